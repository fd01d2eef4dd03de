use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::cards::{create_double_deck, Card};
use crate::errors::GameError;
use crate::player::PlayerId;

/// Uniform in-place permutation (Fisher-Yates).
pub fn shuffle<R: Rng + ?Sized>(cards: &mut [Card], rng: &mut R) {
    cards.shuffle(rng);
}

/// Deals `hand_size` cards to each player, in the order given, from the top
/// (the end) of `deck`. Nothing is removed when the deck is too small.
pub fn deal(
    deck: &mut Vec<Card>,
    players: &[PlayerId],
    hand_size: usize,
) -> Result<Vec<(PlayerId, Vec<Card>)>, GameError> {
    let requested = hand_size * players.len();
    if requested > deck.len() {
        return Err(GameError::InsufficientCards {
            requested,
            available: deck.len(),
        });
    }
    let hands = players
        .iter()
        .map(|id| {
            let split = deck.len() - hand_size;
            let mut hand = deck.split_off(split);
            hand.reverse();
            (id.clone(), hand)
        })
        .collect();
    Ok(hands)
}

/// The draw pile of one table together with the table's single random source.
/// Cards are stored bottom-to-top; the top card is the last element.
#[derive(Debug)]
pub struct Deck {
    cards: Vec<Card>,
    rng: ChaCha20Rng,
}

impl Deck {
    pub fn new_with_seed(seed: u64) -> Self {
        Self::with_rng(ChaCha20Rng::seed_from_u64(seed))
    }

    /// Seeds from the thread-local OS-backed generator so draws are unpredictable.
    pub fn from_entropy() -> Self {
        Self::with_rng(ChaCha20Rng::from_rng(&mut rand::rng()))
    }

    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::new_with_seed(seed),
            None => Self::from_entropy(),
        }
    }

    fn with_rng(rng: ChaCha20Rng) -> Self {
        // Empty until a round starts
        Self {
            cards: Vec::new(),
            rng,
        }
    }

    /// Replaces the pile with a freshly shuffled double deck.
    pub fn shuffle(&mut self) {
        self.cards = create_double_deck();
        shuffle(&mut self.cards, &mut self.rng);
    }

    pub fn deal(
        &mut self,
        players: &[PlayerId],
        hand_size: usize,
    ) -> Result<Vec<(PlayerId, Vec<Card>)>, GameError> {
        deal(&mut self.cards, players, hand_size)
    }

    pub fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    /// Adds `cards` to the pile and reshuffles it with the table's random source.
    pub fn restock(&mut self, cards: Vec<Card>) {
        self.cards.extend(cards);
        shuffle(&mut self.cards, &mut self.rng);
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Drops every card left in the pile.
    pub fn clear(&mut self) {
        self.cards.clear();
    }

    /// Rigs the pile (bottom-to-top) so tests can script the draws.
    #[doc(hidden)]
    pub fn set_cards_for_test(&mut self, cards: Vec<Card>) {
        self.cards = cards;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Rank, Suit};

    #[test]
    fn deal_takes_from_top_in_player_order() {
        let c = |r| Card::new(Suit::Spades, r).unwrap();
        let mut deck = vec![c(Rank::Ace), c(Rank::Two), c(Rank::Three), c(Rank::Four)];
        let hands = deal(&mut deck, &["a".to_string(), "b".to_string()], 1).unwrap();
        assert_eq!(hands[0], ("a".to_string(), vec![c(Rank::Four)]));
        assert_eq!(hands[1], ("b".to_string(), vec![c(Rank::Three)]));
        assert_eq!(deck.len(), 2);
    }

    #[test]
    fn deal_refuses_oversized_request_without_consuming() {
        let mut deck = create_double_deck();
        let players: Vec<PlayerId> = (0..9).map(|i| format!("p{i}")).collect();
        let err = deal(&mut deck, &players, 13).unwrap_err();
        assert_eq!(
            err,
            GameError::InsufficientCards {
                requested: 117,
                available: 108
            }
        );
        assert_eq!(deck.len(), 108);
    }

    #[test]
    fn restock_keeps_every_card() {
        let mut deck = Deck::new_with_seed(3);
        deck.clear();
        assert!(deck.is_empty());
        deck.restock(vec![Card::JOKER; 5]);
        assert_eq!(deck.remaining(), 5);
        assert!(deck.cards().iter().all(Card::is_joker));
    }
}
