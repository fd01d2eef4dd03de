use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::deck::Deck;
use crate::errors::GameError;
use crate::player::PlayerId;
use crate::rules::{requirement_for_round, RoundRequirement, MAX_ROUNDS, ROUND_REQUIREMENTS};

/// A card laid down while opening, tagged with its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenedCard {
    pub card: Card,
    pub player_id: PlayerId,
}

/// Everything a table knows about the cards and scores of the current game.
/// Pure data: only the [`crate::engine::Engine`] mutates it.
///
/// While a round is running, draw pile + discard pile + hands + opened cards
/// always add up to [`crate::cards::DOUBLE_DECK_SIZE`].
#[derive(Debug)]
pub struct GameState {
    round: u8,
    max_rounds: u8,
    meld_requirements: [RoundRequirement; MAX_ROUNDS as usize],
    hands: BTreeMap<PlayerId, Vec<Card>>,
    /// Cumulative across rounds
    scores: BTreeMap<PlayerId, i32>,
    round_scores: BTreeMap<PlayerId, i32>,
    opened_cards: Vec<OpenedCard>,
    players_opened: BTreeSet<PlayerId>,
    draw_pile: Deck,
    /// Bottom-to-top; the last card is face up
    discard_pile: Vec<Card>,
}

impl GameState {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            round: 1,
            max_rounds: MAX_ROUNDS,
            meld_requirements: ROUND_REQUIREMENTS,
            hands: BTreeMap::new(),
            scores: BTreeMap::new(),
            round_scores: BTreeMap::new(),
            opened_cards: Vec::new(),
            players_opened: BTreeSet::new(),
            draw_pile: Deck::new(seed),
            discard_pile: Vec::new(),
        }
    }

    pub fn round(&self) -> u8 {
        self.round
    }

    pub fn max_rounds(&self) -> u8 {
        self.max_rounds
    }

    pub fn is_past_last_round(&self) -> bool {
        self.round > self.max_rounds
    }

    pub fn meld_requirements(&self) -> &[RoundRequirement] {
        &self.meld_requirements
    }

    /// Quota for the current round, `None` once the game is over.
    pub fn requirement(&self) -> Option<RoundRequirement> {
        requirement_for_round(self.round).map(|_| self.meld_requirements[self.round as usize - 1])
    }

    pub fn hand(&self, id: &str) -> Option<&[Card]> {
        self.hands.get(id).map(Vec::as_slice)
    }

    pub fn hands(&self) -> &BTreeMap<PlayerId, Vec<Card>> {
        &self.hands
    }

    pub fn hand_sizes(&self) -> BTreeMap<PlayerId, usize> {
        self.hands
            .iter()
            .map(|(id, hand)| (id.clone(), hand.len()))
            .collect()
    }

    pub fn scores(&self) -> &BTreeMap<PlayerId, i32> {
        &self.scores
    }

    pub fn round_scores(&self) -> &BTreeMap<PlayerId, i32> {
        &self.round_scores
    }

    pub fn opened_cards(&self) -> &[OpenedCard] {
        &self.opened_cards
    }

    /// The subset of the opened pool laid down by `id`.
    pub fn opened_by(&self, id: &str) -> Vec<Card> {
        self.opened_cards
            .iter()
            .filter(|o| o.player_id == id)
            .map(|o| o.card)
            .collect()
    }

    pub fn players_opened(&self) -> &BTreeSet<PlayerId> {
        &self.players_opened
    }

    pub fn has_opened(&self, id: &str) -> bool {
        self.players_opened.contains(id)
    }

    pub fn draw_pile(&self) -> &Deck {
        &self.draw_pile
    }

    pub fn discard_pile(&self) -> &[Card] {
        &self.discard_pile
    }

    pub fn discard_top(&self) -> Option<Card> {
        self.discard_pile.last().copied()
    }

    pub fn card_count(&self) -> usize {
        self.draw_pile.remaining()
            + self.discard_pile.len()
            + self.hands.values().map(Vec::len).sum::<usize>()
            + self.opened_cards.len()
    }

    /// Makes sure a connected player has score entries.
    pub(crate) fn register_player(&mut self, id: &str) {
        self.scores.entry(id.to_string()).or_insert(0);
        self.round_scores.entry(id.to_string()).or_insert(0);
    }

    /// Drops a departing player's hand, scores and opened status. Returns the hand.
    pub(crate) fn forget_player(&mut self, id: &str) -> Vec<Card> {
        self.scores.remove(id);
        self.round_scores.remove(id);
        self.players_opened.remove(id);
        self.hands.remove(id).unwrap_or_default()
    }

    /// Puts cards face down under the discard pile.
    pub(crate) fn bury_in_discard(&mut self, cards: Vec<Card>) {
        let mut pile = cards;
        pile.append(&mut self.discard_pile);
        self.discard_pile = pile;
    }

    /// Fresh shuffled double deck, new hands, empty opened pool and discard pile.
    pub(crate) fn deal_round(
        &mut self,
        players: &[PlayerId],
        hand_size: usize,
    ) -> Result<(), GameError> {
        self.draw_pile.shuffle();
        let dealt = self.draw_pile.deal(players, hand_size)?;
        self.hands = dealt.into_iter().collect();
        self.opened_cards.clear();
        self.players_opened.clear();
        self.discard_pile.clear();
        Ok(())
    }

    pub(crate) fn draw(&mut self) -> Option<Card> {
        self.draw_pile.draw()
    }

    /// Shuffles all discards but the face-up one back into the draw pile.
    /// Returns how many cards moved.
    pub(crate) fn recycle_discards(&mut self) -> usize {
        if self.discard_pile.len() < 2 {
            return 0;
        }
        let top = self.discard_pile.split_off(self.discard_pile.len() - 1);
        let recycled = std::mem::replace(&mut self.discard_pile, top);
        let moved = recycled.len();
        self.draw_pile.restock(recycled);
        moved
    }

    pub(crate) fn take_discard(&mut self) -> Option<Card> {
        self.discard_pile.pop()
    }

    pub(crate) fn push_discard(&mut self, card: Card) {
        self.discard_pile.push(card);
    }

    pub(crate) fn give(&mut self, id: &str, card: Card) {
        self.hands.entry(id.to_string()).or_default().push(card);
    }

    /// Removes one copy of `card` from the hand of `id`.
    pub(crate) fn take_from_hand(&mut self, id: &str, card: Card) -> Result<Card, GameError> {
        let hand = self
            .hands
            .get_mut(id)
            .ok_or_else(|| GameError::UnknownPlayer(id.to_string()))?;
        let index = hand
            .iter()
            .position(|c| *c == card)
            .ok_or(GameError::CardNotInHand(card))?;
        Ok(hand.remove(index))
    }

    pub(crate) fn lay_down(&mut self, id: &str, card: Card) {
        self.opened_cards.push(OpenedCard {
            card,
            player_id: id.to_string(),
        });
    }

    pub(crate) fn mark_opened(&mut self, id: &str) -> bool {
        self.players_opened.insert(id.to_string())
    }

    /// Folds the given round scores into the cumulative totals.
    pub(crate) fn commit_round_scores(&mut self, round_scores: BTreeMap<PlayerId, i32>) {
        for (id, points) in &round_scores {
            *self.scores.entry(id.clone()).or_insert(0) += points;
        }
        self.round_scores = round_scores;
    }

    pub(crate) fn clear_round_scores(&mut self) {
        for points in self.round_scores.values_mut() {
            *points = 0;
        }
    }

    pub(crate) fn advance_round(&mut self) {
        self.round += 1;
    }

    /// Back to round 1 with zeroed scores for the given players.
    pub(crate) fn reset_game(&mut self, players: &[PlayerId]) {
        self.round = 1;
        self.scores = players.iter().map(|id| (id.clone(), 0)).collect();
        self.round_scores = self.scores.clone();
        self.hands.clear();
        self.opened_cards.clear();
        self.players_opened.clear();
        self.discard_pile.clear();
        self.draw_pile.clear();
    }

    #[doc(hidden)]
    pub fn set_hand_for_test(&mut self, id: &str, cards: Vec<Card>) {
        self.hands.insert(id.to_string(), cards);
    }

    #[doc(hidden)]
    pub fn set_draw_pile_for_test(&mut self, cards: Vec<Card>) {
        self.draw_pile.set_cards_for_test(cards);
    }

    #[doc(hidden)]
    pub fn set_discard_pile_for_test(&mut self, cards: Vec<Card>) {
        self.discard_pile = cards;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::DOUBLE_DECK_SIZE;

    #[test]
    fn dealing_preserves_card_count() {
        let mut state = GameState::new(Some(9));
        let players: Vec<PlayerId> = vec!["a".into(), "b".into(), "c".into()];
        state.deal_round(&players, 9).unwrap();
        assert_eq!(state.card_count(), DOUBLE_DECK_SIZE);
        assert_eq!(state.draw_pile().remaining(), DOUBLE_DECK_SIZE - 27);
        assert!(state.hands().values().all(|h| h.len() == 9));
    }

    #[test]
    fn recycling_keeps_the_face_up_card() {
        let mut state = GameState::new(Some(1));
        state.set_draw_pile_for_test(Vec::new());
        state.set_discard_pile_for_test(vec![Card::JOKER, Card::JOKER, crate::cards::create_deck()[0]]);
        assert_eq!(state.recycle_discards(), 2);
        assert_eq!(state.discard_pile().len(), 1);
        assert_eq!(state.draw_pile().remaining(), 2);
        assert!(!state.discard_top().unwrap().is_joker());
    }

    #[test]
    fn burying_goes_under_the_pile() {
        let mut state = GameState::new(Some(1));
        let top = crate::cards::create_deck()[3];
        state.push_discard(top);
        state.bury_in_discard(vec![Card::JOKER]);
        assert_eq!(state.discard_pile(), &[Card::JOKER, top]);
    }
}
