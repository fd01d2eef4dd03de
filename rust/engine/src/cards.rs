use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::GameError;

/// One of the four French suits, or the pseudo-suit carried by jokers.
/// Used as a component of [`Card`]; `Suit::Joker` appears iff the rank is `Rank::Joker`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    /// Hearts suit (♥)
    Hearts,
    /// Diamonds suit (♦)
    Diamonds,
    /// Clubs suit (♣)
    Clubs,
    /// Spades suit (♠)
    Spades,
    /// Jokers carry no real suit
    Joker,
}

impl Suit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Suit::Hearts => "hearts",
            Suit::Diamonds => "diamonds",
            Suit::Clubs => "clubs",
            Suit::Spades => "spades",
            Suit::Joker => "joker",
        }
    }

    pub fn parse(raw: &str) -> Option<Suit> {
        match raw.to_ascii_lowercase().as_str() {
            "hearts" => Some(Suit::Hearts),
            "diamonds" => Some(Suit::Diamonds),
            "clubs" => Some(Suit::Clubs),
            "spades" => Some(Suit::Spades),
            "joker" => Some(Suit::Joker),
            _ => None,
        }
    }
}

/// Face value of a card. The discriminants follow the run order, Ace low:
/// `A,2,3,...,10,J,Q,K`. `Joker` sits outside the order and never belongs to a run by rank.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Rank {
    #[serde(rename = "A")]
    Ace = 0,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
    Joker,
}

impl Rank {
    /// Position in the run order (Ace = 0, King = 12). `None` for jokers.
    pub fn run_index(&self) -> Option<usize> {
        match self {
            Rank::Joker => None,
            r => Some(*r as usize),
        }
    }

    pub fn from_run_index(index: usize) -> Option<Rank> {
        all_ranks().get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Joker => "Joker",
        }
    }

    pub fn parse(raw: &str) -> Option<Rank> {
        if raw.eq_ignore_ascii_case("joker") {
            return Some(Rank::Joker);
        }
        all_ranks()
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(raw))
    }
}

/// A single playing card. Cards are plain values: two decks are combined,
/// so equal cards are interchangeable and a hand may hold both copies.
///
/// Deserialization goes through [`RawCard`] so that client-submitted cards
/// violating the suit/rank invariant are rejected with [`GameError::InvalidCard`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "RawCard", into = "RawCard")]
pub struct Card {
    pub suit: Suit,
    pub rank: Rank,
}

impl Card {
    pub const JOKER: Card = Card {
        suit: Suit::Joker,
        rank: Rank::Joker,
    };

    /// Builds a card, enforcing `suit == Joker` iff `rank == Joker`.
    pub fn new(suit: Suit, rank: Rank) -> Result<Card, GameError> {
        if (suit == Suit::Joker) != (rank == Rank::Joker) {
            return Err(GameError::InvalidCard {
                suit: suit.as_str().to_string(),
                rank: rank.as_str().to_string(),
            });
        }
        Ok(Card { suit, rank })
    }

    /// Parses the wire form (`{"suit": "hearts", "rank": "10"}`).
    pub fn parse(suit: &str, rank: &str) -> Result<Card, GameError> {
        let invalid = || GameError::InvalidCard {
            suit: suit.to_string(),
            rank: rank.to_string(),
        };
        let s = Suit::parse(suit).ok_or_else(invalid)?;
        let r = Rank::parse(rank).ok_or_else(invalid)?;
        Card::new(s, r).map_err(|_| invalid())
    }

    pub fn is_joker(&self) -> bool {
        self.rank == Rank::Joker
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_joker() {
            write!(f, "Joker")
        } else {
            write!(f, "{} of {}", self.rank.as_str(), self.suit.as_str())
        }
    }
}

/// Untyped card as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCard {
    pub suit: String,
    pub rank: String,
}

impl TryFrom<RawCard> for Card {
    type Error = GameError;

    fn try_from(raw: RawCard) -> Result<Self, Self::Error> {
        Card::parse(&raw.suit, &raw.rank)
    }
}

impl From<Card> for RawCard {
    fn from(card: Card) -> Self {
        RawCard {
            suit: card.suit.as_str().to_string(),
            rank: card.rank.as_str().to_string(),
        }
    }
}

pub fn all_suits() -> [Suit; 4] {
    [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades]
}

/// The thirteen natural ranks in run order.
pub fn all_ranks() -> [Rank; 13] {
    [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ]
}

/// Cards in one single deck: 13 ranks x 4 suits + 2 jokers.
pub const SINGLE_DECK_SIZE: usize = 54;
/// Cards in play during a round: two single decks combined.
pub const DOUBLE_DECK_SIZE: usize = 2 * SINGLE_DECK_SIZE;

/// The canonical 54-card deck in a fixed order. No randomness.
pub fn create_deck() -> Vec<Card> {
    let mut v = Vec::with_capacity(SINGLE_DECK_SIZE);
    for &s in &all_suits() {
        for &r in &all_ranks() {
            v.push(Card { suit: s, rank: r });
        }
    }
    v.push(Card::JOKER);
    v.push(Card::JOKER);
    v
}

/// Two independent canonical decks concatenated: 108 cards.
pub fn create_double_deck() -> Vec<Card> {
    let mut v = create_deck();
    v.extend(create_deck());
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_uses_client_names() {
        let card = Card::new(Suit::Hearts, Rank::Ten).unwrap();
        let json = serde_json::to_value(card).unwrap();
        assert_eq!(json, serde_json::json!({"suit": "hearts", "rank": "10"}));

        let joker: Card = serde_json::from_str(r#"{"suit":"joker","rank":"Joker"}"#).unwrap();
        assert!(joker.is_joker());
    }

    #[test]
    fn mismatched_joker_is_rejected() {
        assert!(matches!(
            Card::parse("hearts", "Joker"),
            Err(GameError::InvalidCard { .. })
        ));
        assert!(Card::parse("joker", "7").is_err());
        assert!(Card::parse("stars", "7").is_err());
        assert!(Card::parse("spades", "1").is_err());
        assert!(serde_json::from_str::<Card>(r#"{"suit":"joker","rank":"A"}"#).is_err());
    }

    #[test]
    fn run_index_places_ace_low() {
        assert_eq!(Rank::Ace.run_index(), Some(0));
        assert_eq!(Rank::King.run_index(), Some(12));
        assert_eq!(Rank::Joker.run_index(), None);
        assert_eq!(Rank::from_run_index(9), Some(Rank::Ten));
        assert_eq!(Rank::from_run_index(13), None);
    }
}
