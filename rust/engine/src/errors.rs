use thiserror::Error;

use crate::cards::Card;
use crate::player::PlayerId;

/// Every way an engine operation can be refused. All of them are recoverable:
/// the offending action is simply not applied and the table carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("It's not player {actual}'s turn (expected player {expected})")]
    NotYourTurn { expected: PlayerId, actual: PlayerId },
    #[error("Invalid action: {0}")]
    InvalidAction(String),
    #[error("Card {0} is not in the player's hand")]
    CardNotInHand(Card),
    #[error("Invalid card: suit `{suit}`, rank `{rank}`")]
    InvalidCard { suit: String, rank: String },
    #[error("Hand does not satisfy the round requirement")]
    InvalidClose,
    #[error("Draw pile is empty")]
    EmptyDrawPile,
    #[error("Discard pile is empty")]
    EmptyDiscardPile,
    #[error("Cannot deal {requested} cards from a deck of {available}")]
    InsufficientCards { requested: usize, available: usize },
    #[error("Table is full ({capacity} players)")]
    GameFull { capacity: usize },
    #[error("Unknown player: {0}")]
    UnknownPlayer(PlayerId),
    #[error("Player already connected: {0}")]
    AlreadyConnected(PlayerId),
}

impl GameError {
    /// Stable machine-readable name, matching the notification vocabulary clients know.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::NotYourTurn { .. } => "not_your_turn",
            GameError::InvalidAction(_) => "invalid_action",
            GameError::CardNotInHand(_) => "card_not_in_hand",
            GameError::InvalidCard { .. } => "invalid_card",
            GameError::InvalidClose => "invalid_close",
            GameError::EmptyDrawPile => "empty_draw_pile",
            GameError::EmptyDiscardPile => "empty_discard_pile",
            GameError::InsufficientCards { .. } => "insufficient_cards",
            GameError::GameFull { .. } => "game_full",
            GameError::UnknownPlayer(_) => "unknown_player",
            GameError::AlreadyConnected(_) => "already_connected",
        }
    }
}
