use serde::{Deserialize, Serialize};

use crate::cards::{Card, Rank};
use crate::meld::MeldStrategy;

/// Meld quota for one round: how many trios and runs a player must lay down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoundRequirement {
    pub trios: u8,
    pub runs: u8,
}

impl RoundRequirement {
    pub const fn new(trios: u8, runs: u8) -> Self {
        Self { trios, runs }
    }

    pub fn is_empty(&self) -> bool {
        self.trios == 0 && self.runs == 0
    }
}

/// Rounds in a full game.
pub const MAX_ROUNDS: u8 = 7;

/// Hard cap on concurrently connected players.
pub const MAX_PLAYERS: usize = 5;

/// Fixed quota table, indexed by `round - 1`.
pub const ROUND_REQUIREMENTS: [RoundRequirement; MAX_ROUNDS as usize] = [
    RoundRequirement::new(2, 0),
    RoundRequirement::new(1, 1),
    RoundRequirement::new(0, 2),
    RoundRequirement::new(3, 0),
    RoundRequirement::new(1, 2),
    RoundRequirement::new(2, 1),
    RoundRequirement::new(0, 3),
];

/// Quota for a 1-based round number, `None` outside `1..=MAX_ROUNDS`.
pub fn requirement_for_round(round: u8) -> Option<RoundRequirement> {
    if round == 0 {
        return None;
    }
    ROUND_REQUIREMENTS.get(round as usize - 1).copied()
}

/// Cards dealt to each player: `6 + round`, so 7 in round 1 up to 13 in round 7.
pub fn hand_size_for_round(round: u8) -> usize {
    6 + round as usize
}

/// Penalty value of a card left in hand when someone closes.
pub fn penalty_points(card: &Card) -> i32 {
    match card.rank {
        Rank::Joker => 50,
        Rank::Ace => 20,
        Rank::Jack | Rank::Queen | Rank::King => 10,
        r => r as i32 + 1,
    }
}

pub fn hand_penalty(cards: &[Card]) -> i32 {
    cards.iter().map(penalty_points).sum()
}

/// What `drawFromDeck` does once the draw pile runs dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawPilePolicy {
    /// Shuffle every discard except the top card back into the draw pile.
    #[default]
    ReshuffleDiscard,
    /// Refuse the draw with `EmptyDrawPile`.
    Reject,
}

impl DrawPilePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().replace('-', "_").as_str() {
            "reshuffle_discard" | "reshuffle" => Some(Self::ReshuffleDiscard),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Per-table engine knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seed for the table's random source; `None` seeds from OS entropy.
    pub seed: Option<u64>,
    pub draw_pile: DrawPilePolicy,
    pub strategy: MeldStrategy,
    /// Lobby capacity, at most [`MAX_PLAYERS`].
    pub capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            draw_pile: DrawPilePolicy::default(),
            strategy: MeldStrategy::default(),
            capacity: MAX_PLAYERS,
        }
    }
}

impl EngineConfig {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }
}
