use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::engine::TableView;
use crate::errors::GameError;
use crate::ledger::LedgerEntry;
use crate::player::PlayerId;
use crate::rules::RoundRequirement;

/// Who a notification is for. Private data (hands, drawn cards) is only ever
/// addressed to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "to", content = "player_id", rename_all = "snake_case")]
pub enum Audience {
    All,
    Player(PlayerId),
    AllExcept(PlayerId),
}

impl Audience {
    pub fn includes(&self, id: &str) -> bool {
        match self {
            Audience::All => true,
            Audience::Player(p) => p == id,
            Audience::AllExcept(p) => p != id,
        }
    }
}

/// Server-to-client notifications, named after the table protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    UpdatePlayers {
        players: Vec<PlayerId>,
    },
    UpdateTurnOrder {
        turn_order: Vec<PlayerId>,
    },
    GameFull {
        capacity: usize,
    },
    /// Sent to each player separately, carrying only their own hand.
    NewRound {
        round: u8,
        requirement: RoundRequirement,
        hand: Vec<Card>,
        hand_sizes: BTreeMap<PlayerId, usize>,
    },
    PlayerTurn {
        player_id: PlayerId,
    },
    /// `card` is only filled in for the player who drew it.
    CardDrawn {
        player_id: PlayerId,
        card: Option<Card>,
    },
    CardTaken {
        player_id: PlayerId,
        card: Card,
    },
    CardDiscarded {
        player_id: PlayerId,
        card: Card,
    },
    UpdateDrawPile {
        count: usize,
    },
    UpdateDiscardPile {
        count: usize,
        top: Option<Card>,
    },
    DrawPileRestocked {
        count: usize,
    },
    UpdateGameState {
        state: Box<TableView>,
    },
    OpenValid {
        player_id: PlayerId,
    },
    InvalidOpening {
        player_id: PlayerId,
        requirement: RoundRequirement,
        trios: usize,
        runs: usize,
    },
    ShowPostOpenActions {
        player_id: PlayerId,
    },
    InvalidClose {
        reason: String,
    },
    NotYourTurn {
        current_player: PlayerId,
    },
    NextRound {
        round: u8,
        round_scores: BTreeMap<PlayerId, i32>,
        scores: BTreeMap<PlayerId, i32>,
    },
    GameOver {
        round_scores: BTreeMap<PlayerId, i32>,
        scores: BTreeMap<PlayerId, i32>,
    },
    UpdateActionButtons {
        can_draw: bool,
        can_open: bool,
        can_close: bool,
        can_discard: bool,
    },
    ActionRejected {
        code: String,
        message: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::UpdatePlayers { .. } => "updatePlayers",
            Event::UpdateTurnOrder { .. } => "updateTurnOrder",
            Event::GameFull { .. } => "gameFull",
            Event::NewRound { .. } => "newRound",
            Event::PlayerTurn { .. } => "playerTurn",
            Event::CardDrawn { .. } => "cardDrawn",
            Event::CardTaken { .. } => "cardTaken",
            Event::CardDiscarded { .. } => "cardDiscarded",
            Event::UpdateDrawPile { .. } => "updateDrawPile",
            Event::UpdateDiscardPile { .. } => "updateDiscardPile",
            Event::DrawPileRestocked { .. } => "drawPileRestocked",
            Event::UpdateGameState { .. } => "updateGameState",
            Event::OpenValid { .. } => "openValid",
            Event::InvalidOpening { .. } => "invalidOpening",
            Event::ShowPostOpenActions { .. } => "showPostOpenActions",
            Event::InvalidClose { .. } => "invalidClose",
            Event::NotYourTurn { .. } => "notYourTurn",
            Event::NextRound { .. } => "nextRound",
            Event::GameOver { .. } => "gameOver",
            Event::UpdateActionButtons { .. } => "updateActionButtons",
            Event::ActionRejected { .. } => "actionRejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispatch {
    pub audience: Audience,
    pub event: Event,
}

impl Dispatch {
    pub fn all(event: Event) -> Self {
        Self {
            audience: Audience::All,
            event,
        }
    }

    pub fn to(player: &str, event: Event) -> Self {
        Self {
            audience: Audience::Player(player.to_string()),
            event,
        }
    }

    pub fn all_except(player: &str, event: Event) -> Self {
        Self {
            audience: Audience::AllExcept(player.to_string()),
            event,
        }
    }

    /// The directed notice a rejected actor receives.
    pub fn rejection(actor: &str, err: &GameError) -> Self {
        let event = match err {
            GameError::NotYourTurn { expected, .. } => Event::NotYourTurn {
                current_player: expected.clone(),
            },
            GameError::InvalidClose => Event::InvalidClose {
                reason: err.to_string(),
            },
            GameError::GameFull { capacity } => Event::GameFull {
                capacity: *capacity,
            },
            other => Event::ActionRejected {
                code: other.code().to_string(),
                message: other.to_string(),
            },
        };
        Self::to(actor, event)
    }
}

/// Everything one accepted operation produced, in emission order.
/// Ledger rows are written by the caller after it has released the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub events: Vec<Dispatch>,
    pub ledger: Vec<LedgerEntry>,
}

impl Outcome {
    pub fn push(&mut self, dispatch: Dispatch) {
        self.events.push(dispatch);
    }

    pub fn broadcast(&mut self, event: Event) {
        self.events.push(Dispatch::all(event));
    }

    pub fn send_to(&mut self, player: &str, event: Event) {
        self.events.push(Dispatch::to(player, event));
    }

    /// Events `player` would receive, in order.
    pub fn visible_to<'a>(&'a self, player: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events
            .iter()
            .filter(move |d| d.audience.includes(player))
            .map(|d| &d.event)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.iter().map(|d| d.event.name()).collect()
    }
}
