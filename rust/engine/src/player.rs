use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::errors::GameError;
use crate::rules::MAX_PLAYERS;

/// Opaque player identity handed out by the transport (one per connection).
pub type PlayerId = String;

/// Inbound requests a connected player can make, tagged by their protocol name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerAction {
    StartRound,
    /// Take the top card of the draw pile
    DrawCard,
    /// Take the face-up card of the discard pile
    TakeCard,
    DiscardCard { card: Card },
    Open,
    SelectCardForOpening { card: Card },
    Close,
}

/// Connected players in connection order, capped at the table capacity.
/// The engine only reads it when building a round's turn order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lobby {
    players: Vec<PlayerId>,
    capacity: usize,
}

impl Default for Lobby {
    fn default() -> Self {
        Self::new(MAX_PLAYERS)
    }
}

impl Lobby {
    pub fn new(capacity: usize) -> Self {
        Self {
            players: Vec::with_capacity(capacity),
            capacity: capacity.clamp(1, MAX_PLAYERS),
        }
    }

    pub fn join(&mut self, id: PlayerId) -> Result<(), GameError> {
        if self.contains(&id) {
            return Err(GameError::AlreadyConnected(id));
        }
        if self.is_full() {
            return Err(GameError::GameFull {
                capacity: self.capacity,
            });
        }
        self.players.push(id);
        Ok(())
    }

    pub fn leave(&mut self, id: &str) -> Result<(), GameError> {
        let before = self.players.len();
        self.players.retain(|p| p != id);
        if self.players.len() == before {
            return Err(GameError::UnknownPlayer(id.to_string()));
        }
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.players.iter().any(|p| p == id)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.capacity
    }

    pub fn players(&self) -> &[PlayerId] {
        &self.players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_from_protocol_json() {
        let action: PlayerAction = serde_json::from_str(
            r#"{"type":"discardCard","card":{"suit":"hearts","rank":"Q"}}"#,
        )
        .unwrap();
        assert_eq!(
            action,
            PlayerAction::DiscardCard {
                card: Card::parse("hearts", "Q").unwrap()
            }
        );
        let start: PlayerAction = serde_json::from_str(r#"{"type":"startRound"}"#).unwrap();
        assert_eq!(start, PlayerAction::StartRound);
        assert!(serde_json::from_str::<PlayerAction>(r#"{"type":"fold"}"#).is_err());
    }

    #[test]
    fn sixth_connection_is_rejected() {
        let mut lobby = Lobby::default();
        for i in 0..5 {
            lobby.join(format!("p{i}")).expect("seat available");
        }
        assert_eq!(
            lobby.join("p5".into()),
            Err(GameError::GameFull { capacity: 5 })
        );
        assert_eq!(lobby.len(), 5);
    }

    #[test]
    fn capacity_never_exceeds_five() {
        assert_eq!(Lobby::new(9).capacity(), 5);
    }

    #[test]
    fn duplicate_and_unknown_ids() {
        let mut lobby = Lobby::new(2);
        lobby.join("a".into()).unwrap();
        assert_eq!(
            lobby.join("a".into()),
            Err(GameError::AlreadyConnected("a".into()))
        );
        assert_eq!(lobby.leave("zz"), Err(GameError::UnknownPlayer("zz".into())));
        lobby.leave("a").unwrap();
        assert!(lobby.is_empty());
    }
}
