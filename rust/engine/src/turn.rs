use serde::{Deserialize, Serialize};

use crate::player::PlayerId;

/// Seating for one round: fixed when the round starts, with a cursor on the
/// player to act. The cursor is always a valid index while the order is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOrder {
    players: Vec<PlayerId>,
    current: usize,
}

/// What removing a player did to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    NotSeated,
    /// Someone else left; the current player keeps the turn.
    Other,
    /// The player to act left; the turn passes to whoever followed them.
    Current,
}

impl TurnOrder {
    pub fn new(players: Vec<PlayerId>) -> Self {
        Self {
            players,
            current: 0,
        }
    }

    pub fn current(&self) -> Option<&PlayerId> {
        self.players.get(self.current)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn is_current(&self, id: &str) -> bool {
        self.current().is_some_and(|p| p == id)
    }

    /// `current = (current + 1) mod len`.
    pub fn advance(&mut self) -> Option<&PlayerId> {
        if !self.players.is_empty() {
            self.current = (self.current + 1) % self.players.len();
        }
        self.current()
    }

    /// Drops `id` from the order. The cursor follows identity, not position:
    /// a departure before the cursor shifts it back by one so the same player
    /// keeps the turn, and the departure of the current player hands the turn
    /// to the next seat (wrapping to the first).
    pub fn remove(&mut self, id: &str) -> Removal {
        let Some(index) = self.players.iter().position(|p| p == id) else {
            return Removal::NotSeated;
        };
        self.players.remove(index);
        let removal = match index.cmp(&self.current) {
            std::cmp::Ordering::Less => {
                self.current -= 1;
                Removal::Other
            }
            std::cmp::Ordering::Equal => Removal::Current,
            std::cmp::Ordering::Greater => Removal::Other,
        };
        if self.current >= self.players.len() {
            self.current = 0;
        }
        removal
    }

    pub fn contains(&self, id: &str) -> bool {
        self.players.iter().any(|p| p == id)
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(ids: &[&str]) -> TurnOrder {
        TurnOrder::new(ids.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn advance_wraps() {
        let mut t = order(&["a", "b", "c"]);
        assert_eq!(t.current().map(String::as_str), Some("a"));
        t.advance();
        t.advance();
        assert_eq!(t.current().map(String::as_str), Some("c"));
        assert_eq!(t.advance().map(String::as_str), Some("a"));
    }

    #[test]
    fn removing_earlier_seat_keeps_current_player() {
        let mut t = order(&["a", "b", "c"]);
        t.advance();
        t.advance();
        assert_eq!(t.remove("a"), Removal::Other);
        assert_eq!(t.current().map(String::as_str), Some("c"));
        assert_eq!(t.current_index(), 1);
    }

    #[test]
    fn removing_current_passes_turn_to_next_seat() {
        let mut t = order(&["a", "b", "c"]);
        t.advance();
        assert_eq!(t.remove("b"), Removal::Current);
        assert_eq!(t.current().map(String::as_str), Some("c"));

        // Last seat leaving wraps to the first.
        assert_eq!(t.remove("c"), Removal::Current);
        assert_eq!(t.current().map(String::as_str), Some("a"));
    }

    #[test]
    fn removing_later_seat_or_stranger() {
        let mut t = order(&["a", "b"]);
        assert_eq!(t.remove("zz"), Removal::NotSeated);
        assert_eq!(t.remove("b"), Removal::Other);
        assert_eq!(t.current().map(String::as_str), Some("a"));
        assert_eq!(t.remove("a"), Removal::Current);
        assert!(t.current().is_none());
        assert_eq!(t.advance(), None);
    }
}
