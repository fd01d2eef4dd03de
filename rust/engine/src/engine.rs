use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cards::{Card, DOUBLE_DECK_SIZE};
use crate::errors::GameError;
use crate::events::{Dispatch, Event, Outcome};
use crate::game::{GameState, OpenedCard};
use crate::ledger::LedgerEntry;
use crate::meld;
use crate::player::{Lobby, PlayerAction, PlayerId};
use crate::rules::{
    hand_penalty, hand_size_for_round, requirement_for_round, DrawPilePolicy, EngineConfig,
    RoundRequirement,
};
use crate::turn::{Removal, TurnOrder};

/// Where the current player is within their turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    AwaitingDraw,
    /// Drew a card; may discard, open or close.
    AwaitingDiscardOrOpen,
    /// Laying cards down one at a time.
    Opening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Lobby,
    RoundInProgress { turn: TurnPhase },
    /// A round was closed; waiting for someone to start the next one.
    NextRound,
    GameOver,
}

/// Read-only picture of a table. Hands other than the viewer's are reduced
/// to their sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableView {
    #[serde(flatten)]
    pub phase: Phase,
    pub round: u8,
    pub max_rounds: u8,
    pub requirement: Option<RoundRequirement>,
    pub capacity: usize,
    pub players: Vec<PlayerId>,
    pub turn_order: Vec<PlayerId>,
    pub current_player: Option<PlayerId>,
    pub hand_sizes: BTreeMap<PlayerId, usize>,
    pub scores: BTreeMap<PlayerId, i32>,
    pub round_scores: BTreeMap<PlayerId, i32>,
    pub opened_cards: Vec<OpenedCard>,
    pub players_opened: Vec<PlayerId>,
    pub draw_pile: usize,
    pub discard_pile: usize,
    pub discard_top: Option<Card>,
    #[serde(default)]
    pub hand: Option<Vec<Card>>,
}

/// One table's game: lobby, cards, turn cursor and phase. Every operation
/// either succeeds and returns the notifications it produced, or fails and
/// leaves the table exactly as it was.
///
/// # Examples
///
/// ```
/// use continental_engine::engine::Engine;
/// use continental_engine::player::PlayerAction;
/// use continental_engine::rules::EngineConfig;
///
/// let mut engine = Engine::new(EngineConfig::seeded(7));
/// engine.connect("alice").unwrap();
/// engine.connect("bob").unwrap();
///
/// let outcome = engine.apply("bob", PlayerAction::StartRound).unwrap();
/// assert!(outcome.names().contains(&"newRound"));
/// assert_eq!(engine.current_player().map(String::as_str), Some("alice"));
/// assert_eq!(engine.state().hand("bob").map(|h| h.len()), Some(7));
/// ```
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    lobby: Lobby,
    state: GameState,
    turn: TurnOrder,
    phase: Phase,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            lobby: Lobby::new(config.capacity),
            state: GameState::new(config.seed),
            turn: TurnOrder::default(),
            phase: Phase::Lobby,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Raw access for scripting hands and piles in tests.
    #[doc(hidden)]
    pub fn state_mut_for_test(&mut self) -> &mut GameState {
        &mut self.state
    }

    pub fn turn_order(&self) -> &TurnOrder {
        &self.turn
    }

    /// The player to act, only while a round is running.
    pub fn current_player(&self) -> Option<&PlayerId> {
        match self.phase {
            Phase::RoundInProgress { .. } => self.turn.current(),
            _ => None,
        }
    }

    pub fn apply(&mut self, actor: &str, action: PlayerAction) -> Result<Outcome, GameError> {
        match action {
            PlayerAction::StartRound => self.start_round(actor),
            PlayerAction::DrawCard => self.draw_from_deck(actor),
            PlayerAction::TakeCard => self.take_from_discard(actor),
            PlayerAction::DiscardCard { card } => self.discard(actor, card),
            PlayerAction::Open => self.open(actor),
            PlayerAction::SelectCardForOpening { card } => self.select_card_for_opening(actor, card),
            PlayerAction::Close => self.close(actor),
        }
    }

    pub fn connect(&mut self, id: &str) -> Result<Outcome, GameError> {
        self.lobby.join(id.to_string())?;
        self.state.register_player(id);

        let mut outcome = Outcome::default();
        outcome.broadcast(Event::UpdatePlayers {
            players: self.lobby.players().to_vec(),
        });
        outcome.send_to(
            id,
            Event::UpdateGameState {
                state: Box::new(self.snapshot(Some(id))),
            },
        );
        Ok(outcome)
    }

    /// Removes a player. A dealt hand goes under the discard pile so the card
    /// count holds; the turn passes on if it was theirs.
    pub fn disconnect(&mut self, id: &str) -> Result<Outcome, GameError> {
        self.lobby.leave(id)?;
        let hand = self.state.forget_player(id);
        let removal = self.turn.remove(id);

        let mut outcome = Outcome::default();
        outcome.broadcast(Event::UpdatePlayers {
            players: self.lobby.players().to_vec(),
        });
        if !hand.is_empty() {
            self.state.bury_in_discard(hand);
            outcome.broadcast(self.discard_pile_event());
        }
        if removal != Removal::NotSeated {
            outcome.broadcast(Event::UpdateTurnOrder {
                turn_order: self.turn.players().to_vec(),
            });
        }

        if let Phase::RoundInProgress { .. } = self.phase {
            if self.turn.is_empty() {
                self.phase = Phase::Lobby;
            } else if removal == Removal::Current {
                self.set_turn_phase(TurnPhase::AwaitingDraw);
                self.announce_turn(&mut outcome);
            }
        }

        if self.lobby.is_empty() {
            self.phase = Phase::Lobby;
            self.turn = TurnOrder::default();
            self.state.reset_game(&[]);
        }
        Ok(outcome)
    }

    /// Deals the current round to every connected player. From `GameOver`
    /// this starts a new game at round 1 with zeroed scores.
    pub fn start_round(&mut self, actor: &str) -> Result<Outcome, GameError> {
        if !self.lobby.contains(actor) {
            return Err(GameError::UnknownPlayer(actor.to_string()));
        }
        let fresh_game = match self.phase {
            Phase::Lobby | Phase::NextRound => false,
            Phase::GameOver => true,
            Phase::RoundInProgress { .. } => {
                return Err(GameError::InvalidAction(
                    "a round is already in progress".into(),
                ))
            }
        };
        let round = if fresh_game { 1 } else { self.state.round() };
        let requirement = requirement_for_round(round)
            .ok_or_else(|| GameError::InvalidAction("the game is over".into()))?;
        let players = self.lobby.players().to_vec();
        let hand_size = hand_size_for_round(round);
        if players.len() * hand_size > DOUBLE_DECK_SIZE {
            return Err(GameError::InsufficientCards {
                requested: players.len() * hand_size,
                available: DOUBLE_DECK_SIZE,
            });
        }

        if fresh_game {
            self.state.reset_game(&players);
        }
        self.state.deal_round(&players, hand_size)?;
        self.turn = TurnOrder::new(players.clone());
        self.phase = Phase::RoundInProgress {
            turn: TurnPhase::AwaitingDraw,
        };

        let mut outcome = Outcome::default();
        let hand_sizes = self.state.hand_sizes();
        for id in &players {
            outcome.send_to(
                id,
                Event::NewRound {
                    round,
                    requirement,
                    hand: self.state.hand(id).map(<[Card]>::to_vec).unwrap_or_default(),
                    hand_sizes: hand_sizes.clone(),
                },
            );
        }
        outcome.broadcast(Event::UpdateTurnOrder {
            turn_order: players,
        });
        outcome.broadcast(Event::UpdateDrawPile {
            count: self.state.draw_pile().remaining(),
        });
        outcome.broadcast(self.discard_pile_event());
        self.announce_turn(&mut outcome);
        Ok(outcome)
    }

    pub fn draw_from_deck(&mut self, actor: &str) -> Result<Outcome, GameError> {
        if self.require_turn(actor)? != TurnPhase::AwaitingDraw {
            return Err(GameError::InvalidAction("already drew this turn".into()));
        }

        let mut outcome = Outcome::default();
        if self.state.draw_pile().is_empty() {
            match self.config.draw_pile {
                DrawPilePolicy::Reject => return Err(GameError::EmptyDrawPile),
                DrawPilePolicy::ReshuffleDiscard => {
                    let moved = self.state.recycle_discards();
                    if moved == 0 {
                        return Err(GameError::EmptyDrawPile);
                    }
                    outcome.broadcast(Event::DrawPileRestocked { count: moved });
                    outcome.broadcast(self.discard_pile_event());
                }
            }
        }
        let card = self.state.draw().ok_or(GameError::EmptyDrawPile)?;
        self.state.give(actor, card);
        self.set_turn_phase(TurnPhase::AwaitingDiscardOrOpen);

        outcome.push(Dispatch::to(
            actor,
            Event::CardDrawn {
                player_id: actor.to_string(),
                card: Some(card),
            },
        ));
        outcome.push(Dispatch::all_except(
            actor,
            Event::CardDrawn {
                player_id: actor.to_string(),
                card: None,
            },
        ));
        outcome.broadcast(Event::UpdateDrawPile {
            count: self.state.draw_pile().remaining(),
        });
        outcome.send_to(actor, self.action_buttons(actor));
        Ok(outcome)
    }

    pub fn take_from_discard(&mut self, actor: &str) -> Result<Outcome, GameError> {
        if self.require_turn(actor)? != TurnPhase::AwaitingDraw {
            return Err(GameError::InvalidAction("already drew this turn".into()));
        }
        let card = self.state.take_discard().ok_or(GameError::EmptyDiscardPile)?;
        self.state.give(actor, card);
        self.set_turn_phase(TurnPhase::AwaitingDiscardOrOpen);

        let mut outcome = Outcome::default();
        outcome.broadcast(Event::CardTaken {
            player_id: actor.to_string(),
            card,
        });
        outcome.broadcast(self.discard_pile_event());
        outcome.send_to(actor, self.action_buttons(actor));
        Ok(outcome)
    }

    /// Ends the turn. Always allowed once the player has drawn, opened or not.
    pub fn discard(&mut self, actor: &str, card: Card) -> Result<Outcome, GameError> {
        if self.require_turn(actor)? == TurnPhase::AwaitingDraw {
            return Err(GameError::InvalidAction(
                "draw a card before discarding".into(),
            ));
        }
        let card = self.state.take_from_hand(actor, card)?;
        self.state.push_discard(card);
        self.turn.advance();
        self.set_turn_phase(TurnPhase::AwaitingDraw);

        let mut outcome = Outcome::default();
        outcome.broadcast(Event::CardDiscarded {
            player_id: actor.to_string(),
            card,
        });
        outcome.broadcast(self.discard_pile_event());
        outcome.send_to(actor, self.action_buttons(actor));
        self.announce_turn(&mut outcome);
        Ok(outcome)
    }

    /// Enters the opening sub-phase. Idempotent while already opening.
    pub fn open(&mut self, actor: &str) -> Result<Outcome, GameError> {
        match self.require_turn(actor)? {
            TurnPhase::AwaitingDraw => {
                return Err(GameError::InvalidAction("draw a card before opening".into()))
            }
            TurnPhase::AwaitingDiscardOrOpen => self.set_turn_phase(TurnPhase::Opening),
            TurnPhase::Opening => {}
        }
        let mut outcome = Outcome::default();
        self.publish_state(actor, &mut outcome);
        Ok(outcome)
    }

    /// Moves one card from the hand into the opened pool, then re-checks the
    /// player's laid-down cards against the round quota. Cards stay laid down
    /// whatever the verdict. The last card in hand is only accepted when it
    /// completes the quota, so the player always keeps a discard or a close.
    pub fn select_card_for_opening(&mut self, actor: &str, card: Card) -> Result<Outcome, GameError> {
        if self.require_turn(actor)? != TurnPhase::Opening {
            return Err(GameError::InvalidAction(
                "open before selecting cards".into(),
            ));
        }
        let requirement = self.current_requirement()?;
        let holds_card = self
            .state
            .hand(actor)
            .is_some_and(|hand| hand.contains(&card));
        if !holds_card {
            return Err(GameError::CardNotInHand(card));
        }
        let mut laid_down = self.state.opened_by(actor);
        laid_down.push(card);
        let verdict = meld::validate(&laid_down, requirement, self.config.strategy)?;
        let last_card = self.state.hand(actor).is_some_and(|hand| hand.len() == 1);
        if last_card && !verdict.satisfied {
            return Err(GameError::InvalidAction(
                "the last card can only be laid down to complete the opening".into(),
            ));
        }

        self.state.take_from_hand(actor, card)?;
        self.state.lay_down(actor, card);

        let mut outcome = Outcome::default();
        self.publish_state(actor, &mut outcome);
        if verdict.satisfied {
            if self.state.mark_opened(actor) {
                outcome.broadcast(Event::OpenValid {
                    player_id: actor.to_string(),
                });
                outcome.broadcast(Event::ShowPostOpenActions {
                    player_id: actor.to_string(),
                });
            }
        } else {
            outcome.send_to(
                actor,
                Event::InvalidOpening {
                    player_id: actor.to_string(),
                    requirement,
                    trios: verdict.partition.trios(),
                    runs: verdict.partition.runs(),
                },
            );
        }
        outcome.send_to(actor, self.action_buttons(actor));
        Ok(outcome)
    }

    /// Ends the round if the actor's opened cards plus hand meet the quota.
    /// Every other dealt player scores the penalty of the hand they hold.
    pub fn close(&mut self, actor: &str) -> Result<Outcome, GameError> {
        if self.require_turn(actor)? == TurnPhase::AwaitingDraw {
            return Err(GameError::InvalidAction("draw a card before closing".into()));
        }
        let requirement = self.current_requirement()?;
        if !self.closing_set_satisfies(actor, requirement)? {
            return Err(GameError::InvalidClose);
        }

        let mut round_scores: BTreeMap<PlayerId, i32> = self
            .state
            .hands()
            .iter()
            .map(|(id, hand)| {
                let points = if id == actor { 0 } else { hand_penalty(hand) };
                (id.clone(), points)
            })
            .collect();
        for id in self.lobby.players() {
            round_scores.entry(id.clone()).or_insert(0);
        }

        let closed_round = self.state.round();
        self.state.commit_round_scores(round_scores.clone());
        let scores = self.state.scores().clone();

        let mut outcome = Outcome::default();
        outcome.ledger.extend(round_scores.keys().map(|id| {
            LedgerEntry::ongoing(id, scores.get(id).copied().unwrap_or(0), closed_round)
        }));

        self.state.advance_round();
        self.turn.advance();

        if self.state.is_past_last_round() {
            self.phase = Phase::GameOver;
            outcome.ledger.extend(self.lobby.players().iter().map(|id| {
                LedgerEntry::completed(id, scores.get(id).copied().unwrap_or(0), closed_round)
            }));
            outcome.broadcast(Event::GameOver {
                round_scores,
                scores,
            });
        } else {
            self.state.clear_round_scores();
            self.phase = Phase::NextRound;
            outcome.broadcast(Event::NextRound {
                round: self.state.round(),
                round_scores,
                scores,
            });
        }
        Ok(outcome)
    }

    /// Which controls `id` may use right now.
    pub fn action_buttons(&self, id: &str) -> Event {
        let turn = match self.phase {
            Phase::RoundInProgress { turn } if self.turn.is_current(id) => Some(turn),
            _ => None,
        };
        let drawn = matches!(
            turn,
            Some(TurnPhase::AwaitingDiscardOrOpen | TurnPhase::Opening)
        );
        let satisfied = drawn
            && self
                .current_requirement()
                .and_then(|req| self.closing_set_satisfies(id, req))
                .unwrap_or(false);
        Event::UpdateActionButtons {
            can_draw: turn == Some(TurnPhase::AwaitingDraw),
            can_open: satisfied && !self.state.has_opened(id),
            can_close: satisfied,
            can_discard: drawn,
        }
    }

    pub fn snapshot(&self, viewer: Option<&str>) -> TableView {
        TableView {
            phase: self.phase,
            round: self.state.round(),
            max_rounds: self.state.max_rounds(),
            requirement: self.state.requirement(),
            capacity: self.lobby.capacity(),
            players: self.lobby.players().to_vec(),
            turn_order: self.turn.players().to_vec(),
            current_player: self.current_player().cloned(),
            hand_sizes: self.state.hand_sizes(),
            scores: self.state.scores().clone(),
            round_scores: self.state.round_scores().clone(),
            opened_cards: self.state.opened_cards().to_vec(),
            players_opened: self.state.players_opened().iter().cloned().collect(),
            draw_pile: self.state.draw_pile().remaining(),
            discard_pile: self.state.discard_pile().len(),
            discard_top: self.state.discard_top(),
            hand: viewer
                .and_then(|id| self.state.hand(id))
                .map(<[Card]>::to_vec),
        }
    }

    fn require_turn(&self, actor: &str) -> Result<TurnPhase, GameError> {
        if !self.lobby.contains(actor) {
            return Err(GameError::UnknownPlayer(actor.to_string()));
        }
        let Phase::RoundInProgress { turn } = self.phase else {
            return Err(GameError::InvalidAction("no round in progress".into()));
        };
        match self.turn.current() {
            Some(current) if current == actor => Ok(turn),
            Some(current) => Err(GameError::NotYourTurn {
                expected: current.clone(),
                actual: actor.to_string(),
            }),
            None => Err(GameError::InvalidAction("no round in progress".into())),
        }
    }

    fn current_requirement(&self) -> Result<RoundRequirement, GameError> {
        self.state
            .requirement()
            .ok_or_else(|| GameError::InvalidAction("the game is over".into()))
    }

    /// Opened cards plus hand, checked as one set.
    fn closing_set_satisfies(&self, id: &str, requirement: RoundRequirement) -> Result<bool, GameError> {
        let mut cards = self.state.opened_by(id);
        cards.extend_from_slice(self.state.hand(id).unwrap_or_default());
        meld::can_satisfy(&cards, requirement, self.config.strategy)
    }

    fn set_turn_phase(&mut self, turn: TurnPhase) {
        if let Phase::RoundInProgress { .. } = self.phase {
            self.phase = Phase::RoundInProgress { turn };
        }
    }

    fn announce_turn(&self, outcome: &mut Outcome) {
        if let Some(next) = self.turn.current() {
            outcome.broadcast(Event::PlayerTurn {
                player_id: next.clone(),
            });
            outcome.send_to(next, self.action_buttons(next));
        }
    }

    fn discard_pile_event(&self) -> Event {
        Event::UpdateDiscardPile {
            count: self.state.discard_pile().len(),
            top: self.state.discard_top(),
        }
    }

    fn publish_state(&self, actor: &str, outcome: &mut Outcome) {
        outcome.push(Dispatch::all_except(
            actor,
            Event::UpdateGameState {
                state: Box::new(self.snapshot(None)),
            },
        ));
        outcome.send_to(
            actor,
            Event::UpdateGameState {
                state: Box::new(self.snapshot(Some(actor))),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(ids: &[&str]) -> Engine {
        let mut engine = Engine::new(EngineConfig::seeded(11));
        for id in ids {
            engine.connect(id).unwrap();
        }
        engine
    }

    #[test]
    fn start_round_deals_and_hands_turn_to_first_seat() {
        let mut engine = table(&["a", "b", "c"]);
        let outcome = engine.start_round("c").unwrap();
        assert_eq!(
            engine.phase(),
            Phase::RoundInProgress {
                turn: TurnPhase::AwaitingDraw
            }
        );
        assert_eq!(engine.current_player().map(String::as_str), Some("a"));
        assert_eq!(engine.state().card_count(), DOUBLE_DECK_SIZE);
        // Each player sees exactly one newRound, carrying their own hand.
        for id in ["a", "b", "c"] {
            let rounds: Vec<_> = outcome
                .visible_to(id)
                .filter(|e| e.name() == "newRound")
                .collect();
            assert_eq!(rounds.len(), 1);
            match rounds[0] {
                Event::NewRound { hand, .. } => {
                    assert_eq!(Some(hand.as_slice()), engine.state().hand(id))
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn drawn_card_is_hidden_from_opponents() {
        let mut engine = table(&["a", "b"]);
        engine.start_round("a").unwrap();
        let outcome = engine.draw_from_deck("a").unwrap();
        let seen_by = |id: &str| {
            outcome
                .visible_to(id)
                .find_map(|e| match e {
                    Event::CardDrawn { card, .. } => Some(*card),
                    _ => None,
                })
                .flatten()
        };
        assert!(seen_by("a").is_some());
        assert!(seen_by("b").is_none());
    }

    #[test]
    fn second_start_is_rejected_mid_round() {
        let mut engine = table(&["a"]);
        engine.start_round("a").unwrap();
        assert!(matches!(
            engine.start_round("a"),
            Err(GameError::InvalidAction(_))
        ));
    }

    #[test]
    fn opening_requires_a_draw_first() {
        let mut engine = table(&["a", "b"]);
        engine.start_round("a").unwrap();
        assert!(matches!(engine.open("a"), Err(GameError::InvalidAction(_))));
        engine.draw_from_deck("a").unwrap();
        engine.open("a").unwrap();
        engine.open("a").unwrap();
        assert_eq!(
            engine.phase(),
            Phase::RoundInProgress {
                turn: TurnPhase::Opening
            }
        );
    }

    #[test]
    fn snapshot_hides_other_hands() {
        let mut engine = table(&["a", "b"]);
        engine.start_round("a").unwrap();
        let view = engine.snapshot(Some("b"));
        assert_eq!(view.hand.as_deref(), engine.state().hand("b"));
        assert_eq!(view.hand_sizes.get("a"), Some(&7));
        assert!(engine.snapshot(None).hand.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["phase"], "round_in_progress");
        assert_eq!(json["turn"], "awaiting_draw");
    }
}
