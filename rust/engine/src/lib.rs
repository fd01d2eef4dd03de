//! # continental-engine: Continental Rummy Table Engine
//!
//! Server-authoritative rules for Continental, a seven-round rummy played
//! with two 54-card decks by up to five players. Every round demands a quota
//! of trios and runs; the first player to meet it with the cards they hold
//! closes the round and everyone else scores the penalty of their hand.
//!
//! The engine is synchronous and owns no I/O. Each operation returns an
//! [`events::Outcome`]: the notifications to deliver (each addressed to all
//! players, one player, or all but one) and the score-ledger rows to persist.
//!
//! ## Core Modules
//!
//! - [`cards`] - Suit, Rank, Card and double-deck construction
//! - [`deck`] - Seeded ChaCha20 shuffling, dealing, the draw pile
//! - [`meld`] - Trio/run validation against a round quota
//! - [`rules`] - Round table, hand sizes, penalties, engine config
//! - [`player`] - Player identity, lobby, inbound actions
//! - [`turn`] - Turn order cursor
//! - [`game`] - Hands, piles, opened cards and scores of one game
//! - [`engine`] - The round/turn state machine
//! - [`events`] - Outbound notifications and their audiences
//! - [`ledger`] - Score ledger sinks
//! - [`errors`] - Error types for rejected operations
//!
//! ## Quick Start
//!
//! ```rust
//! use continental_engine::engine::Engine;
//! use continental_engine::rules::EngineConfig;
//!
//! let mut table = Engine::new(EngineConfig::seeded(42));
//! table.connect("ana").unwrap();
//! table.connect("ben").unwrap();
//! table.start_round("ana").unwrap();
//!
//! let outcome = table.draw_from_deck("ana").unwrap();
//! assert!(outcome.names().contains(&"cardDrawn"));
//! ```
//!
//! ## Meld Validation
//!
//! ```rust
//! use continental_engine::cards::Card;
//! use continental_engine::meld::{validate, MeldStrategy};
//! use continental_engine::rules::RoundRequirement;
//!
//! let cards: Vec<Card> = [("hearts", "7"), ("spades", "7"), ("joker", "joker")]
//!     .iter()
//!     .map(|(s, r)| Card::parse(s, r).unwrap())
//!     .collect();
//! let verdict = validate(&cards, RoundRequirement::new(1, 0), MeldStrategy::Greedy).unwrap();
//! assert!(verdict.satisfied);
//! ```

pub mod cards;
pub mod deck;
pub mod engine;
pub mod errors;
pub mod events;
pub mod game;
pub mod ledger;
pub mod meld;
pub mod player;
pub mod rules;
pub mod turn;
