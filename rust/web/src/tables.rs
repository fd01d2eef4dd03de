use crate::errors::{ErrorSeverity, IntoErrorResponse};
use crate::events::EventBus;
use crate::ledger::LedgerWriter;
use chrono::{SecondsFormat, Utc};
use continental_engine::engine::{Engine, TableView};
use continental_engine::errors::GameError;
use continental_engine::events::{Dispatch, Outcome};
use continental_engine::ledger::{MemoryLedger, ScoreLedger};
use continental_engine::player::{PlayerAction, PlayerId};
use continental_engine::rules::EngineConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use uuid::Uuid;
use warp::http::StatusCode;

pub type TableId = String;

/// One game table: an engine behind a lock, plus bookkeeping.
#[derive(Debug)]
pub struct GameTable {
    id: TableId,
    created_at: String,
    engine: Mutex<Engine>,
}

impl GameTable {
    fn new(id: TableId, config: EngineConfig) -> Self {
        Self {
            id,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            engine: Mutex::new(Engine::new(config)),
        }
    }

    pub fn id(&self) -> &TableId {
        &self.id
    }

    pub fn view(&self, viewer: Option<&str>) -> Result<TableView, TableError> {
        let engine = self.engine.lock().map_err(|_| TableError::StoragePoisoned)?;
        Ok(engine.snapshot(viewer))
    }

    pub fn config(&self) -> Result<EngineConfig, TableError> {
        let engine = self.engine.lock().map_err(|_| TableError::StoragePoisoned)?;
        Ok(engine.config().clone())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table_id: TableId,
    pub created_at: String,
    pub players: usize,
    pub capacity: usize,
    pub round: u8,
}

/// What an accepted action produced, as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReceipt {
    pub table_id: TableId,
    pub player_id: PlayerId,
    pub events: Vec<&'static str>,
}

/// Owns every table in the process. Engine calls happen under the table's
/// lock together with event delivery, so subscribers see one table's events
/// in commit order. Score rows go to a background writer once the lock is
/// released.
pub struct TableManager {
    tables: RwLock<HashMap<TableId, Arc<GameTable>>>,
    event_bus: Arc<EventBus>,
    ledger: LedgerWriter,
    defaults: EngineConfig,
}

impl std::fmt::Debug for TableManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableManager")
            .field("defaults", &self.defaults)
            .field("tables", &self.active_tables().len())
            .finish()
    }
}

impl TableManager {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self::with_ledger(event_bus, Arc::new(MemoryLedger::new()), EngineConfig::default())
    }

    pub fn with_ledger(
        event_bus: Arc<EventBus>,
        ledger: Arc<dyn ScoreLedger>,
        defaults: EngineConfig,
    ) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            event_bus,
            ledger: LedgerWriter::spawn(ledger),
            defaults,
        }
    }

    /// Waits until every score row queued so far has been handled.
    pub async fn flush_ledger(&self) {
        self.ledger.flush().await;
    }

    pub fn defaults(&self) -> &EngineConfig {
        &self.defaults
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn create_table(&self, config: EngineConfig) -> Result<TableId, TableError> {
        let id = Uuid::new_v4().to_string();
        tracing::info!(
            table_id = %id,
            seed = ?config.seed,
            draw_pile = ?config.draw_pile,
            strategy = ?config.strategy,
            capacity = config.capacity,
            "creating table"
        );
        let table = Arc::new(GameTable::new(id.clone(), config));
        self.tables
            .write()
            .map_err(|_| TableError::StoragePoisoned)?
            .insert(id.clone(), table);
        Ok(id)
    }

    pub fn get_table(&self, id: &TableId) -> Result<Arc<GameTable>, TableError> {
        let guard = self.tables.read().map_err(|_| TableError::StoragePoisoned)?;
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| TableError::NotFound(id.clone()))
    }

    pub fn delete_table(&self, id: &TableId) -> Result<(), TableError> {
        let removed = self
            .tables
            .write()
            .map_err(|_| TableError::StoragePoisoned)?
            .remove(id);
        match removed {
            Some(_) => {
                self.event_bus.drop_table(id);
                tracing::info!(table_id = %id, "table closed");
                Ok(())
            }
            None => Err(TableError::NotFound(id.clone())),
        }
    }

    pub fn active_tables(&self) -> Vec<TableId> {
        match self.tables.read() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn summaries(&self) -> Result<Vec<TableSummary>, TableError> {
        let tables: Vec<Arc<GameTable>> = {
            let guard = self.tables.read().map_err(|_| TableError::StoragePoisoned)?;
            guard.values().cloned().collect()
        };
        let mut summaries = Vec::with_capacity(tables.len());
        for table in tables {
            let view = table.view(None)?;
            summaries.push(TableSummary {
                table_id: table.id.clone(),
                created_at: table.created_at.clone(),
                players: view.players.len(),
                capacity: view.capacity,
                round: view.round,
            });
        }
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(summaries)
    }

    pub fn view(&self, id: &TableId, viewer: Option<&str>) -> Result<TableView, TableError> {
        self.get_table(id)?.view(viewer)
    }

    /// Seats a new player, minting an id when none is supplied.
    pub fn join(&self, id: &TableId, player_id: Option<PlayerId>) -> Result<PlayerId, TableError> {
        let player_id = player_id
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let joined = player_id.clone();
        self.run(id, &player_id, move |engine| engine.connect(&joined))?;
        tracing::info!(table_id = %id, player_id = %player_id, "player connected");
        Ok(player_id)
    }

    pub fn leave(&self, id: &TableId, player_id: &str) -> Result<(), TableError> {
        self.run(id, player_id, |engine| engine.disconnect(player_id))?;
        self.event_bus.drop_player(id, player_id);
        tracing::info!(table_id = %id, player_id = %player_id, "player disconnected");
        Ok(())
    }

    pub fn act(
        &self,
        id: &TableId,
        player_id: &str,
        action: PlayerAction,
    ) -> Result<ActionReceipt, TableError> {
        tracing::debug!(table_id = %id, player_id = %player_id, action = ?action, "applying action");
        let outcome = self.run(id, player_id, |engine| engine.apply(player_id, action))?;
        Ok(ActionReceipt {
            table_id: id.clone(),
            player_id: player_id.to_string(),
            events: outcome.names(),
        })
    }

    /// Applies `op` under the table lock and delivers its notifications. A
    /// rejection is reported to the actor as a directed notice and leaves the
    /// table untouched.
    fn run<F>(&self, id: &TableId, actor: &str, op: F) -> Result<Outcome, TableError>
    where
        F: FnOnce(&mut Engine) -> Result<Outcome, GameError>,
    {
        let table = self.get_table(id)?;
        let outcome = {
            let mut engine = table
                .engine
                .lock()
                .map_err(|_| TableError::StoragePoisoned)?;
            match op(&mut *engine) {
                Ok(outcome) => {
                    self.event_bus.publish(id, &outcome.events);
                    outcome
                }
                Err(err) => {
                    tracing::debug!(table_id = %id, player_id = %actor, error = %err, "action rejected");
                    self.event_bus.publish(id, &[Dispatch::rejection(actor, &err)]);
                    return Err(TableError::Rejected(err));
                }
            }
        };

        if !outcome.ledger.is_empty() {
            self.ledger.submit(id, outcome.ledger.clone());
        }
        Ok(outcome)
    }
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Table not found: {0}")]
    NotFound(TableId),
    #[error(transparent)]
    Rejected(#[from] GameError),
    #[error("Invalid table configuration: {0}")]
    InvalidConfig(String),
    #[error("Table storage poisoned")]
    StoragePoisoned,
}

impl IntoErrorResponse for TableError {
    fn status_code(&self) -> StatusCode {
        match self {
            TableError::NotFound(_) => StatusCode::NOT_FOUND,
            TableError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            TableError::StoragePoisoned => StatusCode::INTERNAL_SERVER_ERROR,
            TableError::Rejected(err) => match err {
                GameError::UnknownPlayer(_) => StatusCode::NOT_FOUND,
                GameError::NotYourTurn { .. }
                | GameError::GameFull { .. }
                | GameError::AlreadyConnected(_) => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            },
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            TableError::NotFound(_) => "table_not_found",
            TableError::InvalidConfig(_) => "invalid_table_config",
            TableError::StoragePoisoned => "table_storage_error",
            TableError::Rejected(err) => err.code(),
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            TableError::NotFound(id) => Some(serde_json::json!({ "table_id": id })),
            TableError::Rejected(GameError::NotYourTurn { expected, .. }) => {
                Some(serde_json::json!({ "current_player": expected }))
            }
            _ => None,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            TableError::StoragePoisoned => ErrorSeverity::Critical,
            _ => ErrorSeverity::Client,
        }
    }
}
