use crate::settings::{AppSettings, LedgerKind};
use crate::tables::TableId;
use continental_engine::ledger::{
    JsonlLedger, LedgerEntry, LedgerError, LedgerTable, MemoryLedger, ScoreLedger,
};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const BUSY_RETRIES: u32 = 3;
const BUSY_BACKOFF: Duration = Duration::from_millis(25);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS ongoing_scores (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id TEXT NOT NULL,
    score INTEGER NOT NULL,
    round INTEGER NOT NULL,
    ts TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS completed_scores (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id TEXT NOT NULL,
    score INTEGER NOT NULL,
    round INTEGER NOT NULL,
    ts TEXT NOT NULL
);
";

/// Score rows in a SQLite file, one table per ledger table.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLedger").finish_non_exhaustive()
    }
}

fn backend(err: rusqlite::Error) -> LedgerError {
    LedgerError::Backend(err.to_string())
}

fn sqlite_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(info, _)
            if matches!(
                info.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
    )
}

impl SqliteLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path).map_err(backend)?)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::init(Connection::open_in_memory().map_err(backend)?)
    }

    fn init(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(SCHEMA).map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Rows of one table in insertion order.
    pub fn rows(&self, table: LedgerTable) -> Result<Vec<LedgerEntry>, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let sql = format!(
            "SELECT player_id, score, round, ts FROM {} ORDER BY id",
            table.as_str()
        );
        let mut stmt = conn.prepare(&sql).map_err(backend)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LedgerEntry {
                    table,
                    player_id: row.get(0)?,
                    score: row.get(1)?,
                    round: row.get(2)?,
                    ts: row.get(3)?,
                })
            })
            .map_err(backend)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(backend)
    }

    /// Latest cumulative score per player from the ongoing table.
    pub fn latest_scores(&self) -> Result<Vec<(String, i32)>, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let mut stmt = conn
            .prepare(
                "SELECT player_id, score FROM ongoing_scores
                 WHERE id IN (SELECT MAX(id) FROM ongoing_scores GROUP BY player_id)
                 ORDER BY player_id",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(backend)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(backend)
    }

    fn insert_all(conn: &mut Connection, entries: &[LedgerEntry]) -> rusqlite::Result<()> {
        let tx = conn.transaction()?;
        for entry in entries {
            let entry = entry.stamped();
            let sql = format!(
                "INSERT INTO {} (player_id, score, round, ts) VALUES (?1, ?2, ?3, ?4)",
                entry.table.as_str()
            );
            tx.execute(
                &sql,
                params![
                    entry.player_id,
                    entry.score,
                    entry.round,
                    entry.ts.unwrap_or_default()
                ],
            )?;
        }
        tx.commit()
    }
}

impl ScoreLedger for SqliteLedger {
    fn append(&self, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        let mut attempt = 0;
        loop {
            match Self::insert_all(&mut conn, entries) {
                Ok(()) => return Ok(()),
                Err(err) if sqlite_busy(&err) && attempt < BUSY_RETRIES => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "score ledger busy, retrying");
                    thread::sleep(BUSY_BACKOFF * attempt);
                }
                Err(err) => return Err(backend(err)),
            }
        }
    }
}

enum WriterMessage {
    Rows {
        table_id: TableId,
        entries: Vec<LedgerEntry>,
    },
    Flush(oneshot::Sender<()>),
}

/// Appends score rows on a dedicated thread, in submission order, so a slow
/// or locked ledger never holds up a request. Failures are logged and the
/// rows dropped; the scores stay committed in the engine.
#[derive(Debug, Clone)]
pub struct LedgerWriter {
    sender: mpsc::UnboundedSender<WriterMessage>,
}

impl LedgerWriter {
    pub fn spawn(ledger: Arc<dyn ScoreLedger>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let started = thread::Builder::new()
            .name("score-ledger".into())
            .spawn(move || drain(ledger, receiver));
        if let Err(err) = started {
            tracing::error!(error = %err, "failed to start score ledger writer");
        }
        Self { sender }
    }

    /// Queues rows without waiting for the write.
    pub fn submit(&self, table_id: &TableId, entries: Vec<LedgerEntry>) {
        let rows = entries.len();
        let message = WriterMessage::Rows {
            table_id: table_id.clone(),
            entries,
        };
        if self.sender.send(message).is_err() {
            tracing::error!(table_id = %table_id, rows, "score ledger writer stopped, rows dropped");
        }
    }

    /// Resolves once every row submitted before the call has been handled.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(WriterMessage::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

fn drain(ledger: Arc<dyn ScoreLedger>, mut receiver: mpsc::UnboundedReceiver<WriterMessage>) {
    while let Some(message) = receiver.blocking_recv() {
        match message {
            WriterMessage::Rows { table_id, entries } => match ledger.append(&entries) {
                Ok(()) => {
                    tracing::info!(table_id = %table_id, rows = entries.len(), "scores persisted")
                }
                Err(err) => tracing::error!(
                    table_id = %table_id,
                    rows = entries.len(),
                    error = %err,
                    "failed to persist scores"
                ),
            },
            WriterMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("score ledger writer stopped");
}

/// Builds the ledger the settings ask for.
pub fn open_ledger(settings: &AppSettings) -> Result<Arc<dyn ScoreLedger>, LedgerError> {
    let path = settings.ledger_path.as_deref();
    let ledger: Arc<dyn ScoreLedger> = match (settings.ledger, path) {
        (LedgerKind::Memory, _) => Arc::new(MemoryLedger::new()),
        (LedgerKind::Jsonl, Some(path)) => Arc::new(JsonlLedger::create(path)?),
        (LedgerKind::Sqlite, Some(path)) => Arc::new(SqliteLedger::open(path)?),
        (kind, None) => {
            return Err(LedgerError::Backend(format!(
                "{kind:?} ledger needs a ledger_path"
            )))
        }
    };
    tracing::info!(kind = ?settings.ledger, path = ?path, "score ledger ready");
    Ok(ledger)
}
