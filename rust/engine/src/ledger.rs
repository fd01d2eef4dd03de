use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::player::PlayerId;

/// Which score table a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerTable {
    /// Cumulative score after each closed round.
    OngoingScores,
    /// Final score, one row per player per finished game.
    CompletedScores,
}

impl LedgerTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerTable::OngoingScores => "ongoing_scores",
            LedgerTable::CompletedScores => "completed_scores",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub table: LedgerTable,
    pub player_id: PlayerId,
    pub score: i32,
    /// Round that produced the row (the last round for completed scores)
    pub round: u8,
    /// RFC3339, filled in on write when missing
    #[serde(default)]
    pub ts: Option<String>,
}

impl LedgerEntry {
    pub fn ongoing(player_id: &str, score: i32, round: u8) -> Self {
        Self {
            table: LedgerTable::OngoingScores,
            player_id: player_id.to_string(),
            score,
            round,
            ts: None,
        }
    }

    pub fn completed(player_id: &str, score: i32, round: u8) -> Self {
        Self {
            table: LedgerTable::CompletedScores,
            player_id: player_id.to_string(),
            score,
            round,
            ts: None,
        }
    }

    /// Copy of the row with `ts` filled in if it was empty.
    pub fn stamped(&self) -> Self {
        let mut entry = self.clone();
        if entry.ts.is_none() {
            entry.ts = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        entry
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger row could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("ledger backend failed: {0}")]
    Backend(String),
    #[error("ledger lock poisoned")]
    Poisoned,
}

/// Append-only sink for score rows. Called outside the table lock.
pub trait ScoreLedger: Send + Sync {
    fn append(&self, entries: &[LedgerEntry]) -> Result<(), LedgerError>;
}

/// Keeps rows in memory; for tests and ledger-less tables.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    pub fn rows_in(&self, table: LedgerTable) -> Vec<LedgerEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.table == table)
            .collect()
    }
}

impl ScoreLedger for MemoryLedger {
    fn append(&self, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
        let mut rows = self.entries.lock().map_err(|_| LedgerError::Poisoned)?;
        rows.extend(entries.iter().map(LedgerEntry::stamped));
        Ok(())
    }
}

/// One JSON object per line, flushed after every batch.
pub struct JsonlLedger {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlLedger {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        let file = File::options().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl ScoreLedger for JsonlLedger {
    fn append(&self, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
        let mut writer = self.writer.lock().map_err(|_| LedgerError::Poisoned)?;
        for entry in entries {
            let line = serde_json::to_string(&entry.stamped())?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_ledger_stamps_rows() {
        let ledger = MemoryLedger::new();
        ledger
            .append(&[
                LedgerEntry::ongoing("a", 12, 1),
                LedgerEntry::completed("a", 40, 7),
            ])
            .unwrap();
        let rows = ledger.entries();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.ts.is_some()));
        assert_eq!(ledger.rows_in(LedgerTable::CompletedScores)[0].score, 40);
    }

    #[test]
    fn jsonl_ledger_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scores.jsonl");
        {
            let ledger = JsonlLedger::create(&path).unwrap();
            ledger.append(&[LedgerEntry::ongoing("a", 5, 1)]).unwrap();
        }
        let ledger = JsonlLedger::create(&path).unwrap();
        ledger.append(&[LedgerEntry::ongoing("a", 9, 2)]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<LedgerEntry> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].score, 9);
        assert_eq!(rows[1].table, LedgerTable::OngoingScores);
    }
}
