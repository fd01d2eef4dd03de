//! HTTP and Server-Sent Events front end for continental tables.
//!
//! Each table owns one [`continental_engine::engine::Engine`] behind a lock.
//! Actions arrive as JSON over HTTP, notifications leave through a per-player
//! SSE stream filtered by audience, and score rows are queued for a
//! background writer once the table lock has been released.
pub mod errors;
pub mod events;
pub mod handlers;
pub mod ledger;
pub mod logging;
pub mod server;
pub mod settings;
pub mod tables;

pub use errors::{ErrorResponse, ErrorSeverity, IntoErrorResponse};
pub use events::{EventBus, EventSubscription};
pub use ledger::{open_ledger, LedgerWriter, SqliteLedger};
pub use logging::{init_logging, init_test_logging, LogEntry, LogFormat, TestLogSubscriber};
pub use server::{AppContext, ServerConfig, ServerError, ServerHandle, WebServer};
pub use settings::{
    AppSettings, LedgerKind, ResolvedSettings, SettingsError, SettingsOverrides, SettingsSources,
    ValueSource,
};
pub use tables::{ActionReceipt, GameTable, TableError, TableId, TableManager, TableSummary};
