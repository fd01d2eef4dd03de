pub mod health;
pub mod sse;
pub mod tables;

pub use health::health;
pub use sse::stream_events;
pub use tables::{
    create_table, delete_table, get_table, join_table, leave_table, list_tables, submit_action,
    ActionResponse, CreateTableRequest, JoinRequest, JoinResponse, TableResponse, ViewQuery,
};
