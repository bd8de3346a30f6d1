pub mod connection;
pub mod migrations;
pub mod storage;

pub use connection::{connect, connect_with_settings, DbPool};
pub use storage::{SqliteStorage, StoredEntry, DURABLE_SESSION};
