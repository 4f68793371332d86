//! SQLite-Backend

pub mod pool;
pub mod users;

pub use pool::SqliteDb;
