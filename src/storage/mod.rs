mod database;
mod tables;

pub use database::Database;
pub use tables::{SqliteCache, TableRecord};
