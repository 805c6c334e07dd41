// Public modules
pub mod app;
pub mod config;
pub mod domains;
pub mod errors;
pub mod types;
pub mod validation;

// Private modules
mod db_migration;

pub use app::{initialize, AppContext};
pub use config::{Config, StorageBackend};
pub use db_migration::run_migrations;
