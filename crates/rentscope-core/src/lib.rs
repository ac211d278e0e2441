pub mod chips;
pub mod codec;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod geo;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod saved_searches;
pub mod session;
pub mod sources;
pub mod sqlite;
pub mod suggestions;

pub use config::{EngineConfig, LibraryBackend};
pub use engine::{EngineStores, QueryUpdate, SearchEngine};
