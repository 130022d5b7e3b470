pub mod config;
pub mod error;
pub mod ingest;
pub mod query;
pub mod relation;
pub mod store;

pub use error::{EngineError, Result};
