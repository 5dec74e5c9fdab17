//! Shared types, error model, and configuration for tourledger.
//!
//! This crate is the foundation depended on by all other tourledger crates.
//! It provides:
//! - [`TourLedgerError`]: the unified error type
//! - Domain types ([`SubjectId`], [`Message`], [`InteractionRecord`], [`TourStatus`])
//! - Configuration ([`AppConfig`], [`SyncConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, LedgerConfig, OracleConfig, SourceConfig, SyncConfig, config_dir,
    config_file_path, expand_home, init_config, init_config_at, load_config, load_config_from,
    resolve_api_key, validate_api_key,
};
pub use error::{Result, TourLedgerError};
pub use types::{
    InteractionRecord, Message, NO_TIMESTAMP, RECORD_SCHEMA_VERSION, SubjectId, SubjectRef,
    TourStatus, UNKNOWN, entity_key,
};
