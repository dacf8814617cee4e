//! Shared types, error model, and configuration for zenrag.
//!
//! This crate is the foundation depended on by all other zenrag crates.
//! It provides:
//! - [`ZenragError`] — the unified error type
//! - Domain types ([`RawItem`], [`CanonicalRecord`], [`FilterCriteria`])
//! - Configuration ([`AppConfig`], config loading, token resolution)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClientConfig, DefaultsConfig, EnrichmentApiConfig, WorkspaceApiConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_token,
};
pub use error::{Result, ZenragError};
pub use types::{CanonicalRecord, FilterCriteria, ItemKind, RawItem, RecordMetadata};
