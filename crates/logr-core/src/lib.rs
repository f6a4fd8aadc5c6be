//! # logr-core
//!
//! Core types, traits, and configuration for the logr service.
//!
//! This crate provides the foundational data structures and trait
//! definitions that other logr crates depend on.

pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::{normalize_database_url, Settings};
pub use error::{Error, Result};
pub use models::*;
pub use traits::EmbeddingBackend;
