//! Core utilities and types shared across all Hostline crates

pub mod clock;
pub mod config;
pub mod error_reporting;
pub mod jobs;
pub mod types;

// Re-export commonly used types
pub use clock::*;
pub use config::*;
pub use error_reporting::*;
pub use jobs::*;
pub use types::*;

// Re-export external dependencies
pub use chrono;
pub use serde;
pub use serde_json;
pub use tracing;
