//! Custom types for common data structures

use chrono::{DateTime as ChronoDateTime, Utc};

/// Database DateTime type used across all Hostline crates
///
/// This is the canonical datetime type for `TIMESTAMPTZ` columns.
pub type DBDateTime = ChronoDateTime<Utc>;

/// Standard UTC DateTime type used across all Hostline crates
///
/// Serializes as ISO 8601 with a `Z` suffix, e.g. `2025-10-12T12:15:47.609192Z`.
pub type UtcDateTime = ChronoDateTime<Utc>;
