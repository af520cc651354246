use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one verification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    NotStarted,
    InProgress,
    Complete,
    Failed,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::NotStarted => "not_started",
            ChannelStatus::InProgress => "in_progress",
            ChannelStatus::Complete => "complete",
            ChannelStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable explanation of why a channel is not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub code: String,
    pub message: String,
}

impl Hint {
    pub const CNAME_MISSING: &'static str = "cname_missing";
    pub const CNAME_MISMATCH: &'static str = "cname_mismatch";
    pub const DNS_LOOKUP_FAILED: &'static str = "dns_lookup_failed";
    pub const CAA_RECORD_BLOCKING: &'static str = "caa_record_blocking";
    pub const RATE_LIMITED: &'static str = "rate_limited";
    pub const TRANSIENT_DNS_FAILURE: &'static str = "transient_dns_failure";
    pub const UNKNOWN_ERROR: &'static str = "unknown_error";
    pub const CANNOT_ESTABLISH_CONNECTION: &'static str = "cannot_establish_connection";
    pub const PROXY_HEALTH_CHECK_FAILED: &'static str = "proxy_health_check_failed";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Status of a channel plus the ordered hints explaining it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelReport {
    pub status: ChannelStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<Hint>,
}

impl ChannelReport {
    pub fn new(status: ChannelStatus) -> Self {
        Self {
            status,
            hints: Vec::new(),
        }
    }

    pub fn with_hints(status: ChannelStatus, hints: Vec<Hint>) -> Self {
        Self { status, hints }
    }

    pub fn not_started() -> Self {
        Self::new(ChannelStatus::NotStarted)
    }

    pub fn complete() -> Self {
        Self::new(ChannelStatus::Complete)
    }
}

/// All four channels for one domain
///
/// `mail` is `None` when the domain does not need its own mail setup and
/// `proxy` is `None` when no proxy URL is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployStatus {
    pub domain_id: i32,
    pub dns: ChannelReport,
    pub ssl: ChannelReport,
    pub mail: Option<ChannelReport>,
    pub proxy: Option<ChannelReport>,
}
