use serde::{Deserialize, Serialize};

use crate::cname::{CnameLabel, CnameRequirement};
use crate::status::{ChannelReport, ChannelStatus, Hint};

/// One requirement together with its last verification outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsEntry {
    pub host: String,
    pub target: String,
    /// `None` for rows written before labels were persisted
    pub label: Option<CnameLabel>,
    pub required: bool,
    pub can_be_proxied: bool,
    pub proxied: bool,
    pub verified: bool,
    pub hints: Vec<Hint>,
}

impl DnsEntry {
    /// Entry for a requirement that has not been checked yet
    pub fn unchecked(requirement: &CnameRequirement) -> Self {
        Self {
            host: requirement.host.clone(),
            target: requirement.target.clone(),
            label: Some(requirement.label),
            required: requirement.required,
            can_be_proxied: requirement.can_be_proxied,
            proxied: requirement.proxied,
            verified: false,
            hints: Vec::new(),
        }
    }

    pub fn needs_direct_record(&self) -> bool {
        self.required && !self.proxied
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsReport {
    pub status: ChannelStatus,
    pub entries: Vec<DnsEntry>,
}

impl DnsReport {
    /// `complete` when every entry that needs a record verified, otherwise
    /// `in_progress` while a job is running and `not_started` when idle
    pub fn from_entries(entries: Vec<DnsEntry>, job_inflight: bool) -> Self {
        let status = if all_required_verified(&entries) {
            ChannelStatus::Complete
        } else if job_inflight {
            ChannelStatus::InProgress
        } else {
            ChannelStatus::NotStarted
        };
        Self { status, entries }
    }

    pub fn all_required_verified(&self) -> bool {
        all_required_verified(&self.entries)
    }

    pub fn hints(&self) -> Vec<Hint> {
        self.entries
            .iter()
            .flat_map(|entry| entry.hints.iter().cloned())
            .collect()
    }

    pub fn channel_report(&self) -> ChannelReport {
        ChannelReport::with_hints(self.status, self.hints())
    }
}

fn all_required_verified(entries: &[DnsEntry]) -> bool {
    entries
        .iter()
        .filter(|entry| entry.needs_direct_record())
        .all(|entry| entry.verified)
}
