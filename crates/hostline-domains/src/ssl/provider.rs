//! Per-host certificate status as cached from the certificate provider

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use super::hints::hints_for_provider_errors;
use crate::status::{ChannelReport, ChannelStatus};

/// Provider wording for a host's certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCertificateStatus {
    #[serde(alias = "issued", alias = "complete")]
    Active,
    #[serde(
        alias = "initializing",
        alias = "pending_validation",
        alias = "pending_issuance",
        alias = "pending_deployment"
    )]
    Pending,
    #[serde(alias = "validation_timed_out", alias = "expired", alias = "deleted")]
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderHostStatus {
    pub status: ProviderCertificateStatus,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ProviderHostStatus {
    pub fn is_complete(&self) -> bool {
        self.status == ProviderCertificateStatus::Active
    }

    /// Channel report for a host whose certificate is not live yet
    pub fn report(&self) -> ChannelReport {
        let status = match self.status {
            ProviderCertificateStatus::Active => ChannelStatus::Complete,
            ProviderCertificateStatus::Failed => ChannelStatus::Failed,
            ProviderCertificateStatus::Pending | ProviderCertificateStatus::Unknown => {
                ChannelStatus::InProgress
            }
        };
        ChannelReport::with_hints(status, hints_for_provider_errors(&self.errors))
    }
}

/// Decode the cached status map, ignoring hosts whose entry is malformed
pub fn parse_statuses(raw: &Value) -> HashMap<String, ProviderHostStatus> {
    raw.as_object()
        .map(|hosts| {
            hosts
                .iter()
                .filter_map(|(host, value)| {
                    serde_json::from_value::<ProviderHostStatus>(value.clone())
                        .ok()
                        .map(|status| (host.to_ascii_lowercase(), status))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Hint;
    use serde_json::json;

    #[test]
    fn test_parses_wording_variants() {
        let statuses = parse_statuses(&json!({
            "clerk.a.com": { "status": "issued" },
            "accounts.a.com": { "status": "pending_validation" },
            "clkmail.a.com": { "status": "brand_new_state", "errors": ["weird"] },
            "Broken.A.com": { "status": "failed", "errors": ["CAA records block issuance"] },
            "garbage.a.com": "nope"
        }));

        assert_eq!(statuses.len(), 4);
        assert!(statuses["clerk.a.com"].is_complete());
        assert_eq!(
            statuses["accounts.a.com"].report().status,
            ChannelStatus::InProgress
        );
        assert_eq!(
            statuses["clkmail.a.com"].status,
            ProviderCertificateStatus::Unknown
        );

        let failed = statuses["broken.a.com"].report();
        assert_eq!(failed.status, ChannelStatus::Failed);
        assert_eq!(failed.hints[0].code, Hint::CAA_RECORD_BLOCKING);
    }
}
