//! JSON shapes persisted on a DNS check row
//!
//! Rows written by older releases stored bare strings (`host -> target`) and
//! objects (`host -> { "verified": bool }`); both still decode. Unknown fields
//! are ignored.

use hostline_entities::dns_checks;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::report::DnsEntry;
use crate::cname::CnameLabel;
use crate::status::Hint;

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredTarget {
    Bare(String),
    Detailed(StoredRequirement),
}

#[derive(Serialize, Deserialize)]
struct StoredRequirement {
    target: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default = "default_required")]
    required: bool,
    #[serde(default)]
    can_be_proxied: bool,
    #[serde(default)]
    proxied: bool,
}

fn default_required() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredResult {
    Flag(bool),
    Detailed {
        #[serde(default)]
        verified: bool,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredHints {
    List(Vec<Hint>),
    Message(String),
}

/// The three JSON columns written by a verification run
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedCheck {
    pub cname_targets: Value,
    pub last_result: Value,
    pub failure_hints: Value,
}

pub fn encode(entries: &[DnsEntry]) -> EncodedCheck {
    let mut targets = Map::new();
    let mut results = Map::new();
    let mut hints = Map::new();

    for entry in entries {
        let stored = StoredRequirement {
            target: entry.target.clone(),
            label: entry.label.and_then(label_name),
            required: entry.required,
            can_be_proxied: entry.can_be_proxied,
            proxied: entry.proxied,
        };
        targets.insert(
            entry.host.clone(),
            serde_json::to_value(stored).unwrap_or(Value::Null),
        );
        results.insert(entry.host.clone(), Value::Bool(entry.verified));
        if !entry.hints.is_empty() {
            hints.insert(
                entry.host.clone(),
                serde_json::to_value(&entry.hints).unwrap_or(Value::Null),
            );
        }
    }

    EncodedCheck {
        cname_targets: Value::Object(targets),
        last_result: Value::Object(results),
        failure_hints: Value::Object(hints),
    }
}

/// Entries stored on `check`, ordered by label then host
pub fn decode(check: &dns_checks::Model) -> Vec<DnsEntry> {
    let Some(targets) = check.cname_targets.as_object() else {
        return Vec::new();
    };
    let results = check.last_result.as_object();
    let hints = check.failure_hints.as_object();

    let mut entries: Vec<DnsEntry> = targets
        .iter()
        .filter_map(|(host, raw)| {
            let stored = match serde_json::from_value::<StoredTarget>(raw.clone()) {
                Ok(StoredTarget::Bare(target)) => StoredRequirement {
                    target,
                    label: None,
                    required: true,
                    can_be_proxied: false,
                    proxied: false,
                },
                Ok(StoredTarget::Detailed(stored)) => stored,
                Err(e) => {
                    warn!(
                        "Skipping undecodable CNAME target for {} on DNS check {}: {}",
                        host, check.id, e
                    );
                    return None;
                }
            };

            let verified = results
                .and_then(|results| results.get(host))
                .and_then(|raw| serde_json::from_value::<StoredResult>(raw.clone()).ok())
                .map(|result| match result {
                    StoredResult::Flag(verified) => verified,
                    StoredResult::Detailed { verified } => verified,
                })
                .unwrap_or(false);

            let host_hints = hints
                .and_then(|hints| hints.get(host))
                .and_then(|raw| serde_json::from_value::<StoredHints>(raw.clone()).ok())
                .map(|stored| match stored {
                    StoredHints::List(list) => list,
                    StoredHints::Message(message) => vec![Hint::new(Hint::UNKNOWN_ERROR, message)],
                })
                .unwrap_or_default();

            Some(DnsEntry {
                host: host.clone(),
                target: stored.target,
                label: stored.label.as_deref().and_then(parse_label),
                required: stored.required,
                can_be_proxied: stored.can_be_proxied,
                proxied: stored.proxied,
                verified,
                hints: host_hints,
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        (a.label.is_none(), a.label, &a.host).cmp(&(b.label.is_none(), b.label, &b.host))
    });
    entries
}

fn label_name(label: CnameLabel) -> Option<String> {
    match serde_json::to_value(label) {
        Ok(Value::String(name)) => Some(name),
        _ => None,
    }
}

fn parse_label(name: &str) -> Option<CnameLabel> {
    serde_json::from_value(Value::String(name.to_string())).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(targets: Value, results: Value, hints: Value) -> dns_checks::Model {
        let now = chrono::Utc::now();
        dns_checks::Model {
            id: 1,
            domain_id: 1,
            cname_targets: targets,
            last_result: results,
            failure_hints: hints,
            job_inflight: false,
            job_requested_at: None,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_decodes_legacy_shapes() {
        let row = check(
            json!({
                "clerk.example.com": "frontend-api.hostline.services",
                "accounts.example.com": {
                    "target": "accounts.hostline.services",
                    "label": "accounts",
                    "required": false,
                    "added_by": "v1"
                }
            }),
            json!({
                "clerk.example.com": { "verified": true },
                "accounts.example.com": false
            }),
            json!({ "accounts.example.com": "no record found" }),
        );

        let entries = decode(&row);
        assert_eq!(entries.len(), 2);

        // Labelled entries sort first
        assert_eq!(entries[0].host, "accounts.example.com");
        assert_eq!(entries[0].label, Some(CnameLabel::Accounts));
        assert!(!entries[0].required);
        assert_eq!(entries[0].hints[0].code, Hint::UNKNOWN_ERROR);

        assert_eq!(entries[1].host, "clerk.example.com");
        assert_eq!(entries[1].label, None);
        assert!(entries[1].required);
        assert!(entries[1].verified);
    }

    #[test]
    fn test_encoded_entries_decode_back() {
        let entries = vec![DnsEntry {
            host: "clerk.example.com".to_string(),
            target: "frontend-api.hostline.services".to_string(),
            label: Some(CnameLabel::FrontendApi),
            required: true,
            can_be_proxied: true,
            proxied: false,
            verified: false,
            hints: vec![Hint::new(Hint::CNAME_MISSING, "missing")],
        }];

        let encoded = encode(&entries);
        assert_eq!(
            encoded.cname_targets["clerk.example.com"]["label"],
            "frontend_api"
        );
        let row = check(encoded.cname_targets, encoded.last_result, encoded.failure_hints);
        assert_eq!(decode(&row), entries);
    }

    #[test]
    fn test_non_object_columns_decode_empty() {
        let row = check(json!([]), json!(null), json!("garbage"));
        assert!(decode(&row).is_empty());
    }
}
