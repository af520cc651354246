//! Certificate-provider error strings mapped to stable hint codes

use crate::status::Hint;

/// First matching substring wins; comparison is case-insensitive
const PROVIDER_ERROR_TABLE: &[(&str, &str, &str)] = &[
    (
        "caa",
        Hint::CAA_RECORD_BLOCKING,
        "A CAA record on the domain does not allow the certificate authority to issue",
    ),
    (
        "rate limit",
        Hint::RATE_LIMITED,
        "The certificate authority rate limited issuance; it will be retried",
    ),
    (
        "too many certificates",
        Hint::RATE_LIMITED,
        "The certificate authority rate limited issuance; it will be retried",
    ),
    (
        "servfail",
        Hint::TRANSIENT_DNS_FAILURE,
        "The domain's authoritative DNS failed to answer; it will be retried",
    ),
    (
        "timeout during connect",
        Hint::TRANSIENT_DNS_FAILURE,
        "The domain's authoritative DNS failed to answer; it will be retried",
    ),
    (
        "dns problem",
        Hint::TRANSIENT_DNS_FAILURE,
        "The domain's authoritative DNS failed to answer; it will be retried",
    ),
];

const UNKNOWN_ERROR_MESSAGE: &str = "Certificate issuance failed for an unrecognized reason";

/// Hint for one provider error string
pub fn hint_for_provider_error(error: &str) -> Hint {
    let lowered = error.to_lowercase();
    PROVIDER_ERROR_TABLE
        .iter()
        .find(|(needle, _, _)| lowered.contains(needle))
        .map(|(_, code, message)| Hint::new(*code, *message))
        .unwrap_or_else(|| Hint::new(Hint::UNKNOWN_ERROR, UNKNOWN_ERROR_MESSAGE))
}

/// Hints for every error, keeping order and dropping repeated codes
pub fn hints_for_provider_errors(errors: &[String]) -> Vec<Hint> {
    let mut hints: Vec<Hint> = Vec::new();
    for error in errors {
        let hint = hint_for_provider_error(error);
        if !hints.iter().any(|h| h.code == hint.code) {
            hints.push(hint);
        }
    }
    hints
}
