//! Configuration for the verification engine
//!
//! All fields have defaults so an empty document deserializes to a working
//! configuration. Operator escape hatches (`skip_proxy_checks`,
//! `skip_xff_validation`) are plain fields and get injected into the services
//! that honour them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VerificationSettings {
    /// Minimum time between two DNS verification runs for the same domain
    pub dns_cache_ttl_secs: u64,
    /// After this long an in-flight DNS job is presumed lost
    pub dns_job_inflight_expiry_secs: u64,
    pub tls_probe_timeout_ms: u64,
    pub proxy_health_timeout_ms: u64,
    pub identity_oracle_timeout_ms: u64,
    pub skip_proxy_checks: bool,
    pub skip_xff_validation: bool,
    pub identity_oracle_url: String,
    pub platform: PlatformSettings,
}

/// Targets and labels used to build CNAME requirements
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlatformSettings {
    pub base_domain: String,
    pub frontend_api_subdomain: String,
    pub accounts_subdomain: String,
    pub mail_subdomain: String,
    pub dkim1_subdomain: String,
    pub dkim2_subdomain: String,
}

const DEFAULT_BASE_DOMAIN: &str = "hostline.services";

/// Longest accepted throttle window; larger values are clamped to it
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            dns_cache_ttl_secs: 300,
            dns_job_inflight_expiry_secs: 1800,
            tls_probe_timeout_ms: 3000,
            proxy_health_timeout_ms: 5000,
            identity_oracle_timeout_ms: 5000,
            skip_proxy_checks: false,
            skip_xff_validation: false,
            identity_oracle_url: format!("https://api.{}/v1/whatismyip", DEFAULT_BASE_DOMAIN),
            platform: PlatformSettings::default(),
        }
    }
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            base_domain: DEFAULT_BASE_DOMAIN.to_string(),
            frontend_api_subdomain: "clerk".to_string(),
            accounts_subdomain: "accounts".to_string(),
            mail_subdomain: "clkmail".to_string(),
            dkim1_subdomain: "clk._domainkey".to_string(),
            dkim2_subdomain: "clk2._domainkey".to_string(),
        }
    }
}

impl VerificationSettings {
    pub fn dns_cache_ttl(&self) -> chrono::Duration {
        window(self.dns_cache_ttl_secs)
    }

    pub fn dns_job_inflight_expiry(&self) -> chrono::Duration {
        window(self.dns_job_inflight_expiry_secs)
    }

    pub fn tls_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.tls_probe_timeout_ms)
    }

    pub fn proxy_health_timeout(&self) -> Duration {
        Duration::from_millis(self.proxy_health_timeout_ms)
    }

    pub fn identity_oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.identity_oracle_timeout_ms)
    }
}

fn window(secs: u64) -> chrono::Duration {
    let secs = i64::try_from(secs.min(MAX_WINDOW_SECS)).unwrap_or(i64::MAX);
    chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_falls_back_to_defaults() {
        let settings: VerificationSettings = serde_json::from_value(serde_json::json!({
            "dns_cache_ttl_secs": 60,
            "skip_xff_validation": true,
            "platform": { "base_domain": "example.net" }
        }))
        .unwrap();

        assert_eq!(settings.dns_cache_ttl(), chrono::Duration::seconds(60));
        assert!(settings.skip_xff_validation);
        assert!(!settings.skip_proxy_checks);
        assert_eq!(settings.tls_probe_timeout(), Duration::from_secs(3));
        assert_eq!(settings.platform.base_domain, "example.net");
        assert_eq!(settings.platform.accounts_subdomain, "accounts");
    }

    #[test]
    fn test_oversized_windows_are_clamped() {
        let settings = VerificationSettings {
            dns_cache_ttl_secs: u64::MAX,
            dns_job_inflight_expiry_secs: i64::MAX as u64,
            ..Default::default()
        };

        let max = chrono::Duration::seconds(MAX_WINDOW_SECS as i64);
        assert_eq!(settings.dns_cache_ttl(), max);
        assert_eq!(settings.dns_job_inflight_expiry(), max);
        assert!(settings.dns_cache_ttl() > chrono::Duration::zero());
    }
}
