//! SSL channel: certificate status for the hosts that serve HTTPS

pub mod hints;
pub mod probe;
pub mod provider;

pub use hints::{hint_for_provider_error, hints_for_provider_errors};
pub use probe::{ProbeError, RustlsProbe, TlsProbe};
pub use provider::{parse_statuses, ProviderCertificateStatus, ProviderHostStatus};

use futures::future::join_all;
use hostline_entities::{domains, instances};
use std::sync::Arc;
use tracing::debug;

use crate::cname::CnameRequirement;
use crate::dns::DnsReport;
use crate::status::{ChannelReport, ChannelStatus, Hint};

pub struct SslStatusResolver {
    probe: Arc<dyn TlsProbe>,
}

impl SslStatusResolver {
    pub fn new(probe: Arc<dyn TlsProbe>) -> Self {
        Self { probe }
    }

    /// Hosts that need a certificate of ours
    ///
    /// Proxied hosts present the tenant proxy's certificate and are skipped.
    pub fn certificate_hosts(requirements: &[CnameRequirement]) -> Vec<String> {
        requirements
            .iter()
            .filter(|req| req.label.serves_https() && req.needs_direct_record())
            .map(|req| req.host.clone())
            .collect()
    }

    /// SSL status given the already computed DNS report
    ///
    /// DNS gates everything: a provider reporting every host issued does not
    /// count while a required record is still missing.
    pub async fn status(
        &self,
        domain: &domains::Model,
        instance: &instances::Model,
        requirements: &[CnameRequirement],
        dns: &DnsReport,
    ) -> ChannelReport {
        if !instance.environment.is_production() {
            return ChannelReport::complete();
        }

        let hosts = Self::certificate_hosts(requirements);
        if domain.deployment_started_at.is_none() || hosts.is_empty() {
            return ChannelReport::not_started();
        }

        if !dns.all_required_verified() {
            return ChannelReport::not_started();
        }

        let cached = parse_statuses(&domain.certificate_statuses);
        for host in &hosts {
            if let Some(status) = cached.get(&host.to_ascii_lowercase()) {
                if !status.is_complete() {
                    debug!("Certificate for {} is {:?} at the provider", host, status.status);
                    return status.report();
                }
            }
        }

        let outcomes = join_all(hosts.iter().map(|host| self.probe.handshake(host))).await;
        let hints: Vec<Hint> = hosts
            .iter()
            .zip(outcomes)
            .filter_map(|(host, outcome)| {
                outcome.err().map(|e| {
                    debug!("TLS probe of {} failed: {}", host, e);
                    Hint::new(
                        Hint::CANNOT_ESTABLISH_CONNECTION,
                        format!("Could not establish a TLS connection to {}", host),
                    )
                })
            })
            .collect();

        if hints.is_empty() {
            ChannelReport::complete()
        } else {
            ChannelReport::with_hints(ChannelStatus::InProgress, hints)
        }
    }
}
