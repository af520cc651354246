use futures::future::join_all;
use hostline_entities::{dns_checks, instances};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::debug;

use super::records;
use super::report::{DnsEntry, DnsReport};
use super::resolver::DnsResolver;
use crate::cname::{normalize_host, CnameRequirement};
use crate::ssl::TlsProbe;
use crate::status::Hint;

/// Checks requirements against live DNS
///
/// Hosts behind DNS providers that flatten CNAMEs never expose the record,
/// so an HTTPS host that fails the lookup still counts as verified when it
/// answers a TLS handshake.
#[derive(Clone)]
pub struct RealTimeDnsVerifier {
    resolver: Arc<dyn DnsResolver>,
    probe: Arc<dyn TlsProbe>,
}

impl RealTimeDnsVerifier {
    pub fn new(resolver: Arc<dyn DnsResolver>, probe: Arc<dyn TlsProbe>) -> Self {
        Self { resolver, probe }
    }

    /// Entries come back in requirement order; proxied ones are not looked up
    pub async fn verify_entries(&self, requirements: &[CnameRequirement]) -> Vec<DnsEntry> {
        join_all(requirements.iter().map(|req| self.verify_entry(req))).await
    }

    pub async fn verify(&self, requirements: &[CnameRequirement]) -> DnsReport {
        DnsReport::from_entries(self.verify_entries(requirements).await, false)
    }

    async fn verify_entry(&self, requirement: &CnameRequirement) -> DnsEntry {
        let mut entry = DnsEntry::unchecked(requirement);
        if requirement.proxied {
            return entry;
        }

        let expected = normalize_host(&requirement.target);
        let failure = match self.resolver.resolve_cname(&requirement.host).await {
            Ok(Some(found)) if normalize_host(&found) == expected => {
                entry.verified = true;
                return entry;
            }
            Ok(Some(found)) => Hint::new(
                Hint::CNAME_MISMATCH,
                format!(
                    "{} points to {} instead of {}",
                    requirement.host, found, requirement.target
                ),
            ),
            Ok(None) => Hint::new(
                Hint::CNAME_MISSING,
                format!(
                    "No CNAME record found for {}; expected {}",
                    requirement.host, requirement.target
                ),
            ),
            Err(e) => Hint::new(Hint::DNS_LOOKUP_FAILED, e.to_string()),
        };

        if requirement.label.serves_https() {
            match self.probe.handshake(&requirement.host).await {
                Ok(()) => {
                    debug!(
                        "{} has no visible CNAME but serves TLS, treating as flattened",
                        requirement.host
                    );
                    entry.verified = true;
                    return entry;
                }
                Err(e) => debug!("Flattening fallback for {} failed: {}", requirement.host, e),
            }
        }

        entry.hints.push(failure);
        entry
    }
}

/// DNS status source, picked from the instance environment
#[derive(Clone)]
pub enum DnsVerificationEngine {
    /// Development: live lookups on every read, nothing stored
    RealTime(RealTimeDnsVerifier),
    /// Production: whatever the last background run stored
    Cached(Arc<DatabaseConnection>),
}

impl DnsVerificationEngine {
    pub fn for_instance(
        instance: &instances::Model,
        verifier: RealTimeDnsVerifier,
        db: Arc<DatabaseConnection>,
    ) -> Self {
        if instance.environment.is_production() {
            DnsVerificationEngine::Cached(db)
        } else {
            DnsVerificationEngine::RealTime(verifier)
        }
    }

    pub fn is_real_time(&self) -> bool {
        matches!(self, DnsVerificationEngine::RealTime(_))
    }

    pub async fn status(
        &self,
        domain_id: i32,
        requirements: &[CnameRequirement],
    ) -> Result<DnsReport, DbErr> {
        match self {
            DnsVerificationEngine::RealTime(verifier) => Ok(verifier.verify(requirements).await),
            DnsVerificationEngine::Cached(db) => {
                let check = dns_checks::Entity::find()
                    .filter(dns_checks::Column::DomainId.eq(domain_id))
                    .one(db.as_ref())
                    .await?;
                Ok(cached_report(check.as_ref(), requirements))
            }
        }
    }
}

/// Report derived from a stored check
///
/// Without a check, or before its first run has stored anything, the fresh
/// requirements are reported as unchecked.
pub fn cached_report(
    check: Option<&dns_checks::Model>,
    requirements: &[CnameRequirement],
) -> DnsReport {
    let stored = check.map(records::decode).unwrap_or_default();
    let job_inflight = check.map(|c| c.job_inflight).unwrap_or(false);

    let entries = if stored.is_empty() {
        requirements.iter().map(DnsEntry::unchecked).collect()
    } else {
        stored
    };

    DnsReport::from_entries(entries, job_inflight)
}
