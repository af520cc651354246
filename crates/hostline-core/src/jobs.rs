use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct VerifyDnsJob {
    pub domain_id: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct VerifyMailDomainJob {
    pub domain_id: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ProvisionCertificateJob {
    pub domain_id: i32,
    pub hosts: Vec<String>,
}

/// Removes (or re-creates, when `reinitialize` is set) the outbound-mail
/// resources the provider holds for a domain.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CleanupMailDomainJob {
    pub domain_id: i32,
    pub subuser_id: Option<String>,
    pub mail_domain_id: Option<String>,
    pub reinitialize: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DeleteCertificateHostnameJob {
    pub domain_id: i32,
    pub hostname_id: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PurgeCacheJob {
    pub host: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TenantWentLiveJob {
    pub instance_id: i32,
    pub domain_id: i32,
}

/// Core job enum containing all job types the verification engine emits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Job {
    VerifyDns(VerifyDnsJob),
    VerifyMailDomain(VerifyMailDomainJob),
    ProvisionCertificate(ProvisionCertificateJob),
    CleanupMailDomain(CleanupMailDomainJob),
    DeleteCertificateHostname(DeleteCertificateHostnameJob),
    PurgeJwksCache(PurgeCacheJob),
    PurgeResponseCache(PurgeCacheJob),
    TenantWentLive(TenantWentLiveJob),
}

impl Job {
    pub const VERIFY_DNS: &'static str = "verify_dns";
    pub const VERIFY_MAIL_DOMAIN: &'static str = "verify_mail_domain";
    pub const PROVISION_CERTIFICATE: &'static str = "provision_certificate";
    pub const CLEANUP_MAIL_DOMAIN: &'static str = "cleanup_mail_domain";
    pub const DELETE_CERTIFICATE_HOSTNAME: &'static str = "delete_certificate_hostname";
    pub const PURGE_JWKS_CACHE: &'static str = "purge_jwks_cache";
    pub const PURGE_RESPONSE_CACHE: &'static str = "purge_response_cache";
    pub const TENANT_WENT_LIVE: &'static str = "tenant_went_live";

    /// Stable identifier stored next to the payload so workers can claim
    /// only the kinds they handle.
    pub fn kind(&self) -> &'static str {
        match self {
            Job::VerifyDns(_) => Self::VERIFY_DNS,
            Job::VerifyMailDomain(_) => Self::VERIFY_MAIL_DOMAIN,
            Job::ProvisionCertificate(_) => Self::PROVISION_CERTIFICATE,
            Job::CleanupMailDomain(_) => Self::CLEANUP_MAIL_DOMAIN,
            Job::DeleteCertificateHostname(_) => Self::DELETE_CERTIFICATE_HOSTNAME,
            Job::PurgeJwksCache(_) => Self::PURGE_JWKS_CACHE,
            Job::PurgeResponseCache(_) => Self::PURGE_RESPONSE_CACHE,
            Job::TenantWentLive(_) => Self::TENANT_WENT_LIVE,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::VerifyDns(job) => write!(f, "VerifyDns(domain_id: {})", job.domain_id),
            Job::VerifyMailDomain(job) => {
                write!(f, "VerifyMailDomain(domain_id: {})", job.domain_id)
            }
            Job::ProvisionCertificate(job) => write!(
                f,
                "ProvisionCertificate(domain_id: {}, hosts: {:?})",
                job.domain_id, job.hosts
            ),
            Job::CleanupMailDomain(job) => write!(
                f,
                "CleanupMailDomain(domain_id: {}, subuser: {:?}, reinitialize: {})",
                job.domain_id, job.subuser_id, job.reinitialize
            ),
            Job::DeleteCertificateHostname(job) => write!(
                f,
                "DeleteCertificateHostname(domain_id: {}, hostname_id: {})",
                job.domain_id, job.hostname_id
            ),
            Job::PurgeJwksCache(job) => write!(f, "PurgeJwksCache({})", job.host),
            Job::PurgeResponseCache(job) => write!(f, "PurgeResponseCache({})", job.host),
            Job::TenantWentLive(job) => write!(
                f,
                "TenantWentLive(instance_id: {}, domain_id: {})",
                job.instance_id, job.domain_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_matches_variant() {
        let job = Job::VerifyDns(VerifyDnsJob { domain_id: 7 });
        assert_eq!(job.kind(), "verify_dns");
        assert_eq!(job.to_string(), "VerifyDns(domain_id: 7)");

        let job = Job::PurgeJwksCache(PurgeCacheJob {
            host: "example.com".to_string(),
        });
        assert_eq!(job.kind(), Job::PURGE_JWKS_CACHE);
    }

    #[test]
    fn test_job_payload_is_externally_tagged() {
        let job = Job::CleanupMailDomain(CleanupMailDomainJob {
            domain_id: 3,
            subuser_id: Some("sub_1".to_string()),
            mail_domain_id: None,
            reinitialize: true,
        });
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["CleanupMailDomain"]["subuser_id"], "sub_1");
        assert_eq!(value["CleanupMailDomain"]["reinitialize"], true);

        let parsed: Job = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, job);
    }
}
