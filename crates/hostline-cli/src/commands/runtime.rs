use clap::Args;
use hostline_core::{VerificationSettings, MAX_WINDOW_SECS};
use hostline_database::DbConnection;
use hostline_domains::{
    DomainDeploymentService, HickoryDnsResolver, HttpEdgeHealthClient, HttpIdentityOracle,
    RustlsProbe,
};
use hostline_queue::DatabaseJobQueue;
use std::sync::Arc;
use tracing::debug;

/// Connection and verification settings shared by every command
#[derive(Args, Clone)]
pub struct RuntimeArgs {
    /// Database connection URL
    #[arg(long, env = "HOSTLINE_DATABASE_URL")]
    pub database_url: String,

    /// Minimum seconds between two DNS verification runs of a domain
    #[arg(
        long,
        env = "HOSTLINE_DNS_CACHE_TTL_SECS",
        value_parser = clap::value_parser!(u64).range(..=MAX_WINDOW_SECS)
    )]
    pub dns_cache_ttl_secs: Option<u64>,

    /// Seconds after which an unfinished DNS job is presumed lost
    #[arg(
        long,
        env = "HOSTLINE_DNS_JOB_INFLIGHT_EXPIRY_SECS",
        value_parser = clap::value_parser!(u64).range(1..=MAX_WINDOW_SECS)
    )]
    pub dns_job_inflight_expiry_secs: Option<u64>,

    #[arg(long, env = "HOSTLINE_TLS_PROBE_TIMEOUT_MS")]
    pub tls_probe_timeout_ms: Option<u64>,

    #[arg(long, env = "HOSTLINE_PROXY_HEALTH_TIMEOUT_MS")]
    pub proxy_health_timeout_ms: Option<u64>,

    #[arg(long, env = "HOSTLINE_IDENTITY_ORACLE_URL")]
    pub identity_oracle_url: Option<String>,

    /// Accept every proxy without contacting it
    #[arg(long, env = "HOSTLINE_SKIP_PROXY_CHECKS")]
    pub skip_proxy_checks: bool,

    /// Accept proxies that do not forward the caller's IP
    #[arg(long, env = "HOSTLINE_SKIP_XFF_VALIDATION")]
    pub skip_xff_validation: bool,

    /// Domain the platform's CNAME targets live under
    #[arg(long, env = "HOSTLINE_BASE_DOMAIN")]
    pub base_domain: Option<String>,
}

impl RuntimeArgs {
    pub fn settings(&self) -> VerificationSettings {
        let mut settings = VerificationSettings::default();
        if let Some(ttl) = self.dns_cache_ttl_secs {
            settings.dns_cache_ttl_secs = ttl;
        }
        if let Some(expiry) = self.dns_job_inflight_expiry_secs {
            settings.dns_job_inflight_expiry_secs = expiry;
        }
        if let Some(timeout) = self.tls_probe_timeout_ms {
            settings.tls_probe_timeout_ms = timeout;
        }
        if let Some(timeout) = self.proxy_health_timeout_ms {
            settings.proxy_health_timeout_ms = timeout;
        }
        if let Some(url) = &self.identity_oracle_url {
            settings.identity_oracle_url = url.clone();
        }
        if let Some(base_domain) = &self.base_domain {
            settings.platform.base_domain = base_domain.clone();
        }
        settings.skip_proxy_checks = self.skip_proxy_checks;
        settings.skip_xff_validation = self.skip_xff_validation;
        settings
    }

    /// Connect, migrate and wire the service with its production collaborators
    pub async fn connect(&self) -> anyhow::Result<(Arc<DbConnection>, DomainDeploymentService)> {
        let settings = self.settings();

        debug!("Initializing database connection...");
        let db = hostline_database::establish_connection(&self.database_url).await?;

        let service = DomainDeploymentService::builder()
            .with_database(db.clone())
            .with_queue(Arc::new(DatabaseJobQueue::new(db.clone())))
            .with_resolver(Arc::new(HickoryDnsResolver::new()))
            .with_tls_probe(Arc::new(RustlsProbe::new(settings.tls_probe_timeout())?))
            .with_identity_oracle(Arc::new(HttpIdentityOracle::new(
                settings.identity_oracle_url.clone(),
                settings.identity_oracle_timeout(),
            )?))
            .with_edge_client(Arc::new(HttpEdgeHealthClient::new(
                settings.proxy_health_timeout(),
            )?))
            .with_settings(settings)
            .build()?;

        Ok((db, service))
    }
}
