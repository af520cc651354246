use async_trait::async_trait;
use hickory_resolver::config::{LookupIpStrategy, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("DNS lookup for {host} failed: {details}")]
    LookupFailed { host: String, details: String },
}

/// Looks up the CNAME target of a host
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// `Ok(None)` when the host has no CNAME record
    async fn resolve_cname(&self, host: &str) -> Result<Option<String>, ResolverError>;
}

pub struct HickoryDnsResolver {
    resolver: Arc<TokioAsyncResolver>,
}

impl HickoryDnsResolver {
    pub fn new() -> Self {
        // Small cache only: verification wants close to live answers
        let mut options = ResolverOpts::default();
        options.cache_size = 32;
        options.use_hosts_file = false;
        options.edns0 = true;
        options.ip_strategy = LookupIpStrategy::Ipv4Only;
        options.try_tcp_on_error = true;

        let resolver = Arc::new(TokioAsyncResolver::tokio(
            ResolverConfig::cloudflare(),
            options,
        ));

        Self { resolver }
    }
}

impl Default for HickoryDnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DnsResolver for HickoryDnsResolver {
    async fn resolve_cname(&self, host: &str) -> Result<Option<String>, ResolverError> {
        debug!("Resolving CNAME for {}", host);

        match self.resolver.lookup(host, RecordType::CNAME).await {
            Ok(lookup) => {
                let target = lookup.iter().find_map(|record| {
                    record
                        .as_cname()
                        .map(|cname| cname.to_string().trim_end_matches('.').to_string())
                });
                debug!("CNAME for {}: {:?}", host, target);
                Ok(target)
            }
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Ok(None),
                _ => Err(ResolverError::LookupFailed {
                    host: host.to_string(),
                    details: e.to_string(),
                }),
            },
        }
    }
}
