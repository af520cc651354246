use hostline_core::{
    Clock, ErrorReporter, Job, ProvisionCertificateJob, SystemClock, TracingErrorReporter,
    VerificationSettings, VerifyMailDomainJob,
};
use hostline_entities::{dns_checks, domains, proxy_checks};
use hostline_queue::JobQueue;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cname::{normalize_host, CnameRequirementResolver};
use crate::dns::{DnsCheckJob, DnsResolver, DnsVerificationEngine, RealTimeDnsVerifier};
use crate::errors::{BuilderError, DomainDeployError, ErrorClass, ThrottleReason};
use crate::mail::{mail_status, needs_mail_setup};
use crate::proxy::edge::health_url;
use crate::proxy::{CallerAuthorization, EdgeHealthClient, IdentityOracle, ProxyHealthVerifier};
use crate::ssl::{SslStatusResolver, TlsProbe};
use crate::status::DeployStatus;
use crate::store::{load_domain, lock_domain};
use crate::teardown::TeardownOrchestrator;
use crate::throttle::RetryThrottleController;

/// Outcome of an accepted DNS retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsRetry {
    /// A verification job was queued
    Enqueued,
    /// Development domains are checked live on every read; nothing was queued
    RealTime,
}

/// Reconfiguration of a domain; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateDomainRequest {
    pub name: Option<String>,
    /// `Some(None)` removes the proxy
    pub proxy_url: Option<Option<String>>,
}

/// Entry point for every read and mutation on a domain's deployment
pub struct DomainDeploymentService {
    db: Arc<DatabaseConnection>,
    queue: Arc<dyn JobQueue>,
    requirements: Arc<CnameRequirementResolver>,
    verifier: RealTimeDnsVerifier,
    ssl: SslStatusResolver,
    proxy: ProxyHealthVerifier,
    throttle: RetryThrottleController,
    teardown: TeardownOrchestrator,
    reporter: Arc<dyn ErrorReporter>,
    clock: Arc<dyn Clock>,
}

impl DomainDeploymentService {
    pub fn builder() -> DomainDeploymentServiceBuilder {
        DomainDeploymentServiceBuilder::new()
    }

    /// Handler for `verify_dns` jobs sharing this service's collaborators
    pub fn dns_check_job(&self) -> DnsCheckJob {
        DnsCheckJob::new(
            self.db.clone(),
            self.requirements.clone(),
            self.verifier.clone(),
            self.clock.clone(),
        )
    }

    pub fn proxy_verifier(&self) -> &ProxyHealthVerifier {
        &self.proxy
    }

    /// Current state of all four channels; never fails for "not verified yet"
    pub async fn deploy_status(&self, domain_id: i32) -> Result<DeployStatus, DomainDeployError> {
        let result = self.deploy_status_inner(domain_id).await;
        self.reported("deploy_status", result)
    }

    async fn deploy_status_inner(
        &self,
        domain_id: i32,
    ) -> Result<DeployStatus, DomainDeployError> {
        let (domain, instance) = load_domain(self.db.as_ref(), domain_id).await?;
        let requirements = self.requirements.resolve(&domain, &instance);

        let engine =
            DnsVerificationEngine::for_instance(&instance, self.verifier.clone(), self.db.clone());
        let dns = engine.status(domain.id, &requirements).await?;
        let ssl = self
            .ssl
            .status(&domain, &instance, &requirements, &dns)
            .await;
        let mail = mail_status(&domain, &instance);
        let proxy = self.proxy.proxy_status(&domain).await?;

        Ok(DeployStatus {
            domain_id: domain.id,
            dns: dns.channel_report(),
            ssl,
            mail,
            proxy,
        })
    }

    /// Queue a DNS verification run unless the throttle turns it away
    pub async fn retry_dns(&self, domain_id: i32) -> Result<DnsRetry, DomainDeployError> {
        let result = self.retry_dns_inner(domain_id).await;
        self.reported("retry_dns", result)
    }

    async fn retry_dns_inner(&self, domain_id: i32) -> Result<DnsRetry, DomainDeployError> {
        let txn = self.db.begin().await?;
        let (_, instance) = lock_domain(&txn, domain_id).await?;

        if !instance.environment.is_production() {
            debug!("Domain {} verifies DNS in real time, nothing to retry", domain_id);
            txn.commit().await?;
            return Ok(DnsRetry::RealTime);
        }

        self.throttle.request_dns_job(&txn, domain_id).await?;
        txn.commit().await?;
        Ok(DnsRetry::Enqueued)
    }

    /// Request certificate provisioning for the domain's HTTPS hosts
    pub async fn retry_ssl(&self, domain_id: i32) -> Result<(), DomainDeployError> {
        let result = self.retry_ssl_inner(domain_id).await;
        self.reported("retry_ssl", result)
    }

    async fn retry_ssl_inner(&self, domain_id: i32) -> Result<(), DomainDeployError> {
        let txn = self.db.begin().await?;
        let (domain, instance) = lock_domain(&txn, domain_id).await?;

        if !instance.environment.is_production() {
            return Err(DomainDeployError::NotApplicable(
                "development instances do not provision certificates".to_string(),
            ));
        }

        let requirements = self.requirements.resolve(&domain, &instance);
        let hosts = SslStatusResolver::certificate_hosts(&requirements);
        if hosts.is_empty() {
            return Err(DomainDeployError::NotApplicable(format!(
                "no host of {} needs a certificate",
                domain.name
            )));
        }

        self.queue
            .enqueue(
                &txn,
                Job::ProvisionCertificate(ProvisionCertificateJob { domain_id, hosts }),
            )
            .await?;

        if domain.deployment_started_at.is_none() {
            let mut active: domains::ActiveModel = domain.into();
            active.deployment_started_at = Set(Some(self.clock.now()));
            active.update(&txn).await?;
        }

        txn.commit().await?;
        info!("Requested certificate provisioning for domain {}", domain_id);
        Ok(())
    }

    /// Queue mail verification; one job at a time per domain
    pub async fn retry_mail(&self, domain_id: i32) -> Result<(), DomainDeployError> {
        let result = self.retry_mail_inner(domain_id).await;
        self.reported("retry_mail", result)
    }

    async fn retry_mail_inner(&self, domain_id: i32) -> Result<(), DomainDeployError> {
        let txn = self.db.begin().await?;
        let (domain, instance) = lock_domain(&txn, domain_id).await?;

        if !needs_mail_setup(&domain, &instance) {
            return Err(DomainDeployError::NotApplicable(format!(
                "{} does not send mail from its own domain",
                domain.name
            )));
        }
        if domain.mail_job_inflight {
            if !self.throttle.flag_expired(domain.mail_job_requested_at) {
                return Err(DomainDeployError::Throttled(ThrottleReason::JobInFlight));
            }
            info!(
                "Treating stale in-flight mail job for domain {} as lost",
                domain_id
            );
        }

        self.queue
            .enqueue(&txn, Job::VerifyMailDomain(VerifyMailDomainJob { domain_id }))
            .await?;

        let mut active: domains::ActiveModel = domain.into();
        active.mail_job_inflight = Set(true);
        active.mail_job_requested_at = Set(Some(self.clock.now()));
        active.mail_verification_response = Set(None);
        active.update(&txn).await?;

        txn.commit().await?;
        info!("Queued mail verification for domain {}", domain_id);
        Ok(())
    }

    /// Validate the domain's configured proxy end to end
    pub async fn verify_proxy(
        &self,
        domain_id: i32,
        caller: &CallerAuthorization,
    ) -> Result<proxy_checks::Model, DomainDeployError> {
        let result = self.verify_proxy_inner(domain_id, caller).await;
        self.reported("verify_proxy", result)
    }

    async fn verify_proxy_inner(
        &self,
        domain_id: i32,
        caller: &CallerAuthorization,
    ) -> Result<proxy_checks::Model, DomainDeployError> {
        let (domain, _) = load_domain(self.db.as_ref(), domain_id).await?;
        let proxy_url = domain
            .proxy_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                DomainDeployError::InvalidProxyConfiguration(format!(
                    "{} has no proxy URL configured",
                    domain.name
                ))
            })?;

        let check = self
            .proxy
            .find_or_create_by_domain_and_proxy_url(domain_id, proxy_url)
            .await?;
        self.proxy.validate_health(check, domain_id, caller).await
    }

    pub async fn delete_domain(&self, domain_id: i32) -> Result<(), DomainDeployError> {
        let result = self.delete_domain_inner(domain_id).await;
        self.reported("delete_domain", result)
    }

    async fn delete_domain_inner(&self, domain_id: i32) -> Result<(), DomainDeployError> {
        let txn = self.db.begin().await?;
        let (domain, _) = lock_domain(&txn, domain_id).await?;
        self.teardown.delete(&txn, domain).await?;
        txn.commit().await?;
        info!("Deleted domain {}", domain_id);
        Ok(())
    }

    pub async fn reset_domain(&self, domain_id: i32) -> Result<domains::Model, DomainDeployError> {
        let result = self.reset_domain_inner(domain_id).await;
        self.reported("reset_domain", result)
    }

    async fn reset_domain_inner(
        &self,
        domain_id: i32,
    ) -> Result<domains::Model, DomainDeployError> {
        let txn = self.db.begin().await?;
        let (domain, _) = lock_domain(&txn, domain_id).await?;
        let domain = self.teardown.reset(&txn, domain).await?;
        txn.commit().await?;
        info!("Reset domain {}", domain_id);
        Ok(domain)
    }

    /// Rename the domain and/or change its proxy
    ///
    /// Cache purges for the old hostname are queued before the row changes,
    /// and the stored DNS check is dropped since its requirements are stale.
    pub async fn update_domain(
        &self,
        domain_id: i32,
        request: UpdateDomainRequest,
    ) -> Result<domains::Model, DomainDeployError> {
        let result = self.update_domain_inner(domain_id, request).await;
        self.reported("update_domain", result)
    }

    async fn update_domain_inner(
        &self,
        domain_id: i32,
        request: UpdateDomainRequest,
    ) -> Result<domains::Model, DomainDeployError> {
        let new_name = request.name.as_deref().map(normalize_host);
        if new_name.as_deref() == Some("") {
            return Err(DomainDeployError::InvalidDomain(
                "hostname cannot be empty".to_string(),
            ));
        }

        let new_proxy = request.proxy_url.map(|url| {
            url.map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
        });
        if let Some(Some(url)) = &new_proxy {
            health_url(url, domain_id, "0.0.0.0")
                .map_err(|e| DomainDeployError::InvalidProxyConfiguration(e.to_string()))?;
        }

        let txn = self.db.begin().await?;
        let (domain, _) = lock_domain(&txn, domain_id).await?;

        let name_changed = new_name.as_ref().is_some_and(|name| *name != domain.name);
        let proxy_changed = new_proxy
            .as_ref()
            .is_some_and(|proxy| *proxy != domain.proxy_url);
        if !name_changed && !proxy_changed {
            return Ok(domain);
        }

        self.teardown
            .schedule_cache_purges(&txn, &domain.name)
            .await?;

        let mut active: domains::ActiveModel = domain.into();
        if let (true, Some(name)) = (name_changed, new_name.clone()) {
            active.name = Set(name);
        }
        if let (true, Some(proxy)) = (proxy_changed, new_proxy) {
            active.proxy_url = Set(proxy);
        }

        let updated = match active.update(&txn).await {
            Ok(updated) => updated,
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(DomainDeployError::HostnameTaken(
                    new_name.unwrap_or_default(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        dns_checks::Entity::delete_many()
            .filter(dns_checks::Column::DomainId.eq(domain_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        info!("Updated domain {} ({})", domain_id, updated.name);
        Ok(updated)
    }

    /// Hand unexpected errors to the error reporter before returning them
    fn reported<T>(
        &self,
        operation: &str,
        result: Result<T, DomainDeployError>,
    ) -> Result<T, DomainDeployError> {
        if let Err(e) = &result {
            if e.class() == ErrorClass::Unexpected {
                self.reporter.capture(operation, e);
            }
        }
        result
    }
}

pub struct DomainDeploymentServiceBuilder {
    db: Option<Arc<DatabaseConnection>>,
    queue: Option<Arc<dyn JobQueue>>,
    resolver: Option<Arc<dyn DnsResolver>>,
    tls_probe: Option<Arc<dyn TlsProbe>>,
    identity_oracle: Option<Arc<dyn IdentityOracle>>,
    edge_client: Option<Arc<dyn EdgeHealthClient>>,
    reporter: Arc<dyn ErrorReporter>,
    clock: Arc<dyn Clock>,
    settings: VerificationSettings,
}

impl Default for DomainDeploymentServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainDeploymentServiceBuilder {
    pub fn new() -> Self {
        Self {
            db: None,
            queue: None,
            resolver: None,
            tls_probe: None,
            identity_oracle: None,
            edge_client: None,
            reporter: Arc::new(TracingErrorReporter),
            clock: Arc::new(SystemClock),
            settings: VerificationSettings::default(),
        }
    }

    pub fn with_database(mut self, db: Arc<DatabaseConnection>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DnsResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_tls_probe(mut self, probe: Arc<dyn TlsProbe>) -> Self {
        self.tls_probe = Some(probe);
        self
    }

    pub fn with_identity_oracle(mut self, oracle: Arc<dyn IdentityOracle>) -> Self {
        self.identity_oracle = Some(oracle);
        self
    }

    pub fn with_edge_client(mut self, client: Arc<dyn EdgeHealthClient>) -> Self {
        self.edge_client = Some(client);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: VerificationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<DomainDeploymentService, BuilderError> {
        let db = self.db.ok_or(BuilderError::MissingDatabase)?;
        let queue = self.queue.ok_or(BuilderError::MissingQueue)?;
        let resolver = self.resolver.ok_or(BuilderError::MissingResolver)?;
        let probe = self.tls_probe.ok_or(BuilderError::MissingTlsProbe)?;
        let oracle = self
            .identity_oracle
            .ok_or(BuilderError::MissingIdentityOracle)?;
        let edge = self.edge_client.ok_or(BuilderError::MissingEdgeClient)?;

        let proxy = ProxyHealthVerifier::new(
            db.clone(),
            queue.clone(),
            oracle,
            edge,
            self.reporter.clone(),
            self.clock.clone(),
            &self.settings,
        );

        Ok(DomainDeploymentService {
            requirements: Arc::new(CnameRequirementResolver::new(
                self.settings.platform.clone(),
            )),
            verifier: RealTimeDnsVerifier::new(resolver, probe.clone()),
            ssl: SslStatusResolver::new(probe),
            proxy,
            throttle: RetryThrottleController::new(
                queue.clone(),
                self.clock.clone(),
                &self.settings,
            ),
            teardown: TeardownOrchestrator::new(queue.clone(), self.reporter.clone()),
            db,
            queue,
            reporter: self.reporter,
            clock: self.clock,
        })
    }
}
