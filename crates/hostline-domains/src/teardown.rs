//! Cleanup scheduled when a domain is deleted or reset
//!
//! Provider cleanups are best effort: their enqueue failures go to the error
//! reporter and the surrounding transaction carries on. Cache purges and row
//! changes are part of the transaction.

use hostline_core::{
    CleanupMailDomainJob, DeleteCertificateHostnameJob, ErrorReporter, Job, PurgeCacheJob,
};
use hostline_entities::{dns_checks, domains, proxy_checks};
use hostline_queue::{enqueue_best_effort, JobQueue};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseTransaction, EntityTrait,
    ModelTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::DomainDeployError;

pub struct TeardownOrchestrator {
    queue: Arc<dyn JobQueue>,
    reporter: Arc<dyn ErrorReporter>,
}

impl TeardownOrchestrator {
    pub fn new(queue: Arc<dyn JobQueue>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { queue, reporter }
    }

    /// Remove the domain together with everything hanging off it
    pub async fn delete(
        &self,
        txn: &DatabaseTransaction,
        domain: domains::Model,
    ) -> Result<(), DomainDeployError> {
        info!("Tearing down domain {} ({})", domain.id, domain.name);

        self.schedule_cache_purges(txn, &domain.name).await?;
        self.schedule_provider_cleanups(txn, &domain, false).await;
        self.delete_checks(txn, domain.id).await?;

        let domain_id = domain.id;
        domain.delete(txn).await?;
        debug!("Deleted domain row {}", domain_id);
        Ok(())
    }

    /// Drop verification state and provider resources but keep the domain
    pub async fn reset(
        &self,
        txn: &DatabaseTransaction,
        domain: domains::Model,
    ) -> Result<domains::Model, DomainDeployError> {
        info!("Resetting domain {} ({})", domain.id, domain.name);

        self.schedule_provider_cleanups(txn, &domain, true).await;
        self.delete_checks(txn, domain.id).await?;

        let mut active: domains::ActiveModel = domain.into();
        active.mail_verified = Set(false);
        active.mail_verification_response = Set(None);
        active.mail_job_inflight = Set(false);
        active.mail_job_requested_at = Set(None);
        active.certificate_hostname_ids = Set(serde_json::json!([]));
        active.certificate_statuses = Set(serde_json::json!({}));
        active.deployment_started_at = Set(None);
        Ok(active.update(txn).await?)
    }

    /// JWKS and response cache purges for a hostname about to change or go away
    pub async fn schedule_cache_purges(
        &self,
        txn: &DatabaseTransaction,
        host: &str,
    ) -> Result<(), DomainDeployError> {
        let purge = PurgeCacheJob {
            host: host.to_string(),
        };
        self.queue
            .enqueue(txn, Job::PurgeJwksCache(purge.clone()))
            .await?;
        self.queue.enqueue(txn, Job::PurgeResponseCache(purge)).await?;
        Ok(())
    }

    async fn schedule_provider_cleanups(
        &self,
        txn: &DatabaseTransaction,
        domain: &domains::Model,
        reinitialize: bool,
    ) {
        if domain.mail_subuser_id.is_some() || domain.mail_domain_id.is_some() {
            let job = Job::CleanupMailDomain(CleanupMailDomainJob {
                domain_id: domain.id,
                subuser_id: domain.mail_subuser_id.clone(),
                mail_domain_id: domain.mail_domain_id.clone(),
                reinitialize,
            });
            enqueue_best_effort(self.queue.as_ref(), txn, job, self.reporter.as_ref()).await;
        }

        for hostname_id in domain.certificate_hostname_ids() {
            let job = Job::DeleteCertificateHostname(DeleteCertificateHostnameJob {
                domain_id: domain.id,
                hostname_id,
            });
            enqueue_best_effort(self.queue.as_ref(), txn, job, self.reporter.as_ref()).await;
        }
    }

    async fn delete_checks(
        &self,
        txn: &DatabaseTransaction,
        domain_id: i32,
    ) -> Result<(), DomainDeployError> {
        let dns = dns_checks::Entity::delete_many()
            .filter(dns_checks::Column::DomainId.eq(domain_id))
            .exec(txn)
            .await?;
        let proxy = proxy_checks::Entity::delete_many()
            .filter(proxy_checks::Column::DomainId.eq(domain_id))
            .exec(txn)
            .await?;
        debug!(
            "Removed {} DNS and {} proxy checks for domain {}",
            dns.rows_affected, proxy.rows_affected, domain_id
        );
        Ok(())
    }
}
