//! Gate in front of the DNS verification job
//!
//! A domain cycles `idle -> job requested -> job in flight -> idle`. A retry
//! is accepted only from idle and only once the last run is older than the
//! cache TTL.

use hostline_core::{Clock, Job, UtcDateTime, VerificationSettings, VerifyDnsJob};
use hostline_entities::dns_checks;
use hostline_queue::JobQueue;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseTransaction};
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::{DomainDeployError, ThrottleReason};
use crate::store::find_or_create_dns_check;

pub struct RetryThrottleController {
    queue: Arc<dyn JobQueue>,
    clock: Arc<dyn Clock>,
    cache_ttl: chrono::Duration,
    inflight_expiry: chrono::Duration,
}

impl RetryThrottleController {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        clock: Arc<dyn Clock>,
        settings: &VerificationSettings,
    ) -> Self {
        Self {
            queue,
            clock,
            cache_ttl: settings.dns_cache_ttl(),
            inflight_expiry: settings.dns_job_inflight_expiry(),
        }
    }

    /// An in-flight flag older than the expiry belongs to a lost job
    pub fn inflight_expired(&self, check: &dns_checks::Model) -> bool {
        self.flag_expired(check.job_requested_at)
    }

    /// Same rule for any job flag stamped with its request time
    pub fn flag_expired(&self, requested_at: Option<UtcDateTime>) -> bool {
        match requested_at {
            Some(requested_at) => self.clock.now() - requested_at >= self.inflight_expiry,
            None => true,
        }
    }

    pub fn check(&self, check: &dns_checks::Model) -> Result<(), ThrottleReason> {
        if check.job_inflight && !self.inflight_expired(check) {
            return Err(ThrottleReason::JobInFlight);
        }

        if let Some(last_run_at) = check.last_run_at {
            let elapsed = self.clock.now() - last_run_at;
            if elapsed < self.cache_ttl {
                let remaining = self.cache_ttl - elapsed;
                return Err(ThrottleReason::TooSoon {
                    retry_after_secs: remaining.num_seconds().max(1),
                });
            }
        }

        Ok(())
    }

    /// Pass the gate, enqueue the job and mark it in flight
    ///
    /// Everything happens in `txn`; the caller's rollback undoes the enqueue
    /// together with the flag.
    pub async fn request_dns_job(
        &self,
        txn: &DatabaseTransaction,
        domain_id: i32,
    ) -> Result<dns_checks::Model, DomainDeployError> {
        let check = find_or_create_dns_check(txn, domain_id).await?;

        if let Err(reason) = self.check(&check) {
            debug!("DNS retry for domain {} rejected: {}", domain_id, reason);
            return Err(DomainDeployError::Throttled(reason));
        }
        if check.job_inflight {
            info!(
                "Treating stale in-flight DNS job for domain {} as lost",
                domain_id
            );
        }

        self.queue
            .enqueue(txn, Job::VerifyDns(VerifyDnsJob { domain_id }))
            .await?;

        let mut active: dns_checks::ActiveModel = check.into();
        active.job_inflight = Set(true);
        active.job_requested_at = Set(Some(self.clock.now()));
        let updated = active.update(txn).await?;

        info!("Queued DNS verification for domain {}", domain_id);
        Ok(updated)
    }
}
