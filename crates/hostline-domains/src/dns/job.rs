use futures::FutureExt;
use hostline_core::{Clock, ErrorReporter, Job, VerifyDnsJob};
use hostline_entities::dns_checks;
use hostline_queue::{DatabaseJobQueue, QueueError};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::engine::RealTimeDnsVerifier;
use super::records;
use super::report::DnsReport;
use crate::cname::CnameRequirementResolver;
use crate::errors::DomainDeployError;
use crate::store::{find_or_create_dns_check, load_domain};

/// Background verification run for one domain
///
/// Each run overwrites the stored requirements, results and hints wholesale
/// and always leaves `job_inflight` cleared, whether it succeeds or not.
#[derive(Clone)]
pub struct DnsCheckJob {
    db: Arc<DatabaseConnection>,
    requirements: Arc<CnameRequirementResolver>,
    verifier: RealTimeDnsVerifier,
    clock: Arc<dyn Clock>,
}

impl DnsCheckJob {
    pub fn new(
        db: Arc<DatabaseConnection>,
        requirements: Arc<CnameRequirementResolver>,
        verifier: RealTimeDnsVerifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            requirements,
            verifier,
            clock,
        }
    }

    pub async fn run(&self, domain_id: i32) -> Result<DnsReport, DomainDeployError> {
        // The retry throttle measures from here, not from completion
        let started_at = self.clock.now();
        info!("Running DNS verification for domain {}", domain_id);

        match self.verify_and_store(domain_id, started_at).await {
            Ok(report) => {
                info!(
                    "DNS verification for domain {} finished: {}",
                    domain_id, report.status
                );
                Ok(report)
            }
            Err(e) => {
                warn!("DNS verification for domain {} failed: {}", domain_id, e);
                if let Err(clear_err) = self.clear_inflight(domain_id).await {
                    error!(
                        "Could not clear in-flight flag for domain {}: {}",
                        domain_id, clear_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn verify_and_store(
        &self,
        domain_id: i32,
        started_at: hostline_core::UtcDateTime,
    ) -> Result<DnsReport, DomainDeployError> {
        let (domain, instance) = load_domain(self.db.as_ref(), domain_id).await?;
        let requirements = self.requirements.resolve(&domain, &instance);
        let entries = self.verifier.verify_entries(&requirements).await;
        let encoded = records::encode(&entries);

        let check = find_or_create_dns_check(self.db.as_ref(), domain_id).await?;
        let mut active: dns_checks::ActiveModel = check.into();
        active.cname_targets = Set(encoded.cname_targets);
        active.last_result = Set(encoded.last_result);
        active.failure_hints = Set(encoded.failure_hints);
        active.job_inflight = Set(false);
        active.job_requested_at = Set(None);
        active.last_run_at = Set(Some(started_at));
        active.update(self.db.as_ref()).await?;

        Ok(DnsReport::from_entries(entries, false))
    }

    async fn clear_inflight(&self, domain_id: i32) -> Result<(), sea_orm::DbErr> {
        dns_checks::Entity::update_many()
            .col_expr(dns_checks::Column::JobInflight, Expr::value(false))
            .col_expr(
                dns_checks::Column::JobRequestedAt,
                Expr::value(Option::<hostline_core::UtcDateTime>::None),
            )
            .filter(dns_checks::Column::DomainId.eq(domain_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}

/// Drains `verify_dns` jobs from the queue
pub struct DnsVerificationWorker {
    queue: DatabaseJobQueue,
    job: DnsCheckJob,
    reporter: Arc<dyn ErrorReporter>,
}

impl DnsVerificationWorker {
    pub fn new(
        queue: DatabaseJobQueue,
        job: DnsCheckJob,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            queue,
            job,
            reporter,
        }
    }

    /// Process at most one job; `Ok(false)` when the queue was empty
    pub async fn run_once(&self) -> Result<bool, QueueError> {
        let Some(claimed) = self.queue.claim_next(&[Job::VERIFY_DNS]).await? else {
            return Ok(false);
        };

        match &claimed.job {
            Job::VerifyDns(VerifyDnsJob { domain_id }) => match self.job.run(*domain_id).await
            {
                Ok(_) => self.queue.complete(claimed.id).await?,
                Err(e) => {
                    self.reporter.capture("dns_check_job", &e);
                    self.queue.fail(claimed.id, &e.to_string()).await?;
                }
            },
            other => {
                warn!("DNS worker claimed unrelated job {}", other);
                self.queue
                    .fail(claimed.id, &format!("unexpected job kind {}", other.kind()))
                    .await?;
            }
        }

        Ok(true)
    }

    /// Poll until `shutdown` resolves, sleeping `poll_interval` when idle
    pub async fn run_until<F>(&self, poll_interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("DNS verification worker started");

        loop {
            let idle = match self.run_once().await {
                Ok(processed) => !processed,
                Err(e) => {
                    error!("DNS worker failed to process queue: {}", e);
                    self.reporter.capture("dns_worker", &e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            } else if (&mut shutdown).now_or_never().is_some() {
                break;
            } else {
                debug!("Processed one DNS job, polling again");
            }
        }

        info!("DNS verification worker stopped");
    }
}
