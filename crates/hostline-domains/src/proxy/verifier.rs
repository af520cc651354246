use hostline_core::{Clock, ErrorReporter, Job, TenantWentLiveJob, VerificationSettings};
use hostline_entities::{domains, proxy_checks};
use hostline_queue::{enqueue_best_effort, JobQueue};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::edge::{health_url, EdgeHealthClient};
use super::oracle::{CallerAuthorization, IdentityOracle};
use crate::errors::DomainDeployError;
use crate::status::{ChannelReport, ChannelStatus, Hint};

const SKIPPED_RESPONSE: &str = "proxy checks skipped by configuration";

/// Fields of a proxy check that a health run writes back
struct HealthOutcome {
    successful: bool,
    last_response: Option<String>,
}

pub struct ProxyHealthVerifier {
    db: Arc<DatabaseConnection>,
    queue: Arc<dyn JobQueue>,
    oracle: Arc<dyn IdentityOracle>,
    edge: Arc<dyn EdgeHealthClient>,
    reporter: Arc<dyn ErrorReporter>,
    clock: Arc<dyn Clock>,
    skip_proxy_checks: bool,
    skip_xff_validation: bool,
}

impl ProxyHealthVerifier {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        queue: Arc<dyn JobQueue>,
        oracle: Arc<dyn IdentityOracle>,
        edge: Arc<dyn EdgeHealthClient>,
        reporter: Arc<dyn ErrorReporter>,
        clock: Arc<dyn Clock>,
        settings: &VerificationSettings,
    ) -> Self {
        Self {
            db,
            queue,
            oracle,
            edge,
            reporter,
            clock,
            skip_proxy_checks: settings.skip_proxy_checks,
            skip_xff_validation: settings.skip_xff_validation,
        }
    }

    /// The check row for `(domain_id, proxy_url)`, inserted if missing
    ///
    /// The domain row is locked for the duration so concurrent callers end up
    /// with the same row. Where row locks are unavailable the unique index
    /// decides, and the loser reloads the winner's row.
    pub async fn find_or_create_by_domain_and_proxy_url(
        &self,
        domain_id: i32,
        proxy_url: &str,
    ) -> Result<proxy_checks::Model, DomainDeployError> {
        let proxy_url = proxy_url.trim();
        health_url(proxy_url, domain_id, "0.0.0.0")
            .map_err(|e| DomainDeployError::InvalidProxyConfiguration(e.to_string()))?;

        let txn = self.db.begin().await?;

        domains::Entity::find_by_id(domain_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(DomainDeployError::DomainNotFound(domain_id))?;

        if let Some(existing) = find_proxy_check(&txn, domain_id, proxy_url).await? {
            txn.commit().await?;
            return Ok(existing);
        }

        insert_or_reload(self.db.as_ref(), txn, domain_id, proxy_url).await
    }

    /// Run the health check and persist its outcome, whatever it is
    ///
    /// Returns the updated row on success. On failure the check error wins
    /// over a persistence error, which is logged and reported instead.
    pub async fn validate_health(
        &self,
        check: proxy_checks::Model,
        domain_id: i32,
        caller: &CallerAuthorization,
    ) -> Result<proxy_checks::Model, DomainDeployError> {
        let mut outcome = HealthOutcome {
            successful: check.successful,
            last_response: check.last_response.clone(),
        };

        let checked = self
            .run_health_check(&check, domain_id, caller, &mut outcome)
            .await;
        let persisted = self.persist(check, outcome).await;

        match (checked, persisted) {
            (Ok(()), Ok(updated)) => {
                if updated.successful {
                    self.track_went_live(domain_id).await;
                }
                Ok(updated)
            }
            (Ok(()), Err(persist_err)) => Err(persist_err),
            (Err(check_err), Ok(_)) => Err(check_err),
            (Err(check_err), Err(persist_err)) => {
                error!(
                    "Could not persist failed proxy check for domain {}: {}",
                    domain_id, persist_err
                );
                self.reporter.capture("proxy_check.persist", &persist_err);
                Err(check_err)
            }
        }
    }

    async fn run_health_check(
        &self,
        check: &proxy_checks::Model,
        domain_id: i32,
        caller: &CallerAuthorization,
        outcome: &mut HealthOutcome,
    ) -> Result<(), DomainDeployError> {
        if self.skip_proxy_checks {
            debug!("Proxy checks disabled, accepting {}", check.proxy_url);
            outcome.successful = true;
            outcome.last_response = Some(SKIPPED_RESPONSE.to_string());
            return Ok(());
        }

        // Oracle failures surface as Unexpected; the service reports them once
        let identity = self
            .oracle
            .lookup(caller)
            .await
            .map_err(|e| DomainDeployError::Unexpected(e.to_string()))?;
        if !identity.errors.is_empty() {
            return Err(DomainDeployError::Unexpected(format!(
                "identity oracle reported errors: {}",
                identity.errors.join("; ")
            )));
        }
        let caller_ip = identity.ip.trim().to_string();
        if caller_ip.is_empty() {
            return Err(DomainDeployError::Unexpected(
                "identity oracle returned no IP".to_string(),
            ));
        }

        outcome.successful = false;

        let reply = match self.edge.check(&check.proxy_url, domain_id, &caller_ip).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Proxy health request for domain {} failed: {}", domain_id, e);
                outcome.last_response = Some(e.to_string());
                return Err(DomainDeployError::InvalidProxyConfiguration(format!(
                    "could not reach {} through the proxy: {}",
                    check.proxy_url, e
                )));
            }
        };
        outcome.last_response = Some(reply.raw.clone());

        let response = match reply.response {
            Some(response) if response.is_healthy() => response,
            Some(response) => {
                return Err(DomainDeployError::InvalidProxyConfiguration(
                    response.message.unwrap_or_else(|| {
                        format!("proxy health check reported status {}", response.status)
                    }),
                ));
            }
            None => {
                return Err(DomainDeployError::InvalidProxyConfiguration(format!(
                    "proxy health endpoint answered HTTP {} with an unreadable body",
                    reply.http_status
                )));
            }
        };

        if !self.skip_xff_validation {
            let forwarded = response.forwarded_client_ip().unwrap_or_default();
            if forwarded != caller_ip {
                return Err(DomainDeployError::InvalidProxyConfiguration(format!(
                    "X-Forwarded-For mismatch: expected {}, proxy forwarded {:?}",
                    caller_ip, forwarded
                )));
            }
        }

        outcome.successful = true;
        Ok(())
    }

    async fn persist(
        &self,
        check: proxy_checks::Model,
        outcome: HealthOutcome,
    ) -> Result<proxy_checks::Model, DomainDeployError> {
        let mut active: proxy_checks::ActiveModel = check.into();
        active.successful = Set(outcome.successful);
        active.last_response = Set(outcome.last_response);
        active.last_run_at = Set(Some(self.clock.now()));
        Ok(active.update(self.db.as_ref()).await?)
    }

    async fn track_went_live(&self, domain_id: i32) {
        let domain = match domains::Entity::find_by_id(domain_id)
            .one(self.db.as_ref())
            .await
        {
            Ok(Some(domain)) => domain,
            Ok(None) => return,
            Err(e) => {
                self.reporter.capture("enqueue.tenant_went_live", &e);
                return;
            }
        };

        let job = Job::TenantWentLive(TenantWentLiveJob {
            instance_id: domain.instance_id,
            domain_id,
        });

        match self.db.begin().await {
            Ok(txn) => {
                enqueue_best_effort(self.queue.as_ref(), &txn, job, self.reporter.as_ref()).await;
                if let Err(e) = txn.commit().await {
                    self.reporter.capture("enqueue.tenant_went_live", &e);
                }
            }
            Err(e) => self.reporter.capture("enqueue.tenant_went_live", &e),
        }
    }

    /// `None` when the domain has no proxy configured
    pub async fn proxy_status(
        &self,
        domain: &domains::Model,
    ) -> Result<Option<ChannelReport>, DomainDeployError> {
        let Some(proxy_url) = domain.proxy_url.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if proxy_url.is_empty() {
            return Ok(None);
        }

        let check = find_proxy_check(self.db.as_ref(), domain.id, proxy_url).await?;
        let report = match check {
            Some(check) if check.last_run_at.is_some() => {
                if check.successful {
                    ChannelReport::complete()
                } else {
                    ChannelReport::with_hints(
                        ChannelStatus::Failed,
                        vec![Hint::new(
                            Hint::PROXY_HEALTH_CHECK_FAILED,
                            check
                                .last_response
                                .unwrap_or_else(|| "proxy health check failed".to_string()),
                        )],
                    )
                }
            }
            _ => ChannelReport::not_started(),
        };
        Ok(Some(report))
    }
}

/// Insert a fresh check in `txn`
///
/// A row committed by someone else since the lookup surfaces as a unique
/// violation; `txn` is then rolled back and that row is returned.
async fn insert_or_reload(
    db: &DatabaseConnection,
    txn: DatabaseTransaction,
    domain_id: i32,
    proxy_url: &str,
) -> Result<proxy_checks::Model, DomainDeployError> {
    let inserted = proxy_checks::ActiveModel {
        domain_id: Set(domain_id),
        proxy_url: Set(proxy_url.to_string()),
        successful: Set(false),
        last_response: Set(None),
        last_run_at: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await;

    match inserted {
        Ok(created) => {
            txn.commit().await?;
            info!("Created proxy check {} for domain {}", created.id, domain_id);
            Ok(created)
        }
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            txn.rollback().await?;
            debug!(
                "Proxy check for domain {} was created concurrently, reloading",
                domain_id
            );
            find_proxy_check(db, domain_id, proxy_url)
                .await?
                .ok_or_else(|| {
                    DomainDeployError::Unexpected(format!(
                        "proxy check for domain {} vanished after a unique violation",
                        domain_id
                    ))
                })
        }
        Err(e) => Err(e.into()),
    }
}

async fn find_proxy_check<C: ConnectionTrait>(
    conn: &C,
    domain_id: i32,
    proxy_url: &str,
) -> Result<Option<proxy_checks::Model>, DomainDeployError> {
    Ok(proxy_checks::Entity::find()
        .filter(proxy_checks::Column::DomainId.eq(domain_id))
        .filter(proxy_checks::Column::ProxyUrl.eq(proxy_url))
        .one(conn)
        .await?)
}
