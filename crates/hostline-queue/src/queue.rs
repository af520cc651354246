use async_trait::async_trait;
use hostline_core::{ErrorReporter, Job};
use hostline_entities::queued_jobs;
use hostline_entities::types::JobStatus;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Failed to serialize job {job_type}: {details}")]
    Serialization { job_type: String, details: String },

    #[error("Invalid job data in row {id}: {details}")]
    InvalidJobData { id: i32, details: String },

    #[error("Failed to enqueue job: {0}")]
    EnqueueFailed(String),
}

/// Core trait for enqueueing jobs
///
/// Taking the transaction by type makes the enqueue part of whatever the
/// caller commits or rolls back.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, txn: &DatabaseTransaction, job: Job) -> Result<(), QueueError>;
}

/// Enqueue a job whose failure must not affect the surrounding transaction
///
/// The insert runs under a savepoint: if it fails, only the savepoint is
/// rolled back and the error is handed to the reporter. Nothing is returned
/// on purpose.
pub async fn enqueue_best_effort(
    queue: &dyn JobQueue,
    txn: &DatabaseTransaction,
    job: Job,
    reporter: &dyn ErrorReporter,
) {
    let description = job.to_string();
    let context = format!("enqueue.{}", job.kind());

    let savepoint = match txn.begin().await {
        Ok(savepoint) => savepoint,
        Err(e) => {
            warn!("Could not open savepoint for {}: {}", description, e);
            reporter.capture(&context, &e);
            return;
        }
    };

    match queue.enqueue(&savepoint, job).await {
        Ok(()) => {
            if let Err(e) = savepoint.commit().await {
                warn!("Could not release savepoint for {}: {}", description, e);
                reporter.capture(&context, &e);
            }
        }
        Err(e) => {
            warn!("Best-effort enqueue of {} failed: {}", description, e);
            reporter.capture(&context, &e);
            if let Err(rollback_err) = savepoint.rollback().await {
                error!(
                    "Could not roll back savepoint for {}: {}",
                    description, rollback_err
                );
            }
        }
    }
}

/// A job row a worker has taken ownership of
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: i32,
    pub job: Job,
    pub attempts: i32,
}

#[derive(Clone)]
pub struct DatabaseJobQueue {
    db: Arc<DatabaseConnection>,
}

impl DatabaseJobQueue {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Claim the oldest pending job of one of `kinds`
    ///
    /// The claim is a conditional `pending -> running` update, so two workers
    /// racing for the same row cannot both win it.
    pub async fn claim_next(&self, kinds: &[&str]) -> Result<Option<ClaimedJob>, QueueError> {
        loop {
            let candidate = queued_jobs::Entity::find()
                .filter(queued_jobs::Column::Status.eq(JobStatus::Pending))
                .filter(queued_jobs::Column::Kind.is_in(kinds.iter().copied()))
                .order_by_asc(queued_jobs::Column::Id)
                .one(self.db.as_ref())
                .await?;

            let Some(candidate) = candidate else {
                return Ok(None);
            };

            let claimed = queued_jobs::Entity::update_many()
                .col_expr(
                    queued_jobs::Column::Status,
                    Expr::value(JobStatus::Running.to_value()),
                )
                .col_expr(
                    queued_jobs::Column::Attempts,
                    Expr::col(queued_jobs::Column::Attempts).add(1),
                )
                .col_expr(
                    queued_jobs::Column::UpdatedAt,
                    Expr::value(chrono::Utc::now()),
                )
                .filter(queued_jobs::Column::Id.eq(candidate.id))
                .filter(queued_jobs::Column::Status.eq(JobStatus::Pending))
                .exec(self.db.as_ref())
                .await?;

            if claimed.rows_affected != 1 {
                debug!("Job {} was claimed by another worker", candidate.id);
                continue;
            }

            match serde_json::from_value::<Job>(candidate.payload.clone()) {
                Ok(job) => {
                    debug!("Claimed job {}: {}", candidate.id, job);
                    return Ok(Some(ClaimedJob {
                        id: candidate.id,
                        job,
                        attempts: candidate.attempts + 1,
                    }));
                }
                Err(e) => {
                    let err = QueueError::InvalidJobData {
                        id: candidate.id,
                        details: e.to_string(),
                    };
                    error!("{}", err);
                    self.fail(candidate.id, &err.to_string()).await?;
                }
            }
        }
    }

    pub async fn complete(&self, id: i32) -> Result<(), QueueError> {
        self.set_status(id, JobStatus::Done, None).await
    }

    pub async fn fail(&self, id: i32, error: &str) -> Result<(), QueueError> {
        self.set_status(id, JobStatus::Failed, Some(error.to_string()))
            .await
    }

    /// Jobs of one kind still waiting for a worker
    pub async fn pending(&self, kind: &str) -> Result<Vec<queued_jobs::Model>, QueueError> {
        let jobs = queued_jobs::Entity::find()
            .filter(queued_jobs::Column::Kind.eq(kind))
            .filter(queued_jobs::Column::Status.eq(JobStatus::Pending))
            .order_by_asc(queued_jobs::Column::Id)
            .all(self.db.as_ref())
            .await?;
        Ok(jobs)
    }

    async fn set_status(
        &self,
        id: i32,
        status: JobStatus,
        last_error: Option<String>,
    ) -> Result<(), QueueError> {
        let row = queued_jobs::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| QueueError::InvalidJobData {
                id,
                details: "job row disappeared".to_string(),
            })?;

        let mut active: queued_jobs::ActiveModel = row.into();
        active.status = Set(status);
        active.last_error = Set(last_error);
        active.update(self.db.as_ref()).await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for DatabaseJobQueue {
    async fn enqueue(&self, txn: &DatabaseTransaction, job: Job) -> Result<(), QueueError> {
        let payload =
            serde_json::to_value(&job).map_err(|e| QueueError::Serialization {
                job_type: job.kind().to_string(),
                details: e.to_string(),
            })?;

        let row = queued_jobs::ActiveModel {
            kind: Set(job.kind().to_string()),
            payload: Set(payload),
            status: Set(JobStatus::Pending),
            attempts: Set(0),
            last_error: Set(None),
            ..Default::default()
        };
        let row = row.insert(txn).await?;

        debug!("Enqueued job {} as row {}", job, row.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostline_core::{PurgeCacheJob, RecordingErrorReporter, VerifyDnsJob};
    use hostline_database::test_utils::TestDatabase;

    struct FailingQueue;

    #[async_trait]
    impl JobQueue for FailingQueue {
        async fn enqueue(&self, _txn: &DatabaseTransaction, job: Job) -> Result<(), QueueError> {
            Err(QueueError::EnqueueFailed(format!("refusing {}", job.kind())))
        }
    }

    fn verify_dns(domain_id: i32) -> Job {
        Job::VerifyDns(VerifyDnsJob { domain_id })
    }

    #[tokio::test]
    async fn test_enqueue_is_visible_only_after_commit() -> anyhow::Result<()> {
        let test_db = TestDatabase::with_migrations().await?;
        let queue = DatabaseJobQueue::new(test_db.connection_arc());

        let txn = test_db.db.begin().await?;
        queue.enqueue(&txn, verify_dns(1)).await?;
        txn.rollback().await?;
        assert!(queue.pending(Job::VERIFY_DNS).await?.is_empty());

        let txn = test_db.db.begin().await?;
        queue.enqueue(&txn, verify_dns(2)).await?;
        txn.commit().await?;
        assert_eq!(queue.pending(Job::VERIFY_DNS).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_claim_filters_by_kind_and_claims_once() -> anyhow::Result<()> {
        let test_db = TestDatabase::with_migrations().await?;
        let queue = DatabaseJobQueue::new(test_db.connection_arc());

        let txn = test_db.db.begin().await?;
        queue
            .enqueue(
                &txn,
                Job::PurgeJwksCache(PurgeCacheJob {
                    host: "example.com".to_string(),
                }),
            )
            .await?;
        queue.enqueue(&txn, verify_dns(9)).await?;
        txn.commit().await?;

        let claimed = queue
            .claim_next(&[Job::VERIFY_DNS])
            .await?
            .expect("a verify_dns job should be pending");
        assert_eq!(claimed.job, verify_dns(9));
        assert_eq!(claimed.attempts, 1);

        assert!(queue.claim_next(&[Job::VERIFY_DNS]).await?.is_none());

        queue.complete(claimed.id).await?;
        let row = queued_jobs::Entity::find_by_id(claimed.id)
            .one(test_db.db.as_ref())
            .await?
            .unwrap();
        assert_eq!(row.status, JobStatus::Done);

        Ok(())
    }

    #[tokio::test]
    async fn test_best_effort_failure_keeps_transaction_usable() -> anyhow::Result<()> {
        let test_db = TestDatabase::with_migrations().await?;
        let queue = DatabaseJobQueue::new(test_db.connection_arc());
        let reporter = RecordingErrorReporter::new();

        let txn = test_db.db.begin().await?;
        enqueue_best_effort(&FailingQueue, &txn, verify_dns(1), &reporter).await;
        enqueue_best_effort(&queue, &txn, verify_dns(2), &reporter).await;
        txn.commit().await?;

        let pending = queue.pending(Job::VERIFY_DNS).await?;
        assert_eq!(pending.len(), 1);

        let captured = reporter.captured();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0, "enqueue.verify_dns");

        Ok(())
    }
}
