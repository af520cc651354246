//! Shared fixtures for the deployment integration tests
//!
//! External collaborators (DNS, TLS, identity oracle, tenant edge) are
//! replaced by in-memory fakes; the database and job queue are real.

#![allow(dead_code)]

use async_trait::async_trait;
use hostline_core::{FixedClock, Job, RecordingErrorReporter, VerificationSettings};
use hostline_database::test_utils::TestDatabase;
use hostline_domains::dns::ResolverError;
use hostline_domains::proxy::{
    EdgeError, EdgeHealthClient, EdgeHealthReply, EdgeHealthResponse, IdentityLookup,
    OracleError,
};
use hostline_domains::ssl::ProbeError;
use hostline_domains::{
    CallerAuthorization, DnsResolver, DomainDeploymentService, IdentityOracle, TlsProbe,
};
use hostline_entities::types::{DomainRole, EnvironmentType};
use hostline_entities::{domains, instances};
use hostline_queue::{DatabaseJobQueue, JobQueue, QueueError};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, DatabaseTransaction};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub struct StaticResolver {
    records: Mutex<HashMap<String, String>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn set(&self, host: &str, target: &str) {
        self.records
            .lock()
            .unwrap()
            .insert(host.to_string(), target.to_string());
    }

    pub fn remove(&self, host: &str) {
        self.records.lock().unwrap().remove(host);
    }

    /// Every record a production primary domain needs
    pub fn set_all_records(&self, domain_name: &str, instance_id: i32) {
        self.set(
            &format!("clerk.{}", domain_name),
            "frontend-api.hostline.services",
        );
        self.set(
            &format!("accounts.{}", domain_name),
            "accounts.hostline.services",
        );
        self.set(
            &format!("clkmail.{}", domain_name),
            &format!("mail.{}.hostline.services", instance_id),
        );
        self.set(
            &format!("clk._domainkey.{}", domain_name),
            &format!("dkim1.{}.hostline.services", instance_id),
        );
        self.set(
            &format!("clk2._domainkey.{}", domain_name),
            &format!("dkim2.{}.hostline.services", instance_id),
        );
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn resolve_cname(&self, host: &str) -> Result<Option<String>, ResolverError> {
        Ok(self.records.lock().unwrap().get(host).cloned())
    }
}

/// TLS probe whose outcome tests flip at will
pub struct SwitchProbe {
    reachable: AtomicBool,
}

impl SwitchProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl TlsProbe for SwitchProbe {
    async fn handshake(&self, host: &str) -> Result<(), ProbeError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProbeError::Connect {
                host: host.to_string(),
                details: "connection refused".to_string(),
            })
        }
    }
}

pub struct FakeOracle {
    answer: Mutex<Result<IdentityLookup, String>>,
    pub calls: AtomicUsize,
}

impl FakeOracle {
    pub fn with_ip(ip: &str) -> Self {
        Self {
            answer: Mutex::new(Ok(IdentityLookup {
                ip: ip.to_string(),
                errors: Vec::new(),
            })),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_answer(&self, answer: Result<IdentityLookup, String>) {
        *self.answer.lock().unwrap() = answer;
    }
}

#[async_trait]
impl IdentityOracle for FakeOracle {
    async fn lookup(&self, _caller: &CallerAuthorization) -> Result<IdentityLookup, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .lock()
            .unwrap()
            .clone()
            .map_err(OracleError::Request)
    }
}

pub struct FakeEdge {
    reply: Mutex<Result<EdgeHealthReply, String>>,
    pub calls: AtomicUsize,
}

impl FakeEdge {
    pub fn echoing(forwarded_for: &str) -> Self {
        let edge = Self {
            reply: Mutex::new(Err("not configured".to_string())),
            calls: AtomicUsize::new(0),
        };
        edge.echo(forwarded_for);
        edge
    }

    pub fn echo(&self, forwarded_for: &str) {
        let raw = serde_json::json!({
            "status": "ok",
            "x_forwarded_for": forwarded_for,
        })
        .to_string();
        *self.reply.lock().unwrap() = Ok(EdgeHealthReply {
            http_status: 200,
            raw,
            response: Some(EdgeHealthResponse {
                status: "ok".to_string(),
                x_forwarded_for: Some(forwarded_for.to_string()),
                message: None,
            }),
        });
    }

    pub fn fail_with(&self, status: &str, message: &str) {
        let raw = serde_json::json!({ "status": status, "message": message }).to_string();
        *self.reply.lock().unwrap() = Ok(EdgeHealthReply {
            http_status: 502,
            raw,
            response: Some(EdgeHealthResponse {
                status: status.to_string(),
                x_forwarded_for: None,
                message: Some(message.to_string()),
            }),
        });
    }

    pub fn unreachable(&self) {
        *self.reply.lock().unwrap() = Err("connection reset by peer".to_string());
    }
}

#[async_trait]
impl EdgeHealthClient for FakeEdge {
    async fn check(
        &self,
        _proxy_url: &str,
        _domain_id: i32,
        _expected_ip: &str,
    ) -> Result<EdgeHealthReply, EdgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .lock()
            .unwrap()
            .clone()
            .map_err(EdgeError::Transport)
    }
}

/// Real queue that refuses the job kinds it is told to
pub struct SelectiveQueue {
    inner: DatabaseJobQueue,
    failing: Mutex<HashSet<&'static str>>,
}

impl SelectiveQueue {
    pub fn new(inner: DatabaseJobQueue) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_kind(&self, kind: &'static str) {
        self.failing.lock().unwrap().insert(kind);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl JobQueue for SelectiveQueue {
    async fn enqueue(&self, txn: &DatabaseTransaction, job: Job) -> Result<(), QueueError> {
        if self.failing.lock().unwrap().contains(job.kind()) {
            return Err(QueueError::EnqueueFailed(format!(
                "{} rejected by test queue",
                job.kind()
            )));
        }
        self.inner.enqueue(txn, job).await
    }
}

pub struct Harness {
    pub test_db: TestDatabase,
    pub db: Arc<DatabaseConnection>,
    pub jobs: DatabaseJobQueue,
    pub queue: Arc<SelectiveQueue>,
    pub reporter: Arc<RecordingErrorReporter>,
    pub clock: Arc<FixedClock>,
    pub resolver: Arc<StaticResolver>,
    pub probe: Arc<SwitchProbe>,
    pub oracle: Arc<FakeOracle>,
    pub edge: Arc<FakeEdge>,
    pub service: DomainDeploymentService,
}

impl Harness {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_settings(VerificationSettings::default()).await
    }

    pub async fn with_settings(settings: VerificationSettings) -> anyhow::Result<Self> {
        let test_db = TestDatabase::with_migrations().await?;
        let db = test_db.connection_arc();
        let jobs = DatabaseJobQueue::new(db.clone());
        let queue = Arc::new(SelectiveQueue::new(jobs.clone()));
        let reporter = Arc::new(RecordingErrorReporter::new());
        let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
        let resolver = Arc::new(StaticResolver::new());
        let probe = Arc::new(SwitchProbe::new(false));
        let oracle = Arc::new(FakeOracle::with_ip("1.1.1.1"));
        let edge = Arc::new(FakeEdge::echoing("1.1.1.1"));

        let service = DomainDeploymentService::builder()
            .with_database(db.clone())
            .with_queue(queue.clone())
            .with_resolver(resolver.clone())
            .with_tls_probe(probe.clone())
            .with_identity_oracle(oracle.clone())
            .with_edge_client(edge.clone())
            .with_reporter(reporter.clone())
            .with_clock(clock.clone())
            .with_settings(settings)
            .build()?;

        Ok(Self {
            test_db,
            db,
            jobs,
            queue,
            reporter,
            clock,
            resolver,
            probe,
            oracle,
            edge,
            service,
        })
    }

    pub async fn instance(&self, environment: EnvironmentType) -> anyhow::Result<instances::Model> {
        let instance = instances::ActiveModel {
            name: Set("acme".to_string()),
            environment: Set(environment),
            account_portal_enabled: Set(true),
            uses_shared_mail_domain: Set(false),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(instance)
    }

    pub async fn domain(
        &self,
        instance: &instances::Model,
        name: &str,
        role: DomainRole,
    ) -> anyhow::Result<domains::Model> {
        let domain = domains::ActiveModel {
            instance_id: Set(instance.id),
            name: Set(name.to_string()),
            role: Set(role),
            proxy_url: Set(None),
            mail_subuser_id: Set(None),
            mail_domain_id: Set(None),
            mail_verified: Set(false),
            mail_verification_response: Set(None),
            mail_job_inflight: Set(false),
            mail_job_requested_at: Set(None),
            deployment_started_at: Set(None),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(domain)
    }

    /// Pending job payloads of one kind
    pub async fn pending(&self, kind: &str) -> anyhow::Result<Vec<Job>> {
        Ok(self
            .jobs
            .pending(kind)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(row.payload))
            .collect::<Result<Vec<Job>, _>>()?)
    }
}
