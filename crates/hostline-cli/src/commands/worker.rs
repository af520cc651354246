use clap::Args;
use hostline_core::TracingErrorReporter;
use hostline_domains::DnsVerificationWorker;
use hostline_queue::DatabaseJobQueue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::runtime::RuntimeArgs;

#[derive(Args)]
pub struct WorkerCommand {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    /// Seconds to wait between polls when the queue is empty
    #[arg(long, default_value = "5", env = "HOSTLINE_WORKER_POLL_SECS")]
    pub poll_secs: u64,
}

impl WorkerCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let (db, service) = self.runtime.connect().await?;
            let worker = DnsVerificationWorker::new(
                DatabaseJobQueue::new(db),
                service.dns_check_job(),
                Arc::new(TracingErrorReporter),
            );

            info!(
                "Starting DNS verification worker (poll every {}s)",
                self.poll_secs
            );
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
                info!("Received Ctrl+C, shutting down worker");
            };
            worker
                .run_until(Duration::from_secs(self.poll_secs), shutdown)
                .await;
            Ok(())
        })
    }
}
