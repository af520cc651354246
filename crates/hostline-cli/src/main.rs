//! Hostline CLI
//!
//! Operator entrypoint for the domain verification engine: inspect a domain's
//! deployment, request retries, tear domains down, or run the DNS worker.

mod commands;

use clap::{Parser, Subcommand};
use commands::{DomainCommand, DomainOperation, VerifyProxyCommand, WorkerCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "HOSTLINE_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "HOSTLINE_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show DNS, SSL, mail and proxy status of a domain
    Status(DomainCommand),
    /// Queue a DNS verification run
    RetryDns(DomainCommand),
    /// Request certificate provisioning
    RetrySsl(DomainCommand),
    /// Queue mail domain verification
    RetryMail(DomainCommand),
    /// Validate the domain's reverse proxy end to end
    VerifyProxy(VerifyProxyCommand),
    /// Delete a domain and schedule its cleanup
    Delete(DomainCommand),
    /// Drop verification state and provider resources, keeping the domain
    Reset(DomainCommand),
    /// Process queued DNS verification jobs until interrupted
    Worker(WorkerCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins when set; otherwise our crates log at --log-level
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::try_new(format!(
            "hostline={level},\
             hostline_cli={level},\
             hostline_core={level},\
             hostline_database={level},\
             hostline_queue={level},\
             hostline_domains={level},\
             sqlx=warn,\
             sea_orm=warn,\
             hickory_resolver=warn,\
             hyper=warn,\
             reqwest=warn,\
             rustls=warn",
            level = cli.log_level
        ))?
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Status(cmd) => cmd.execute(DomainOperation::Status),
        Commands::RetryDns(cmd) => cmd.execute(DomainOperation::RetryDns),
        Commands::RetrySsl(cmd) => cmd.execute(DomainOperation::RetrySsl),
        Commands::RetryMail(cmd) => cmd.execute(DomainOperation::RetryMail),
        Commands::VerifyProxy(cmd) => cmd.execute(),
        Commands::Delete(cmd) => cmd.execute(DomainOperation::Delete),
        Commands::Reset(cmd) => cmd.execute(DomainOperation::Reset),
        Commands::Worker(cmd) => cmd.execute(),
    }
}
