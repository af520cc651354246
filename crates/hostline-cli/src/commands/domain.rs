use clap::Args;
use colored::Colorize;
use hostline_domains::{
    CallerAuthorization, ChannelReport, ChannelStatus, DeployStatus, DnsRetry, DomainDeployError,
};
use tracing::{info, warn};

use super::runtime::RuntimeArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainOperation {
    Status,
    RetryDns,
    RetrySsl,
    RetryMail,
    Delete,
    Reset,
}

#[derive(Args)]
pub struct DomainCommand {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    /// Id of the domain to act on
    pub domain_id: i32,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl DomainCommand {
    pub fn execute(self, operation: DomainOperation) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run(operation))
    }

    async fn run(&self, operation: DomainOperation) -> anyhow::Result<()> {
        let (_db, service) = self.runtime.connect().await?;
        let domain_id = self.domain_id;

        let outcome = match operation {
            DomainOperation::Status => {
                let status = service.deploy_status(domain_id).await;
                status.map(|status| self.print_status(&status))
            }
            DomainOperation::RetryDns => {
                service
                    .retry_dns(domain_id)
                    .await
                    .map(|retry| match retry {
                        DnsRetry::Enqueued => success("DNS verification queued"),
                        DnsRetry::RealTime => {
                            success("Development domain, DNS is checked on every status read")
                        }
                    })
            }
            DomainOperation::RetrySsl => service
                .retry_ssl(domain_id)
                .await
                .map(|()| success("Certificate provisioning requested")),
            DomainOperation::RetryMail => service
                .retry_mail(domain_id)
                .await
                .map(|()| success("Mail verification queued")),
            DomainOperation::Delete => service
                .delete_domain(domain_id)
                .await
                .map(|()| success("Domain deleted, cleanup scheduled")),
            DomainOperation::Reset => service
                .reset_domain(domain_id)
                .await
                .map(|domain| success(&format!("Domain {} reset", domain.name))),
        };

        outcome.map_err(|e| explain(domain_id, e))
    }

    fn print_status(&self, status: &DeployStatus) {
        if self.json {
            match serde_json::to_string_pretty(status) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("Could not serialize status: {}", e),
            }
            return;
        }

        println!();
        println!(
            "{} {}",
            "Domain".bright_white().bold(),
            status.domain_id.to_string().bright_cyan()
        );
        print_channel("DNS", Some(&status.dns));
        print_channel("SSL", Some(&status.ssl));
        print_channel("Mail", status.mail.as_ref());
        print_channel("Proxy", status.proxy.as_ref());
        println!();
    }
}

#[derive(Args)]
pub struct VerifyProxyCommand {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    pub domain_id: i32,

    /// Session token forwarded to the identity oracle
    #[arg(long, env = "HOSTLINE_CALLER_TOKEN")]
    pub caller_token: String,
}

impl VerifyProxyCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let (_db, service) = self.runtime.connect().await?;
            let caller = CallerAuthorization::new(self.caller_token.clone());

            let check = service
                .verify_proxy(self.domain_id, &caller)
                .await
                .map_err(|e| explain(self.domain_id, e))?;
            info!("Proxy check {} passed for {}", check.id, check.proxy_url);
            success(&format!("Proxy {} is healthy", check.proxy_url));
            Ok(())
        })
    }
}

fn success(message: &str) {
    println!("{} {}", "✓".bright_green().bold(), message);
}

fn print_channel(name: &str, report: Option<&ChannelReport>) {
    let Some(report) = report else {
        println!("  {:<6} {}", name, "not applicable".dimmed());
        return;
    };

    let status = match report.status {
        ChannelStatus::Complete => report.status.as_str().bright_green(),
        ChannelStatus::InProgress => report.status.as_str().bright_yellow(),
        ChannelStatus::NotStarted => report.status.as_str().white(),
        ChannelStatus::Failed => report.status.as_str().bright_red(),
    };
    println!("  {:<6} {}", name, status);
    for hint in &report.hints {
        println!("         {} {}", hint.code.yellow(), hint.message);
    }
}

/// Throttle and configuration errors are expected answers, not crashes
fn explain(domain_id: i32, error: DomainDeployError) -> anyhow::Error {
    if error.is_throttled() || error.is_configuration() {
        println!("{} {}", "✗".bright_yellow().bold(), error);
    }
    anyhow::anyhow!("domain {}: {}", domain_id, error)
}
