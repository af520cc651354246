pub use super::dns_checks::Entity as DnsChecks;
pub use super::domains::Entity as Domains;
pub use super::instances::Entity as Instances;
pub use super::proxy_checks::Entity as ProxyChecks;
pub use super::queued_jobs::Entity as QueuedJobs;
