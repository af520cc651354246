//! DNS channel: live CNAME verification and the cached, job-refreshed view

pub mod engine;
pub mod job;
pub mod records;
pub mod report;
pub mod resolver;

pub use engine::{cached_report, DnsVerificationEngine, RealTimeDnsVerifier};
pub use job::{DnsCheckJob, DnsVerificationWorker};
pub use report::{DnsEntry, DnsReport};
pub use resolver::{DnsResolver, HickoryDnsResolver, ResolverError};
