//! Domain deployment verification engine
//!
//! Decides, per domain, whether DNS, SSL, mail and reverse-proxy setup are
//! `not_started`, `in_progress`, `complete` or `failed`, and drives the
//! background jobs that move each channel forward.

pub mod cname;
pub mod dns;
pub mod errors;
pub mod mail;
pub mod proxy;
pub mod service;
pub mod ssl;
pub mod status;
mod store;
pub mod teardown;
pub mod throttle;

// Re-export commonly used types
pub use cname::{CnameLabel, CnameRequirement, CnameRequirementResolver};
pub use dns::{
    DnsCheckJob, DnsReport, DnsResolver, DnsVerificationEngine, DnsVerificationWorker,
    HickoryDnsResolver, RealTimeDnsVerifier,
};
pub use errors::{BuilderError, DomainDeployError, ErrorClass, ThrottleReason};
pub use proxy::{
    CallerAuthorization, EdgeHealthClient, HttpEdgeHealthClient, HttpIdentityOracle,
    IdentityOracle, ProxyHealthVerifier,
};
pub use service::{
    DnsRetry, DomainDeploymentService, DomainDeploymentServiceBuilder, UpdateDomainRequest,
};
pub use ssl::{RustlsProbe, SslStatusResolver, TlsProbe};
pub use status::{ChannelReport, ChannelStatus, DeployStatus, Hint};
pub use teardown::TeardownOrchestrator;
pub use throttle::RetryThrottleController;
