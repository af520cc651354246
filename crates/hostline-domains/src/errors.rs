use hostline_queue::QueueError;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainDeployError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Domain not found: {0}")]
    DomainNotFound(i32),

    #[error("Instance not found: {0}")]
    InstanceNotFound(i32),

    #[error("Invalid proxy configuration: {0}")]
    InvalidProxyConfiguration(String),

    #[error("Hostname is already in use: {0}")]
    HostnameTaken(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Operation not applicable: {0}")]
    NotApplicable(String),

    #[error("Retry rejected: {0}")]
    Throttled(ThrottleReason),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Why a retry was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleReason {
    /// A verification job is already queued or running
    JobInFlight,
    /// The last run is younger than the cache TTL
    TooSoon { retry_after_secs: i64 },
}

impl fmt::Display for ThrottleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThrottleReason::JobInFlight => write!(f, "a verification job is already in flight"),
            ThrottleReason::TooSoon { retry_after_secs } => {
                write!(f, "checked too recently, retry in {}s", retry_after_secs)
            }
        }
    }
}

/// How a caller should surface an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller-correctable setup problem, shown to the user as is
    Configuration,
    /// Retry rejected by the throttle; not an alarm
    Throttled,
    NotFound,
    /// Infrastructure or transport failure; reported to error tracking
    Unexpected,
}

impl DomainDeployError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DomainDeployError::InvalidProxyConfiguration(_)
            | DomainDeployError::HostnameTaken(_)
            | DomainDeployError::InvalidDomain(_)
            | DomainDeployError::NotApplicable(_) => ErrorClass::Configuration,
            DomainDeployError::Throttled(_) => ErrorClass::Throttled,
            DomainDeployError::DomainNotFound(_) | DomainDeployError::InstanceNotFound(_) => {
                ErrorClass::NotFound
            }
            DomainDeployError::Database(_)
            | DomainDeployError::Queue(_)
            | DomainDeployError::Unexpected(_) => ErrorClass::Unexpected,
        }
    }

    pub fn is_throttled(&self) -> bool {
        self.class() == ErrorClass::Throttled
    }

    pub fn is_configuration(&self) -> bool {
        self.class() == ErrorClass::Configuration
    }
}

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("Missing database connection")]
    MissingDatabase,

    #[error("Missing job queue")]
    MissingQueue,

    #[error("Missing DNS resolver")]
    MissingResolver,

    #[error("Missing TLS probe")]
    MissingTlsProbe,

    #[error("Missing identity oracle")]
    MissingIdentityOracle,

    #[error("Missing edge health client")]
    MissingEdgeClient,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(DomainDeployError::InvalidProxyConfiguration("x".into()).is_configuration());
        assert!(DomainDeployError::Throttled(ThrottleReason::JobInFlight).is_throttled());
        assert_eq!(
            DomainDeployError::Unexpected("boom".into()).class(),
            ErrorClass::Unexpected
        );
        assert_eq!(
            DomainDeployError::DomainNotFound(3).class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            ThrottleReason::TooSoon {
                retry_after_secs: 42
            }
            .to_string(),
            "checked too recently, retry in 42s"
        );
    }
}
