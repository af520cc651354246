pub mod domain;
pub mod runtime;
pub mod worker;

pub use domain::{DomainCommand, DomainOperation, VerifyProxyCommand};
pub use worker::WorkerCommand;
