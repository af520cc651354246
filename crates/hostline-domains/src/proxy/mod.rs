//! Reverse-proxy channel: synchronous health validation of a tenant proxy

pub mod edge;
pub mod oracle;
pub mod verifier;

pub use edge::{EdgeError, EdgeHealthClient, EdgeHealthReply, EdgeHealthResponse, HttpEdgeHealthClient};
pub use oracle::{CallerAuthorization, HttpIdentityOracle, IdentityLookup, IdentityOracle, OracleError};
pub use verifier::ProxyHealthVerifier;
