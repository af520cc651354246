pub mod types;
pub mod instances;
pub mod domains;
pub mod dns_checks;
pub mod proxy_checks;
pub mod queued_jobs;

pub mod prelude;
