//! Outbound mail verification state
//!
//! The flags read here are written back by the mail provider job; nothing in
//! this module talks to the provider.

use hostline_entities::{domains, instances, types::DomainRole};

use crate::status::{ChannelReport, ChannelStatus};

/// Only primary domains of production instances with their own sending
/// domain go through mail verification
pub fn needs_mail_setup(domain: &domains::Model, instance: &instances::Model) -> bool {
    domain.role == DomainRole::Primary
        && instance.environment.is_production()
        && !instance.uses_shared_mail_domain
}

/// `None` when mail does not apply to the domain
pub fn mail_status(domain: &domains::Model, instance: &instances::Model) -> Option<ChannelReport> {
    if !needs_mail_setup(domain, instance) {
        return None;
    }

    let status = if domain.mail_verified {
        ChannelStatus::Complete
    } else if domain.mail_verification_response.is_some() {
        ChannelStatus::Failed
    } else if domain.mail_job_inflight {
        ChannelStatus::InProgress
    } else {
        ChannelStatus::NotStarted
    };

    Some(ChannelReport::new(status))
}
