//! Row lookups shared by the services

use hostline_entities::{dns_checks, domains, instances};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QuerySelect,
};

use crate::errors::DomainDeployError;

pub(crate) async fn load_domain<C: ConnectionTrait>(
    conn: &C,
    domain_id: i32,
) -> Result<(domains::Model, instances::Model), DomainDeployError> {
    let domain = domains::Entity::find_by_id(domain_id)
        .one(conn)
        .await?
        .ok_or(DomainDeployError::DomainNotFound(domain_id))?;
    let instance = load_instance(conn, domain.instance_id).await?;
    Ok((domain, instance))
}

/// Same as [`load_domain`] but holds a row lock on the domain until the
/// transaction ends
pub(crate) async fn lock_domain<C: ConnectionTrait>(
    conn: &C,
    domain_id: i32,
) -> Result<(domains::Model, instances::Model), DomainDeployError> {
    let domain = domains::Entity::find_by_id(domain_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or(DomainDeployError::DomainNotFound(domain_id))?;
    let instance = load_instance(conn, domain.instance_id).await?;
    Ok((domain, instance))
}

async fn load_instance<C: ConnectionTrait>(
    conn: &C,
    instance_id: i32,
) -> Result<instances::Model, DomainDeployError> {
    instances::Entity::find_by_id(instance_id)
        .one(conn)
        .await?
        .ok_or(DomainDeployError::InstanceNotFound(instance_id))
}

pub(crate) async fn find_dns_check<C: ConnectionTrait>(
    conn: &C,
    domain_id: i32,
) -> Result<Option<dns_checks::Model>, DomainDeployError> {
    Ok(dns_checks::Entity::find()
        .filter(dns_checks::Column::DomainId.eq(domain_id))
        .one(conn)
        .await?)
}

/// The domain's DNS check, created empty on first use
pub(crate) async fn find_or_create_dns_check<C: ConnectionTrait>(
    conn: &C,
    domain_id: i32,
) -> Result<dns_checks::Model, DomainDeployError> {
    if let Some(check) = find_dns_check(conn, domain_id).await? {
        return Ok(check);
    }

    let check = dns_checks::ActiveModel {
        domain_id: Set(domain_id),
        cname_targets: Set(serde_json::json!({})),
        last_result: Set(serde_json::json!({})),
        failure_hints: Set(serde_json::json!({})),
        job_inflight: Set(false),
        job_requested_at: Set(None),
        last_run_at: Set(None),
        ..Default::default()
    };
    Ok(check.insert(conn).await?)
}
