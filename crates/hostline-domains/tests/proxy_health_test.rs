mod common;

use common::Harness;
use futures::future::join_all;
use hostline_core::{Job, VerificationSettings};
use hostline_domains::proxy::IdentityLookup;
use hostline_domains::{CallerAuthorization, ChannelStatus, DomainDeployError, Hint};
use hostline_entities::types::{DomainRole, EnvironmentType};
use hostline_entities::{domains, proxy_checks};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
};
use std::sync::atomic::Ordering;

const PROXY_URL: &str = "https://example.com/__hostline";

async fn proxied_domain(h: &Harness) -> anyhow::Result<domains::Model> {
    let instance = h.instance(EnvironmentType::Production).await?;
    let domain = h.domain(&instance, "example.com", DomainRole::Primary).await?;
    let mut active: domains::ActiveModel = domain.into();
    active.proxy_url = Set(Some(PROXY_URL.to_string()));
    Ok(active.update(h.db.as_ref()).await?)
}

async fn stored_checks(h: &Harness, domain_id: i32) -> anyhow::Result<Vec<proxy_checks::Model>> {
    Ok(proxy_checks::Entity::find()
        .filter(proxy_checks::Column::DomainId.eq(domain_id))
        .all(h.db.as_ref())
        .await?)
}

fn caller() -> CallerAuthorization {
    CallerAuthorization::new("session-token")
}

#[tokio::test]
async fn test_matching_forwarded_ip_marks_proxy_healthy() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let domain = proxied_domain(&h).await?;

    let status = h.service.deploy_status(domain.id).await?;
    assert_eq!(status.proxy.map(|p| p.status), Some(ChannelStatus::NotStarted));

    let check = h.service.verify_proxy(domain.id, &caller()).await?;
    assert!(check.successful);
    assert_eq!(check.proxy_url, PROXY_URL);
    assert!(check.last_run_at.is_some());

    let status = h.service.deploy_status(domain.id).await?;
    assert_eq!(status.proxy.map(|p| p.status), Some(ChannelStatus::Complete));

    let went_live = h.pending(Job::TENANT_WENT_LIVE).await?;
    assert_eq!(went_live.len(), 1);
    assert!(h.reporter.captured().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_forwarded_ip_mismatch_is_persisted_as_failure() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let domain = proxied_domain(&h).await?;
    h.edge.echo("2.2.2.2");

    let err = h
        .service
        .verify_proxy(domain.id, &caller())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainDeployError::InvalidProxyConfiguration(_)));
    assert!(err.to_string().contains("X-Forwarded-For mismatch"));

    let checks = stored_checks(&h, domain.id).await?;
    assert_eq!(checks.len(), 1);
    assert!(!checks[0].successful);
    assert!(checks[0].last_run_at.is_some());
    assert!(checks[0]
        .last_response
        .as_deref()
        .is_some_and(|raw| raw.contains("2.2.2.2")));

    let status = h.service.deploy_status(domain.id).await?;
    let proxy = status.proxy.expect("proxy configured");
    assert_eq!(proxy.status, ChannelStatus::Failed);
    assert_eq!(proxy.hints[0].code, Hint::PROXY_HEALTH_CHECK_FAILED);

    // Configuration problems are the caller's to fix, not alarms
    assert!(h.reporter.captured().is_empty());
    assert!(h.pending(Job::TENANT_WENT_LIVE).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_forwarded_chain_uses_first_hop() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let domain = proxied_domain(&h).await?;
    h.edge.echo("1.1.1.1, 10.0.0.3");

    let check = h.service.verify_proxy(domain.id, &caller()).await?;
    assert!(check.successful);
    Ok(())
}

#[tokio::test]
async fn test_unhealthy_edge_and_recovery() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let domain = proxied_domain(&h).await?;

    h.edge.fail_with("error", "upstream not reachable");
    let err = h
        .service
        .verify_proxy(domain.id, &caller())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid proxy configuration: upstream not reachable"
    );

    h.edge.unreachable();
    let err = h
        .service
        .verify_proxy(domain.id, &caller())
        .await
        .unwrap_err();
    assert!(err.is_configuration());
    let checks = stored_checks(&h, domain.id).await?;
    assert!(checks[0]
        .last_response
        .as_deref()
        .is_some_and(|raw| raw.contains("connection reset by peer")));

    h.edge.echo("1.1.1.1");
    let check = h.service.verify_proxy(domain.id, &caller()).await?;
    assert!(check.successful);

    // Every run reused the same row
    assert_eq!(stored_checks(&h, domain.id).await?.len(), 1);
    assert_eq!(h.edge.calls.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn test_identity_oracle_failure_is_unexpected() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let domain = proxied_domain(&h).await?;
    h.oracle
        .set_answer(Err("identity service unavailable".to_string()));

    let err = h
        .service
        .verify_proxy(domain.id, &caller())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainDeployError::Unexpected(_)));
    assert_eq!(h.edge.calls.load(Ordering::SeqCst), 0);

    // One failure, one report
    let captured = h.reporter.captured();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].0, "verify_proxy");
    assert!(captured[0].1.contains("identity service unavailable"));

    h.oracle.set_answer(Ok(IdentityLookup {
        ip: String::new(),
        errors: vec!["session expired".to_string()],
    }));
    let err = h
        .service
        .verify_proxy(domain.id, &caller())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("session expired"));
    assert_eq!(h.reporter.captured().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_skip_proxy_checks_short_circuits() -> anyhow::Result<()> {
    let settings = VerificationSettings {
        skip_proxy_checks: true,
        ..Default::default()
    };
    let h = Harness::with_settings(settings).await?;
    let domain = proxied_domain(&h).await?;
    h.edge.unreachable();

    let check = h.service.verify_proxy(domain.id, &caller()).await?;
    assert!(check.successful);
    assert_eq!(h.oracle.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.edge.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_skip_xff_validation_accepts_any_forwarded_ip() -> anyhow::Result<()> {
    let settings = VerificationSettings {
        skip_xff_validation: true,
        ..Default::default()
    };
    let h = Harness::with_settings(settings).await?;
    let domain = proxied_domain(&h).await?;
    h.edge.echo("203.0.113.9");

    let check = h.service.verify_proxy(domain.id, &caller()).await?;
    assert!(check.successful);
    assert_eq!(h.edge.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_find_or_create_yields_one_row() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let domain = proxied_domain(&h).await?;
    let verifier = h.service.proxy_verifier();

    let results = join_all(
        (0..4).map(|_| verifier.find_or_create_by_domain_and_proxy_url(domain.id, PROXY_URL)),
    )
    .await;

    let ids: Vec<i32> = results
        .into_iter()
        .map(|result| result.map(|check| check.id))
        .collect::<Result<_, _>>()?;
    assert!(ids.iter().all(|id| *id == ids[0]));

    let count = proxy_checks::Entity::find()
        .filter(proxy_checks::Column::DomainId.eq(domain.id))
        .count(h.db.as_ref())
        .await?;
    assert_eq!(count, 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_or_invalid_proxy_url_is_rejected() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let instance = h.instance(EnvironmentType::Production).await?;
    let domain = h.domain(&instance, "example.com", DomainRole::Primary).await?;

    let err = h
        .service
        .verify_proxy(domain.id, &caller())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainDeployError::InvalidProxyConfiguration(_)));

    let err = h
        .service
        .proxy_verifier()
        .find_or_create_by_domain_and_proxy_url(domain.id, "ftp://example.com/proxy")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainDeployError::InvalidProxyConfiguration(_)));
    assert!(stored_checks(&h, domain.id).await?.is_empty());
    assert_eq!(h.oracle.calls.load(Ordering::SeqCst), 0);
    Ok(())
}
