//! CNAME requirements a domain has to satisfy

use hostline_core::PlatformSettings;
use hostline_entities::{domains, instances, types::DomainRole};
use serde::{Deserialize, Serialize};

use crate::mail::needs_mail_setup;

/// Logical subdomain a requirement stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CnameLabel {
    FrontendApi,
    Accounts,
    Mail,
    Dkim1,
    Dkim2,
}

impl CnameLabel {
    /// Hosts under this label answer HTTPS and therefore need a certificate
    pub fn serves_https(&self) -> bool {
        matches!(self, CnameLabel::FrontendApi | CnameLabel::Accounts)
    }

    /// The record can be replaced by routing the traffic through the tenant's proxy
    pub fn proxy_capable(&self) -> bool {
        matches!(self, CnameLabel::FrontendApi)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CnameRequirement {
    pub label: CnameLabel,
    pub host: String,
    pub target: String,
    /// False when the backing feature is disabled for the instance
    pub required: bool,
    pub can_be_proxied: bool,
    /// Satisfied through the domain's proxy rather than a DNS record
    pub proxied: bool,
}

impl CnameRequirement {
    /// Whether this entry has to resolve for DNS to count as complete
    pub fn needs_direct_record(&self) -> bool {
        self.required && !self.proxied
    }
}

pub struct CnameRequirementResolver {
    platform: PlatformSettings,
}

impl CnameRequirementResolver {
    pub fn new(platform: PlatformSettings) -> Self {
        Self { platform }
    }

    /// Ordered requirement set for `domain`
    ///
    /// Pure: the same domain and instance always produce the same list.
    pub fn resolve(
        &self,
        domain: &domains::Model,
        instance: &instances::Model,
    ) -> Vec<CnameRequirement> {
        let name = normalize_host(&domain.name);
        let base = normalize_host(&self.platform.base_domain);
        let proxied = domain.is_proxied();
        let mut requirements = Vec::new();

        let mut push = |label: CnameLabel, subdomain: &str, target: String, required: bool| {
            let can_be_proxied = label.proxy_capable();
            requirements.push(CnameRequirement {
                label,
                host: format!("{}.{}", subdomain, name),
                target,
                required,
                can_be_proxied,
                proxied: can_be_proxied && proxied,
            });
        };

        push(
            CnameLabel::FrontendApi,
            &self.platform.frontend_api_subdomain,
            format!("frontend-api.{}", base),
            true,
        );

        if domain.role == DomainRole::Primary {
            push(
                CnameLabel::Accounts,
                &self.platform.accounts_subdomain,
                format!("accounts.{}", base),
                instance.account_portal_enabled,
            );
        }

        if needs_mail_setup(domain, instance) {
            let scope = format!("{}.{}", instance.id, base);
            push(
                CnameLabel::Mail,
                &self.platform.mail_subdomain,
                format!("mail.{}", scope),
                true,
            );
            push(
                CnameLabel::Dkim1,
                &self.platform.dkim1_subdomain,
                format!("dkim1.{}", scope),
                true,
            );
            push(
                CnameLabel::Dkim2,
                &self.platform.dkim2_subdomain,
                format!("dkim2.{}", scope),
                true,
            );
        }

        requirements
    }
}

/// Lowercase, trimmed and without the trailing root dot
pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hostline_entities::types::EnvironmentType;

    pub(crate) fn instance(environment: EnvironmentType) -> instances::Model {
        let now = chrono::Utc::now();
        instances::Model {
            id: 42,
            name: "acme".to_string(),
            environment,
            account_portal_enabled: true,
            uses_shared_mail_domain: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn domain(name: &str, role: DomainRole) -> domains::Model {
        let now = chrono::Utc::now();
        domains::Model {
            id: 7,
            instance_id: 42,
            name: name.to_string(),
            role,
            proxy_url: None,
            mail_subuser_id: None,
            mail_domain_id: None,
            mail_verified: false,
            mail_verification_response: None,
            mail_job_inflight: false,
            mail_job_requested_at: None,
            certificate_hostname_ids: serde_json::json!([]),
            certificate_statuses: serde_json::json!({}),
            deployment_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn resolver() -> CnameRequirementResolver {
        CnameRequirementResolver::new(PlatformSettings::default())
    }

    #[test]
    fn test_production_primary_gets_full_set_in_order() {
        let reqs = resolver().resolve(
            &domain("Example.COM.", DomainRole::Primary),
            &instance(EnvironmentType::Production),
        );

        let hosts: Vec<&str> = reqs.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(
            hosts,
            vec![
                "clerk.example.com",
                "accounts.example.com",
                "clkmail.example.com",
                "clk._domainkey.example.com",
                "clk2._domainkey.example.com",
            ]
        );
        assert_eq!(reqs[0].target, "frontend-api.hostline.services");
        assert_eq!(reqs[2].target, "mail.42.hostline.services");
        assert!(reqs.iter().all(|r| r.needs_direct_record()));
    }

    #[test]
    fn test_disabled_account_portal_makes_accounts_optional() {
        let mut inst = instance(EnvironmentType::Production);
        inst.account_portal_enabled = false;

        let reqs = resolver().resolve(&domain("example.com", DomainRole::Primary), &inst);
        let accounts = reqs
            .iter()
            .find(|r| r.label == CnameLabel::Accounts)
            .unwrap();
        assert!(!accounts.required);
        assert!(!accounts.needs_direct_record());
    }

    #[test]
    fn test_proxied_domain_keeps_frontend_api_marked_as_proxied() {
        let mut dom = domain("example.com", DomainRole::Primary);
        dom.proxy_url = Some("https://example.com/__hostline".to_string());

        let reqs = resolver().resolve(&dom, &instance(EnvironmentType::Production));
        let frontend = &reqs[0];
        assert_eq!(frontend.label, CnameLabel::FrontendApi);
        assert!(frontend.can_be_proxied);
        assert!(frontend.proxied);
        assert!(frontend.required);
        assert!(!frontend.needs_direct_record());
        assert!(reqs[1..].iter().all(|r| !r.proxied));
    }

    #[test]
    fn test_satellite_and_development_skip_mail() {
        let reqs = resolver().resolve(
            &domain("satellite.dev", DomainRole::Satellite),
            &instance(EnvironmentType::Production),
        );
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].label, CnameLabel::FrontendApi);

        let reqs = resolver().resolve(
            &domain("example.com", DomainRole::Primary),
            &instance(EnvironmentType::Development),
        );
        assert_eq!(
            reqs.iter().map(|r| r.label).collect::<Vec<_>>(),
            vec![CnameLabel::FrontendApi, CnameLabel::Accounts]
        );
    }

    #[test]
    fn test_shared_mail_domain_skips_mail_records() {
        let mut inst = instance(EnvironmentType::Production);
        inst.uses_shared_mail_domain = true;
        let reqs = resolver().resolve(&domain("example.com", DomainRole::Primary), &inst);
        assert!(reqs.iter().all(|r| !matches!(
            r.label,
            CnameLabel::Mail | CnameLabel::Dkim1 | CnameLabel::Dkim2
        )));
    }
}
