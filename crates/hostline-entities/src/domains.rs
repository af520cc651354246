use async_trait::async_trait;
use hostline_core::DBDateTime;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DbErr};
use serde::{Deserialize, Serialize};

use crate::types::DomainRole;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "domains")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub instance_id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub role: DomainRole,
    pub proxy_url: Option<String>,
    pub mail_subuser_id: Option<String>,
    pub mail_domain_id: Option<String>,
    pub mail_verified: bool,
    /// Raw outcome of the last mail-provider verification attempt
    pub mail_verification_response: Option<Json>,
    pub mail_job_inflight: bool,
    pub mail_job_requested_at: Option<DBDateTime>,
    /// JSON array of certificate-provider hostname ids
    pub certificate_hostname_ids: Json,
    /// JSON object: host -> `{ "status": ..., "errors": [...] }`, as last synced from the provider
    pub certificate_statuses: Json,
    pub deployment_started_at: Option<DBDateTime>,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::instances::Entity",
        from = "Column::InstanceId",
        to = "super::instances::Column::Id",
        on_delete = "Cascade"
    )]
    Instance,
    #[sea_orm(has_one = "super::dns_checks::Entity")]
    DnsCheck,
    #[sea_orm(has_many = "super::proxy_checks::Entity")]
    ProxyChecks,
}

impl Related<super::instances::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Instance.def()
    }
}

impl Related<super::dns_checks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DnsCheck.def()
    }
}

impl Related<super::proxy_checks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProxyChecks.def()
    }
}

impl Model {
    pub fn is_proxied(&self) -> bool {
        self.proxy_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }

    /// Certificate-provider hostname ids, skipping anything that is not a string
    pub fn certificate_hostname_ids(&self) -> Vec<String> {
        self.certificate_hostname_ids
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = chrono::Utc::now();

        if insert {
            if self.created_at.is_not_set() {
                self.created_at = Set(now);
            }
            if self.updated_at.is_not_set() {
                self.updated_at = Set(now);
            }
            if self.certificate_hostname_ids.is_not_set() {
                self.certificate_hostname_ids = Set(serde_json::json!([]));
            }
            if self.certificate_statuses.is_not_set() {
                self.certificate_statuses = Set(serde_json::json!({}));
            }
        } else {
            self.updated_at = Set(now);
        }

        Ok(self)
    }
}
