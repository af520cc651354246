//! Enumerations stored as text columns

use sea_orm::sea_query::StringLen;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};

/// Environment an instance runs in
///
/// Development instances verify DNS in real time on every request and never
/// go through a certificate lifecycle. Production instances read cached
/// verification results refreshed by background jobs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentType {
    #[sea_orm(string_value = "development")]
    Development,
    #[sea_orm(string_value = "production")]
    Production,
}

impl EnvironmentType {
    pub fn is_production(&self) -> bool {
        matches!(self, EnvironmentType::Production)
    }
}

/// Role of a domain within its instance
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum DomainRole {
    /// The instance's home domain; hosts every platform feature
    #[sea_orm(string_value = "primary")]
    Primary,
    /// Additional domain sharing the primary's session; only serves the frontend API
    #[sea_orm(string_value = "satellite")]
    Satellite,
}

/// Lifecycle of a durable job row
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "done")]
    Done,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::sea_query::ColumnType;
    use sea_orm::{ActiveEnum, Iterable};

    #[test]
    fn test_enums_store_as_short_strings() {
        let expected = ColumnType::String(StringLen::N(16));
        assert_eq!(EnvironmentType::db_type().get_column_type(), &expected);
        assert_eq!(DomainRole::db_type().get_column_type(), &expected);
        assert_eq!(JobStatus::db_type().get_column_type(), &expected);

        for status in JobStatus::iter() {
            assert!(status.to_value().len() <= 16);
            assert_eq!(JobStatus::try_from_value(&status.to_value()).unwrap(), status);
        }
        assert_eq!(EnvironmentType::Production.to_value(), "production");
        assert_eq!(DomainRole::Satellite.to_value(), "satellite");
    }
}
