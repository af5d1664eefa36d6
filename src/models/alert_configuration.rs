//! Alertmanager configuration entity model
//!
//! Every save appends a row; the newest row per org is the active one.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

/// Alertmanager configuration entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_configuration")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub org_id: i64,

    /// Serialized `PostableUserConfig`
    pub alertmanager_configuration: String,

    pub configuration_version: String,

    /// Hex sha256 of `alertmanager_configuration`
    pub configuration_hash: String,

    #[sea_orm(column_name = "default")]
    pub is_default: bool,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
