//! Unified alert rule entity model
//!
//! `data`, `labels` and `annotations` hold JSON text; the typed view lives in
//! `crate::unified::rule::AlertRule`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

/// Unified alert rule entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_rule")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub org_id: i64,

    pub uid: String,

    /// Unique within `(org_id, namespace_uid)`
    pub title: String,

    /// Ref id of the query or expression that decides firing
    pub condition: String,

    /// JSON array of queries and expressions
    pub data: String,

    pub interval_seconds: i64,

    pub version: i64,

    /// Folder UID owning the rule
    pub namespace_uid: String,

    pub dashboard_uid: Option<String>,

    pub panel_id: Option<i64>,

    pub rule_group: String,

    pub rule_group_idx: i32,

    pub no_data_state: String,

    pub exec_err_state: String,

    pub for_seconds: i64,

    pub annotations: String,

    pub labels: String,

    pub is_paused: bool,

    pub updated: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
