//! Alert rule version history entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_rule_version")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub rule_org_id: i64,
    pub rule_uid: String,
    pub rule_namespace_uid: String,
    pub rule_group: String,
    pub parent_version: i64,
    pub version: i64,
    pub title: String,
    pub condition: String,
    pub data: String,
    pub interval_seconds: i64,
    pub labels: String,
    pub annotations: String,
    pub created: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
