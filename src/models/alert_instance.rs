//! Alert instance state entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

/// Evaluated state of one label set of one rule
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_instance")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub rule_org_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub rule_uid: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub labels_hash: String,
    pub labels: String,
    pub current_state: String,
    pub last_eval_time: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
