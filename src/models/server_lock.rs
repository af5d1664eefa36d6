//! Server lock entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

/// Cross-process lock row keyed by action name
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "server_lock")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub operation_uid: String,

    /// Bumped on every acquisition, used for optimistic concurrency
    pub version: i64,

    /// Unix seconds of the last acquisition
    pub last_execution: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
