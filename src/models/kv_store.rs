//! Key-value store entity model
//!
//! Namespaced per org; values are opaque strings.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

/// Key-value store entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "kv_store")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub org_id: i64,

    pub namespace: String,

    pub key: String,

    pub value: String,

    pub created: DateTimeUtc,

    pub updated: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
