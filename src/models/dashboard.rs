//! Dashboard entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

/// Dashboard entity; legacy alerts hang off its panels
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "dashboard")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub org_id: i64,
    pub uid: String,
    pub title: String,
    /// Owning folder id, 0 when the dashboard sits in the root "General" level
    pub folder_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
