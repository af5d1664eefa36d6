//! Folder entity model
//!
//! Folders own dashboards and, after migration, alert rules (the rule's
//! `namespace_uid` is the folder UID).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

/// Folder entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "folder")]
pub struct Model {
    /// Numeric identifier referenced by `dashboard.folder_id`
    #[sea_orm(primary_key)]
    pub id: i64,

    pub org_id: i64,

    /// Stable folder UID, unique per org
    pub uid: String,

    pub title: String,

    /// Parent folder UID; `None` for root-level folders
    pub parent_uid: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
