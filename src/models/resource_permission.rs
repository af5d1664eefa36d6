//! Resource permission entity model
//!
//! Grants on dashboards (`resource = "dashboards"`) and folders
//! (`resource = "folders"`). Principals are users, teams or basic roles.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

/// Resource permission entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "resource_permission")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub org_id: i64,

    /// `dashboards` or `folders`
    pub resource: String,

    /// UID of the dashboard or folder
    pub resource_uid: String,

    /// `user`, `team` or `role`
    pub principal_kind: String,

    /// User id, team id or basic role name
    pub principal: String,

    /// `View`, `Edit` or `Admin`
    pub permission: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
