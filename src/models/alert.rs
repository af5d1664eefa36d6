//! Legacy dashboard alert entity model
//!
//! One row per alerting panel. `settings` is the JSON blob holding the classic
//! conditions, notification references, tags and no-data/error behaviour.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

/// Legacy alert entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub org_id: i64,

    pub dashboard_id: i64,

    pub panel_id: i64,

    pub name: String,

    /// Free-form notification message, may embed `${instance}`
    pub message: String,

    /// Legacy evaluation state, `paused` marks a paused alert
    pub state: String,

    /// Raw JSON settings blob
    pub settings: String,

    /// Evaluation frequency in seconds
    pub frequency: i64,

    /// Pending duration in seconds
    pub for_seconds: i64,

    pub silenced: bool,

    pub execution_error: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
