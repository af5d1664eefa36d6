//! Legacy notification channel entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

/// Legacy notification channel entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_notification")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub org_id: i64,

    pub uid: String,

    /// Channel name, unique within an org
    pub name: String,

    /// Integration type, e.g. `slack` or `email`
    #[sea_orm(column_name = "type")]
    pub channel_type: String,

    /// Default channels receive every alert of the org
    pub is_default: bool,

    pub send_reminder: bool,

    /// Reminder frequency in seconds
    pub frequency: i64,

    pub disable_resolve_message: bool,

    /// JSON object of plain settings
    pub settings: String,

    /// JSON object mapping keys to base64 encoded ciphertexts
    pub secure_settings: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
