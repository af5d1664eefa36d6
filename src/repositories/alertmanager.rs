//! # Alertmanager Repository
//!
//! Stores Alertmanager configurations. Every save is a new row; the newest
//! row of an org is its active configuration.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use sha2::{Digest, Sha256};

use crate::error::RepositoryError;
use crate::models::{
    alert_configuration, alert_instance, ngalert_configuration, AlertConfiguration, AlertInstance,
    NgalertConfiguration,
};
use crate::unified::PostableUserConfig;

pub const CONFIGURATION_VERSION: &str = "v1";

pub struct AlertmanagerRepository<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> AlertmanagerRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn latest(
        &self,
        org_id: i64,
    ) -> Result<Option<alert_configuration::Model>, RepositoryError> {
        AlertConfiguration::find()
            .filter(alert_configuration::Column::OrgId.eq(org_id))
            .order_by_desc(alert_configuration::Column::Id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Latest configuration of an org, parsed.
    pub async fn latest_config(
        &self,
        org_id: i64,
    ) -> Result<Option<PostableUserConfig>, RepositoryError> {
        let Some(row) = self.latest(org_id).await? else {
            return Ok(None);
        };
        let config = serde_json::from_str(&row.alertmanager_configuration)
            .map_err(|e| RepositoryError::serialization("alertmanager configuration", e))?;
        Ok(Some(config))
    }

    pub async fn save(
        &self,
        org_id: i64,
        config: &PostableUserConfig,
    ) -> Result<alert_configuration::Model, RepositoryError> {
        let raw = serde_json::to_string(config)
            .map_err(|e| RepositoryError::serialization("alertmanager configuration", e))?;
        let hash = hex::encode(Sha256::digest(raw.as_bytes()));

        alert_configuration::ActiveModel {
            org_id: Set(org_id),
            alertmanager_configuration: Set(raw),
            configuration_version: Set(CONFIGURATION_VERSION.to_string()),
            configuration_hash: Set(hash),
            is_default: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    /// Removes configurations, ngalert settings and alert instance state for
    /// one org, or for every org when `org_id` is `None`.
    pub async fn delete_all(&self, org_id: Option<i64>) -> Result<(), RepositoryError> {
        let mut configs = AlertConfiguration::delete_many();
        let mut settings = NgalertConfiguration::delete_many();
        let mut instances = AlertInstance::delete_many();
        if let Some(org_id) = org_id {
            configs = configs.filter(alert_configuration::Column::OrgId.eq(org_id));
            settings = settings.filter(ngalert_configuration::Column::OrgId.eq(org_id));
            instances = instances.filter(alert_instance::Column::RuleOrgId.eq(org_id));
        }
        configs
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        settings
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        instances
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(())
    }
}
