//! Storage seam of the migration engine.
//!
//! [`MigrationStore`] bundles the legacy reads, unified writes and ledger
//! access one operation needs. Every call runs on the operation's
//! transaction.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sea_orm::DatabaseTransaction;
use tracing::debug;

use crate::error::RepositoryError;
use crate::models::{alert, alert_notification, dashboard, org};
use crate::repositories::{
    AlertRuleRepository, AlertmanagerRepository, KvStoreRepository, LegacyRepository,
};
use crate::unified::{AlertRule, PostableUserConfig};

use super::ledger::OrgMigrationState;
use super::{KV_NAMESPACE, MIGRATED_KEY, NOTIFIER_KV_NAMESPACE, SUMMARY_KEY};

#[async_trait]
pub trait MigrationStore: Send + Sync {
    async fn is_migrated(&self, txn: &DatabaseTransaction, org_id: i64) -> Result<bool, RepositoryError>;

    async fn set_migrated(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        migrated: bool,
    ) -> Result<(), RepositoryError>;

    /// The stored ledger, or an empty one when the org was never migrated.
    async fn get_org_migration_summary(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
    ) -> Result<OrgMigrationState, RepositoryError>;

    async fn set_org_migration_summary(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        summary: &OrgMigrationState,
    ) -> Result<(), RepositoryError>;

    async fn list_orgs(&self, txn: &DatabaseTransaction) -> Result<Vec<org::Model>, RepositoryError>;

    async fn get_dashboard(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        dashboard_id: i64,
    ) -> Result<Option<dashboard::Model>, RepositoryError>;

    async fn is_provisioned(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        dashboard_uid: &str,
    ) -> Result<bool, RepositoryError>;

    /// Alerts of an org keyed by dashboard id.
    async fn get_org_dashboard_alerts(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
    ) -> Result<BTreeMap<i64, Vec<alert::Model>>, RepositoryError>;

    async fn get_dashboard_alerts(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        dashboard_id: i64,
    ) -> Result<Vec<alert::Model>, RepositoryError>;

    async fn get_dashboard_alert(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        dashboard_id: i64,
        panel_id: i64,
    ) -> Result<Option<alert::Model>, RepositoryError>;

    /// Channels of an org, default channels first.
    async fn get_notification_channels(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
    ) -> Result<Vec<alert_notification::Model>, RepositoryError>;

    async fn get_notification_channel(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        channel_id: i64,
    ) -> Result<Option<alert_notification::Model>, RepositoryError>;

    async fn get_alert_notification_uid(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        channel_id: i64,
    ) -> Result<String, RepositoryError>;

    /// Inserts a rule; provisioned rules also get `upgrade` provenance.
    async fn insert_alert_rule(
        &self,
        txn: &DatabaseTransaction,
        rule: &AlertRule,
        provisioned: bool,
    ) -> Result<(), RepositoryError>;

    async fn alert_rule_uid_exists(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        uid: &str,
    ) -> Result<bool, RepositoryError>;

    async fn delete_alert_rules(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        uids: &[String],
    ) -> Result<u64, RepositoryError>;

    async fn get_alertmanager_config(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
    ) -> Result<Option<PostableUserConfig>, RepositoryError>;

    async fn save_alertmanager_config(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        config: &PostableUserConfig,
    ) -> Result<(), RepositoryError>;

    /// Deletes rules, Alertmanager state and both key-value namespaces of
    /// `org_id`, or of every org when `None`. Folders and silence files are
    /// left to their own collaborators.
    async fn delete_unified_data(
        &self,
        txn: &DatabaseTransaction,
        org_id: Option<i64>,
    ) -> Result<(), RepositoryError>;
}

#[derive(Debug, Default, Clone)]
pub struct SqlMigrationStore;

#[async_trait]
impl MigrationStore for SqlMigrationStore {
    async fn is_migrated(&self, txn: &DatabaseTransaction, org_id: i64) -> Result<bool, RepositoryError> {
        let Some(value) = KvStoreRepository::new(txn)
            .get(org_id, KV_NAMESPACE, MIGRATED_KEY)
            .await?
        else {
            return Ok(false);
        };
        serde_json::from_str(&value).map_err(|e| RepositoryError::serialization("migration status", e))
    }

    async fn set_migrated(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        migrated: bool,
    ) -> Result<(), RepositoryError> {
        KvStoreRepository::new(txn)
            .set(org_id, KV_NAMESPACE, MIGRATED_KEY, &migrated.to_string())
            .await
    }

    async fn get_org_migration_summary(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
    ) -> Result<OrgMigrationState, RepositoryError> {
        let Some(raw) = KvStoreRepository::new(txn)
            .get(org_id, KV_NAMESPACE, SUMMARY_KEY)
            .await?
        else {
            return Ok(OrgMigrationState::new(org_id));
        };
        serde_json::from_str(&raw).map_err(|e| RepositoryError::serialization("migration summary", e))
    }

    async fn set_org_migration_summary(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        summary: &OrgMigrationState,
    ) -> Result<(), RepositoryError> {
        let raw = serde_json::to_string(summary)
            .map_err(|e| RepositoryError::serialization("migration summary", e))?;
        KvStoreRepository::new(txn)
            .set(org_id, KV_NAMESPACE, SUMMARY_KEY, &raw)
            .await
    }

    async fn list_orgs(&self, txn: &DatabaseTransaction) -> Result<Vec<org::Model>, RepositoryError> {
        LegacyRepository::new(txn).list_orgs().await
    }

    async fn get_dashboard(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        dashboard_id: i64,
    ) -> Result<Option<dashboard::Model>, RepositoryError> {
        LegacyRepository::new(txn).get_dashboard(org_id, dashboard_id).await
    }

    async fn is_provisioned(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        dashboard_uid: &str,
    ) -> Result<bool, RepositoryError> {
        LegacyRepository::new(txn).is_provisioned(org_id, dashboard_uid).await
    }

    async fn get_org_dashboard_alerts(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
    ) -> Result<BTreeMap<i64, Vec<alert::Model>>, RepositoryError> {
        LegacyRepository::new(txn).dashboard_alerts_by_dashboard(org_id).await
    }

    async fn get_dashboard_alerts(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        dashboard_id: i64,
    ) -> Result<Vec<alert::Model>, RepositoryError> {
        LegacyRepository::new(txn).dashboard_alerts(org_id, dashboard_id).await
    }

    async fn get_dashboard_alert(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        dashboard_id: i64,
        panel_id: i64,
    ) -> Result<Option<alert::Model>, RepositoryError> {
        LegacyRepository::new(txn)
            .dashboard_alert(org_id, dashboard_id, panel_id)
            .await
    }

    async fn get_notification_channels(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
    ) -> Result<Vec<alert_notification::Model>, RepositoryError> {
        LegacyRepository::new(txn).notification_channels(org_id).await
    }

    async fn get_notification_channel(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        channel_id: i64,
    ) -> Result<Option<alert_notification::Model>, RepositoryError> {
        LegacyRepository::new(txn)
            .notification_channel(org_id, channel_id)
            .await
    }

    async fn get_alert_notification_uid(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        channel_id: i64,
    ) -> Result<String, RepositoryError> {
        LegacyRepository::new(txn)
            .notification_channel_uid(org_id, channel_id)
            .await
    }

    async fn insert_alert_rule(
        &self,
        txn: &DatabaseTransaction,
        rule: &AlertRule,
        provisioned: bool,
    ) -> Result<(), RepositoryError> {
        let rules = AlertRuleRepository::new(txn);
        rules.insert(rule).await?;
        if provisioned {
            rules.upsert_upgrade_provenance(rule.org_id, &rule.uid).await?;
        }
        Ok(())
    }

    async fn alert_rule_uid_exists(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        uid: &str,
    ) -> Result<bool, RepositoryError> {
        AlertRuleRepository::new(txn).uid_exists(org_id, uid).await
    }

    async fn delete_alert_rules(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        uids: &[String],
    ) -> Result<u64, RepositoryError> {
        AlertRuleRepository::new(txn).delete_by_uids(org_id, uids).await
    }

    async fn get_alertmanager_config(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
    ) -> Result<Option<PostableUserConfig>, RepositoryError> {
        AlertmanagerRepository::new(txn).latest_config(org_id).await
    }

    async fn save_alertmanager_config(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        config: &PostableUserConfig,
    ) -> Result<(), RepositoryError> {
        AlertmanagerRepository::new(txn).save(org_id, config).await?;
        Ok(())
    }

    async fn delete_unified_data(
        &self,
        txn: &DatabaseTransaction,
        org_id: Option<i64>,
    ) -> Result<(), RepositoryError> {
        let rules = AlertRuleRepository::new(txn).delete_all(org_id).await?;
        AlertmanagerRepository::new(txn).delete_all(org_id).await?;

        let kv = KvStoreRepository::new(txn);
        kv.delete_namespace(org_id, NOTIFIER_KV_NAMESPACE).await?;
        kv.delete_namespace(org_id, KV_NAMESPACE).await?;

        debug!(?org_id, rules, "deleted unified alerting data");
        Ok(())
    }
}
