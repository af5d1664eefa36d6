//! Entry points of the alerting upgrade.
//!
//! Every public operation holds the in-process mutex and runs in a single
//! transaction that is committed only when the operation succeeds. Item
//! failures are recorded in the returned summaries and do not roll back.

use std::path::PathBuf;
use std::slice;
use std::sync::Arc;

use metrics::counter;
use sea_orm::{DatabaseBackend, DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, warn};

use crate::config::AppConfig;
use crate::db::is_case_insensitive_backend;
use crate::error::{MigrationError, RepositoryError};
use crate::notifier::{BuiltinValidator, ReceiverValidator, validate_config};
use crate::repositories::ServerLockRepository;
use crate::services::{
    Encryption, ServiceIdentity, SqlDatasourceCache, SqlFolderService,
    SqlPermissionService,
};
use crate::telemetry::{
    METRIC_CHANNELS_MIGRATED, METRIC_LOCK_SKIPPED, METRIC_ORG_REVERTS, operation_span,
};
use crate::unified::{MeshSilence, PostableUserConfig};

use super::channel::{create_base_config, remove_channel};
use super::ledger::{ContactPair, DashboardUpgrade, OrgMigrationState};
use super::org::{Collaborators, OrgMigration};
use super::silences::{FileSilenceSink, SilenceSink};
use super::store::{MigrationStore, SqlMigrationStore};
use super::{ACTION_NAME, ANY_ORG, RULE_UID_LABEL};

/// Settings steering [`MigrationService::run`].
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    pub unified_alerting_enabled: bool,
    pub legacy_alerting_enabled: Option<bool>,
    pub force_migration: bool,
    pub lock_lease_seconds: i64,
    /// Title uniqueness ignores case, matching the backend's collation.
    pub case_insensitive: bool,
    pub data_path: PathBuf,
}

impl MigrationSettings {
    pub fn from_config(config: &AppConfig, backend: DatabaseBackend) -> Self {
        Self {
            unified_alerting_enabled: config.unified_alerting_enabled,
            legacy_alerting_enabled: config.legacy_alerting_enabled,
            force_migration: config.force_migration,
            lock_lease_seconds: i64::try_from(config.migration_lock_lease_seconds)
                .unwrap_or(i64::MAX),
            case_insensitive: config
                .case_insensitive_titles
                .unwrap_or_else(|| is_case_insensitive_backend(backend)),
            data_path: config.data_path.clone(),
        }
    }

    fn legacy_alerting_disabled(&self) -> bool {
        self.legacy_alerting_enabled == Some(false)
    }
}

pub struct MigrationService {
    db: DatabaseConnection,
    settings: MigrationSettings,
    deps: Collaborators,
    validator: Arc<dyn ReceiverValidator>,
    silences: Arc<dyn SilenceSink>,
    lock: Mutex<()>,
}

async fn finish<T>(
    txn: DatabaseTransaction,
    result: Result<T, MigrationError>,
) -> Result<T, MigrationError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "failed to roll back migration transaction");
            }
            Err(err)
        }
    }
}

/// Drops silences of `removed` rules and appends `added`.
fn merge_silences(
    mut existing: Vec<MeshSilence>,
    removed: &[String],
    added: &[MeshSilence],
) -> Vec<MeshSilence> {
    existing.retain(|silence| {
        silence
            .matcher_value(RULE_UID_LABEL)
            .is_none_or(|uid| !removed.iter().any(|r| r == uid))
    });
    existing.extend_from_slice(added);
    existing
}

impl MigrationService {
    pub fn new(
        db: DatabaseConnection,
        settings: MigrationSettings,
        deps: Collaborators,
        validator: Arc<dyn ReceiverValidator>,
        silences: Arc<dyn SilenceSink>,
    ) -> Self {
        Self {
            db,
            settings,
            deps,
            validator,
            silences,
            lock: Mutex::new(()),
        }
    }

    /// Service backed by the SQL collaborators, the built-in receiver
    /// validator and silence files under `settings.data_path`.
    pub fn with_sql_collaborators(
        db: DatabaseConnection,
        settings: MigrationSettings,
        encryption: Arc<dyn Encryption>,
    ) -> Self {
        let deps = Collaborators {
            store: Arc::new(SqlMigrationStore),
            folders: Arc::new(SqlFolderService),
            permissions: Arc::new(SqlPermissionService),
            datasources: Arc::new(SqlDatasourceCache::new()),
            encryption,
        };
        let silences = Arc::new(FileSilenceSink::new(settings.data_path.clone()));
        Self::new(db, settings, deps, Arc::new(BuiltinValidator), silences)
    }

    fn store(&self) -> &dyn MigrationStore {
        self.deps.store.as_ref()
    }

    fn org_migration(&self, org_id: i64) -> OrgMigration {
        OrgMigration::new(org_id, self.deps.clone(), self.settings.case_insensitive)
    }

    fn validate(&self, config: &PostableUserConfig) -> Result<(), MigrationError> {
        validate_config(config, self.validator.as_ref(), self.deps.encryption.as_ref())
            .map_err(|err| MigrationError::InvalidAlertmanagerConfig(err.to_string()))
    }

    /// Migrates or reverts depending on the configured alerting mode.
    ///
    /// Runs under the server lock; when another process holds it the run is
    /// skipped.
    pub async fn run(&self) -> Result<(), MigrationError> {
        let _guard = self.lock.lock().await;
        async {
            let locks = ServerLockRepository::new(&self.db);
            if !locks
                .try_acquire(ACTION_NAME, self.settings.lock_lease_seconds)
                .await?
            {
                warn!("alerting migration is already running in another process, skipping");
                counter!(METRIC_LOCK_SKIPPED).increment(1);
                return Ok(());
            }

            let result = match self.db.begin().await {
                Ok(txn) => {
                    let result = self.run_in(&txn).await;
                    finish(txn, result).await
                }
                Err(err) => Err(err.into()),
            };

            if let Err(err) = locks.release(ACTION_NAME).await {
                warn!(error = %err, "failed to release migration lock");
            }
            result
        }
        .instrument(operation_span("run", ANY_ORG))
        .await
    }

    async fn run_in(&self, txn: &DatabaseTransaction) -> Result<(), MigrationError> {
        let migrated = self.store().is_migrated(txn, ANY_ORG).await?;
        let unified_enabled = self.settings.unified_alerting_enabled;

        if migrated == unified_enabled {
            debug!(migrated, "no alerting migration action required");
            return Ok(());
        }

        if migrated {
            if self.settings.legacy_alerting_disabled() {
                info!("unified and legacy alerting are both disabled, keeping unified alerting data");
                return Ok(());
            }
            if !self.settings.force_migration {
                return Err(MigrationError::ForceMigrationRequired);
            }
            info!("reverting unified alerting upgrade");
            return self.revert_all_in(txn).await;
        }

        info!("starting legacy alerting upgrade");
        for org in self.store().list_orgs(txn).await? {
            match self.migrate_org_in(txn, org.id).await {
                Ok(summary) => info!(
                    org_id = org.id,
                    dashboards = summary.migrated_dashboards.len(),
                    channels = summary.migrated_channels.len(),
                    errors = summary.errors.len(),
                    "org upgraded"
                ),
                Err(MigrationError::AlreadyMigrated) => {
                    debug!(org_id = org.id, "org already upgraded, skipping");
                }
                Err(err) => return Err(err),
            }
        }
        self.store().set_migrated(txn, ANY_ORG, true).await?;
        Ok(())
    }

    /// Migrates every dashboard alert and channel of an org that has not been migrated yet.
    pub async fn migrate_org(&self, org_id: i64) -> Result<OrgMigrationState, MigrationError> {
        let _guard = self.lock.lock().await;
        async {
            let txn = self.db.begin().await?;
            let result = self.migrate_org_in(&txn, org_id).await;
            finish(txn, result).await
        }
        .instrument(operation_span("migrate_org", org_id))
        .await
    }

    async fn migrate_org_in(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
    ) -> Result<OrgMigrationState, MigrationError> {
        let store = self.store();
        if store.is_migrated(txn, org_id).await? {
            return Err(MigrationError::AlreadyMigrated);
        }
        info!(org_id, "upgrading org");

        let mut om = self.org_migration(org_id);
        om.migrate_dashboards(txn).await?;

        let channels = store.get_notification_channels(txn, org_id).await?;
        let mut config = create_base_config();
        let pairs = om.migrate_channels(&mut config, &channels);
        counter!(METRIC_CHANNELS_MIGRATED)
            .increment(pairs.iter().filter(|pair| pair.error.is_empty()).count() as u64);
        om.state.migrated_channels = pairs;

        match self.validate(&config) {
            Ok(()) => store.save_alertmanager_config(txn, org_id, &config).await?,
            Err(err) => {
                warn!(org_id, error = %err, "migrated alertmanager configuration is invalid, not saving it");
                om.state.errors.push(err.to_string());
            }
        }

        if !om.silences.is_empty() {
            if let Err(err) = self.silences.write(org_id, &om.silences).await {
                warn!(org_id, error = %err, "failed to write silences");
                om.state.errors.push(format!("failed to write silences: {err}"));
            }
        }

        om.record_created_folders();
        store.set_org_migration_summary(txn, org_id, &om.state).await?;
        store.set_migrated(txn, org_id, true).await?;
        Ok(om.state)
    }

    /// Re-migrates one dashboard, replacing whatever a previous migration of
    /// it created. With `skip_existing`, an already migrated dashboard is
    /// returned unchanged.
    pub async fn migrate_dashboard(
        &self,
        org_id: i64,
        dashboard_id: i64,
        skip_existing: bool,
    ) -> Result<DashboardUpgrade, MigrationError> {
        let _guard = self.lock.lock().await;
        async {
            let txn = self.db.begin().await?;
            let result = self
                .migrate_dashboard_in(&txn, org_id, dashboard_id, skip_existing)
                .await;
            finish(txn, result).await
        }
        .instrument(operation_span("migrate_dashboard", org_id))
        .await
    }

    async fn migrate_dashboard_in(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        dashboard_id: i64,
        skip_existing: bool,
    ) -> Result<DashboardUpgrade, MigrationError> {
        let store = self.store();
        let mut summary = store.get_org_migration_summary(txn, org_id).await?;
        if skip_existing {
            if let Some(existing) = summary.get_dashboard_upgrade(dashboard_id) {
                return Ok(existing.clone());
            }
        }

        let mut removed = Vec::new();
        if let Some(previous) = summary.pop_dashboard_upgrade(dashboard_id) {
            removed = previous.rule_uids();
            let deleted = store.delete_alert_rules(txn, org_id, &removed).await?;
            debug!(org_id, dashboard_id, deleted, "deleted previously migrated rules");
            if previous.has_new_folder()
                && !summary.folder_in_use(&previous.new_folder_uid)
                && summary.forget_created_folder(&previous.new_folder_uid)
            {
                self.delete_folder(txn, org_id, &previous.new_folder_uid).await?;
            }
        }

        let alerts = store.get_dashboard_alerts(txn, org_id, dashboard_id).await?;
        let mut om = self.org_migration(org_id);
        let du = om.migrate_dashboard(txn, dashboard_id, &alerts).await;

        om.state = summary;
        om.state.migrated_dashboards.push(du.clone());
        self.update_silences(&mut om, &removed).await;
        om.record_created_folders();
        store.set_org_migration_summary(txn, org_id, &om.state).await?;
        Ok(du)
    }

    /// Re-migrates the alert of one dashboard panel, reusing the folder the
    /// dashboard was migrated to.
    pub async fn migrate_alert(
        &self,
        org_id: i64,
        dashboard_id: i64,
        panel_id: i64,
    ) -> Result<DashboardUpgrade, MigrationError> {
        let _guard = self.lock.lock().await;
        async {
            let txn = self.db.begin().await?;
            let result = self
                .migrate_alert_in(&txn, org_id, dashboard_id, panel_id)
                .await;
            finish(txn, result).await
        }
        .instrument(operation_span("migrate_alert", org_id))
        .await
    }

    async fn migrate_alert_in(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        dashboard_id: i64,
        panel_id: i64,
    ) -> Result<DashboardUpgrade, MigrationError> {
        let store = self.store();
        let alert = store
            .get_dashboard_alert(txn, org_id, dashboard_id, panel_id)
            .await?
            .ok_or_else(|| {
                MigrationError::NotFound(format!("alert for dashboard {dashboard_id} panel {panel_id}"))
            })?;
        let dash = store
            .get_dashboard(txn, org_id, dashboard_id)
            .await?
            .ok_or_else(|| MigrationError::NotFound(format!("dashboard {dashboard_id}")))?;
        let provisioned = store.is_provisioned(txn, org_id, &dash.uid).await?;

        let mut summary = store.get_org_migration_summary(txn, org_id).await?;
        let mut om = self.org_migration(org_id);
        let mut removed = Vec::new();

        let mut du = match summary.pop_dashboard_upgrade(dashboard_id) {
            Some(mut du) => {
                if du.provisioned != provisioned {
                    return Err(MigrationError::ProvisionedStatusChanged(dash.uid));
                }
                if self
                    .deps
                    .folders
                    .get_by_uid(txn, org_id, &du.new_folder_uid)
                    .await?
                    .is_none()
                {
                    return Err(MigrationError::FolderNotFound(du.new_folder_uid));
                }
                if let Some(rule) = du
                    .pop_alert_pair_by_panel_id(panel_id)
                    .and_then(|pair| pair.alert_rule)
                {
                    store
                        .delete_alert_rules(txn, org_id, slice::from_ref(&rule.uid))
                        .await?;
                    removed.push(rule.uid);
                }
                du
            }
            None => {
                let mut du = DashboardUpgrade::new(dashboard_id);
                du.provisioned = provisioned;
                om.prepare_dashboard(txn, &mut du, &dash)
                    .await
                    .map_err(|err| MigrationError::item(format!("dashboard {}", dash.uid), err))?;
                du
            }
        };

        om.migrate_dashboard_alert(txn, &mut du, &alert).await?;

        om.state = summary;
        om.state.migrated_dashboards.push(du.clone());
        self.update_silences(&mut om, &removed).await;
        om.record_created_folders();
        store.set_org_migration_summary(txn, org_id, &om.state).await?;
        Ok(du)
    }

    /// Re-migrates one channel into the stored Alertmanager configuration.
    pub async fn migrate_channel(
        &self,
        org_id: i64,
        channel_id: i64,
    ) -> Result<ContactPair, MigrationError> {
        let _guard = self.lock.lock().await;
        async {
            let txn = self.db.begin().await?;
            let result = self.migrate_channel_in(&txn, org_id, channel_id).await;
            finish(txn, result).await
        }
        .instrument(operation_span("migrate_channel", org_id))
        .await
    }

    async fn migrate_channel_in(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        channel_id: i64,
    ) -> Result<ContactPair, MigrationError> {
        let store = self.store();
        let channel = store
            .get_notification_channel(txn, org_id, channel_id)
            .await?
            .ok_or_else(|| MigrationError::NotFound(format!("notification channel {channel_id}")))?;

        let mut summary = store.get_org_migration_summary(txn, org_id).await?;
        let mut config = store
            .get_alertmanager_config(txn, org_id)
            .await?
            .unwrap_or_else(create_base_config);
        if let Some(previous) = summary.pop_contact_pair(channel_id) {
            if remove_channel(&mut config, &previous) {
                debug!(org_id, channel_id, "removed previously migrated contact point");
            }
        }

        let om = self.org_migration(org_id);
        let Some(pair) = om.migrate_channels(&mut config, slice::from_ref(&channel)).pop() else {
            return Err(MigrationError::NotFound(format!("contact point for channel {channel_id}")));
        };

        self.validate(&config)?;
        store.save_alertmanager_config(txn, org_id, &config).await?;
        if pair.error.is_empty() {
            counter!(METRIC_CHANNELS_MIGRATED).increment(1);
        }

        summary.migrated_channels.push(pair.clone());
        store.set_org_migration_summary(txn, org_id, &summary).await?;
        Ok(pair)
    }

    /// Re-migrates every channel of an org, replacing all contact points a
    /// previous migration created.
    pub async fn migrate_all_channels(
        &self,
        org_id: i64,
    ) -> Result<Vec<ContactPair>, MigrationError> {
        let _guard = self.lock.lock().await;
        async {
            let txn = self.db.begin().await?;
            let result = self.migrate_all_channels_in(&txn, org_id).await;
            finish(txn, result).await
        }
        .instrument(operation_span("migrate_all_channels", org_id))
        .await
    }

    async fn migrate_all_channels_in(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
    ) -> Result<Vec<ContactPair>, MigrationError> {
        let store = self.store();
        let mut summary = store.get_org_migration_summary(txn, org_id).await?;
        let mut config = store
            .get_alertmanager_config(txn, org_id)
            .await?
            .unwrap_or_else(create_base_config);
        for previous in summary.migrated_channels.drain(..) {
            remove_channel(&mut config, &previous);
        }

        let channels = store.get_notification_channels(txn, org_id).await?;
        let pairs = self.org_migration(org_id).migrate_channels(&mut config, &channels);

        self.validate(&config)?;
        store.save_alertmanager_config(txn, org_id, &config).await?;
        counter!(METRIC_CHANNELS_MIGRATED)
            .increment(pairs.iter().filter(|pair| pair.error.is_empty()).count() as u64);

        summary.migrated_channels = pairs.clone();
        store.set_org_migration_summary(txn, org_id, &summary).await?;
        Ok(pairs)
    }

    pub async fn get_org_migration_summary(
        &self,
        org_id: i64,
    ) -> Result<OrgMigrationState, MigrationError> {
        let _guard = self.lock.lock().await;
        let txn = self.db.begin().await?;
        let result = self
            .store()
            .get_org_migration_summary(&txn, org_id)
            .await
            .map_err(MigrationError::from);
        finish(txn, result).await
    }

    pub async fn is_migrated(&self, org_id: i64) -> Result<bool, MigrationError> {
        let _guard = self.lock.lock().await;
        let txn = self.db.begin().await?;
        let result = self
            .store()
            .is_migrated(&txn, org_id)
            .await
            .map_err(MigrationError::from);
        finish(txn, result).await
    }

    /// Deletes everything the upgrade created for an org and marks it not migrated.
    pub async fn revert_org(&self, org_id: i64) -> Result<(), MigrationError> {
        let _guard = self.lock.lock().await;
        async {
            let txn = self.db.begin().await?;
            let result = self.revert_org_in(&txn, org_id).await;
            finish(txn, result).await
        }
        .instrument(operation_span("revert_org", org_id))
        .await
    }

    async fn revert_org_in(&self, txn: &DatabaseTransaction, org_id: i64) -> Result<(), MigrationError> {
        self.revert_org_data(txn, org_id).await?;
        self.store().set_migrated(txn, org_id, false).await?;
        Ok(())
    }

    /// Reverts every org and clears the global migrated flag.
    pub async fn revert_all_orgs(&self) -> Result<(), MigrationError> {
        let _guard = self.lock.lock().await;
        async {
            let txn = self.db.begin().await?;
            let result = self.revert_all_in(&txn).await;
            finish(txn, result).await
        }
        .instrument(operation_span("revert_all_orgs", ANY_ORG))
        .await
    }

    async fn revert_all_in(&self, txn: &DatabaseTransaction) -> Result<(), MigrationError> {
        let store = self.store();
        for org in store.list_orgs(txn).await? {
            self.revert_org_data(txn, org.id).await?;
        }
        store.delete_unified_data(txn, None).await?;
        if let Err(err) = self.silences.remove_all().await {
            warn!(error = %err, "failed to remove silence files");
        }
        store.set_migrated(txn, ANY_ORG, false).await?;
        Ok(())
    }

    /// Folders listed in the ledger go first; the ledger itself is removed
    /// with the rest of the org's unified data.
    async fn revert_org_data(&self, txn: &DatabaseTransaction, org_id: i64) -> Result<(), MigrationError> {
        let store = self.store();
        let summary = store.get_org_migration_summary(txn, org_id).await?;
        for uid in &summary.created_folders {
            self.delete_folder(txn, org_id, uid).await?;
        }
        store.delete_unified_data(txn, Some(org_id)).await?;
        if let Err(err) = self.silences.remove(org_id).await {
            warn!(org_id, error = %err, "failed to remove silence file");
        }
        counter!(METRIC_ORG_REVERTS).increment(1);
        info!(org_id, folders = summary.created_folders.len(), "reverted org upgrade");
        Ok(())
    }

    async fn delete_folder(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        uid: &str,
    ) -> Result<(), MigrationError> {
        let identity = ServiceIdentity::revert(org_id);
        match self.deps.folders.delete(txn, &identity, org_id, uid).await {
            Ok(()) => {
                info!(org_id, folder_uid = uid, "deleted folder created by upgrade");
                Ok(())
            }
            Err(RepositoryError::NotFound(_)) => {
                warn!(org_id, folder_uid = uid, "folder created by upgrade no longer exists");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Replaces the silences of `removed` rules with the ones `om` produced.
    /// Failures are recorded in the ledger.
    async fn update_silences(&self, om: &mut OrgMigration, removed: &[String]) {
        if removed.is_empty() && om.silences.is_empty() {
            return;
        }
        let org_id = om.org_id;
        let result = match self.silences.read(org_id).await {
            Ok(existing) => {
                let merged = merge_silences(existing, removed, &om.silences);
                self.silences.write(org_id, &merged).await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(org_id, error = %err, "failed to update silences");
            om.state.errors.push(format!("failed to write silences: {err}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence_for(rule_uid: &str) -> MeshSilence {
        MeshSilence::equal_matchers(&[("alertname", "DatasourceNoData"), (RULE_UID_LABEL, rule_uid)], "test")
    }

    #[test]
    fn merge_drops_silences_of_removed_rules() {
        let existing = vec![silence_for("a"), silence_for("b")];
        let merged = merge_silences(existing, &["a".to_string()], &[silence_for("c")]);
        let uids: Vec<_> = merged
            .iter()
            .filter_map(|s| s.matcher_value(RULE_UID_LABEL))
            .collect();
        assert_eq!(uids, vec!["b", "c"]);
    }

    #[test]
    fn settings_prefer_explicit_title_collation() {
        let mut config = AppConfig::default();
        let settings = MigrationSettings::from_config(&config, DatabaseBackend::Sqlite);
        assert!(!settings.case_insensitive);
        assert_eq!(settings.lock_lease_seconds, 600);

        config.case_insensitive_titles = Some(true);
        let settings = MigrationSettings::from_config(&config, DatabaseBackend::Sqlite);
        assert!(settings.case_insensitive);
    }

    #[test]
    fn legacy_disabled_requires_explicit_false() {
        let mut config = AppConfig::default();
        assert!(!MigrationSettings::from_config(&config, DatabaseBackend::Sqlite).legacy_alerting_disabled());
        config.legacy_alerting_enabled = Some(false);
        assert!(MigrationSettings::from_config(&config, DatabaseBackend::Sqlite).legacy_alerting_disabled());
    }
}
