//! Per-operation migration context for one org.

use std::collections::HashMap;
use std::slice;
use std::sync::Arc;

use metrics::counter;
use sea_orm::{DatabaseTransaction, TransactionTrait};
use tracing::{debug, info, warn};

use crate::error::{ItemError, RepositoryError};
use crate::legacy::DashAlertSettings;
use crate::models::{alert, alert_notification, dashboard};
use crate::services::{DatasourceCache, Encryption, FolderService, PermissionService};
use crate::telemetry::{METRIC_ALERT_ERRORS, METRIC_RULES_MIGRATED};
use crate::unified::{AlertRule, MeshSilence, PostableUserConfig};

use super::alert_rule::{create_silences, make_alert_rule};
use super::channel;
use super::conditions::trans_conditions;
use super::dedup::Deduplicator;
use super::folders::FolderHelper;
use super::ledger::{AlertRuleUpgrade, ContactPair, DashboardUpgrade, OrgMigrationState};
use super::store::MigrationStore;
use super::{MAX_TITLE_LENGTH, short_uid};

const GENERAL_ALERTING_WARNING: &str =
    "dashboard alerts moved to general alerting folder during upgrade: original folder not found";
const NEW_FOLDER_WARNING: &str =
    "dashboard alerts moved to new folder during upgrade: folder permission changes were needed";

/// Collaborators shared by every per-org context.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn MigrationStore>,
    pub folders: Arc<dyn FolderService>,
    pub permissions: Arc<dyn PermissionService>,
    pub datasources: Arc<dyn DatasourceCache>,
    pub encryption: Arc<dyn Encryption>,
}

/// A rule ready for insertion plus the silences it needs.
pub struct MigratedAlert {
    pub rule: AlertRule,
    pub silences: Vec<MeshSilence>,
}

/// Caches, deduplicators and the ledger of one operation on one org.
pub struct OrgMigration {
    pub org_id: i64,
    deps: Collaborators,
    case_insensitive: bool,
    pub folder_helper: FolderHelper,
    seen_uids: Deduplicator,
    alert_rule_title_dedup: HashMap<String, Deduplicator>,
    pub silences: Vec<MeshSilence>,
    pub state: OrgMigrationState,
}

impl OrgMigration {
    pub fn new(org_id: i64, deps: Collaborators, case_insensitive: bool) -> Self {
        let folder_helper = FolderHelper::new(
            org_id,
            Arc::clone(&deps.folders),
            Arc::clone(&deps.permissions),
        );
        Self {
            org_id,
            deps,
            case_insensitive,
            folder_helper,
            seen_uids: Deduplicator::new(case_insensitive, 0),
            alert_rule_title_dedup: HashMap::new(),
            silences: Vec::new(),
            state: OrgMigrationState::new(org_id),
        }
    }

    fn title_dedup(&mut self, folder_uid: &str) -> &mut Deduplicator {
        let case_insensitive = self.case_insensitive;
        self.alert_rule_title_dedup
            .entry(folder_uid.to_string())
            .or_insert_with(|| Deduplicator::new(case_insensitive, MAX_TITLE_LENGTH))
    }

    /// Channel uids an alert notifies. Unresolvable ids are logged and dropped.
    async fn extract_channel_uids(
        &self,
        txn: &DatabaseTransaction,
        alert: &alert::Model,
        settings: &DashAlertSettings,
    ) -> Vec<String> {
        let mut uids = Vec::with_capacity(settings.notifications.len());
        for notification in &settings.notifications {
            if notification.id > 0 {
                match self
                    .deps
                    .store
                    .get_alert_notification_uid(txn, self.org_id, notification.id)
                    .await
                {
                    Ok(uid) => uids.push(uid),
                    Err(err) => warn!(
                        org_id = self.org_id,
                        alert_id = alert.id,
                        notifier_id = notification.id,
                        error = %err,
                        "failed to get alert notification uid"
                    ),
                }
            } else if !notification.uid.is_empty() {
                uids.push(notification.uid.clone());
            }
        }
        uids
    }

    /// Translates one legacy alert into a rule in `du`'s new folder.
    pub async fn migrate_alert(
        &mut self,
        txn: &DatabaseTransaction,
        alert: &alert::Model,
        du: &DashboardUpgrade,
    ) -> Result<MigratedAlert, ItemError> {
        debug!(org_id = self.org_id, alert_id = alert.id, name = %alert.name, "migrating alert");
        let settings = alert.parse_settings().map_err(ItemError::InvalidSettings)?;
        let condition = trans_conditions(txn, self.deps.datasources.as_ref(), self.org_id, &settings)
            .await
            .map_err(|err| ItemError::Conditions(err.to_string()))?;
        let channels = self.extract_channel_uids(txn, alert, &settings).await;

        let mut rule = make_alert_rule(condition, alert, &settings, du, &channels)?;
        while self.seen_uids.contains(&rule.uid) {
            rule.uid = short_uid();
        }
        self.seen_uids.add(&rule.uid);

        let silences = create_silences(&settings, &mut rule);
        Ok(MigratedAlert { rule, silences })
    }

    async fn try_insert(
        &self,
        txn: &DatabaseTransaction,
        rule: &AlertRule,
        provisioned: bool,
    ) -> Result<(), RepositoryError> {
        let savepoint = txn.begin().await.map_err(RepositoryError::database_error)?;
        match self
            .deps
            .store
            .insert_alert_rule(&savepoint, rule, provisioned)
            .await
        {
            Ok(()) => savepoint
                .commit()
                .await
                .map_err(RepositoryError::database_error),
            Err(err) => {
                savepoint
                    .rollback()
                    .await
                    .map_err(RepositoryError::database_error)?;
                Err(err)
            }
        }
    }

    /// Inserts `rule`, retrying once with a deduplicated title when the
    /// title is already taken in its folder. A clash on the uid is returned
    /// as is.
    pub async fn insert_rule(
        &mut self,
        txn: &DatabaseTransaction,
        rule: &mut AlertRule,
        provisioned: bool,
    ) -> Result<(), RepositoryError> {
        match self.try_insert(txn, rule, provisioned).await {
            Err(err) if err.is_unique_violation() => {
                if self
                    .deps
                    .store
                    .alert_rule_uid_exists(txn, self.org_id, &rule.uid)
                    .await?
                {
                    return Err(err);
                }
                let dedup = self.title_dedup(&rule.namespace_uid);
                let title = dedup.deduplicate(&rule.title);
                dedup.add(&title);
                warn!(
                    org_id = self.org_id,
                    rule_uid = %rule.uid,
                    old_title = %rule.title,
                    new_title = %title,
                    "alert rule title already in use, retrying with a new title"
                );
                rule.title = title;
                self.try_insert(txn, rule, provisioned).await
            }
            other => other,
        }
    }

    /// Migrates every alert of one dashboard. Failures end up in the returned
    /// upgrade instead of aborting the operation.
    pub async fn migrate_dashboard(
        &mut self,
        txn: &DatabaseTransaction,
        dashboard_id: i64,
        alerts: &[alert::Model],
    ) -> DashboardUpgrade {
        let mut du = DashboardUpgrade::new(dashboard_id);
        if let Err(err) = self.try_migrate_dashboard(txn, &mut du, alerts).await {
            warn!(
                org_id = self.org_id,
                dashboard_uid = %du.dashboard_uid,
                dashboard_title = %du.dashboard_name,
                new_folder_uid = %du.new_folder_uid,
                alert_count = alerts.len(),
                error = %err,
                "failed to migrate dashboard"
            );
            du.migrated_alerts.clear();
            du.add_alert_errors(&err.to_string(), alerts);
            du.errors.push(err.to_string());
            counter!(METRIC_ALERT_ERRORS).increment(alerts.len() as u64);
        }
        du
    }

    /// Records `dash` on `du` and resolves the folder its rules go to.
    pub async fn prepare_dashboard(
        &mut self,
        txn: &DatabaseTransaction,
        du: &mut DashboardUpgrade,
        dash: &dashboard::Model,
    ) -> Result<(), ItemError> {
        du.set_dashboard(&dash.uid, &dash.title);
        let resolved = self.folder_helper.get_or_create_migrated_folder(txn, dash).await?;
        if let Some(legacy) = &resolved.legacy {
            du.set_folder(&legacy.uid, &legacy.title);
        }
        du.set_new_folder(&resolved.target.uid, &resolved.target.title);
        if resolved.legacy_missing {
            du.warnings.push(GENERAL_ALERTING_WARNING.to_string());
        }
        if resolved.permissions_changed {
            du.warnings.push(NEW_FOLDER_WARNING.to_string());
        }
        Ok(())
    }

    async fn try_migrate_dashboard(
        &mut self,
        txn: &DatabaseTransaction,
        du: &mut DashboardUpgrade,
        alerts: &[alert::Model],
    ) -> Result<(), ItemError> {
        let store = Arc::clone(&self.deps.store);
        let dash = store
            .get_dashboard(txn, self.org_id, du.dashboard_id)
            .await?
            .ok_or_else(|| ItemError::DashboardNotFound(format!("dashboard {} not found", du.dashboard_id)))?;

        du.provisioned = match store.is_provisioned(txn, self.org_id, &dash.uid).await {
            Ok(provisioned) => provisioned,
            Err(err) => {
                warn!(org_id = self.org_id, dashboard_uid = %dash.uid, error = %err, "failed to get provisioned status for dashboard");
                du.warnings.push(format!("failed to get provisioned status: {err}"));
                false
            }
        };
        self.prepare_dashboard(txn, du, &dash).await?;
        let target_uid = du.new_folder_uid.clone();

        let org_id = self.org_id;
        let mut migrated = Vec::with_capacity(alerts.len());
        for alert in alerts {
            match self.migrate_alert(txn, alert, du).await {
                Ok(mut item) => {
                    let dedup = self.title_dedup(&target_uid);
                    if dedup.contains(&item.rule.title) {
                        let deduped = dedup.deduplicate(&item.rule.title);
                        warn!(
                            org_id,
                            dashboard_uid = %dash.uid,
                            old_title = %item.rule.title,
                            new_title = %deduped,
                            "duplicate alert rule name detected, renaming"
                        );
                        item.rule.title = deduped;
                    }
                    dedup.add(&item.rule.title);
                    migrated.push((alert, item));
                }
                Err(err) => {
                    warn!(org_id = self.org_id, dashboard_uid = %dash.uid, alert_id = alert.id, error = %err, "failed to migrate alert");
                    du.add_alert_errors(&err.to_string(), slice::from_ref(alert));
                    counter!(METRIC_ALERT_ERRORS).increment(1);
                }
            }
        }

        if migrated.is_empty() {
            return Ok(());
        }

        info!(
            org_id = self.org_id,
            dashboard_uid = %dash.uid,
            count = migrated.len(),
            provisioned = du.provisioned,
            "inserting migrated alert rules"
        );
        let savepoint = txn.begin().await.map_err(RepositoryError::database_error)?;
        let mut inserted = Vec::with_capacity(migrated.len());
        for (alert, mut item) in migrated {
            match self.insert_rule(&savepoint, &mut item.rule, du.provisioned).await {
                Ok(()) => inserted.push((alert, item)),
                Err(err) if err.is_unique_violation() => {
                    let err = ItemError::InsertRules(err.to_string());
                    warn!(org_id = self.org_id, alert_id = alert.id, error = %err, "failed to insert alert rule");
                    du.add_alert_errors(&err.to_string(), slice::from_ref(alert));
                    counter!(METRIC_ALERT_ERRORS).increment(1);
                }
                Err(err) => {
                    savepoint
                        .rollback()
                        .await
                        .map_err(RepositoryError::database_error)?;
                    return Err(ItemError::InsertRules(err.to_string()));
                }
            }
        }
        savepoint
            .commit()
            .await
            .map_err(RepositoryError::database_error)?;

        counter!(METRIC_RULES_MIGRATED).increment(inserted.len() as u64);
        for (alert, item) in inserted {
            du.add_alert(alert).alert_rule = Some(AlertRuleUpgrade::from(&item.rule));
            self.silences.extend(item.silences);
        }
        Ok(())
    }

    /// Migrates and inserts one alert into an existing dashboard upgrade,
    /// keeping its title unique among the rules `du` already holds.
    pub async fn migrate_dashboard_alert(
        &mut self,
        txn: &DatabaseTransaction,
        du: &mut DashboardUpgrade,
        alert: &alert::Model,
    ) -> Result<(), RepositoryError> {
        let org_id = self.org_id;
        let folder_uid = du.new_folder_uid.clone();
        let dedup = self.title_dedup(&folder_uid);
        for rule in du.migrated_alerts.iter().filter_map(|pair| pair.alert_rule.as_ref()) {
            dedup.add(&rule.title);
        }

        let mut item = match self.migrate_alert(txn, alert, du).await {
            Ok(item) => item,
            Err(err) => {
                warn!(org_id, alert_id = alert.id, error = %err, "failed to migrate alert");
                du.add_alert_errors(&err.to_string(), slice::from_ref(alert));
                counter!(METRIC_ALERT_ERRORS).increment(1);
                return Ok(());
            }
        };

        let dedup = self.title_dedup(&folder_uid);
        if dedup.contains(&item.rule.title) {
            item.rule.title = dedup.deduplicate(&item.rule.title);
        }
        dedup.add(&item.rule.title);

        match self.insert_rule(txn, &mut item.rule, du.provisioned).await {
            Ok(()) => {}
            Err(err) if err.is_unique_violation() => {
                let err = ItemError::InsertRules(err.to_string());
                warn!(org_id, alert_id = alert.id, error = %err, "failed to insert alert rule");
                du.add_alert_errors(&err.to_string(), slice::from_ref(alert));
                counter!(METRIC_ALERT_ERRORS).increment(1);
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        counter!(METRIC_RULES_MIGRATED).increment(1);
        du.add_alert(alert).alert_rule = Some(AlertRuleUpgrade::from(&item.rule));
        self.silences.extend(item.silences);
        Ok(())
    }

    /// Migrates every dashboard with legacy alerts into `self.state`.
    /// Failing to load the alerts fails the whole operation.
    pub async fn migrate_dashboards(&mut self, txn: &DatabaseTransaction) -> Result<(), RepositoryError> {
        let alerts = self
            .deps
            .store
            .get_org_dashboard_alerts(txn, self.org_id)
            .await?;
        info!(
            org_id = self.org_id,
            alerts = alerts.values().map(Vec::len).sum::<usize>(),
            "alerts found to migrate"
        );

        for (dashboard_id, dashboard_alerts) in alerts {
            let du = self.migrate_dashboard(txn, dashboard_id, &dashboard_alerts).await;
            self.state.migrated_dashboards.push(du);
        }
        Ok(())
    }

    /// Adds receivers and routes for `channels` to `config`.
    pub fn migrate_channels(
        &self,
        config: &mut PostableUserConfig,
        channels: &[alert_notification::Model],
    ) -> Vec<ContactPair> {
        channel::migrate_channels(config, channels, self.deps.encryption.as_ref())
    }

    /// Moves the folders created by this run into the ledger.
    pub fn record_created_folders(&mut self) {
        for uid in self.folder_helper.created_folders.drain(..) {
            if !self.state.created_folders.contains(&uid) {
                self.state.created_folders.push(uid);
            }
        }
    }
}
