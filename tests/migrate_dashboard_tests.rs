//! Integration tests for re-migrating single dashboards and alerts.

use anyhow::Result;
use serde_json::json;
use tempfile::TempDir;
use ualert_migration::error::MigrationError;
use ualert_migration::repositories::AlertRuleRepository;

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::*;

async fn seed_restricted_dashboard(db: &sea_orm::DatabaseConnection) -> Result<()> {
    seed_org(db).await?;
    insert_folder(db, ORG_ID, 10, "ops", "Ops").await?;
    insert_default_folder_permissions(db, ORG_ID, "ops").await?;
    insert_dashboard(db, ORG_ID, 100, "dash-secret", "Secret", 10).await?;
    insert_permission(db, ORG_ID, "dashboards", "dash-secret", "team", "3", "Edit").await?;
    let settings = alert_settings(json!([]));
    insert_alert(db, ORG_ID, 1, 100, 1, "First", &settings).await?;
    insert_alert(db, ORG_ID, 2, 100, 2, "Second", &settings).await
}

#[tokio::test]
async fn remigrating_a_dashboard_replaces_its_rules_and_folder() -> Result<()> {
    let db = setup_test_db().await?;
    seed_restricted_dashboard(&db).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let first = service.migrate_dashboard(ORG_ID, 100, false).await?;
    assert_eq!(first.rule_uids().len(), 2);
    let folders_after_first = folder_count(&db, ORG_ID).await?;

    let second = service.migrate_dashboard(ORG_ID, 100, false).await?;

    assert_eq!(rule_count(&db, ORG_ID).await?, 2);
    assert_eq!(folder_count(&db, ORG_ID).await?, folders_after_first);
    assert_ne!(first.new_folder_uid, second.new_folder_uid);
    let old_folder = count(
        &db,
        "SELECT COUNT(*) AS c FROM folder WHERE uid = ?",
        vec![first.new_folder_uid.clone().into()],
    )
    .await?;
    assert_eq!(old_folder, 0);

    let summary = service.get_org_migration_summary(ORG_ID).await?;
    assert_eq!(summary.migrated_dashboards.len(), 1);
    assert_eq!(summary.created_folders, vec![second.new_folder_uid.clone()]);
    Ok(())
}

#[tokio::test]
async fn skip_existing_keeps_the_previous_upgrade() -> Result<()> {
    let db = setup_test_db().await?;
    seed_restricted_dashboard(&db).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let first = service.migrate_dashboard(ORG_ID, 100, false).await?;
    let skipped = service.migrate_dashboard(ORG_ID, 100, true).await?;

    assert_eq!(first, skipped);
    assert_eq!(rule_count(&db, ORG_ID).await?, 2);
    Ok(())
}

#[tokio::test]
async fn user_folders_survive_dashboard_remigration() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_folder(&db, ORG_ID, 10, "ops", "Ops").await?;
    insert_default_folder_permissions(&db, ORG_ID, "ops").await?;
    insert_dashboard(&db, ORG_ID, 100, "dash-ops", "Ops", 10).await?;
    insert_alert(&db, ORG_ID, 1, 100, 1, "Up", &alert_settings(json!([]))).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    service.migrate_dashboard(ORG_ID, 100, false).await?;
    service.migrate_dashboard(ORG_ID, 100, false).await?;

    assert_eq!(folder_count(&db, ORG_ID).await?, 1);
    assert_eq!(rule_count(&db, ORG_ID).await?, 1);
    Ok(())
}

#[tokio::test]
async fn migrate_alert_replaces_only_that_panel() -> Result<()> {
    let db = setup_test_db().await?;
    seed_restricted_dashboard(&db).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let first = service.migrate_dashboard(ORG_ID, 100, false).await?;
    let uid_of = |du: &ualert_migration::upgrade::DashboardUpgrade, panel_id: i64| {
        du.migrated_alerts
            .iter()
            .find(|pair| pair.legacy_alert.panel_id == panel_id)
            .and_then(|pair| pair.alert_rule.as_ref())
            .map(|rule| rule.uid.clone())
            .expect("rule for panel")
    };

    exec(
        &db,
        "UPDATE alert SET name = 'First renamed' WHERE id = 1",
        vec![],
    )
    .await?;
    let updated = service.migrate_alert(ORG_ID, 100, 1).await?;

    assert_eq!(updated.new_folder_uid, first.new_folder_uid);
    assert_eq!(updated.migrated_alerts.len(), 2);
    assert_eq!(uid_of(&updated, 2), uid_of(&first, 2));
    assert_ne!(uid_of(&updated, 1), uid_of(&first, 1));

    let rules = AlertRuleRepository::new(&db).list_for_org(ORG_ID).await?;
    assert_eq!(rules.len(), 2);
    assert!(rules.iter().any(|r| r.title == "First renamed"));
    Ok(())
}

#[tokio::test]
async fn migrate_alert_without_ledger_entry_resolves_the_folder() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_dashboard(&db, ORG_ID, 100, "dash", "Dash", 0).await?;
    insert_alert(&db, ORG_ID, 1, 100, 1, "Solo", &alert_settings(json!([]))).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let du = service.migrate_alert(ORG_ID, 100, 1).await?;

    assert_eq!(du.new_folder_name, "General Alerting");
    assert_eq!(du.rule_uids().len(), 1);
    let summary = service.get_org_migration_summary(ORG_ID).await?;
    assert_eq!(summary.created_folders, vec![du.new_folder_uid.clone()]);
    Ok(())
}

#[tokio::test]
async fn migrate_alert_rejects_changed_provisioning() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_dashboard(&db, ORG_ID, 100, "dash", "Dash", 0).await?;
    insert_alert(&db, ORG_ID, 1, 100, 1, "Solo", &alert_settings(json!([]))).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    service.migrate_dashboard(ORG_ID, 100, false).await?;
    insert_provisioning(&db, ORG_ID, "dash").await?;

    let err = service.migrate_alert(ORG_ID, 100, 1).await.unwrap_err();
    assert!(matches!(err, MigrationError::ProvisionedStatusChanged(ref uid) if uid == "dash"));
    assert!(err.to_string().contains("must re-upgrade entire dashboard"));
    assert_eq!(rule_count(&db, ORG_ID).await?, 1);
    Ok(())
}

#[tokio::test]
async fn migrate_alert_for_unknown_panel_is_not_found() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_dashboard(&db, ORG_ID, 100, "dash", "Dash", 0).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let err = service.migrate_alert(ORG_ID, 100, 9).await.unwrap_err();
    assert!(matches!(err, MigrationError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn title_taken_by_another_dashboard_is_retried_with_a_suffix() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_folder(&db, ORG_ID, 10, "ops", "Ops").await?;
    insert_default_folder_permissions(&db, ORG_ID, "ops").await?;
    insert_dashboard(&db, ORG_ID, 100, "dash-a", "A", 10).await?;
    insert_dashboard(&db, ORG_ID, 200, "dash-b", "B", 10).await?;
    let settings = alert_settings(json!([]));
    insert_alert(&db, ORG_ID, 1, 100, 1, "Latency", &settings).await?;
    insert_alert(&db, ORG_ID, 2, 200, 1, "Latency", &settings).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let first = service.migrate_dashboard(ORG_ID, 100, false).await?;
    let second = service.migrate_dashboard(ORG_ID, 200, false).await?;

    assert_eq!(first.new_folder_uid, "ops");
    assert_eq!(second.new_folder_uid, "ops");
    assert!(second.errors.is_empty(), "errors: {:?}", second.errors);
    let title_of = |du: &ualert_migration::upgrade::DashboardUpgrade| {
        du.migrated_alerts[0]
            .alert_rule
            .as_ref()
            .map(|rule| rule.title.clone())
            .expect("migrated rule")
    };
    assert_eq!(title_of(&first), "Latency");
    assert!(title_of(&second).starts_with("Latency_"));

    let mut titles: Vec<_> = AlertRuleRepository::new(&db)
        .list_for_org(ORG_ID)
        .await?
        .into_iter()
        .map(|rule| rule.title)
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["Latency".to_string(), title_of(&second)]);
    Ok(())
}

#[tokio::test]
async fn uid_clash_is_not_retried_as_a_title_clash() -> Result<()> {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use sea_orm::TransactionTrait;
    use ualert_migration::services::{SqlDatasourceCache, SqlFolderService, SqlPermissionService};
    use ualert_migration::unified::{AlertRule, Duration, ExecutionErrorState, NoDataState};
    use ualert_migration::upgrade::SqlMigrationStore;
    use ualert_migration::upgrade::org::{Collaborators, OrgMigration};

    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_dashboard(&db, ORG_ID, 100, "dash", "Dash", 0).await?;
    insert_alert(&db, ORG_ID, 1, 100, 1, "Latency", &alert_settings(json!([]))).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));
    service.migrate_dashboard(ORG_ID, 100, false).await?;
    let existing = AlertRuleRepository::new(&db).list_for_org(ORG_ID).await?.remove(0);

    let deps = Collaborators {
        store: Arc::new(SqlMigrationStore),
        folders: Arc::new(SqlFolderService),
        permissions: Arc::new(SqlPermissionService),
        datasources: Arc::new(SqlDatasourceCache::new()),
        encryption: Arc::new(test_encryption()),
    };
    let mut om = OrgMigration::new(ORG_ID, deps, false);
    let mut rule = AlertRule {
        uid: existing.uid.clone(),
        org_id: ORG_ID,
        title: "Throughput".to_string(),
        condition: "A".to_string(),
        data: Vec::new(),
        interval_seconds: 60,
        version: 1,
        namespace_uid: existing.namespace_uid.clone(),
        dashboard_uid: None,
        panel_id: None,
        rule_group: "Throughput".to_string(),
        rule_group_index: 1,
        no_data_state: NoDataState::NoData,
        exec_err_state: ExecutionErrorState::Alerting,
        for_duration: Duration::default(),
        annotations: BTreeMap::new(),
        labels: BTreeMap::new(),
        is_paused: false,
        updated: chrono::Utc::now(),
    };

    let txn = db.begin().await?;
    let err = om.insert_rule(&txn, &mut rule, false).await.unwrap_err();
    txn.rollback().await?;

    assert!(err.is_unique_violation());
    assert_eq!(rule.title, "Throughput");
    assert_eq!(rule_count(&db, ORG_ID).await?, 1);
    Ok(())
}
