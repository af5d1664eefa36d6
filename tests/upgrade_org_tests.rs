//! Integration tests for migrating whole orgs.

use anyhow::Result;
use serde_json::json;
use tempfile::TempDir;
use ualert_migration::error::MigrationError;
use ualert_migration::repositories::{AlertRuleRepository, AlertmanagerRepository};
use ualert_migration::upgrade::{FileSilenceSink, SilenceSink};

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::*;

async fn seed_two_dashboards(db: &sea_orm::DatabaseConnection) -> Result<()> {
    seed_org(db).await?;
    insert_folder(db, ORG_ID, 10, "ops", "Ops").await?;
    insert_default_folder_permissions(db, ORG_ID, "ops").await?;
    insert_dashboard(db, ORG_ID, 100, "dash-ops", "Ops Overview", 10).await?;
    insert_dashboard(db, ORG_ID, 200, "dash-root", "Home", 0).await?;

    let notify_email = alert_settings(json!([{"uid": "chan-email"}]));
    insert_alert(db, ORG_ID, 1, 100, 1, "CPU high", &notify_email).await?;
    insert_alert(db, ORG_ID, 2, 100, 2, "Memory high", &alert_settings(json!([]))).await?;
    insert_alert(db, ORG_ID, 3, 200, 1, "Disk full", &alert_settings(json!([]))).await?;

    insert_channel(
        db,
        ORG_ID,
        1,
        "chan-email",
        "Ops email",
        "email",
        false,
        json!({"addresses": "ops@example.com"}),
    )
    .await?;
    insert_channel(
        db,
        ORG_ID,
        2,
        "chan-slack",
        "Slack",
        "slack",
        true,
        json!({"url": "https://hooks.slack.com/services/T000/B000/XXX"}),
    )
    .await
}

#[tokio::test]
async fn migrate_org_creates_rules_folders_and_contact_points() -> Result<()> {
    let db = setup_test_db().await?;
    seed_two_dashboards(&db).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let summary = service.migrate_org(ORG_ID).await?;

    assert_eq!(summary.migrated_dashboards.len(), 2);
    assert!(summary.errors.is_empty(), "errors: {:?}", summary.errors);
    for du in &summary.migrated_dashboards {
        for pair in &du.migrated_alerts {
            assert!(pair.error.is_empty(), "alert error: {}", pair.error);
            assert!(pair.alert_rule.is_some());
        }
    }
    assert_eq!(rule_count(&db, ORG_ID).await?, 3);

    let ops = summary
        .migrated_dashboards
        .iter()
        .find(|du| du.dashboard_uid == "dash-ops")
        .expect("ops dashboard upgraded");
    assert_eq!(ops.new_folder_uid, "ops");
    assert!(ops.warnings.is_empty());

    let root = summary
        .migrated_dashboards
        .iter()
        .find(|du| du.dashboard_uid == "dash-root")
        .expect("root dashboard upgraded");
    assert_eq!(root.new_folder_name, "General Alerting");
    assert_eq!(summary.created_folders, vec![root.new_folder_uid.clone()]);

    let rules = AlertRuleRepository::new(&db).list_for_org(ORG_ID).await?;
    let cpu = rules.iter().find(|r| r.title == "CPU high").expect("cpu rule");
    assert_eq!(cpu.namespace_uid, "ops");
    assert_eq!(cpu.rule_group, "Ops Overview - 1");
    assert!(cpu.labels.contains("__contacts_chan-email__"));
    assert!(cpu.labels.contains("\"team\":\"infra\""));
    assert!(cpu.annotations.contains("__dashboardUid__"));

    assert_eq!(summary.migrated_channels.len(), 2);
    assert!(summary.migrated_channels.iter().all(|pair| pair.error.is_empty()));
    let config = AlertmanagerRepository::new(&db)
        .latest_config(ORG_ID)
        .await?
        .expect("alertmanager config saved");
    let names = config.receiver_names();
    assert!(names.contains("Ops email"));
    assert!(names.contains("Slack"));
    assert!(names.contains("autogen-contact-point-default"));

    assert!(service.is_migrated(ORG_ID).await?);
    Ok(())
}

#[tokio::test]
async fn migrating_an_org_twice_is_rejected() -> Result<()> {
    let db = setup_test_db().await?;
    seed_two_dashboards(&db).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    service.migrate_org(ORG_ID).await?;
    let err = service.migrate_org(ORG_ID).await.unwrap_err();
    assert!(matches!(err, MigrationError::AlreadyMigrated));
    assert_eq!(rule_count(&db, ORG_ID).await?, 3);
    Ok(())
}

#[tokio::test]
async fn colliding_titles_in_one_folder_are_deduplicated() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_dashboard(&db, ORG_ID, 100, "dash-a", "A", 0).await?;
    insert_dashboard(&db, ORG_ID, 200, "dash-b", "B", 0).await?;
    let settings = alert_settings(json!([]));
    insert_alert(&db, ORG_ID, 1, 100, 1, "Latency", &settings).await?;
    insert_alert(&db, ORG_ID, 2, 100, 2, "Latency", &settings).await?;
    insert_alert(&db, ORG_ID, 3, 200, 1, "Latency", &settings).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    service.migrate_org(ORG_ID).await?;

    let rules = AlertRuleRepository::new(&db).list_for_org(ORG_ID).await?;
    assert_eq!(rules.len(), 3);
    let mut titles: Vec<_> = rules.iter().map(|r| r.title.clone()).collect();
    titles.sort();
    titles.dedup();
    assert_eq!(titles.len(), 3);
    assert!(titles.iter().all(|t| t.starts_with("Latency")));
    Ok(())
}

#[tokio::test]
async fn dashboard_permissions_move_rules_to_a_new_folder() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_folder(&db, ORG_ID, 10, "ops", "Ops").await?;
    insert_default_folder_permissions(&db, ORG_ID, "ops").await?;
    insert_dashboard(&db, ORG_ID, 100, "dash-secret", "Secret", 10).await?;
    insert_permission(&db, ORG_ID, "dashboards", "dash-secret", "user", "7", "Admin").await?;
    insert_alert(&db, ORG_ID, 1, 100, 1, "Leak", &alert_settings(json!([]))).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let summary = service.migrate_org(ORG_ID).await?;

    let du = &summary.migrated_dashboards[0];
    assert_eq!(du.folder_uid, "ops");
    assert_ne!(du.new_folder_uid, "ops");
    assert!(du.new_folder_name.starts_with("Secret Alerts - "));
    assert!(
        du.warnings
            .iter()
            .any(|w| w.contains("folder permission changes were needed"))
    );
    assert_eq!(summary.created_folders, vec![du.new_folder_uid.clone()]);

    let grants = count(
        &db,
        "SELECT COUNT(*) AS c FROM resource_permission WHERE resource = 'folders' AND resource_uid = ? AND principal = '7' AND permission = 'Admin'",
        vec![du.new_folder_uid.clone().into()],
    )
    .await?;
    assert_eq!(grants, 1);
    Ok(())
}

#[tokio::test]
async fn missing_folder_falls_back_to_general_alerting() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_dashboard(&db, ORG_ID, 100, "dash-orphan", "Orphan", 42).await?;
    insert_alert(&db, ORG_ID, 1, 100, 1, "Lost", &alert_settings(json!([]))).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let summary = service.migrate_org(ORG_ID).await?;

    let du = &summary.migrated_dashboards[0];
    assert_eq!(du.new_folder_name, "General Alerting");
    assert!(
        du.warnings
            .iter()
            .any(|w| w.contains("original folder not found"))
    );
    Ok(())
}

#[tokio::test]
async fn broken_alerts_are_recorded_without_blocking_siblings() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_dashboard(&db, ORG_ID, 100, "dash", "Dash", 0).await?;
    insert_alert(&db, ORG_ID, 1, 100, 1, "Good", &alert_settings(json!([]))).await?;
    insert_alert(&db, ORG_ID, 2, 100, 2, "No conditions", &json!({"conditions": []})).await?;
    let mut unknown_ds = alert_settings(json!([]));
    unknown_ds["conditions"][0]["query"]["datasourceId"] = json!(99);
    insert_alert(&db, ORG_ID, 3, 100, 3, "Unknown datasource", &unknown_ds).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let summary = service.migrate_org(ORG_ID).await?;

    let du = &summary.migrated_dashboards[0];
    assert_eq!(du.migrated_alerts.len(), 3);
    let error_of = |panel_id: i64| {
        du.migrated_alerts
            .iter()
            .find(|pair| pair.legacy_alert.panel_id == panel_id)
            .map(|pair| pair.error.clone())
            .unwrap_or_default()
    };
    assert!(error_of(1).is_empty());
    assert!(error_of(2).contains("conditions"));
    assert!(error_of(3).contains("datasource 99"));
    assert_eq!(rule_count(&db, ORG_ID).await?, 1);
    assert!(service.is_migrated(ORG_ID).await?);
    Ok(())
}

#[tokio::test]
async fn provisioned_dashboards_get_upgrade_provenance() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_dashboard(&db, ORG_ID, 100, "dash-prov", "Provisioned", 0).await?;
    insert_provisioning(&db, ORG_ID, "dash-prov").await?;
    insert_alert(&db, ORG_ID, 1, 100, 1, "Managed", &alert_settings(json!([]))).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let summary = service.migrate_org(ORG_ID).await?;

    assert!(summary.migrated_dashboards[0].provisioned);
    let provenance = count(
        &db,
        "SELECT COUNT(*) AS c FROM provenance_type WHERE org_id = ? AND provenance = 'upgrade'",
        vec![ORG_ID.into()],
    )
    .await?;
    assert_eq!(provenance, 1);
    Ok(())
}

#[tokio::test]
async fn keep_state_alerts_write_silences() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_dashboard(&db, ORG_ID, 100, "dash", "Dash", 0).await?;
    let mut settings = alert_settings(json!([]));
    settings["noDataState"] = json!("keep_state");
    insert_alert(&db, ORG_ID, 1, 100, 1, "Sticky", &settings).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let summary = service.migrate_org(ORG_ID).await?;

    let rule_uid = summary.migrated_dashboards[0].rule_uids()[0].clone();
    let silences = FileSilenceSink::new(data.path()).read(ORG_ID).await?;
    assert_eq!(silences.len(), 1);
    assert_eq!(silences[0].matcher_value("alertname"), Some("DatasourceNoData"));
    assert_eq!(silences[0].matcher_value("rule_uid"), Some(rule_uid.as_str()));
    Ok(())
}

#[tokio::test]
async fn prometheus_queries_with_both_modes_become_range_queries() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_dashboard(&db, ORG_ID, 100, "dash", "Dash", 0).await?;
    let mut settings = alert_settings(json!([]));
    settings["conditions"][0]["query"]["model"] =
        json!({"expr": "up", "refId": "A", "instant": true, "range": true});
    insert_alert(&db, ORG_ID, 1, 100, 1, "Up", &settings).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    service.migrate_org(ORG_ID).await?;

    let rules = AlertRuleRepository::new(&db).list_for_org(ORG_ID).await?;
    assert_eq!(rules.len(), 1);
    let queries: serde_json::Value = serde_json::from_str(&rules[0].data)?;
    let model = &queries[0]["model"];
    assert_eq!(model["datasource"], json!({"type": "prometheus", "uid": "prom-uid"}));
    assert_eq!(model["instant"], false);
    assert_eq!(model["range"], true);
    Ok(())
}

#[tokio::test]
async fn unreadable_alerts_roll_back_the_org() -> Result<()> {
    let db = setup_test_db().await?;
    seed_two_dashboards(&db).await?;
    exec(&db, "DROP TABLE alert", vec![]).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let err = service.migrate_org(ORG_ID).await.unwrap_err();

    assert!(matches!(err, MigrationError::Repository(_)), "got {err:?}");
    assert!(!service.is_migrated(ORG_ID).await?);
    let summary = service.get_org_migration_summary(ORG_ID).await?;
    assert!(summary.migrated_channels.is_empty());
    assert_eq!(
        count(&db, "SELECT COUNT(*) AS c FROM alert_configuration WHERE org_id = ?", vec![ORG_ID.into()]).await?,
        0
    );
    Ok(())
}
