//! Test utilities for database testing.
//!
//! Sets up in-memory SQLite databases with the schema applied and inserts
//! legacy alerting fixtures with raw SQL.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement, Value};
use serde_json::json;
use ualert_migration::config::AppConfig;
use ualert_migration::crypto::AesGcmEncryption;
use ualert_migration::db;
use ualert_migration::upgrade::{MigrationService, MigrationSettings};

pub const ORG_ID: i64 = 1;
pub const PROM_DATASOURCE_ID: i64 = 1;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let config = AppConfig {
        database_url: "sqlite::memory:".to_string(),
        ..AppConfig::default()
    };
    db::connect_and_migrate(&config).await
}

pub async fn exec(db: &DatabaseConnection, sql: &str, values: Vec<Value>) -> Result<()> {
    db.execute(Statement::from_sql_and_values(
        db.get_database_backend(),
        sql,
        values,
    ))
    .await?;
    Ok(())
}

/// Runs a `SELECT COUNT(*) AS c ...` query.
pub async fn count(db: &DatabaseConnection, sql: &str, values: Vec<Value>) -> Result<i64> {
    let row = db
        .query_one(Statement::from_sql_and_values(
            db.get_database_backend(),
            sql,
            values,
        ))
        .await?
        .ok_or_else(|| anyhow::anyhow!("count query returned no row"))?;
    Ok(row.try_get::<i64>("", "c")?)
}

pub fn test_encryption() -> AesGcmEncryption {
    AesGcmEncryption::from_bytes(vec![7u8; 32]).expect("32 byte key")
}

pub fn test_settings(data_path: &Path) -> MigrationSettings {
    MigrationSettings {
        unified_alerting_enabled: true,
        legacy_alerting_enabled: None,
        force_migration: false,
        lock_lease_seconds: 600,
        case_insensitive: false,
        data_path: data_path.to_path_buf(),
    }
}

pub fn test_service(db: &DatabaseConnection, settings: MigrationSettings) -> MigrationService {
    MigrationService::with_sql_collaborators(db.clone(), settings, Arc::new(test_encryption()))
}

/// Org 1 with a Prometheus data source.
pub async fn seed_org(db: &DatabaseConnection) -> Result<()> {
    insert_org(db, ORG_ID, "Main Org.").await?;
    insert_datasource(db, ORG_ID, PROM_DATASOURCE_ID, "prom-uid", "prometheus").await
}

pub async fn insert_org(db: &DatabaseConnection, id: i64, name: &str) -> Result<()> {
    exec(
        db,
        "INSERT INTO org (id, name) VALUES (?, ?)",
        vec![id.into(), name.into()],
    )
    .await
}

pub async fn insert_datasource(
    db: &DatabaseConnection,
    org_id: i64,
    id: i64,
    uid: &str,
    kind: &str,
) -> Result<()> {
    exec(
        db,
        "INSERT INTO data_source (id, org_id, uid, name, type) VALUES (?, ?, ?, ?, ?)",
        vec![id.into(), org_id.into(), uid.into(), uid.into(), kind.into()],
    )
    .await
}

pub async fn insert_folder(
    db: &DatabaseConnection,
    org_id: i64,
    id: i64,
    uid: &str,
    title: &str,
) -> Result<()> {
    exec(
        db,
        "INSERT INTO folder (id, org_id, uid, title) VALUES (?, ?, ?, ?)",
        vec![id.into(), org_id.into(), uid.into(), title.into()],
    )
    .await
}

pub async fn insert_dashboard(
    db: &DatabaseConnection,
    org_id: i64,
    id: i64,
    uid: &str,
    title: &str,
    folder_id: i64,
) -> Result<()> {
    exec(
        db,
        "INSERT INTO dashboard (id, org_id, uid, title, folder_id) VALUES (?, ?, ?, ?, ?)",
        vec![
            id.into(),
            org_id.into(),
            uid.into(),
            title.into(),
            folder_id.into(),
        ],
    )
    .await
}

pub async fn insert_provisioning(
    db: &DatabaseConnection,
    org_id: i64,
    dashboard_uid: &str,
) -> Result<()> {
    exec(
        db,
        "INSERT INTO dashboard_provisioning (org_id, dashboard_uid, name, external_id) VALUES (?, ?, ?, ?)",
        vec![
            org_id.into(),
            dashboard_uid.into(),
            "default".into(),
            "dashboards/provisioned.json".into(),
        ],
    )
    .await
}

pub async fn insert_permission(
    db: &DatabaseConnection,
    org_id: i64,
    resource: &str,
    resource_uid: &str,
    principal_kind: &str,
    principal: &str,
    permission: &str,
) -> Result<()> {
    exec(
        db,
        "INSERT INTO resource_permission (org_id, resource, resource_uid, principal_kind, principal, permission) VALUES (?, ?, ?, ?, ?, ?)",
        vec![
            org_id.into(),
            resource.into(),
            resource_uid.into(),
            principal_kind.into(),
            principal.into(),
            permission.into(),
        ],
    )
    .await
}

/// Viewer View and Editor Edit, the permissions of a root-level dashboard.
pub async fn insert_default_folder_permissions(
    db: &DatabaseConnection,
    org_id: i64,
    folder_uid: &str,
) -> Result<()> {
    insert_permission(db, org_id, "folders", folder_uid, "role", "Viewer", "View").await?;
    insert_permission(db, org_id, "folders", folder_uid, "role", "Editor", "Edit").await
}

/// Settings of a legacy alert firing when `avg(A) > 80`.
pub fn alert_settings(notifications: serde_json::Value) -> serde_json::Value {
    json!({
        "conditions": [{
            "evaluator": {"type": "gt", "params": [80]},
            "operator": {"type": "and"},
            "query": {
                "params": ["A", "5m", "now"],
                "datasourceId": PROM_DATASOURCE_ID,
                "model": {"expr": "up", "refId": "A"}
            },
            "reducer": {"type": "avg"}
        }],
        "noDataState": "no_data",
        "executionErrorState": "alerting",
        "alertRuleTags": {"team": "infra"},
        "notifications": notifications
    })
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_alert(
    db: &DatabaseConnection,
    org_id: i64,
    id: i64,
    dashboard_id: i64,
    panel_id: i64,
    name: &str,
    settings: &serde_json::Value,
) -> Result<()> {
    exec(
        db,
        "INSERT INTO alert (id, org_id, dashboard_id, panel_id, name, message, state, settings, frequency, for_seconds) VALUES (?, ?, ?, ?, ?, ?, 'ok', ?, 60, 300)",
        vec![
            id.into(),
            org_id.into(),
            dashboard_id.into(),
            panel_id.into(),
            name.into(),
            format!("{name} is firing").into(),
            settings.to_string().into(),
        ],
    )
    .await
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_channel(
    db: &DatabaseConnection,
    org_id: i64,
    id: i64,
    uid: &str,
    name: &str,
    kind: &str,
    is_default: bool,
    settings: serde_json::Value,
) -> Result<()> {
    exec(
        db,
        "INSERT INTO alert_notification (id, org_id, uid, name, type, is_default, settings, secure_settings) VALUES (?, ?, ?, ?, ?, ?, ?, '{}')",
        vec![
            id.into(),
            org_id.into(),
            uid.into(),
            name.into(),
            kind.into(),
            is_default.into(),
            settings.to_string().into(),
        ],
    )
    .await
}

pub async fn rule_count(db: &DatabaseConnection, org_id: i64) -> Result<i64> {
    count(
        db,
        "SELECT COUNT(*) AS c FROM alert_rule WHERE org_id = ?",
        vec![org_id.into()],
    )
    .await
}

pub async fn folder_count(db: &DatabaseConnection, org_id: i64) -> Result<i64> {
    count(
        db,
        "SELECT COUNT(*) AS c FROM folder WHERE org_id = ?",
        vec![org_id.into()],
    )
    .await
}
