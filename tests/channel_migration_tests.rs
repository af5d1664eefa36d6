//! Integration tests for migrating notification channels.

use anyhow::Result;
use serde_json::json;
use tempfile::TempDir;
use ualert_migration::error::MigrationError;
use ualert_migration::repositories::AlertmanagerRepository;

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::*;

async fn receiver_names(db: &sea_orm::DatabaseConnection) -> Result<Vec<String>> {
    let config = AlertmanagerRepository::new(db)
        .latest_config(ORG_ID)
        .await?
        .expect("alertmanager config saved");
    let mut names: Vec<String> = config.receiver_names().into_iter().collect();
    names.sort();
    Ok(names)
}

#[tokio::test]
async fn remigrating_a_channel_replaces_its_receiver() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_channel(
        &db,
        ORG_ID,
        1,
        "chan-hook",
        "Hook",
        "webhook",
        false,
        json!({"url": "https://example.com/hook"}),
    )
    .await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let first = service.migrate_channel(ORG_ID, 1).await?;
    assert!(first.error.is_empty(), "error: {}", first.error);

    exec(&db, "UPDATE alert_notification SET name = 'Hook v2' WHERE id = 1", vec![]).await?;
    let second = service.migrate_channel(ORG_ID, 1).await?;

    let contact = second.contact_point.as_ref().expect("contact point");
    assert_eq!(contact.name, "Hook v2");
    assert_eq!(contact.route_label, "__contacts_chan-hook__");
    assert_eq!(
        receiver_names(&db).await?,
        vec!["Hook v2".to_string(), "autogen-contact-point-default".to_string()]
    );

    let summary = service.get_org_migration_summary(ORG_ID).await?;
    assert_eq!(summary.migrated_channels.len(), 1);
    Ok(())
}

#[tokio::test]
async fn discontinued_channels_are_recorded_as_errors() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_channel(&db, ORG_ID, 1, "chan-hip", "Old chat", "hipchat", false, json!({})).await?;
    insert_channel(
        &db,
        ORG_ID,
        2,
        "chan-mail",
        "Mail",
        "email",
        false,
        json!({"addresses": "a@example.com;b@example.com"}),
    )
    .await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let pairs = service.migrate_all_channels(ORG_ID).await?;

    assert_eq!(pairs.len(), 2);
    let hip = pairs
        .iter()
        .find(|pair| pair.legacy_channel.uid == "chan-hip")
        .expect("hipchat pair");
    assert!(hip.error.contains("hipchat is a discontinued"));
    assert!(hip.contact_point.is_none());
    assert_eq!(
        receiver_names(&db).await?,
        vec!["Mail".to_string(), "autogen-contact-point-default".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn migrate_all_channels_replaces_previous_contact_points() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_channel(
        &db,
        ORG_ID,
        1,
        "chan-mail",
        "Mail",
        "email",
        true,
        json!({"addresses": "a@example.com"}),
    )
    .await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    service.migrate_all_channels(ORG_ID).await?;
    service.migrate_all_channels(ORG_ID).await?;

    assert_eq!(
        receiver_names(&db).await?,
        vec!["Mail".to_string(), "autogen-contact-point-default".to_string()]
    );
    assert_eq!(service.get_org_migration_summary(ORG_ID).await?.migrated_channels.len(), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_configuration_is_not_saved() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    insert_channel(
        &db,
        ORG_ID,
        1,
        "chan-mail",
        "Mail",
        "email",
        false,
        json!({"addresses": "not an address"}),
    )
    .await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let err = service.migrate_channel(ORG_ID, 1).await.unwrap_err();

    assert!(matches!(err, MigrationError::InvalidAlertmanagerConfig(_)));
    assert!(
        AlertmanagerRepository::new(&db)
            .latest_config(ORG_ID)
            .await?
            .is_none()
    );
    Ok(())
}

#[tokio::test]
async fn unknown_channel_is_not_found() -> Result<()> {
    let db = setup_test_db().await?;
    seed_org(&db).await?;
    let data = TempDir::new()?;
    let service = test_service(&db, test_settings(data.path()));

    let err = service.migrate_channel(ORG_ID, 5).await.unwrap_err();
    assert!(matches!(err, MigrationError::NotFound(_)));
    Ok(())
}
