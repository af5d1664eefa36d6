//! # Alerting Migration CLI
//!
//! Runs the unified alerting upgrade against the configured database and
//! prints the resulting summaries as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sea_orm::ConnectionTrait;
use serde::Serialize;
use ualert_migration::{
    config::ConfigLoader,
    crypto::AesGcmEncryption,
    db,
    telemetry::init_tracing,
    upgrade::{ANY_ORG, MigrationService, MigrationSettings},
};

#[derive(Parser)]
#[command(name = "ualert-migration", about = "Legacy to unified alerting upgrade")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Migrate or revert depending on the configured alerting mode
    Run,
    /// Migrate one org that has not been migrated yet
    MigrateOrg {
        #[arg(long)]
        org: i64,
    },
    /// Re-migrate every alert of one dashboard
    MigrateDashboard {
        #[arg(long)]
        org: i64,
        #[arg(long)]
        dashboard: i64,
        /// Keep a dashboard that was already migrated as is
        #[arg(long)]
        skip_existing: bool,
    },
    /// Re-migrate the alert of one dashboard panel
    MigrateAlert {
        #[arg(long)]
        org: i64,
        #[arg(long)]
        dashboard: i64,
        #[arg(long)]
        panel: i64,
    },
    /// Re-migrate one notification channel
    MigrateChannel {
        #[arg(long)]
        org: i64,
        #[arg(long)]
        channel: i64,
    },
    /// Re-migrate every notification channel of an org
    MigrateChannels {
        #[arg(long)]
        org: i64,
    },
    /// Print the migration ledger of an org
    Summary {
        #[arg(long)]
        org: i64,
    },
    /// Delete everything the upgrade created for an org
    RevertOrg {
        #[arg(long)]
        org: i64,
    },
    /// Delete everything the upgrade created for every org
    RevertAll,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("encoding result")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    init_tracing(&config).context("initializing telemetry")?;
    tracing::info!(profile = %config.profile, "loaded configuration");

    let key = config
        .crypto_key
        .clone()
        .context("crypto key not present in configuration")?;
    let encryption = AesGcmEncryption::from_bytes(key).context("initializing encryption")?;

    let db = db::connect_and_migrate(&config)
        .await
        .context("preparing database")?;

    let settings = MigrationSettings::from_config(&config, db.get_database_backend());
    let service = MigrationService::with_sql_collaborators(db, settings, Arc::new(encryption));

    match cli.cmd {
        Cmd::Run => {
            service.run().await?;
            print_json(&serde_json::json!({ "migrated": service.is_migrated(ANY_ORG).await? }))
        }
        Cmd::MigrateOrg { org } => print_json(&service.migrate_org(org).await?),
        Cmd::MigrateDashboard {
            org,
            dashboard,
            skip_existing,
        } => print_json(
            &service
                .migrate_dashboard(org, dashboard, skip_existing)
                .await?,
        ),
        Cmd::MigrateAlert {
            org,
            dashboard,
            panel,
        } => print_json(&service.migrate_alert(org, dashboard, panel).await?),
        Cmd::MigrateChannel { org, channel } => {
            print_json(&service.migrate_channel(org, channel).await?)
        }
        Cmd::MigrateChannels { org } => print_json(&service.migrate_all_channels(org).await?),
        Cmd::Summary { org } => print_json(&service.get_org_migration_summary(org).await?),
        Cmd::RevertOrg { org } => {
            service.revert_org(org).await?;
            print_json(&serde_json::json!({ "org_id": org, "migrated": false }))
        }
        Cmd::RevertAll => {
            service.revert_all_orgs().await?;
            print_json(&serde_json::json!({ "migrated": false }))
        }
    }
}
