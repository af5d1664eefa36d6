//! Smoke tests for the `ualert-migration` binary against a SQLite file.

use std::path::Path;
use std::process::{Command, Output};

use anyhow::Result;
use serde_json::Value;
use tempfile::TempDir;

const CRYPTO_KEY: &str = "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=";

fn ualert(dir: &Path, args: &[&str], extra_env: &[(&str, &str)]) -> Output {
    let database_url = format!("sqlite://{}?mode=rwc", dir.join("ualert.db").display());
    Command::new(assert_cmd::cargo::cargo_bin!("ualert-migration"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env("UALERT_DATABASE_URL", database_url)
        .env("UALERT_CRYPTO_KEY", CRYPTO_KEY)
        .env("UALERT_DATA_PATH", dir.join("data"))
        .env("UALERT_LOG_LEVEL", "warn")
        .envs(extra_env.iter().copied())
        .args(args)
        .output()
        .expect("failed to spawn ualert-migration")
}

fn stdout_json(output: &Output) -> Result<Value> {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(serde_json::from_slice(&output.stdout)?)
}

#[test]
fn summary_of_untouched_org_is_empty() -> Result<()> {
    let dir = TempDir::new()?;

    let summary = stdout_json(&ualert(dir.path(), &["summary", "--org", "1"], &[]))?;

    assert_eq!(summary["orgId"], 1);
    assert_eq!(summary["migratedDashboards"], Value::Array(Vec::new()));
    assert_eq!(summary["createdFolders"], Value::Array(Vec::new()));
    Ok(())
}

#[test]
fn run_then_disable_requires_force() -> Result<()> {
    let dir = TempDir::new()?;

    let first = stdout_json(&ualert(dir.path(), &["run"], &[]))?;
    assert_eq!(first["migrated"], true);

    let refused = ualert(
        dir.path(),
        &["run"],
        &[("UALERT_UNIFIED_ALERTING_ENABLED", "false")],
    );
    assert!(!refused.status.success());
    assert!(String::from_utf8_lossy(&refused.stderr).contains("force_migration=true"));

    let forced = stdout_json(&ualert(
        dir.path(),
        &["run"],
        &[
            ("UALERT_UNIFIED_ALERTING_ENABLED", "false"),
            ("UALERT_FORCE_MIGRATION", "true"),
        ],
    ))?;
    assert_eq!(forced["migrated"], false);
    Ok(())
}

#[test]
fn missing_crypto_key_fails_before_touching_the_database() -> Result<()> {
    let dir = TempDir::new()?;

    let output = ualert(dir.path(), &["run"], &[("UALERT_CRYPTO_KEY", "")]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("crypto key is missing"));
    assert!(!dir.path().join("ualert.db").exists());
    Ok(())
}
