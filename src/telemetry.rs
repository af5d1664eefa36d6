//! Logging setup, metric names and span helpers for migration operations.

use std::any::type_name_of_val;
use std::io;
use std::sync::Once;

use log::LevelFilter;
use metrics::{Unit, describe_counter};
use thiserror::Error;
use tracing::Span;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::AppConfig;

pub const METRIC_RULES_MIGRATED: &str = "ualert_migration_rules_migrated_total";
pub const METRIC_ALERT_ERRORS: &str = "ualert_migration_alert_errors_total";
pub const METRIC_CHANNELS_MIGRATED: &str = "ualert_migration_channels_migrated_total";
pub const METRIC_ORG_REVERTS: &str = "ualert_migration_org_reverts_total";
pub const METRIC_LOCK_SKIPPED: &str = "ualert_migration_lock_skipped_total";

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static DESCRIBE_METRICS: Once = Once::new();

/// Registers descriptions for every counter with the installed recorder.
pub fn describe_metrics() {
    DESCRIBE_METRICS.call_once(|| {
        describe_counter!(METRIC_RULES_MIGRATED, Unit::Count, "Alert rules created from legacy alerts");
        describe_counter!(METRIC_ALERT_ERRORS, Unit::Count, "Legacy alerts that failed to migrate");
        describe_counter!(METRIC_CHANNELS_MIGRATED, Unit::Count, "Notification channels turned into contact points");
        describe_counter!(METRIC_ORG_REVERTS, Unit::Count, "Orgs whose upgrade was reverted");
        describe_counter!(METRIC_LOCK_SKIPPED, Unit::Count, "Runs skipped because another process held the migration lock");
    });
}

/// Installs the global subscriber, writing to stderr; stdout carries command
/// output. `log` records from sqlx are bridged into tracing. A subscriber
/// installed by someone else is left in place.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if let Err(err) = LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()
    {
        if !type_name_of_val(log::logger()).contains("LogTracer") {
            return Err(err.into());
        }
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let fmt_layer = match config.log_format.as_str() {
        "pretty" => fmt::layer().pretty().with_writer(io::stderr).boxed(),
        _ => fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(io::stderr)
            .boxed(),
    };

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {}
        Err(err) => tracing::debug!(error = %err, "tracing subscriber already installed"),
    }
    describe_metrics();
    Ok(())
}

/// Span wrapping one migration operation. `org_id` is zero for cross-org operations.
pub fn operation_span(operation: &'static str, org_id: i64) -> Span {
    tracing::info_span!("alerting_migration", operation, org_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let config = AppConfig::default();
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_ok());
    }

    #[test]
    fn operation_span_carries_metadata() {
        let span = operation_span("migrate_org", 3);
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "alerting_migration");
            assert!(meta.fields().field("org_id").is_some());
        }
    }
}
