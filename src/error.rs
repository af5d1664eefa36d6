//! Error types for the migration engine.
//!
//! Three layers: [`RepositoryError`] for storage access, [`ItemError`] for a
//! single alert, channel or dashboard (its text is what the ledger records),
//! and [`MigrationError`] for whole operations, which roll back their
//! transaction.

use sea_orm::DbErr;
use thiserror::Error;

use crate::crypto::CryptoError;

/// Message returned when a revert to legacy alerting is attempted without the force flag.
pub const FORCE_MIGRATION_MESSAGE: &str = "Grafana has already been migrated to Unified Alerting. Any alert rules created while using Unified Alerting will be deleted by rolling back. Set force_migration=true in your grafana.ini and restart Grafana to roll back and delete Unified Alerting configuration data.";

/// Errors raised by repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(DbErr),
    #[error("unique constraint violated: {0}")]
    UniqueViolation(DbErr),
    #[error("failed to serialize {what}: {source}")]
    Serialization {
        what: &'static str,
        source: serde_json::Error,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl RepositoryError {
    /// Wraps a database error, classifying unique violations.
    pub fn database_error(err: DbErr) -> Self {
        if is_unique_violation(&err) {
            Self::UniqueViolation(err)
        } else {
            Self::Database(err)
        }
    }

    pub fn serialization(what: &'static str, source: serde_json::Error) -> Self {
        Self::Serialization { what, source }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }
}

impl From<DbErr> for RepositoryError {
    fn from(err: DbErr) -> Self {
        Self::database_error(err)
    }
}

/// Failure scoped to one alert, channel or dashboard.
///
/// These never abort an operation; their `Display` output is stored verbatim
/// in the ledger.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("failed to parse settings: {0}")]
    InvalidSettings(serde_json::Error),
    #[error("failed to transform conditions: {0}")]
    Conditions(String),
    #[error("failed to migrate alert rule queries: {0}")]
    Queries(serde_json::Error),
    #[error("failed to get dashboard: {0}")]
    DashboardNotFound(String),
    #[error("failed to get or create folder for new alert rule: {0}")]
    Folder(String),
    #[error("failed to insert alert rules: {0}")]
    InsertRules(String),
    #[error("{0} is a discontinued")]
    DiscontinuedChannel(String),
    #[error("failed to parse channel settings: {0}")]
    InvalidChannelSettings(serde_json::Error),
    #[error("failed to decrypt secure settings: {0}")]
    Decrypt(CryptoError),
    #[error("failed to encrypt secure settings: {0}")]
    Encrypt(CryptoError),
    #[error("create route: {0}")]
    Route(String),
    #[error("{0}")]
    Repository(#[from] RepositoryError),
}

/// Operation-level failure; the surrounding transaction is rolled back.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("{}", FORCE_MIGRATION_MESSAGE)]
    ForceMigrationRequired,
    #[error("organization has already been migrated")]
    AlreadyMigrated,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("{0} not found")]
    NotFound(String),
    #[error(
        "provisioned status has changed for dashboard {0}, must re-upgrade entire dashboard"
    )]
    ProvisionedStatusChanged(String),
    #[error("folder with uid {0} not found")]
    FolderNotFound(String),
    #[error("failed to validate AlertmanagerConfig: {0}")]
    InvalidAlertmanagerConfig(String),
    #[error("{context}: {source}")]
    Item {
        context: String,
        source: ItemError,
    },
}

impl MigrationError {
    pub fn item(context: impl Into<String>, source: ItemError) -> Self {
        Self::Item {
            context: context.into(),
            source,
        }
    }
}

/// Returns true when the database rejected a write because of a unique index.
pub fn is_unique_violation(error: &DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const MYSQL_DUPLICATE_CODES: &[&str] = &["1022", "1062", "1169", "1586"];
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error.code().is_some_and(|code| {
        let code = code.as_ref();
        code == PG_UNIQUE
            || MYSQL_DUPLICATE_CODES.contains(&code)
            || SQLITE_DUPLICATE_CODES.contains(&code)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_migration_error_has_fixed_text() {
        let err = MigrationError::ForceMigrationRequired;
        assert!(err.to_string().starts_with(
            "Grafana has already been migrated to Unified Alerting."
        ));
        assert!(err.to_string().contains("force_migration=true"));
    }

    #[test]
    fn discontinued_channel_message() {
        let err = ItemError::DiscontinuedChannel("hipchat".into());
        assert_eq!(err.to_string(), "hipchat is a discontinued");
    }

    #[test]
    fn non_sqlx_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&DbErr::RecordNotFound("x".into())));
        assert!(!RepositoryError::database_error(DbErr::Custom("boom".into())).is_unique_violation());
    }
}
