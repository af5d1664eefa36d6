//! # Server Lock Repository
//!
//! A lease-based lock shared by every process pointed at the same database.
//! A lock whose lease has expired may be taken over by another process.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};

use crate::error::RepositoryError;
use crate::models::{server_lock, ServerLock};

pub struct ServerLockRepository<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> ServerLockRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Attempts to take the lock. Returns `false` if another holder owns an
    /// unexpired lease.
    pub async fn try_acquire(
        &self,
        operation_uid: &str,
        lease_seconds: i64,
    ) -> Result<bool, RepositoryError> {
        let now = Utc::now().timestamp();
        let existing = ServerLock::find()
            .filter(server_lock::Column::OperationUid.eq(operation_uid))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        let Some(row) = existing else {
            let inserted = server_lock::ActiveModel {
                operation_uid: Set(operation_uid.to_string()),
                version: Set(1),
                last_execution: Set(now),
                ..Default::default()
            }
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error);
            return match inserted {
                Ok(_) => Ok(true),
                Err(err) if err.is_unique_violation() => Ok(false),
                Err(err) => Err(err),
            };
        };

        if now - row.last_execution < lease_seconds {
            return Ok(false);
        }

        let result = ServerLock::update_many()
            .col_expr(server_lock::Column::Version, Expr::value(row.version + 1))
            .col_expr(server_lock::Column::LastExecution, Expr::value(now))
            .filter(server_lock::Column::Id.eq(row.id))
            .filter(server_lock::Column::Version.eq(row.version))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(result.rows_affected == 1)
    }

    pub async fn release(&self, operation_uid: &str) -> Result<(), RepositoryError> {
        ServerLock::delete_many()
            .filter(server_lock::Column::OperationUid.eq(operation_uid))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(())
    }
}
