//! # KV Store Repository
//!
//! Namespaced string values keyed by `(org_id, namespace, key)`. Org `0`
//! holds values that are not tied to a single organization.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter, Set,
};

use crate::error::RepositoryError;
use crate::models::kv_store::{self, ActiveModel as KvActiveModel, Entity as KvStore};

pub struct KvStoreRepository<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> KvStoreRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn get(
        &self,
        org_id: i64,
        namespace: &str,
        key: &str,
    ) -> Result<Option<String>, RepositoryError> {
        let row = KvStore::find()
            .filter(kv_store::Column::OrgId.eq(org_id))
            .filter(kv_store::Column::Namespace.eq(namespace))
            .filter(kv_store::Column::Key.eq(key))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(row.map(|r| r.value))
    }

    /// Inserts or overwrites a value.
    pub async fn set(
        &self,
        org_id: i64,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let existing = KvStore::find()
            .filter(kv_store::Column::OrgId.eq(org_id))
            .filter(kv_store::Column::Namespace.eq(namespace))
            .filter(kv_store::Column::Key.eq(key))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        match existing {
            Some(row) => {
                let mut active = row.into_active_model();
                active.value = Set(value.to_string());
                active.updated = Set(now);
                active
                    .update(self.db)
                    .await
                    .map_err(RepositoryError::database_error)?;
            }
            None => {
                let active = KvActiveModel {
                    org_id: Set(org_id),
                    namespace: Set(namespace.to_string()),
                    key: Set(key.to_string()),
                    value: Set(value.to_string()),
                    created: Set(now),
                    updated: Set(now),
                    ..Default::default()
                };
                active
                    .insert(self.db)
                    .await
                    .map_err(RepositoryError::database_error)?;
            }
        }
        Ok(())
    }

    /// Deletes every key of a namespace, for one org or for all of them.
    pub async fn delete_namespace(
        &self,
        org_id: Option<i64>,
        namespace: &str,
    ) -> Result<u64, RepositoryError> {
        let mut delete = KvStore::delete_many().filter(kv_store::Column::Namespace.eq(namespace));
        if let Some(org_id) = org_id {
            delete = delete.filter(kv_store::Column::OrgId.eq(org_id));
        }
        let result = delete
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(result.rows_affected)
    }
}
