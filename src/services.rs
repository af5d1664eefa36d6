//! Collaborator seams of the migration engine.
//!
//! The engine talks to folders, permissions, data sources and encryption only
//! through these traits. Each async method takes the caller's transaction so a
//! failed operation rolls back everything it touched.

use std::fmt;
use std::num::NonZero;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use sea_orm::DatabaseTransaction;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::crypto::CryptoError;
use crate::error::RepositoryError;
use crate::models::folder;
use crate::repositories::folder::{RESOURCE_DASHBOARDS, RESOURCE_FOLDERS};
use crate::repositories::{AlertRuleRepository, DatasourceRepository, FolderRepository};

pub const ACTION_FOLDERS_DELETE: &str = "folders:delete";
pub const SCOPE_FOLDERS_ALL: &str = "folders:*";

const DATASOURCE_CACHE_SIZE: usize = 256;

/// Background identity on whose behalf the engine acts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub login: String,
    pub org_id: i64,
    pub role: String,
    /// `(action, scope)` pairs
    pub permissions: Vec<(String, String)>,
}

impl ServiceIdentity {
    pub fn migration(org_id: i64) -> Self {
        Self {
            login: "ngalert_migration".to_string(),
            org_id,
            role: "Admin".to_string(),
            permissions: Vec::new(),
        }
    }

    /// Identity allowed to delete folders and nothing else.
    pub fn revert(org_id: i64) -> Self {
        Self {
            login: "ngalert_migration_revert".to_string(),
            org_id,
            role: "Admin".to_string(),
            permissions: vec![(
                ACTION_FOLDERS_DELETE.to_string(),
                SCOPE_FOLDERS_ALL.to_string(),
            )],
        }
    }

    /// Whether `action` is granted on `scope`. A granted scope ending in `*`
    /// covers every scope sharing its prefix.
    pub fn can(&self, action: &str, scope: &str) -> bool {
        self.permissions.iter().any(|(granted_action, granted_scope)| {
            granted_action == action
                && match granted_scope.strip_suffix('*') {
                    Some(prefix) => scope.starts_with(prefix),
                    None => granted_scope == scope,
                }
        })
    }
}

/// Folder and dashboard permission level. Ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    View,
    Edit,
    Admin,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::View => "View",
            Permission::Edit => "Edit",
            Permission::Admin => "Admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "View" => Some(Permission::View),
            "Edit" => Some(Permission::Edit),
            "Admin" => Some(Permission::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One grant: a principal (`user`, `team` or `role`) and its permission.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PermissionGrant {
    pub kind: String,
    pub principal: String,
    pub permission: Permission,
}

impl PermissionGrant {
    pub fn role(role: &str, permission: Permission) -> Self {
        Self {
            kind: "role".to_string(),
            principal: role.to_string(),
            permission,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasourceRef {
    pub uid: String,
    pub plugin_type: String,
}

#[async_trait]
pub trait FolderService: Send + Sync {
    async fn get_by_uid(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        uid: &str,
    ) -> Result<Option<folder::Model>, RepositoryError>;

    async fn get_by_id(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        id: i64,
    ) -> Result<Option<folder::Model>, RepositoryError>;

    /// Root-level folder by title.
    async fn get_by_title(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        title: &str,
    ) -> Result<Option<folder::Model>, RepositoryError>;

    async fn create(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        uid: &str,
        title: &str,
    ) -> Result<folder::Model, RepositoryError>;

    /// Deletes a folder together with its alert rules.
    async fn delete(
        &self,
        txn: &DatabaseTransaction,
        identity: &ServiceIdentity,
        org_id: i64,
        uid: &str,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PermissionService: Send + Sync {
    async fn get_dashboard_permissions(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        dashboard_uid: &str,
    ) -> Result<Vec<PermissionGrant>, RepositoryError>;

    async fn get_folder_permissions(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        folder_uid: &str,
    ) -> Result<Vec<PermissionGrant>, RepositoryError>;

    async fn set_folder_permissions(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        folder_uid: &str,
        grants: &[PermissionGrant],
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DatasourceCache: Send + Sync {
    async fn get_datasource(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        datasource_id: i64,
    ) -> Result<Option<DatasourceRef>, RepositoryError>;
}

/// Encrypts secure settings. Payloads carry no org or key-scope binding.
pub trait Encryption: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

#[derive(Debug, Default, Clone)]
pub struct SqlFolderService;

#[async_trait]
impl FolderService for SqlFolderService {
    async fn get_by_uid(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        uid: &str,
    ) -> Result<Option<folder::Model>, RepositoryError> {
        FolderRepository::new(txn).get_by_uid(org_id, uid).await
    }

    async fn get_by_id(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        id: i64,
    ) -> Result<Option<folder::Model>, RepositoryError> {
        FolderRepository::new(txn).get_by_id(org_id, id).await
    }

    async fn get_by_title(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        title: &str,
    ) -> Result<Option<folder::Model>, RepositoryError> {
        FolderRepository::new(txn).get_by_title(org_id, title).await
    }

    async fn create(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        uid: &str,
        title: &str,
    ) -> Result<folder::Model, RepositoryError> {
        FolderRepository::new(txn).create(org_id, uid, title).await
    }

    async fn delete(
        &self,
        txn: &DatabaseTransaction,
        identity: &ServiceIdentity,
        org_id: i64,
        uid: &str,
    ) -> Result<(), RepositoryError> {
        let scope = format!("folders:uid:{uid}");
        if !identity.can(ACTION_FOLDERS_DELETE, &scope) {
            return Err(RepositoryError::PermissionDenied(format!(
                "{} cannot delete folder {uid}",
                identity.login
            )));
        }

        AlertRuleRepository::new(txn)
            .delete_by_namespace(org_id, uid)
            .await?;
        let deleted = FolderRepository::new(txn).delete(org_id, uid).await?;
        if deleted == 0 {
            return Err(RepositoryError::NotFound(format!("folder {uid}")));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct SqlPermissionService;

impl SqlPermissionService {
    async fn grants(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        resource: &str,
        resource_uid: &str,
    ) -> Result<Vec<PermissionGrant>, RepositoryError> {
        let rows = FolderRepository::new(txn)
            .permissions(org_id, resource, resource_uid)
            .await?;
        let grants = rows
            .into_iter()
            .filter_map(|row| {
                let permission = Permission::parse(&row.permission);
                if permission.is_none() {
                    tracing::warn!(
                        org_id,
                        resource,
                        resource_uid,
                        permission = %row.permission,
                        "ignoring unknown permission level"
                    );
                }
                permission.map(|permission| PermissionGrant {
                    kind: row.principal_kind,
                    principal: row.principal,
                    permission,
                })
            })
            .collect();
        Ok(grants)
    }
}

#[async_trait]
impl PermissionService for SqlPermissionService {
    async fn get_dashboard_permissions(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        dashboard_uid: &str,
    ) -> Result<Vec<PermissionGrant>, RepositoryError> {
        self.grants(txn, org_id, RESOURCE_DASHBOARDS, dashboard_uid)
            .await
    }

    async fn get_folder_permissions(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        folder_uid: &str,
    ) -> Result<Vec<PermissionGrant>, RepositoryError> {
        self.grants(txn, org_id, RESOURCE_FOLDERS, folder_uid).await
    }

    async fn set_folder_permissions(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        folder_uid: &str,
        grants: &[PermissionGrant],
    ) -> Result<(), RepositoryError> {
        let rows: Vec<(String, String, String)> = grants
            .iter()
            .map(|g| {
                (
                    g.kind.clone(),
                    g.principal.clone(),
                    g.permission.as_str().to_string(),
                )
            })
            .collect();
        FolderRepository::new(txn)
            .set_permissions(org_id, RESOURCE_FOLDERS, folder_uid, &rows)
            .await
    }
}

/// Data source lookups memoized per `(org_id, datasource_id)`.
pub struct SqlDatasourceCache {
    cache: Arc<RwLock<LruCache<(i64, i64), DatasourceRef>>>,
}

impl SqlDatasourceCache {
    pub fn new() -> Self {
        let capacity = NonZero::new(DATASOURCE_CACHE_SIZE).unwrap_or(NonZero::<usize>::MIN);
        Self {
            cache: Arc::new(RwLock::new(LruCache::new(capacity))),
        }
    }
}

impl Default for SqlDatasourceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatasourceCache for SqlDatasourceCache {
    async fn get_datasource(
        &self,
        txn: &DatabaseTransaction,
        org_id: i64,
        datasource_id: i64,
    ) -> Result<Option<DatasourceRef>, RepositoryError> {
        {
            let mut cache = self.cache.write().await;
            if let Some(found) = cache.get(&(org_id, datasource_id)) {
                return Ok(Some(found.clone()));
            }
        }

        let Some(row) = DatasourceRepository::new(txn)
            .get(org_id, datasource_id)
            .await?
        else {
            return Ok(None);
        };
        let found = DatasourceRef {
            uid: row.uid,
            plugin_type: row.plugin_type,
        };
        self.cache
            .write()
            .await
            .put((org_id, datasource_id), found.clone());
        Ok(Some(found))
    }
}
