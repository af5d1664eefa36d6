//! Folder resolution for migrated dashboards.
//!
//! Rules move from dashboards into folders, so a dashboard whose permissions
//! differ from its folder cannot share that folder without widening access.
//! Such dashboards get a dedicated folder carrying the merged permissions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use sea_orm::DatabaseTransaction;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{ItemError, RepositoryError};
use crate::models::{dashboard, folder};
use crate::services::{FolderService, Permission, PermissionGrant, PermissionService};

use super::{GENERAL_ALERTING_FOLDER, MAX_FOLDER_NAME_LENGTH, short_uid, truncate_chars};

/// Permissions a root-level dashboard inherits when it has none of its own.
fn default_root_permissions() -> Vec<PermissionGrant> {
    vec![
        PermissionGrant::role("Viewer", Permission::View),
        PermissionGrant::role("Editor", Permission::Edit),
    ]
}

/// Stable hash of a permission set, independent of grant order.
pub fn permission_hash(grants: &[PermissionGrant]) -> String {
    let mut entries: Vec<String> = grants
        .iter()
        .map(|g| format!("{}:{}:{}", g.kind, g.principal, g.permission))
        .collect();
    entries.sort();
    entries.dedup();

    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Union of both sets, keeping the strongest permission per principal.
pub fn merge_permissions(
    parent: &[PermissionGrant],
    dashboard: &[PermissionGrant],
) -> Vec<PermissionGrant> {
    let mut merged: BTreeMap<(String, String), Permission> = BTreeMap::new();
    for grant in parent.iter().chain(dashboard) {
        merged
            .entry((grant.kind.clone(), grant.principal.clone()))
            .and_modify(|p| *p = (*p).max(grant.permission))
            .or_insert(grant.permission);
    }
    merged
        .into_iter()
        .map(|((kind, principal), permission)| PermissionGrant {
            kind,
            principal,
            permission,
        })
        .collect()
}

/// Outcome of resolving one dashboard.
#[derive(Debug, Clone)]
pub struct ResolvedFolder {
    /// The dashboard's own folder; `None` at the root or when it is missing.
    pub legacy: Option<folder::Model>,
    /// Where the dashboard's rules go.
    pub target: folder::Model,
    /// The dashboard referenced a folder that no longer exists.
    pub legacy_missing: bool,
    /// The target carries permissions the parent folder does not grant.
    pub permissions_changed: bool,
}

/// Per-run folder lookups and creations for one org.
pub struct FolderHelper {
    org_id: i64,
    folders: Arc<dyn FolderService>,
    permissions: Arc<dyn PermissionService>,
    folder_cache: HashMap<i64, Option<folder::Model>>,
    folder_permission_cache: HashMap<String, Vec<PermissionGrant>>,
    permissions_map: HashMap<(i64, String), folder::Model>,
    general_alerting: Option<folder::Model>,
    /// Uids of folders created during this run, in creation order.
    pub created_folders: Vec<String>,
}

impl FolderHelper {
    pub fn new(
        org_id: i64,
        folders: Arc<dyn FolderService>,
        permissions: Arc<dyn PermissionService>,
    ) -> Self {
        Self {
            org_id,
            folders,
            permissions,
            folder_cache: HashMap::new(),
            folder_permission_cache: HashMap::new(),
            permissions_map: HashMap::new(),
            general_alerting: None,
            created_folders: Vec::new(),
        }
    }

    async fn legacy_folder(
        &mut self,
        txn: &DatabaseTransaction,
        folder_id: i64,
    ) -> Result<Option<folder::Model>, RepositoryError> {
        if let Some(cached) = self.folder_cache.get(&folder_id) {
            return Ok(cached.clone());
        }
        let found = self.folders.get_by_id(txn, self.org_id, folder_id).await?;
        self.folder_cache.insert(folder_id, found.clone());
        Ok(found)
    }

    async fn folder_permissions(
        &mut self,
        txn: &DatabaseTransaction,
        folder_uid: &str,
    ) -> Result<Vec<PermissionGrant>, RepositoryError> {
        if let Some(cached) = self.folder_permission_cache.get(folder_uid) {
            return Ok(cached.clone());
        }
        let grants = self
            .permissions
            .get_folder_permissions(txn, self.org_id, folder_uid)
            .await?;
        self.folder_permission_cache
            .insert(folder_uid.to_string(), grants.clone());
        Ok(grants)
    }

    /// The root `General Alerting` folder, created on first use.
    pub async fn general_alerting_folder(
        &mut self,
        txn: &DatabaseTransaction,
    ) -> Result<folder::Model, RepositoryError> {
        if let Some(folder) = &self.general_alerting {
            return Ok(folder.clone());
        }
        let folder = match self
            .folders
            .get_by_title(txn, self.org_id, GENERAL_ALERTING_FOLDER)
            .await?
        {
            Some(folder) => folder,
            None => {
                let folder = self.create_folder(txn, GENERAL_ALERTING_FOLDER).await?;
                self.permissions
                    .set_folder_permissions(txn, self.org_id, &folder.uid, &default_root_permissions())
                    .await?;
                folder
            }
        };
        self.general_alerting = Some(folder.clone());
        Ok(folder)
    }

    async fn create_folder(
        &mut self,
        txn: &DatabaseTransaction,
        title: &str,
    ) -> Result<folder::Model, RepositoryError> {
        let folder = self
            .folders
            .create(txn, self.org_id, &short_uid(), title)
            .await?;
        info!(org_id = self.org_id, folder_uid = %folder.uid, title = %folder.title, "created folder");
        self.created_folders.push(folder.uid.clone());
        Ok(folder)
    }

    /// Picks the folder for `dash`'s rules, creating one when its permissions
    /// cannot be kept in a shared folder.
    pub async fn get_or_create_migrated_folder(
        &mut self,
        txn: &DatabaseTransaction,
        dash: &dashboard::Model,
    ) -> Result<ResolvedFolder, ItemError> {
        self.resolve(txn, dash)
            .await
            .map_err(|err| ItemError::Folder(err.to_string()))
    }

    async fn resolve(
        &mut self,
        txn: &DatabaseTransaction,
        dash: &dashboard::Model,
    ) -> Result<ResolvedFolder, RepositoryError> {
        let legacy = if dash.folder_id > 0 {
            self.legacy_folder(txn, dash.folder_id).await?
        } else {
            None
        };
        let legacy_missing = dash.folder_id > 0 && legacy.is_none();

        let parent_grants = match &legacy {
            Some(folder) => self.folder_permissions(txn, &folder.uid).await?,
            None => default_root_permissions(),
        };
        let dashboard_grants = self
            .permissions
            .get_dashboard_permissions(txn, self.org_id, &dash.uid)
            .await?;

        let merged = merge_permissions(&parent_grants, &dashboard_grants);
        let hash = permission_hash(&merged);

        if hash == permission_hash(&parent_grants) {
            let target = match &legacy {
                Some(folder) => folder.clone(),
                None => self.general_alerting_folder(txn).await?,
            };
            return Ok(ResolvedFolder {
                legacy,
                target,
                legacy_missing,
                permissions_changed: false,
            });
        }

        let cache_key = (dash.folder_id, hash);
        if let Some(existing) = self.permissions_map.get(&cache_key) {
            debug!(dashboard_uid = %dash.uid, folder_uid = %existing.uid, "reusing folder with matching permissions");
            return Ok(ResolvedFolder {
                legacy,
                target: existing.clone(),
                legacy_missing,
                permissions_changed: true,
            });
        }

        let title = truncate_chars(
            &format!("{} Alerts - {}", dash.title, short_uid()),
            MAX_FOLDER_NAME_LENGTH,
        );
        let target = self.create_folder(txn, &title).await?;
        self.permissions
            .set_folder_permissions(txn, self.org_id, &target.uid, &merged)
            .await?;
        self.folder_permission_cache.insert(target.uid.clone(), merged);
        self.permissions_map.insert(cache_key, target.clone());

        Ok(ResolvedFolder {
            legacy,
            target,
            legacy_missing,
            permissions_changed: true,
        })
    }
}
