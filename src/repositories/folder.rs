//! # Folder Repository
//!
//! Folder rows and the resource permissions attached to folders and dashboards.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::error::RepositoryError;
use crate::models::{folder, resource_permission, Folder, ResourcePermission};

pub const RESOURCE_DASHBOARDS: &str = "dashboards";
pub const RESOURCE_FOLDERS: &str = "folders";

pub struct FolderRepository<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> FolderRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn get_by_uid(
        &self,
        org_id: i64,
        uid: &str,
    ) -> Result<Option<folder::Model>, RepositoryError> {
        Folder::find()
            .filter(folder::Column::OrgId.eq(org_id))
            .filter(folder::Column::Uid.eq(uid))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn get_by_id(
        &self,
        org_id: i64,
        id: i64,
    ) -> Result<Option<folder::Model>, RepositoryError> {
        Folder::find()
            .filter(folder::Column::OrgId.eq(org_id))
            .filter(folder::Column::Id.eq(id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Root-level folder with the given title.
    pub async fn get_by_title(
        &self,
        org_id: i64,
        title: &str,
    ) -> Result<Option<folder::Model>, RepositoryError> {
        Folder::find()
            .filter(folder::Column::OrgId.eq(org_id))
            .filter(folder::Column::Title.eq(title))
            .filter(folder::Column::ParentUid.is_null())
            .order_by_asc(folder::Column::Id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn create(
        &self,
        org_id: i64,
        uid: &str,
        title: &str,
    ) -> Result<folder::Model, RepositoryError> {
        folder::ActiveModel {
            org_id: Set(org_id),
            uid: Set(uid.to_string()),
            title: Set(title.to_string()),
            parent_uid: Set(None),
            ..Default::default()
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    /// Deletes a folder and the permissions granted on it.
    pub async fn delete(&self, org_id: i64, uid: &str) -> Result<u64, RepositoryError> {
        ResourcePermission::delete_many()
            .filter(resource_permission::Column::OrgId.eq(org_id))
            .filter(resource_permission::Column::Resource.eq(RESOURCE_FOLDERS))
            .filter(resource_permission::Column::ResourceUid.eq(uid))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        let result = Folder::delete_many()
            .filter(folder::Column::OrgId.eq(org_id))
            .filter(folder::Column::Uid.eq(uid))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(result.rows_affected)
    }

    pub async fn permissions(
        &self,
        org_id: i64,
        resource: &str,
        resource_uid: &str,
    ) -> Result<Vec<resource_permission::Model>, RepositoryError> {
        ResourcePermission::find()
            .filter(resource_permission::Column::OrgId.eq(org_id))
            .filter(resource_permission::Column::Resource.eq(resource))
            .filter(resource_permission::Column::ResourceUid.eq(resource_uid))
            .order_by_asc(resource_permission::Column::Id)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Replaces every grant on a resource with `grants`.
    pub async fn set_permissions(
        &self,
        org_id: i64,
        resource: &str,
        resource_uid: &str,
        grants: &[(String, String, String)],
    ) -> Result<(), RepositoryError> {
        ResourcePermission::delete_many()
            .filter(resource_permission::Column::OrgId.eq(org_id))
            .filter(resource_permission::Column::Resource.eq(resource))
            .filter(resource_permission::Column::ResourceUid.eq(resource_uid))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        for (kind, principal, permission) in grants {
            resource_permission::ActiveModel {
                org_id: Set(org_id),
                resource: Set(resource.to_string()),
                resource_uid: Set(resource_uid.to_string()),
                principal_kind: Set(kind.clone()),
                principal: Set(principal.clone()),
                permission: Set(permission.clone()),
                ..Default::default()
            }
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        }
        Ok(())
    }
}
