//! Migration to create the resource_permission table.
//!
//! One row grants a principal (user, team or basic role) a permission level on a
//! dashboard or folder.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ResourcePermission::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ResourcePermission::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ResourcePermission::OrgId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ResourcePermission::Resource).text().not_null())
                    .col(
                        ColumnDef::new(ResourcePermission::ResourceUid)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ResourcePermission::PrincipalKind)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ResourcePermission::Principal)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ResourcePermission::Permission)
                            .text()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_resource_permission_principal")
                    .table(ResourcePermission::Table)
                    .col(ResourcePermission::OrgId)
                    .col(ResourcePermission::Resource)
                    .col(ResourcePermission::ResourceUid)
                    .col(ResourcePermission::PrincipalKind)
                    .col(ResourcePermission::Principal)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ResourcePermission::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ResourcePermission {
    Table,
    Id,
    OrgId,
    Resource,
    ResourceUid,
    PrincipalKind,
    Principal,
    Permission,
}
