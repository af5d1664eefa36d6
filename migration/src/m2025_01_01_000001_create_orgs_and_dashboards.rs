//! Migration to create the org, folder, dashboard, provisioning and data source tables.
//!
//! These tables hold the content the alerting migration reads from: dashboards
//! live in folders (or at the root when `folder_id` is 0), and queries reference
//! data sources by numeric id.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Org::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Org::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Org::Name).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Folder::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Folder::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Folder::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(Folder::Uid).text().not_null())
                    .col(ColumnDef::new(Folder::Title).text().not_null())
                    .col(ColumnDef::new(Folder::ParentUid).text().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_folder_org_uid")
                    .table(Folder::Table)
                    .col(Folder::OrgId)
                    .col(Folder::Uid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Dashboard::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Dashboard::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Dashboard::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(Dashboard::Uid).text().not_null())
                    .col(ColumnDef::new(Dashboard::Title).text().not_null())
                    .col(
                        ColumnDef::new(Dashboard::FolderId)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_dashboard_org_uid")
                    .table(Dashboard::Table)
                    .col(Dashboard::OrgId)
                    .col(Dashboard::Uid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DashboardProvisioning::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DashboardProvisioning::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DashboardProvisioning::OrgId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DashboardProvisioning::DashboardUid)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DashboardProvisioning::Name).text().not_null())
                    .col(
                        ColumnDef::new(DashboardProvisioning::ExternalId)
                            .text()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DataSource::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DataSource::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DataSource::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(DataSource::Uid).text().not_null())
                    .col(ColumnDef::new(DataSource::Name).text().not_null())
                    .col(ColumnDef::new(DataSource::Type).text().not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DataSource::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DashboardProvisioning::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Dashboard::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Folder::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Org::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Org {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum Folder {
    Table,
    Id,
    OrgId,
    Uid,
    Title,
    ParentUid,
}

#[derive(DeriveIden)]
enum Dashboard {
    Table,
    Id,
    OrgId,
    Uid,
    Title,
    FolderId,
}

#[derive(DeriveIden)]
enum DashboardProvisioning {
    Table,
    Id,
    OrgId,
    DashboardUid,
    Name,
    ExternalId,
}

#[derive(DeriveIden)]
enum DataSource {
    Table,
    Id,
    OrgId,
    Uid,
    Name,
    Type,
}
