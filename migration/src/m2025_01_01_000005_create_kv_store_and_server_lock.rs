//! Migration to create the kv_store and server_lock tables.
//!
//! The key-value store carries the migration ledger per org; server_lock rows
//! coordinate exclusive background actions across processes.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(KvStore::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(KvStore::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(KvStore::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(KvStore::Namespace).text().not_null())
                    .col(ColumnDef::new(KvStore::Key).text().not_null())
                    .col(ColumnDef::new(KvStore::Value).text().not_null())
                    .col(
                        ColumnDef::new(KvStore::Created)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(KvStore::Updated)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_kv_store_org_namespace_key")
                    .table(KvStore::Table)
                    .col(KvStore::OrgId)
                    .col(KvStore::Namespace)
                    .col(KvStore::Key)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ServerLock::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ServerLock::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ServerLock::OperationUid).text().not_null())
                    .col(ColumnDef::new(ServerLock::Version).big_integer().not_null())
                    .col(
                        ColumnDef::new(ServerLock::LastExecution)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_server_lock_operation_uid")
                    .table(ServerLock::Table)
                    .col(ServerLock::OperationUid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ServerLock::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(KvStore::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum KvStore {
    Table,
    Id,
    OrgId,
    Namespace,
    Key,
    Value,
    Created,
    Updated,
}

#[derive(DeriveIden)]
enum ServerLock {
    Table,
    Id,
    OperationUid,
    Version,
    LastExecution,
}
