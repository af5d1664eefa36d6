//! Migration to create the legacy alerting tables.
//!
//! `alert` rows are attached to dashboard panels; `alert_notification` rows are
//! the flat notification channels they reference.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alert::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alert::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alert::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(Alert::DashboardId).big_integer().not_null())
                    .col(ColumnDef::new(Alert::PanelId).big_integer().not_null())
                    .col(ColumnDef::new(Alert::Name).text().not_null())
                    .col(ColumnDef::new(Alert::Message).text().not_null().default(""))
                    .col(ColumnDef::new(Alert::State).text().not_null().default("unknown"))
                    .col(ColumnDef::new(Alert::Settings).text().not_null().default("{}"))
                    .col(ColumnDef::new(Alert::Frequency).big_integer().not_null().default(60))
                    .col(ColumnDef::new(Alert::ForSeconds).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Alert::Silenced).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Alert::ExecutionError)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_alert_org_dashboard")
                    .table(Alert::Table)
                    .col(Alert::OrgId)
                    .col(Alert::DashboardId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AlertNotification::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertNotification::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AlertNotification::OrgId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertNotification::Uid).text().not_null())
                    .col(ColumnDef::new(AlertNotification::Name).text().not_null())
                    .col(ColumnDef::new(AlertNotification::Type).text().not_null())
                    .col(
                        ColumnDef::new(AlertNotification::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AlertNotification::SendReminder)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AlertNotification::Frequency)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AlertNotification::DisableResolveMessage)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AlertNotification::Settings)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(AlertNotification::SecureSettings)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_alert_notification_org_uid")
                    .table(AlertNotification::Table)
                    .col(AlertNotification::OrgId)
                    .col(AlertNotification::Uid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AlertNotification::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Alert::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Alert {
    Table,
    Id,
    OrgId,
    DashboardId,
    PanelId,
    Name,
    Message,
    State,
    Settings,
    Frequency,
    ForSeconds,
    Silenced,
    ExecutionError,
}

#[derive(DeriveIden)]
enum AlertNotification {
    Table,
    Id,
    OrgId,
    Uid,
    Name,
    Type,
    IsDefault,
    SendReminder,
    Frequency,
    DisableResolveMessage,
    Settings,
    SecureSettings,
}
