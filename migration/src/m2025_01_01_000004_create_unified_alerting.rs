//! Migration to create the unified alerting tables.
//!
//! Alert rules (plus their version history), alertmanager configurations,
//! per-org alerting settings, evaluated instance state and rule provenance.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AlertRule::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertRule::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AlertRule::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(AlertRule::Uid).text().not_null())
                    .col(ColumnDef::new(AlertRule::Title).text().not_null())
                    .col(ColumnDef::new(AlertRule::Condition).text().not_null())
                    .col(ColumnDef::new(AlertRule::Data).text().not_null())
                    .col(
                        ColumnDef::new(AlertRule::IntervalSeconds)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertRule::Version).big_integer().not_null())
                    .col(ColumnDef::new(AlertRule::NamespaceUid).text().not_null())
                    .col(ColumnDef::new(AlertRule::DashboardUid).text().null())
                    .col(ColumnDef::new(AlertRule::PanelId).big_integer().null())
                    .col(ColumnDef::new(AlertRule::RuleGroup).text().not_null())
                    .col(ColumnDef::new(AlertRule::RuleGroupIdx).integer().not_null())
                    .col(ColumnDef::new(AlertRule::NoDataState).text().not_null())
                    .col(ColumnDef::new(AlertRule::ExecErrState).text().not_null())
                    .col(ColumnDef::new(AlertRule::ForSeconds).big_integer().not_null())
                    .col(ColumnDef::new(AlertRule::Annotations).text().not_null())
                    .col(ColumnDef::new(AlertRule::Labels).text().not_null())
                    .col(
                        ColumnDef::new(AlertRule::IsPaused)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AlertRule::Updated)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_alert_rule_org_uid")
                    .table(AlertRule::Table)
                    .col(AlertRule::OrgId)
                    .col(AlertRule::Uid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_alert_rule_org_namespace_title")
                    .table(AlertRule::Table)
                    .col(AlertRule::OrgId)
                    .col(AlertRule::NamespaceUid)
                    .col(AlertRule::Title)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AlertRuleVersion::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertRuleVersion::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AlertRuleVersion::RuleOrgId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertRuleVersion::RuleUid).text().not_null())
                    .col(
                        ColumnDef::new(AlertRuleVersion::RuleNamespaceUid)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertRuleVersion::RuleGroup).text().not_null())
                    .col(
                        ColumnDef::new(AlertRuleVersion::ParentVersion)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertRuleVersion::Version)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertRuleVersion::Title).text().not_null())
                    .col(ColumnDef::new(AlertRuleVersion::Condition).text().not_null())
                    .col(ColumnDef::new(AlertRuleVersion::Data).text().not_null())
                    .col(
                        ColumnDef::new(AlertRuleVersion::IntervalSeconds)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertRuleVersion::Labels).text().not_null())
                    .col(
                        ColumnDef::new(AlertRuleVersion::Annotations)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertRuleVersion::Created)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AlertConfiguration::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertConfiguration::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AlertConfiguration::OrgId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertConfiguration::AlertmanagerConfiguration)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertConfiguration::ConfigurationVersion)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertConfiguration::ConfigurationHash)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AlertConfiguration::Default)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AlertConfiguration::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(NgalertConfiguration::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NgalertConfiguration::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(NgalertConfiguration::OrgId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NgalertConfiguration::AlertmanagersChoice)
                            .text()
                            .not_null()
                            .default("all"),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AlertInstance::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertInstance::RuleOrgId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertInstance::RuleUid).text().not_null())
                    .col(ColumnDef::new(AlertInstance::LabelsHash).text().not_null())
                    .col(ColumnDef::new(AlertInstance::Labels).text().not_null())
                    .col(ColumnDef::new(AlertInstance::CurrentState).text().not_null())
                    .col(
                        ColumnDef::new(AlertInstance::LastEvalTime)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .primary_key(
                        Index::create()
                            .col(AlertInstance::RuleOrgId)
                            .col(AlertInstance::RuleUid)
                            .col(AlertInstance::LabelsHash),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProvenanceType::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProvenanceType::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProvenanceType::OrgId).big_integer().not_null())
                    .col(ColumnDef::new(ProvenanceType::RecordKey).text().not_null())
                    .col(ColumnDef::new(ProvenanceType::RecordType).text().not_null())
                    .col(ColumnDef::new(ProvenanceType::Provenance).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_provenance_type_record")
                    .table(ProvenanceType::Table)
                    .col(ProvenanceType::RecordType)
                    .col(ProvenanceType::RecordKey)
                    .col(ProvenanceType::OrgId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProvenanceType::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AlertInstance::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(NgalertConfiguration::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AlertConfiguration::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AlertRuleVersion::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AlertRule::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AlertRule {
    Table,
    Id,
    OrgId,
    Uid,
    Title,
    Condition,
    Data,
    IntervalSeconds,
    Version,
    NamespaceUid,
    DashboardUid,
    PanelId,
    RuleGroup,
    RuleGroupIdx,
    NoDataState,
    ExecErrState,
    ForSeconds,
    Annotations,
    Labels,
    IsPaused,
    Updated,
}

#[derive(DeriveIden)]
enum AlertRuleVersion {
    Table,
    Id,
    RuleOrgId,
    RuleUid,
    RuleNamespaceUid,
    RuleGroup,
    ParentVersion,
    Version,
    Title,
    Condition,
    Data,
    IntervalSeconds,
    Labels,
    Annotations,
    Created,
}

#[derive(DeriveIden)]
enum AlertConfiguration {
    Table,
    Id,
    OrgId,
    AlertmanagerConfiguration,
    ConfigurationVersion,
    ConfigurationHash,
    Default,
    CreatedAt,
}

#[derive(DeriveIden)]
enum NgalertConfiguration {
    Table,
    Id,
    OrgId,
    AlertmanagersChoice,
}

#[derive(DeriveIden)]
enum AlertInstance {
    Table,
    RuleOrgId,
    RuleUid,
    LabelsHash,
    Labels,
    CurrentState,
    LastEvalTime,
}

#[derive(DeriveIden)]
enum ProvenanceType {
    Table,
    Id,
    OrgId,
    RecordKey,
    RecordType,
    Provenance,
}
