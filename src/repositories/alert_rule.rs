//! # Alert Rule Repository
//!
//! Persists unified alert rules together with their first version row and,
//! for provisioned dashboards, their provenance.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::error::RepositoryError;
use crate::models::{
    alert_rule, alert_rule_version, provenance_type, AlertRule as AlertRuleEntity,
    AlertRuleVersion, ProvenanceType,
};
use crate::unified::AlertRule;

/// Provenance given to rules of provisioned dashboards.
pub const PROVENANCE_UPGRADE: &str = "upgrade";
const RECORD_TYPE_ALERT_RULE: &str = "alertRule";

pub struct AlertRuleRepository<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> AlertRuleRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Inserts one rule and its version history entry.
    pub async fn insert(&self, rule: &AlertRule) -> Result<alert_rule::Model, RepositoryError> {
        let data = serde_json::to_string(&rule.data)
            .map_err(|e| RepositoryError::serialization("alert rule data", e))?;
        let labels = serde_json::to_string(&rule.labels)
            .map_err(|e| RepositoryError::serialization("alert rule labels", e))?;
        let annotations = serde_json::to_string(&rule.annotations)
            .map_err(|e| RepositoryError::serialization("alert rule annotations", e))?;

        let active = alert_rule::ActiveModel {
            org_id: Set(rule.org_id),
            uid: Set(rule.uid.clone()),
            title: Set(rule.title.clone()),
            condition: Set(rule.condition.clone()),
            data: Set(data.clone()),
            interval_seconds: Set(rule.interval_seconds),
            version: Set(rule.version),
            namespace_uid: Set(rule.namespace_uid.clone()),
            dashboard_uid: Set(rule.dashboard_uid.clone()),
            panel_id: Set(rule.panel_id),
            rule_group: Set(rule.rule_group.clone()),
            rule_group_idx: Set(rule.rule_group_index),
            no_data_state: Set(rule.no_data_state.to_string()),
            exec_err_state: Set(rule.exec_err_state.to_string()),
            for_seconds: Set(rule.for_duration.as_secs()),
            annotations: Set(annotations.clone()),
            labels: Set(labels.clone()),
            is_paused: Set(rule.is_paused),
            updated: Set(rule.updated),
            ..Default::default()
        };
        let inserted = active
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        let version = alert_rule_version::ActiveModel {
            rule_org_id: Set(rule.org_id),
            rule_uid: Set(rule.uid.clone()),
            rule_namespace_uid: Set(rule.namespace_uid.clone()),
            rule_group: Set(rule.rule_group.clone()),
            parent_version: Set(0),
            version: Set(rule.version),
            title: Set(rule.title.clone()),
            condition: Set(rule.condition.clone()),
            data: Set(data),
            interval_seconds: Set(rule.interval_seconds),
            labels: Set(labels),
            annotations: Set(annotations),
            created: Set(rule.updated),
            ..Default::default()
        };
        version
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(inserted)
    }

    pub async fn upsert_upgrade_provenance(
        &self,
        org_id: i64,
        rule_uid: &str,
    ) -> Result<(), RepositoryError> {
        let existing = ProvenanceType::find()
            .filter(provenance_type::Column::OrgId.eq(org_id))
            .filter(provenance_type::Column::RecordType.eq(RECORD_TYPE_ALERT_RULE))
            .filter(provenance_type::Column::RecordKey.eq(rule_uid))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        match existing {
            Some(row) => {
                let mut active: provenance_type::ActiveModel = row.into();
                active.provenance = Set(PROVENANCE_UPGRADE.to_string());
                active
                    .update(self.db)
                    .await
                    .map_err(RepositoryError::database_error)?;
            }
            None => {
                provenance_type::ActiveModel {
                    org_id: Set(org_id),
                    record_key: Set(rule_uid.to_string()),
                    record_type: Set(RECORD_TYPE_ALERT_RULE.to_string()),
                    provenance: Set(PROVENANCE_UPGRADE.to_string()),
                    ..Default::default()
                }
                .insert(self.db)
                .await
                .map_err(RepositoryError::database_error)?;
            }
        }
        Ok(())
    }

    pub async fn uid_exists(&self, org_id: i64, uid: &str) -> Result<bool, RepositoryError> {
        let count = AlertRuleEntity::find()
            .filter(alert_rule::Column::OrgId.eq(org_id))
            .filter(alert_rule::Column::Uid.eq(uid))
            .count(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(count > 0)
    }

    pub async fn list_for_org(&self, org_id: i64) -> Result<Vec<alert_rule::Model>, RepositoryError> {
        AlertRuleEntity::find()
            .filter(alert_rule::Column::OrgId.eq(org_id))
            .order_by_asc(alert_rule::Column::Id)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Deletes the given rules with their versions and provenance.
    pub async fn delete_by_uids(&self, org_id: i64, uids: &[String]) -> Result<u64, RepositoryError> {
        if uids.is_empty() {
            return Ok(0);
        }
        let result = AlertRuleEntity::delete_many()
            .filter(alert_rule::Column::OrgId.eq(org_id))
            .filter(alert_rule::Column::Uid.is_in(uids.iter().cloned()))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        AlertRuleVersion::delete_many()
            .filter(alert_rule_version::Column::RuleOrgId.eq(org_id))
            .filter(alert_rule_version::Column::RuleUid.is_in(uids.iter().cloned()))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        ProvenanceType::delete_many()
            .filter(provenance_type::Column::OrgId.eq(org_id))
            .filter(provenance_type::Column::RecordType.eq(RECORD_TYPE_ALERT_RULE))
            .filter(provenance_type::Column::RecordKey.is_in(uids.iter().cloned()))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(result.rows_affected)
    }

    pub async fn delete_by_namespace(
        &self,
        org_id: i64,
        namespace_uid: &str,
    ) -> Result<u64, RepositoryError> {
        let uids: Vec<String> = AlertRuleEntity::find()
            .filter(alert_rule::Column::OrgId.eq(org_id))
            .filter(alert_rule::Column::NamespaceUid.eq(namespace_uid))
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?
            .into_iter()
            .map(|r| r.uid)
            .collect();
        self.delete_by_uids(org_id, &uids).await
    }

    /// Deletes every rule, version and rule provenance of one org, or of all orgs.
    pub async fn delete_all(&self, org_id: Option<i64>) -> Result<u64, RepositoryError> {
        let mut rules = AlertRuleEntity::delete_many();
        let mut versions = AlertRuleVersion::delete_many();
        let mut provenance = ProvenanceType::delete_many()
            .filter(provenance_type::Column::RecordType.eq(RECORD_TYPE_ALERT_RULE));
        if let Some(org_id) = org_id {
            rules = rules.filter(alert_rule::Column::OrgId.eq(org_id));
            versions = versions.filter(alert_rule_version::Column::RuleOrgId.eq(org_id));
            provenance = provenance.filter(provenance_type::Column::OrgId.eq(org_id));
        }

        let result = rules
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        versions
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        provenance
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(result.rows_affected)
    }
}
