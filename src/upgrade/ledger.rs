//! The per-org ledger recording what the upgrade created.
//!
//! It is stored as JSON in the key-value store and is the only source used to
//! clean up before a re-migration and to decide which folders a revert may
//! delete.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::legacy::null_as_default;
use crate::models::{alert, alert_notification};
use crate::unified::{
    AlertRule, Duration, ExecutionErrorState, NoDataState, PostableApiReceiver, Route,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgMigrationState {
    pub org_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub migrated_dashboards: Vec<DashboardUpgrade>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub migrated_channels: Vec<ContactPair>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_folders: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<String>,
}

impl OrgMigrationState {
    pub fn new(org_id: i64) -> Self {
        Self {
            org_id,
            ..Self::default()
        }
    }

    pub fn get_dashboard_upgrade(&self, dashboard_id: i64) -> Option<&DashboardUpgrade> {
        self.migrated_dashboards
            .iter()
            .find(|du| du.dashboard_id == dashboard_id)
    }

    pub fn pop_dashboard_upgrade(&mut self, dashboard_id: i64) -> Option<DashboardUpgrade> {
        let idx = self
            .migrated_dashboards
            .iter()
            .position(|du| du.dashboard_id == dashboard_id)?;
        Some(self.migrated_dashboards.remove(idx))
    }

    pub fn pop_contact_pair(&mut self, channel_id: i64) -> Option<ContactPair> {
        let idx = self
            .migrated_channels
            .iter()
            .position(|pair| pair.legacy_channel.id == channel_id)?;
        Some(self.migrated_channels.remove(idx))
    }

    /// Removes `uid` from the created folders; returns whether it was listed.
    pub fn forget_created_folder(&mut self, uid: &str) -> bool {
        let before = self.created_folders.len();
        self.created_folders.retain(|f| f != uid);
        before != self.created_folders.len()
    }

    /// Whether any remaining dashboard upgrade still targets `folder_uid`.
    pub fn folder_in_use(&self, folder_uid: &str) -> bool {
        self.migrated_dashboards
            .iter()
            .any(|du| du.new_folder_uid == folder_uid)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardUpgrade {
    #[serde(default, deserialize_with = "null_as_default")]
    pub migrated_alerts: Vec<AlertPair>,
    pub dashboard_id: i64,
    #[serde(default)]
    pub dashboard_uid: String,
    #[serde(default)]
    pub dashboard_name: String,
    #[serde(default)]
    pub folder_uid: String,
    #[serde(default)]
    pub folder_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub new_folder_uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub new_folder_name: String,
    #[serde(default)]
    pub provisioned: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
}

impl DashboardUpgrade {
    pub fn new(dashboard_id: i64) -> Self {
        Self {
            dashboard_id,
            ..Self::default()
        }
    }

    pub fn set_dashboard(&mut self, uid: &str, name: &str) {
        self.dashboard_uid = uid.to_string();
        self.dashboard_name = name.to_string();
    }

    pub fn set_folder(&mut self, uid: &str, name: &str) {
        self.folder_uid = uid.to_string();
        self.folder_name = name.to_string();
    }

    pub fn set_new_folder(&mut self, uid: &str, name: &str) {
        self.new_folder_uid = uid.to_string();
        self.new_folder_name = name.to_string();
    }

    pub fn add_alert(&mut self, alert: &alert::Model) -> &mut AlertPair {
        self.migrated_alerts.push(AlertPair {
            legacy_alert: LegacyAlert::from(alert),
            alert_rule: None,
            error: String::new(),
        });
        let last = self.migrated_alerts.len() - 1;
        &mut self.migrated_alerts[last]
    }

    /// Records `error` against every alert in `alerts`.
    pub fn add_alert_errors(&mut self, error: &str, alerts: &[alert::Model]) {
        for alert in alerts {
            self.add_alert(alert).error = error.to_string();
        }
    }

    pub fn pop_alert_pair_by_panel_id(&mut self, panel_id: i64) -> Option<AlertPair> {
        let idx = self
            .migrated_alerts
            .iter()
            .position(|pair| pair.legacy_alert.panel_id == panel_id)?;
        Some(self.migrated_alerts.remove(idx))
    }

    /// Uids of the rules this dashboard upgrade created.
    pub fn rule_uids(&self) -> Vec<String> {
        self.migrated_alerts
            .iter()
            .filter_map(|pair| pair.alert_rule.as_ref())
            .filter(|rule| !rule.uid.is_empty())
            .map(|rule| rule.uid.clone())
            .collect()
    }

    /// Whether the upgrade targets a folder other than the dashboard's own.
    pub fn has_new_folder(&self) -> bool {
        !self.new_folder_uid.is_empty() && self.new_folder_uid != self.folder_uid
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPair {
    pub legacy_alert: LegacyAlert,
    #[serde(default)]
    pub alert_rule: Option<AlertRuleUpgrade>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyAlert {
    pub id: i64,
    pub dashboard_id: i64,
    pub panel_id: i64,
    pub name: String,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub silenced: bool,
    #[serde(default)]
    pub execution_error: String,
    #[serde(default)]
    pub frequency: i64,
    #[serde(rename = "for", default)]
    pub for_duration: Duration,
    #[serde(default)]
    pub modified: bool,
}

impl From<&alert::Model> for LegacyAlert {
    fn from(alert: &alert::Model) -> Self {
        Self {
            id: alert.id,
            dashboard_id: alert.dashboard_id,
            panel_id: alert.panel_id,
            name: alert.name.clone(),
            paused: alert.is_paused(),
            silenced: alert.silenced,
            execution_error: alert.execution_error.clone(),
            frequency: alert.frequency,
            for_duration: Duration::from_secs(alert.for_seconds),
            modified: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRuleUpgrade {
    pub uid: String,
    pub title: String,
    #[serde(default)]
    pub dashboard_uid: Option<String>,
    #[serde(default)]
    pub panel_id: Option<i64>,
    pub no_data_state: NoDataState,
    pub exec_err_state: ExecutionErrorState,
    #[serde(rename = "for", default)]
    pub for_duration: Duration,
    #[serde(default, deserialize_with = "null_as_default")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default)]
    pub modified: bool,
}

impl From<&AlertRule> for AlertRuleUpgrade {
    fn from(rule: &AlertRule) -> Self {
        Self {
            uid: rule.uid.clone(),
            title: rule.title.clone(),
            dashboard_uid: rule.dashboard_uid.clone(),
            panel_id: rule.panel_id,
            no_data_state: rule.no_data_state,
            exec_err_state: rule.exec_err_state,
            for_duration: rule.for_duration,
            annotations: rule.annotations.clone(),
            labels: rule.labels.clone(),
            is_paused: rule.is_paused,
            modified: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPair {
    pub legacy_channel: LegacyChannel,
    #[serde(default)]
    pub contact_point: Option<ContactPointUpgrade>,
    #[serde(default)]
    pub provisioned: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl ContactPair {
    pub fn new(
        channel: &alert_notification::Model,
        receiver: Option<&PostableApiReceiver>,
        route: Option<&Route>,
        error: Option<String>,
    ) -> Self {
        let contact_point = receiver.and_then(|receiver| {
            receiver
                .grafana_managed_receiver_configs
                .first()
                .map(|integration| ContactPointUpgrade {
                    name: receiver.name.clone(),
                    uid: integration.uid.clone(),
                    kind: integration.kind.clone(),
                    disable_resolve_message: integration.disable_resolve_message,
                    route_label: route
                        .and_then(|r| r.object_matchers.first())
                        .map(|m| m.name.clone())
                        .unwrap_or_default(),
                    modified: false,
                })
        });
        Self {
            legacy_channel: LegacyChannel::from(channel),
            contact_point,
            // Provisioning of legacy channels is not stored in the database.
            provisioned: false,
            error: error.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyChannel {
    pub id: i64,
    pub uid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub send_reminder: bool,
    #[serde(default)]
    pub disable_resolve_message: bool,
    #[serde(default)]
    pub frequency: Duration,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub modified: bool,
}

impl From<&alert_notification::Model> for LegacyChannel {
    fn from(channel: &alert_notification::Model) -> Self {
        Self {
            id: channel.id,
            uid: channel.uid.clone(),
            name: channel.name.clone(),
            kind: channel.channel_type.clone(),
            send_reminder: channel.send_reminder,
            disable_resolve_message: channel.disable_resolve_message,
            frequency: Duration::from_secs(channel.frequency),
            is_default: channel.is_default,
            modified: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPointUpgrade {
    pub name: String,
    pub uid: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub disable_resolve_message: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub route_label: String,
    #[serde(default)]
    pub modified: bool,
}
