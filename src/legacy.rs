//! Typed view of the legacy alerting payloads.
//!
//! The `alert.settings` column is free-form JSON. Known fields are decoded
//! into [`DashAlertSettings`]; anything else is kept in `extra` so unknown
//! legacy fields survive a decode/encode cycle.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::models::{alert, alert_notification};

/// Treats an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Settings blob stored with every legacy dashboard alert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashAlertSettings {
    #[serde(default, deserialize_with = "null_as_default")]
    pub no_data_state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub execution_error_state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conditions: Vec<DashAlertCondition>,
    /// Either an object of tags or, in old dashboards, an array that carries no labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_rule_tags: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub notifications: Vec<DashAlertNotification>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DashAlertSettings {
    /// Tags usable as labels. Only string values of an object are kept.
    pub fn tags(&self) -> BTreeMap<String, String> {
        match &self.alert_rule_tags {
            Some(Value::Object(tags)) => tags
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        }
    }
}

/// Reference to a notification channel, by numeric id or by uid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashAlertNotification {
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "is_zero")]
    pub id: i64,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// One classic condition: `reducer(query) evaluator params`, joined to the previous by `operator`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashAlertCondition {
    #[serde(default)]
    pub evaluator: ConditionEvaluator,
    #[serde(default)]
    pub operator: ConditionOperator,
    #[serde(default)]
    pub query: ConditionQuery,
    #[serde(default)]
    pub reducer: ConditionReducer,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionEvaluator {
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: Vec<f64>,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionOperator {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
}

/// `params` is `[refId, from, to]`, e.g. `["A", "5m", "now"]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionQuery {
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: Vec<String>,
    #[serde(rename = "datasourceId", default, deserialize_with = "null_as_default")]
    pub datasource_id: i64,
    #[serde(alias = "Model", default)]
    pub model: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionReducer {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
}

impl alert::Model {
    pub fn parse_settings(&self) -> Result<DashAlertSettings, serde_json::Error> {
        if self.settings.trim().is_empty() {
            return Ok(DashAlertSettings::default());
        }
        serde_json::from_str(&self.settings)
    }

    pub fn is_paused(&self) -> bool {
        self.state == "paused"
    }
}

impl alert_notification::Model {
    /// Plain settings as a JSON object; an empty column is an empty object.
    pub fn parse_settings(&self) -> Result<Map<String, Value>, serde_json::Error> {
        if self.settings.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&self.settings)
    }

    /// Secure settings as stored: key to base64 of the encrypted value.
    pub fn parse_secure_settings(&self) -> Result<BTreeMap<String, String>, serde_json::Error> {
        if self.secure_settings.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str::<Option<BTreeMap<String, String>>>(&self.secure_settings)
            .map(Option::unwrap_or_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert_with_settings(settings: &str) -> alert::Model {
        alert::Model {
            id: 1,
            org_id: 1,
            dashboard_id: 1,
            panel_id: 1,
            name: "cpu".into(),
            message: String::new(),
            state: "ok".into(),
            settings: settings.into(),
            frequency: 60,
            for_seconds: 0,
            silenced: false,
            execution_error: String::new(),
        }
    }

    #[test]
    fn tags_from_object_only_keep_strings() {
        let settings = alert_with_settings(r#"{"alertRuleTags":{"team":"infra","level":3}}"#)
            .parse_settings()
            .unwrap();
        let tags = settings.tags();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags["team"], "infra");
    }

    #[test]
    fn tags_from_array_are_ignored() {
        let settings = alert_with_settings(r#"{"alertRuleTags":["one","two"]}"#)
            .parse_settings()
            .unwrap();
        assert!(settings.tags().is_empty());
    }

    #[test]
    fn decodes_conditions_and_keeps_unknown_fields() {
        let raw = r#"{
            "noDataState": "keep_state",
            "conditions": [{
                "evaluator": {"params": [80], "type": "gt"},
                "operator": {"type": "and"},
                "query": {"params": ["A", "5m", "now"], "datasourceId": 2, "model": {"expr": "up"}},
                "reducer": {"type": "avg", "params": []}
            }],
            "notifications": [{"uid": "ops"}, {"id": 4}],
            "handler": 1
        }"#;
        let settings = alert_with_settings(raw).parse_settings().unwrap();
        assert_eq!(settings.no_data_state, "keep_state");
        assert_eq!(settings.execution_error_state, "");
        assert_eq!(settings.conditions[0].query.datasource_id, 2);
        assert_eq!(settings.conditions[0].reducer.kind, "avg");
        assert_eq!(settings.notifications[1].id, 4);
        assert_eq!(settings.extra["handler"], Value::from(1));
    }

    #[test]
    fn null_fields_decode_as_empty() {
        let settings = alert_with_settings(r#"{"conditions":null,"noDataState":null}"#)
            .parse_settings()
            .unwrap();
        assert!(settings.conditions.is_empty());
        assert_eq!(settings.no_data_state, "");
    }
}
