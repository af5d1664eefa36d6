//! Assembles a unified alert rule from one legacy dashboard alert.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::warn;

use crate::error::ItemError;
use crate::legacy::DashAlertSettings;
use crate::models::alert;
use crate::unified::{AlertRule, Duration, ExecutionErrorState, MeshSilence, NoDataState};

use super::conditions::TranslatedCondition;
use super::ledger::DashboardUpgrade;
use super::queries::migrate_alert_rule_queries;
use super::template::migrate_template;
use super::{
    ALERT_ID_ANNOTATION, DASHBOARD_UID_ANNOTATION, MAX_TITLE_LENGTH, MESSAGE_ANNOTATION,
    PANEL_ID_ANNOTATION, RULE_UID_LABEL, USE_LEGACY_CHANNELS_LABEL, contact_label, short_uid,
    truncate_chars,
};

/// Scheduler tick; rule intervals are multiples of it.
const BASE_INTERVAL_SECONDS: i64 = 10;
const KEEP_STATE: &str = "keep_state";
const SILENCE_COMMENT: &str = "Created during auto migration to unified alerting";

/// Labels and annotations recording where a rule came from and where it routes.
pub fn add_migration_info(
    alert: &alert::Model,
    settings: &DashAlertSettings,
    dashboard_uid: &str,
    channel_uids: &[String],
) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let mut labels = settings.tags();
    labels.insert(USE_LEGACY_CHANNELS_LABEL.to_string(), "true".to_string());
    for uid in channel_uids {
        labels.insert(contact_label(uid), "true".to_string());
    }

    let annotations = BTreeMap::from([
        (DASHBOARD_UID_ANNOTATION.to_string(), dashboard_uid.to_string()),
        (PANEL_ID_ANNOTATION.to_string(), alert.panel_id.to_string()),
        (ALERT_ID_ANNOTATION.to_string(), alert.id.to_string()),
        (MESSAGE_ANNOTATION.to_string(), migrate_template(&alert.message)),
    ]);
    (labels, annotations)
}

pub fn trans_no_data(state: &str) -> NoDataState {
    match state {
        "ok" => NoDataState::Ok,
        "" | "no_data" => NoDataState::NoData,
        "alerting" => NoDataState::Alerting,
        // Unified alerting fires a DatasourceNoData alert instead; it gets silenced.
        KEEP_STATE => NoDataState::NoData,
        other => {
            warn!(old = other, new = %NoDataState::NoData, "unable to translate NoData state, using default");
            NoDataState::NoData
        }
    }
}

pub fn trans_exec_err(state: &str) -> ExecutionErrorState {
    match state {
        "" | "alerting" => ExecutionErrorState::Alerting,
        KEEP_STATE => ExecutionErrorState::Error,
        "ok" => ExecutionErrorState::Ok,
        other => {
            warn!(old = other, new = %ExecutionErrorState::Error, "unable to translate execution error state, using default");
            ExecutionErrorState::Error
        }
    }
}

/// Rounds a legacy frequency down to the scheduler tick, never below one tick.
pub fn rule_adjust_interval(frequency: i64) -> i64 {
    if frequency <= BASE_INTERVAL_SECONDS {
        return BASE_INTERVAL_SECONDS;
    }
    frequency - frequency % BASE_INTERVAL_SECONDS
}

pub fn truncate_rule_name(name: &str) -> String {
    truncate_chars(name, MAX_TITLE_LENGTH)
}

/// Builds the rule for `alert` in the folder recorded on `du`.
pub fn make_alert_rule(
    condition: TranslatedCondition,
    alert: &alert::Model,
    settings: &DashAlertSettings,
    du: &DashboardUpgrade,
    channel_uids: &[String],
) -> Result<AlertRule, ItemError> {
    let (labels, annotations) = add_migration_info(alert, settings, &du.dashboard_uid, channel_uids);
    let data = migrate_alert_rule_queries(condition.data).map_err(ItemError::Queries)?;

    Ok(AlertRule {
        uid: short_uid(),
        org_id: alert.org_id,
        title: truncate_rule_name(&alert.name),
        condition: condition.condition,
        data,
        interval_seconds: rule_adjust_interval(alert.frequency),
        version: 1,
        namespace_uid: du.new_folder_uid.clone(),
        dashboard_uid: Some(du.dashboard_uid.clone()),
        panel_id: Some(alert.panel_id),
        // One rule per group keeps panels evaluating independently.
        rule_group: format!("{} - {}", du.dashboard_name, alert.panel_id),
        rule_group_index: 1,
        no_data_state: trans_no_data(&settings.no_data_state),
        exec_err_state: trans_exec_err(&settings.execution_error_state),
        for_duration: Duration::from_secs(alert.for_seconds),
        annotations,
        labels,
        is_paused: alert.is_paused(),
        updated: Utc::now(),
    })
}

/// Silences standing in for "keep last state". Adds the `rule_uid` label
/// they match on to `rule`.
pub fn create_silences(settings: &DashAlertSettings, rule: &mut AlertRule) -> Vec<MeshSilence> {
    let keep_exec = settings.execution_error_state == KEEP_STATE;
    let keep_no_data = settings.no_data_state == KEEP_STATE;
    if !keep_exec && !keep_no_data {
        return Vec::new();
    }

    rule.labels
        .insert(RULE_UID_LABEL.to_string(), rule.uid.clone());

    let mut silences = Vec::new();
    if keep_exec {
        silences.push(MeshSilence::equal_matchers(
            &[("alertname", "DatasourceError"), (RULE_UID_LABEL, &rule.uid)],
            SILENCE_COMMENT,
        ));
    }
    if keep_no_data {
        silences.push(MeshSilence::equal_matchers(
            &[("alertname", "DatasourceNoData"), (RULE_UID_LABEL, &rule.uid)],
            SILENCE_COMMENT,
        ));
    }
    silences
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::unified::{AlertQuery, RelativeTimeRange};

    fn legacy_alert(name: &str, message: &str, settings: serde_json::Value) -> alert::Model {
        alert::Model {
            id: 7,
            org_id: 1,
            dashboard_id: 3,
            panel_id: 2,
            name: name.into(),
            message: message.into(),
            state: "ok".into(),
            settings: settings.to_string(),
            frequency: 65,
            for_seconds: 120,
            silenced: false,
            execution_error: String::new(),
        }
    }

    fn upgrade() -> DashboardUpgrade {
        let mut du = DashboardUpgrade::new(3);
        du.set_dashboard("dash-uid", "Service");
        du.set_new_folder("folder-uid", "Service Alerts");
        du
    }

    fn condition() -> TranslatedCondition {
        TranslatedCondition {
            condition: "C".into(),
            data: vec![AlertQuery {
                ref_id: "A".into(),
                query_type: String::new(),
                relative_time_range: RelativeTimeRange { from: 300, to: 0 },
                datasource_uid: "ds".into(),
                model: json!({"refId": "A", "hide": false}),
            }],
        }
    }

    #[test]
    fn builds_rule_with_routing_labels_and_provenance() {
        let alert = legacy_alert("High CPU", "${instance} is hot", json!({"alertRuleTags": {"team": "infra"}}));
        let settings = alert.parse_settings().unwrap();
        let rule = make_alert_rule(condition(), &alert, &settings, &upgrade(), &["slack".into()]).unwrap();

        assert_eq!(rule.title, "High CPU");
        assert_eq!(rule.namespace_uid, "folder-uid");
        assert_eq!(rule.rule_group, "Service - 2");
        assert_eq!(rule.interval_seconds, 60);
        assert_eq!(rule.for_duration.as_secs(), 120);
        assert_eq!(rule.labels["team"], "infra");
        assert_eq!(rule.labels[USE_LEGACY_CHANNELS_LABEL], "true");
        assert_eq!(rule.labels["__contacts_slack__"], "true");
        assert_eq!(rule.annotations[DASHBOARD_UID_ANNOTATION], "dash-uid");
        assert_eq!(rule.annotations[PANEL_ID_ANNOTATION], "2");
        assert_eq!(rule.annotations[ALERT_ID_ANNOTATION], "7");
        assert!(rule.annotations[MESSAGE_ANNOTATION].contains("{{$mergedLabels.instance}}"));
        assert_eq!(rule.data[0].model, json!({"refId": "A"}));
        assert!(!rule.is_paused);
    }

    #[test]
    fn tag_arrays_produce_no_labels() {
        let alert = legacy_alert("x", "", json!({"alertRuleTags": ["a", "b"]}));
        let settings = alert.parse_settings().unwrap();
        let (labels, _) = add_migration_info(&alert, &settings, "d", &[]);
        assert_eq!(labels.len(), 1);
        assert!(labels.contains_key(USE_LEGACY_CHANNELS_LABEL));
    }

    #[test]
    fn state_translation_defaults() {
        assert_eq!(trans_no_data("ok"), NoDataState::Ok);
        assert_eq!(trans_no_data(""), NoDataState::NoData);
        assert_eq!(trans_no_data("alerting"), NoDataState::Alerting);
        assert_eq!(trans_no_data("keep_state"), NoDataState::NoData);
        assert_eq!(trans_no_data("bogus"), NoDataState::NoData);

        assert_eq!(trans_exec_err(""), ExecutionErrorState::Alerting);
        assert_eq!(trans_exec_err("keep_state"), ExecutionErrorState::Error);
        assert_eq!(trans_exec_err("ok"), ExecutionErrorState::Ok);
        assert_eq!(trans_exec_err("bogus"), ExecutionErrorState::Error);
    }

    #[test]
    fn intervals_round_down_to_ticks() {
        assert_eq!(rule_adjust_interval(0), 10);
        assert_eq!(rule_adjust_interval(10), 10);
        assert_eq!(rule_adjust_interval(15), 10);
        assert_eq!(rule_adjust_interval(61), 60);
    }

    #[test]
    fn long_names_are_truncated() {
        let name = "n".repeat(300);
        assert_eq!(truncate_rule_name(&name).chars().count(), MAX_TITLE_LENGTH);
    }

    #[test]
    fn keep_state_creates_matching_silences() {
        let alert = legacy_alert(
            "x",
            "",
            json!({"noDataState": "keep_state", "executionErrorState": "keep_state"}),
        );
        let settings = alert.parse_settings().unwrap();
        let mut rule = make_alert_rule(condition(), &alert, &settings, &upgrade(), &[]).unwrap();
        let silences = create_silences(&settings, &mut rule);

        assert_eq!(silences.len(), 2);
        assert_eq!(rule.labels[RULE_UID_LABEL], rule.uid);
        assert_eq!(silences[0].matcher_value("alertname"), Some("DatasourceError"));
        assert_eq!(silences[1].matcher_value("alertname"), Some("DatasourceNoData"));
        assert!(silences.iter().all(|s| s.matcher_value(RULE_UID_LABEL) == Some(rule.uid.as_str())));
    }

    #[test]
    fn no_silences_without_keep_state() {
        let alert = legacy_alert("x", "", json!({"noDataState": "alerting"}));
        let settings = alert.parse_settings().unwrap();
        let mut rule = make_alert_rule(condition(), &alert, &settings, &upgrade(), &[]).unwrap();
        assert!(create_silences(&settings, &mut rule).is_empty());
        assert!(!rule.labels.contains_key(RULE_UID_LABEL));
    }
}
