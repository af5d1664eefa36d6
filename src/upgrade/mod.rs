//! # Alerting Upgrade
//!
//! Converts legacy dashboard alerts and notification channels into unified
//! alert rules, contact points and notification policies, and records what it
//! created in a per-org ledger so the upgrade can be re-run or reverted.
//!
//! [`MigrationService`] is the entry point. Everything below it is owned by a
//! single operation: [`org::OrgMigration`] carries the caches and
//! deduplicators of one run and is dropped when the operation ends.

pub mod alert_rule;
pub mod channel;
pub mod conditions;
pub mod dedup;
pub mod folders;
pub mod ledger;
pub mod org;
pub mod queries;
pub mod service;
pub mod silences;
pub mod store;
pub mod template;

use rand::Rng;
use rand::distributions::Alphanumeric;

pub use ledger::{ContactPair, DashboardUpgrade, OrgMigrationState};
pub use service::{MigrationService, MigrationSettings};
pub use silences::{FileSilenceSink, SilenceSink};
pub use store::{MigrationStore, SqlMigrationStore};

/// Maximum length of an alert rule title.
pub const MAX_TITLE_LENGTH: usize = 190;
/// Maximum length of a generated folder title.
pub const MAX_FOLDER_NAME_LENGTH: usize = 255;

/// Label routing a rule to the nested route holding every migrated channel.
pub const USE_LEGACY_CHANNELS_LABEL: &str = "__use_legacy_channels__";

pub const DASHBOARD_UID_ANNOTATION: &str = "__dashboardUid__";
pub const PANEL_ID_ANNOTATION: &str = "__panelId__";
pub const ALERT_ID_ANNOTATION: &str = "__alertId__";
pub const MESSAGE_ANNOTATION: &str = "message";

/// Label carrying the rule uid, matched by the silences of keep-state rules.
pub const RULE_UID_LABEL: &str = "rule_uid";

/// Title of the root folder receiving alerts of root-level dashboards.
pub const GENERAL_ALERTING_FOLDER: &str = "General Alerting";

/// Key-value namespace of the ledger.
pub const KV_NAMESPACE: &str = "ngalert.migration";
/// Key-value namespace owned by the Alertmanager; cleared on revert.
pub const NOTIFIER_KV_NAMESPACE: &str = "alertmanager";
pub const MIGRATED_KEY: &str = "migrated";
pub const SUMMARY_KEY: &str = "summary";
/// Org id under which the global "migrated" flag is stored.
pub const ANY_ORG: i64 = 0;

/// Name of the server lock serializing `run` across processes.
pub const ACTION_NAME: &str = "alerting migration";

const SHORT_UID_LENGTH: usize = 9;

/// Label that routes a rule to one migrated channel.
pub fn contact_label(channel_uid: &str) -> String {
    format!("__contacts_{channel_uid}__")
}

/// Random alphanumeric uid used for rules, folders and dedup suffixes.
pub fn short_uid() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHORT_UID_LENGTH)
        .map(char::from)
        .collect()
}

/// Truncates to at most `max` characters.
pub(crate) fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_uids_are_alphanumeric() {
        let uid = short_uid();
        assert_eq!(uid.len(), SHORT_UID_LENGTH);
        assert!(uid.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(short_uid(), short_uid());
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn contact_label_wraps_uid() {
        assert_eq!(contact_label("abc"), "__contacts_abc__");
    }
}
