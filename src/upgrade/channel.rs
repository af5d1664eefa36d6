//! Contact points and notification policies for legacy notification channels.
//!
//! Every migrated channel becomes one receiver plus one route nested under a
//! single route matching [`USE_LEGACY_CHANNELS_LABEL`]. Rules carry one
//! `__contacts_<uid>__` label per channel they notify; default channels match
//! every alert instead.

use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::{Map, Value};
use tracing::warn;

use crate::crypto::CryptoError;
use crate::error::ItemError;
use crate::models::alert_notification;
use crate::services::Encryption;
use crate::unified::amconfig::PostableApiAlertingConfig;
use crate::unified::{
    Duration, MatchType, Matcher, PostableApiReceiver, PostableGrafanaReceiver,
    PostableUserConfig, Route,
};

use super::dedup::Deduplicator;
use super::ledger::ContactPair;
use super::{USE_LEGACY_CHANNELS_LABEL, contact_label};

pub const DEFAULT_RECEIVER: &str = "autogen-contact-point-default";

/// Repeat interval used when a channel had reminders off (52 weeks).
pub const DISABLED_REPEAT_INTERVAL: Duration = Duration::from_hours(8736);

const FOLDER_TITLE_LABEL: &str = "grafana_folder";
const ALERT_NAME_LABEL: &str = "alertname";
const DISCONTINUED_TYPES: &[&str] = &["hipchat", "sensu"];

/// Keys that older releases kept in plain settings before they became secure.
fn secure_keys_to_migrate(kind: &str) -> &'static [&'static str] {
    match kind {
        "slack" => &["url", "token"],
        "pagerduty" => &["integrationKey"],
        "webhook" => &["password"],
        "prometheus-alertmanager" => &["basicAuthPassword"],
        "opsgenie" => &["apiKey"],
        "telegram" => &["bottoken"],
        "line" => &["token"],
        "pushover" => &["apiToken", "userKey"],
        "threema" => &["api_secret"],
        _ => &[],
    }
}

/// Empty configuration: the default receiver and a root route holding only
/// the nested legacy route.
pub fn create_base_config() -> PostableUserConfig {
    PostableUserConfig {
        template_files: BTreeMap::new(),
        alertmanager_config: PostableApiAlertingConfig {
            route: Some(Route {
                receiver: DEFAULT_RECEIVER.to_string(),
                group_by: vec![FOLDER_TITLE_LABEL.to_string(), ALERT_NAME_LABEL.to_string()],
                routes: vec![create_nested_legacy_route()],
                ..Default::default()
            }),
            templates: Vec::new(),
            receivers: vec![PostableApiReceiver {
                name: DEFAULT_RECEIVER.to_string(),
                grafana_managed_receiver_configs: Vec::new(),
            }],
        },
    }
}

fn create_nested_legacy_route() -> Route {
    Route {
        object_matchers: vec![Matcher {
            name: USE_LEGACY_CHANNELS_LABEL.to_string(),
            match_type: MatchType::Equal,
            value: "true".to_string(),
        }],
        r#continue: true,
        ..Default::default()
    }
}

pub fn is_nested_legacy_route(route: &Route) -> bool {
    route.object_matchers.len() == 1 && route.object_matchers[0].name == USE_LEGACY_CHANNELS_LABEL
}

/// The nested legacy route of `config`, inserted as the first top-level
/// route when missing.
pub fn get_or_create_nested_legacy_route(config: &mut PostableUserConfig) -> &mut Route {
    let root = config
        .alertmanager_config
        .route
        .get_or_insert_with(|| Route {
            receiver: DEFAULT_RECEIVER.to_string(),
            group_by: vec![FOLDER_TITLE_LABEL.to_string(), ALERT_NAME_LABEL.to_string()],
            ..Default::default()
        });
    let position = match root.routes.iter().position(is_nested_legacy_route) {
        Some(position) => position,
        None => {
            root.routes.insert(0, create_nested_legacy_route());
            0
        }
    };
    &mut root.routes[position]
}

fn decrypt_secure_settings(
    secure: &BTreeMap<String, String>,
    encryption: &dyn Encryption,
) -> Result<BTreeMap<String, String>, ItemError> {
    secure
        .iter()
        .map(|(key, encoded)| -> Result<(String, String), ItemError> {
            let raw = BASE64
                .decode(encoded)
                .map_err(|_| ItemError::Decrypt(CryptoError::InvalidFormat))?;
            let plain = encryption.decrypt(&raw).map_err(ItemError::Decrypt)?;
            let value =
                String::from_utf8(plain).map_err(|_| ItemError::Decrypt(CryptoError::InvalidFormat))?;
            Ok((key.clone(), value))
        })
        .collect()
}

/// Moves plaintext secrets of `kind` into secure settings, then re-encrypts
/// every secure value. Existing non-empty secure values win.
pub fn migrate_settings_to_secure_settings(
    kind: &str,
    mut settings: Map<String, Value>,
    secure: &BTreeMap<String, String>,
    encryption: &dyn Encryption,
) -> Result<(Map<String, Value>, BTreeMap<String, String>), ItemError> {
    let mut plain = decrypt_secure_settings(secure, encryption)?;

    for key in secure_keys_to_migrate(kind) {
        if plain.get(*key).is_some_and(|v| !v.is_empty()) {
            continue;
        }
        let moved = match settings.get(*key) {
            Some(Value::String(value)) if !value.is_empty() => value.clone(),
            _ => continue,
        };
        settings.remove(*key);
        plain.insert((*key).to_string(), moved);
    }

    let encrypted = plain
        .into_iter()
        .map(|(key, value)| -> Result<(String, String), ItemError> {
            let payload = encryption
                .encrypt(value.as_bytes())
                .map_err(ItemError::Encrypt)?;
            Ok((key, BASE64.encode(payload)))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok((settings, encrypted))
}

/// Receiver for `channel`, named after it unless the name is already taken.
pub fn create_receiver(
    channel: &alert_notification::Model,
    names: &Deduplicator,
    encryption: &dyn Encryption,
) -> Result<PostableApiReceiver, ItemError> {
    if DISCONTINUED_TYPES.contains(&channel.channel_type.as_str()) {
        return Err(ItemError::DiscontinuedChannel(channel.channel_type.clone()));
    }

    let settings = channel
        .parse_settings()
        .map_err(ItemError::InvalidChannelSettings)?;
    let secure = channel
        .parse_secure_settings()
        .map_err(ItemError::InvalidChannelSettings)?;
    let (settings, secure_settings) =
        migrate_settings_to_secure_settings(&channel.channel_type, settings, &secure, encryption)?;

    let name = if names.contains(&channel.name) {
        names.deduplicate(&channel.name)
    } else {
        channel.name.clone()
    };

    Ok(PostableApiReceiver {
        name: name.clone(),
        grafana_managed_receiver_configs: vec![PostableGrafanaReceiver {
            uid: channel.uid.clone(),
            name,
            kind: channel.channel_type.clone(),
            disable_resolve_message: channel.disable_resolve_message,
            settings: Value::Object(settings),
            secure_settings,
        }],
    })
}

/// Route delivering to `receiver_name`. Siblings keep matching after it.
pub fn create_route(
    channel: &alert_notification::Model,
    receiver_name: &str,
) -> Result<Route, ItemError> {
    let matcher = if channel.is_default {
        Matcher::new(MatchType::Regexp, ALERT_NAME_LABEL, ".+")
    } else {
        Matcher::equal(contact_label(&channel.uid), "true")
    }
    .map_err(|err| ItemError::Route(err.to_string()))?;

    let repeat_interval = if channel.send_reminder {
        Duration::from_secs(channel.frequency)
    } else {
        DISABLED_REPEAT_INTERVAL
    };

    Ok(Route {
        receiver: receiver_name.to_string(),
        object_matchers: vec![matcher],
        r#continue: true,
        repeat_interval: Some(repeat_interval),
        ..Default::default()
    })
}

/// Adds a receiver and route per channel to `config`. Channel failures are
/// recorded on their pair and leave `config` untouched.
pub fn migrate_channels(
    config: &mut PostableUserConfig,
    channels: &[alert_notification::Model],
    encryption: &dyn Encryption,
) -> Vec<ContactPair> {
    let mut names = Deduplicator::new(false, 0);
    for name in config.receiver_names() {
        names.add(&name);
    }

    let mut pairs = Vec::with_capacity(channels.len());
    for channel in channels {
        let receiver = match create_receiver(channel, &names, encryption) {
            Ok(receiver) => receiver,
            Err(err) => {
                warn!(
                    channel_type = %channel.channel_type,
                    name = %channel.name,
                    channel_uid = %channel.uid,
                    error = %err,
                    "failed to create receiver"
                );
                pairs.push(ContactPair::new(
                    channel,
                    None,
                    None,
                    Some(format!("create receiver: {err}")),
                ));
                continue;
            }
        };

        let route = match create_route(channel, &receiver.name) {
            Ok(route) => route,
            Err(err) => {
                warn!(
                    channel_type = %channel.channel_type,
                    name = %channel.name,
                    channel_uid = %channel.uid,
                    error = %err,
                    "failed to create route for receiver"
                );
                pairs.push(ContactPair::new(channel, Some(&receiver), None, Some(err.to_string())));
                continue;
            }
        };

        pairs.push(ContactPair::new(channel, Some(&receiver), Some(&route), None));
        names.add(&receiver.name);
        get_or_create_nested_legacy_route(config).routes.push(route);
        config.alertmanager_config.receivers.push(receiver);
    }
    pairs
}

/// Drops the receiver and nested route a previous migration of this channel
/// created. Returns whether anything was removed.
pub fn remove_channel(config: &mut PostableUserConfig, pair: &ContactPair) -> bool {
    let Some(contact_point) = &pair.contact_point else {
        return false;
    };
    let name = contact_point.name.as_str();
    let mut removed = config.remove_receiver(name);
    if let Some(root) = config.alertmanager_config.route.as_mut() {
        for nested in root.routes.iter_mut().filter(|r| is_nested_legacy_route(r)) {
            let before = nested.routes.len();
            nested.routes.retain(|r| r.receiver != name);
            removed |= before != nested.routes.len();
        }
    }
    removed
}
