//! Receiver validation.
//!
//! Mirrors the checks the Alertmanager performs when it builds integrations
//! from a configuration: the type must be known, required settings present
//! (plain or secure), URLs parseable and email address lists non-empty.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::crypto::CryptoError;
use crate::services::Encryption;
use crate::unified::amconfig::ConfigValidationError;
use crate::unified::{PostableGrafanaReceiver, PostableUserConfig};

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("unsupported integration type {0:?}")]
    UnknownType(String),
    #[error("{kind} integration {name:?}: could not find {key} property in settings")]
    MissingSetting {
        kind: String,
        name: String,
        key: &'static str,
    },
    #[error("{kind} integration {name:?}: invalid URL {value:?}: {source}")]
    InvalidUrl {
        kind: String,
        name: String,
        value: String,
        source: url::ParseError,
    },
    #[error("{kind} integration {name:?}: invalid email address {value:?}")]
    InvalidEmail {
        kind: String,
        name: String,
        value: String,
    },
    #[error("failed to decode secure setting {key}: {source}")]
    SecureSettingEncoding {
        key: String,
        source: base64::DecodeError,
    },
    #[error("failed to decrypt secure setting {key}: {source}")]
    SecureSettingDecrypt { key: String, source: CryptoError },
    #[error(transparent)]
    Config(#[from] ConfigValidationError),
}

/// Checks that one integration could be constructed.
pub trait ReceiverValidator: Send + Sync {
    fn validate(
        &self,
        receiver: &PostableGrafanaReceiver,
        encryption: &dyn Encryption,
    ) -> Result<(), NotifierError>;
}

enum Setting {
    Text(&'static str),
    Url(&'static str),
    Emails(&'static str),
}

/// Required settings per integration type. A slot with several entries is
/// satisfied by any one of them.
fn required_settings(kind: &str) -> Option<&'static [&'static [Setting]]> {
    use Setting::*;
    let table: &'static [&'static [Setting]] = match kind {
        "email" => &[&[Emails("addresses")]],
        "slack" => &[&[Url("url"), Text("token")]],
        "pagerduty" => &[&[Text("integrationKey")]],
        "webhook" => &[&[Url("url")]],
        "prometheus-alertmanager" => &[&[Url("url")]],
        "opsgenie" => &[&[Text("apiKey")]],
        "telegram" => &[&[Text("bottoken")], &[Text("chatid")]],
        "line" => &[&[Text("token")]],
        "pushover" => &[&[Text("apiToken")], &[Text("userKey")]],
        "threema" => &[&[Text("gateway_id")], &[Text("recipient_id")], &[Text("api_secret")]],
        "discord" | "googlechat" | "teams" | "dingding" | "victorops" => &[&[Url("url")]],
        "kafka" => &[&[Url("kafkaRestProxy")], &[Text("kafkaTopic")]],
        "sensugo" => &[&[Url("url")], &[Text("apikey")]],
        _ => return None,
    };
    Some(table)
}

#[derive(Debug, Default, Clone)]
pub struct BuiltinValidator;

impl BuiltinValidator {
    fn lookup(
        receiver: &PostableGrafanaReceiver,
        encryption: &dyn Encryption,
        key: &str,
    ) -> Result<Option<String>, NotifierError> {
        if let Some(encoded) = receiver.secure_settings.get(key) {
            let raw = BASE64
                .decode(encoded)
                .map_err(|source| NotifierError::SecureSettingEncoding {
                    key: key.to_string(),
                    source,
                })?;
            let plain = encryption
                .decrypt(&raw)
                .map_err(|source| NotifierError::SecureSettingDecrypt {
                    key: key.to_string(),
                    source,
                })?;
            let value = String::from_utf8_lossy(&plain).into_owned();
            if !value.is_empty() {
                return Ok(Some(value));
            }
        }
        let value = match receiver.settings.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Ok(value)
    }

    fn check(
        receiver: &PostableGrafanaReceiver,
        setting: &Setting,
        value: &str,
    ) -> Result<(), NotifierError> {
        match setting {
            Setting::Text(_) => Ok(()),
            Setting::Url(_) => Url::parse(value).map(|_| ()).map_err(|source| {
                NotifierError::InvalidUrl {
                    kind: receiver.kind.clone(),
                    name: receiver.name.clone(),
                    value: value.to_string(),
                    source,
                }
            }),
            Setting::Emails(_) => {
                for address in value.split([';', ',', '\n']).map(str::trim) {
                    if address.is_empty() {
                        continue;
                    }
                    let valid = address
                        .split_once('@')
                        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
                    if !valid {
                        return Err(NotifierError::InvalidEmail {
                            kind: receiver.kind.clone(),
                            name: receiver.name.clone(),
                            value: address.to_string(),
                        });
                    }
                }
                Ok(())
            }
        }
    }
}

impl Setting {
    fn key(&self) -> &'static str {
        match self {
            Setting::Text(k) | Setting::Url(k) | Setting::Emails(k) => k,
        }
    }
}

impl ReceiverValidator for BuiltinValidator {
    fn validate(
        &self,
        receiver: &PostableGrafanaReceiver,
        encryption: &dyn Encryption,
    ) -> Result<(), NotifierError> {
        let slots = required_settings(&receiver.kind)
            .ok_or_else(|| NotifierError::UnknownType(receiver.kind.clone()))?;

        for slot in slots {
            let mut satisfied = false;
            for setting in slot.iter() {
                if let Some(value) = Self::lookup(receiver, encryption, setting.key())? {
                    Self::check(receiver, setting, &value)?;
                    satisfied = true;
                    break;
                }
            }
            if !satisfied {
                return Err(NotifierError::MissingSetting {
                    kind: receiver.kind.clone(),
                    name: receiver.name.clone(),
                    key: slot.first().map(Setting::key).unwrap_or_default(),
                });
            }
        }
        Ok(())
    }
}

/// Validates the configuration structure and then every integration in it.
pub fn validate_config(
    config: &PostableUserConfig,
    validator: &dyn ReceiverValidator,
    encryption: &dyn Encryption,
) -> Result<(), NotifierError> {
    config.validate()?;
    for receiver in &config.alertmanager_config.receivers {
        for integration in &receiver.grafana_managed_receiver_configs {
            validator.validate(integration, encryption)?;
        }
    }
    Ok(())
}
