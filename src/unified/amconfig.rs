//! Alertmanager configuration: receivers and the notification policy tree.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::duration::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Equal,
    NotEqual,
    Regexp,
    NotRegexp,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Regexp => "=~",
            Self::NotRegexp => "!~",
        }
    }

    fn parse(op: &str) -> Option<Self> {
        match op {
            "=" => Some(Self::Equal),
            "!=" => Some(Self::NotEqual),
            "=~" => Some(Self::Regexp),
            "!~" => Some(Self::NotRegexp),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error("unknown match operator {0:?}")]
    UnknownOperator(String),
    #[error("invalid regular expression {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },
    #[error("matcher label name must not be empty")]
    EmptyName,
}

/// A label matcher, serialized as `[name, op, value]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    pub name: String,
    pub match_type: MatchType,
    pub value: String,
}

impl Matcher {
    pub fn new(
        match_type: MatchType,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, MatcherError> {
        let name = name.into();
        let value = value.into();
        if name.is_empty() {
            return Err(MatcherError::EmptyName);
        }
        if matches!(match_type, MatchType::Regexp | MatchType::NotRegexp) {
            Regex::new(&format!("^(?:{value})$")).map_err(|source| MatcherError::InvalidRegex {
                pattern: value.clone(),
                source,
            })?;
        }
        Ok(Self {
            name,
            match_type,
            value,
        })
    }

    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Result<Self, MatcherError> {
        Self::new(MatchType::Equal, name, value)
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.match_type.as_str(), self.value)
    }
}

impl Serialize for Matcher {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.name, self.match_type.as_str(), &self.value).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Matcher {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (name, op, value) = <(String, String, String)>::deserialize(deserializer)?;
        let match_type = MatchType::parse(&op)
            .ok_or_else(|| serde::de::Error::custom(MatcherError::UnknownOperator(op.clone())))?;
        Matcher::new(match_type, name, value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub receiver: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_matchers: Vec<Matcher>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub r#continue: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_interval: Option<Duration>,
}

impl Route {
    fn walk<'a>(&'a self, out: &mut Vec<&'a Route>) {
        out.push(self);
        for child in &self.routes {
            child.walk(out);
        }
    }
}

/// One integration of a contact point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostableGrafanaReceiver {
    pub uid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub disable_resolve_message: bool,
    #[serde(default)]
    pub settings: Value,
    /// Key to base64 of the encrypted value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secure_settings: BTreeMap<String, String>,
}

/// A contact point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostableApiReceiver {
    pub name: String,
    #[serde(default)]
    pub grafana_managed_receiver_configs: Vec<PostableGrafanaReceiver>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostableApiAlertingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<String>,
    #[serde(default)]
    pub receivers: Vec<PostableApiReceiver>,
}

/// Full per-org Alertmanager configuration as persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostableUserConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub template_files: BTreeMap<String, String>,
    pub alertmanager_config: PostableApiAlertingConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("no root route defined")]
    MissingRootRoute,
    #[error("root route must specify a default receiver")]
    MissingDefaultReceiver,
    #[error("receiver {0:?} is defined more than once")]
    DuplicateReceiver(String),
    #[error("route references undefined receiver {0:?}")]
    UndefinedReceiver(String),
}

impl PostableUserConfig {
    pub fn receiver_names(&self) -> HashSet<String> {
        self.alertmanager_config
            .receivers
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    /// Drops a receiver by name; returns whether one was present.
    pub fn remove_receiver(&mut self, name: &str) -> bool {
        let before = self.alertmanager_config.receivers.len();
        self.alertmanager_config.receivers.retain(|r| r.name != name);
        before != self.alertmanager_config.receivers.len()
    }

    /// Structural checks the Alertmanager would reject on load.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let root = self
            .alertmanager_config
            .route
            .as_ref()
            .ok_or(ConfigValidationError::MissingRootRoute)?;
        if root.receiver.is_empty() {
            return Err(ConfigValidationError::MissingDefaultReceiver);
        }

        let mut names = HashSet::new();
        for receiver in &self.alertmanager_config.receivers {
            if !names.insert(receiver.name.as_str()) {
                return Err(ConfigValidationError::DuplicateReceiver(
                    receiver.name.clone(),
                ));
            }
        }

        let mut routes = Vec::new();
        root.walk(&mut routes);
        for route in routes {
            if !route.receiver.is_empty() && !names.contains(route.receiver.as_str()) {
                return Err(ConfigValidationError::UndefinedReceiver(
                    route.receiver.clone(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matcher_serializes_as_triple() {
        let m = Matcher::new(MatchType::Regexp, "alertname", ".+").unwrap();
        assert_eq!(
            serde_json::to_value(&m).unwrap(),
            serde_json::json!(["alertname", "=~", ".+"])
        );
        let back: Matcher = serde_json::from_value(serde_json::json!(["a", "!=", "b"])).unwrap();
        assert_eq!(back.match_type, MatchType::NotEqual);
    }

    #[test]
    fn matcher_rejects_bad_regex_and_operator() {
        assert!(Matcher::new(MatchType::Regexp, "x", "(").is_err());
        assert!(Matcher::equal("", "v").is_err());
        assert!(serde_json::from_value::<Matcher>(serde_json::json!(["a", "~", "b"])).is_err());
    }

    #[test]
    fn validate_catches_undefined_receivers() {
        let mut config = PostableUserConfig {
            template_files: BTreeMap::new(),
            alertmanager_config: PostableApiAlertingConfig {
                route: Some(Route {
                    receiver: "default".into(),
                    routes: vec![Route {
                        receiver: "missing".into(),
                        ..Route::default()
                    }],
                    ..Route::default()
                }),
                templates: vec![],
                receivers: vec![PostableApiReceiver {
                    name: "default".into(),
                    grafana_managed_receiver_configs: vec![],
                }],
            },
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::UndefinedReceiver(name)) if name == "missing"
        ));

        if let Some(route) = config.alertmanager_config.route.as_mut() {
            route.routes.clear();
        }
        assert!(config.validate().is_ok());
        assert!(config.remove_receiver("default"));
        assert!(!config.remove_receiver("default"));
    }

    #[test]
    fn route_omits_empty_fields() {
        let route = Route {
            receiver: "r".into(),
            r#continue: true,
            repeat_interval: Some(Duration::from_hours(8736)),
            ..Route::default()
        };
        let json = serde_json::to_value(&route).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"receiver": "r", "continue": true, "repeat_interval": "52w"})
        );
    }
}
