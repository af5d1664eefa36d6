//! Alertmanager silences in their mesh (replicated) form.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SilenceMatcherType {
    Equal,
    Regexp,
    NotEqual,
    NotRegexp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilenceMatcher {
    #[serde(rename = "type")]
    pub kind: SilenceMatcherType,
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Silence {
    pub id: String,
    pub matchers: Vec<SilenceMatcher>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshSilence {
    pub silence: Silence,
    pub expires_at: DateTime<Utc>,
}

impl MeshSilence {
    /// A one-year silence whose matchers all use equality.
    pub fn equal_matchers(matchers: &[(&str, &str)], comment: impl Into<String>) -> Self {
        let now = Utc::now();
        let ends_at = now
            .checked_add_months(Months::new(12))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            silence: Silence {
                id: Uuid::new_v4().to_string(),
                matchers: matchers
                    .iter()
                    .map(|(name, pattern)| SilenceMatcher {
                        kind: SilenceMatcherType::Equal,
                        name: (*name).to_string(),
                        pattern: (*pattern).to_string(),
                    })
                    .collect(),
                starts_at: now,
                ends_at,
                updated_at: now,
                created_by: "Grafana Migration".to_string(),
                comment: comment.into(),
            },
            expires_at: ends_at,
        }
    }

    /// Value of the first equality matcher on `name`, if any.
    pub fn matcher_value(&self, name: &str) -> Option<&str> {
        self.silence
            .matchers
            .iter()
            .find(|m| m.kind == SilenceMatcherType::Equal && m.name == name)
            .map(|m| m.pattern.as_str())
    }
}
