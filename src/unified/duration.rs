//! Prometheus-style durations (`1m`, `52w`, `1h30m`) with second precision.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const UNITS: &[(&str, i64)] = &[
    ("y", 365 * 24 * 60 * 60),
    ("w", 7 * 24 * 60 * 60),
    ("d", 24 * 60 * 60),
    ("h", 60 * 60),
    ("m", 60),
    ("s", 1),
];

static DURATION_RE: OnceLock<Regex> = OnceLock::new();

fn duration_re() -> &'static Regex {
    DURATION_RE.get_or_init(|| {
        Regex::new(
            r"^(?:([0-9]+)y)?(?:([0-9]+)w)?(?:([0-9]+)d)?(?:([0-9]+)h)?(?:([0-9]+)m)?(?:([0-9]+)s)?(?:([0-9]+)ms)?$",
        )
        .unwrap_or_else(|_| unreachable!("duration pattern is a valid regex"))
    })
}

/// A non-negative duration in whole seconds that serializes like Prometheus' `model.Duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(i64);

impl Duration {
    pub const fn from_secs(secs: i64) -> Self {
        Self(if secs < 0 { 0 } else { secs })
    }

    pub const fn from_hours(hours: i64) -> Self {
        Self::from_secs(hours * 60 * 60)
    }

    pub const fn as_secs(&self) -> i64 {
        self.0
    }

    /// Parses `"<n>y<n>w<n>d<n>h<n>m<n>s<n>ms"` with every unit optional; milliseconds are dropped.
    pub fn parse(input: &str) -> Result<Self, DurationParseError> {
        if input == "0" {
            return Ok(Self(0));
        }
        if input.is_empty() {
            return Err(DurationParseError(input.to_string()));
        }
        let caps = duration_re()
            .captures(input)
            .ok_or_else(|| DurationParseError(input.to_string()))?;

        let mut total: i64 = 0;
        for (idx, (_, factor)) in UNITS.iter().enumerate() {
            if let Some(m) = caps.get(idx + 1) {
                let value: i64 = m
                    .as_str()
                    .parse()
                    .map_err(|_| DurationParseError(input.to_string()))?;
                total = value
                    .checked_mul(*factor)
                    .and_then(|v| total.checked_add(v))
                    .ok_or_else(|| DurationParseError(input.to_string()))?;
            }
        }
        Ok(Self(total))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("0s");
        }
        let mut remaining = self.0;
        for (unit, factor) in UNITS {
            let count = remaining / factor;
            if count > 0 {
                write!(f, "{count}{unit}")?;
                remaining -= count * factor;
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("not a valid duration string: {0:?}")]
pub struct DurationParseError(String);

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Duration::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_like_prometheus() {
        assert_eq!(Duration::from_secs(0).to_string(), "0s");
        assert_eq!(Duration::from_secs(60).to_string(), "1m");
        assert_eq!(Duration::from_secs(90).to_string(), "1m30s");
        assert_eq!(Duration::from_hours(8736).to_string(), "52w");
        assert_eq!(Duration::from_hours(24 * 366).to_string(), "1y1d");
    }

    #[test]
    fn parses_compound_strings() {
        assert_eq!(Duration::parse("1h30m").unwrap().as_secs(), 5400);
        assert_eq!(Duration::parse("52w").unwrap(), Duration::from_hours(8736));
        assert_eq!(Duration::parse("0").unwrap().as_secs(), 0);
        assert_eq!(Duration::parse("1500ms").unwrap().as_secs(), 0);
        assert!(Duration::parse("").is_err());
        assert!(Duration::parse("10 minutes").is_err());
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Duration::from_secs(300)).unwrap();
        assert_eq!(json, "\"5m\"");
        let back: Duration = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_secs(), 300);
    }
}
