use greeter_crypto::FieldElement;
use greeter_types::{GreeterError, GreeterResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = GreeterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(GreeterError::Config(format!("unknown log level: {}", other))),
        }
    }
}

/// Which external nullifier scopes replay protection.
///
/// `TreeRoot` makes every group snapshot its own epoch: members may greet
/// once per root. `Topic` pins one scope for all snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ScopePolicy {
    #[default]
    TreeRoot,
    Topic(FieldElement),
}

impl ScopePolicy {
    /// Scope for a signal proven against `root`.
    pub fn resolve(&self, root: FieldElement) -> FieldElement {
        match self {
            ScopePolicy::TreeRoot => root,
            ScopePolicy::Topic(topic) => *topic,
        }
    }
}

impl fmt::Display for ScopePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopePolicy::TreeRoot => write!(f, "root"),
            ScopePolicy::Topic(topic) => write!(f, "{}", topic),
        }
    }
}

impl FromStr for ScopePolicy {
    type Err = GreeterError;

    fn from_str(s: &str) -> GreeterResult<Self> {
        if s.trim().eq_ignore_ascii_case("root") {
            return Ok(ScopePolicy::TreeRoot);
        }
        s.parse::<FieldElement>()
            .map(ScopePolicy::Topic)
            .map_err(|e| GreeterError::Config(format!("invalid external nullifier: {}", e)))
    }
}

impl Serialize for ScopePolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ScopePolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
