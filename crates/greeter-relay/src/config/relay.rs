use greeter_crypto::{DEFAULT_TREE_DEPTH, MAX_TREE_DEPTH};
use greeter_types::{GreeterError, GreeterResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::logging::LoggingConfig;
use super::types::{LogLevel, ScopePolicy};
use super::{DEFAULT_EVENT_BUFFER, MAX_ROOT_HISTORY};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GreeterConfig {
    pub data_dir: PathBuf,
    pub tree_depth: usize,
    /// `"root"` to scope by snapshot root, otherwise a field element topic.
    pub external_nullifier: ScopePolicy,
    pub commitments_path: PathBuf,
    pub keys_dir: PathBuf,
    pub registry_path: PathBuf,
    /// Superseded roots still accepted after a snapshot refresh.
    pub root_history_size: usize,
    pub event_buffer: usize,
    pub logging: LoggingConfig,
}

impl Default for GreeterConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/var/lib/greeter"));
        Self::with_data_dir(home.join(".greeter"))
    }
}

impl GreeterConfig {
    /// Defaults with every path placed under `data_dir`.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            commitments_path: data_dir.join("identityCommitments.json"),
            keys_dir: data_dir.join("keys"),
            registry_path: data_dir.join("nullifiers"),
            data_dir,
            tree_depth: DEFAULT_TREE_DEPTH,
            external_nullifier: ScopePolicy::default(),
            root_history_size: 0,
            event_buffer: DEFAULT_EVENT_BUFFER,
            logging: LoggingConfig::default(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> GreeterResult<Self> {
        Self::load_or(path, Self::default)
    }

    /// Like [`GreeterConfig::load`], but a missing file yields defaults
    /// rooted at `data_dir`.
    pub fn load_in(path: impl AsRef<Path>, data_dir: &Path) -> GreeterResult<Self> {
        Self::load_or(path, || Self::with_data_dir(data_dir.to_path_buf()))
    }

    fn load_or(path: impl AsRef<Path>, fallback: impl FnOnce() -> Self) -> GreeterResult<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| GreeterError::Config(format!("Failed to read config: {}", e)))?;

            toml::from_str(&contents)
                .map_err(|e| GreeterError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            info!("Config file not found, using defaults");
            fallback()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> GreeterResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| GreeterError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GreeterError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path.as_ref(), contents)
            .map_err(|e| GreeterError::Config(format!("Failed to write config: {}", e)))?;

        info!("Configuration saved to {:?}", path.as_ref());
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("GREETER_COMMITMENTS") {
            self.commitments_path = PathBuf::from(path);
        }

        if let Ok(dir) = std::env::var("GREETER_KEYS_DIR") {
            self.keys_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("GREETER_REGISTRY_PATH") {
            self.registry_path = PathBuf::from(path);
        }

        if let Ok(depth) = std::env::var("GREETER_TREE_DEPTH") {
            match depth.parse() {
                Ok(d) => self.tree_depth = d,
                Err(_) => warn!("Ignoring invalid GREETER_TREE_DEPTH: {}", depth),
            }
        }

        if let Ok(scope) = std::env::var("GREETER_EXTERNAL_NULLIFIER") {
            match scope.parse() {
                Ok(s) => self.external_nullifier = s,
                Err(e) => warn!("Ignoring invalid GREETER_EXTERNAL_NULLIFIER: {}", e),
            }
        }

        if let Ok(level) = std::env::var("GREETER_LOG_LEVEL") {
            self.logging.level = level.parse().unwrap_or(LogLevel::Info);
        }

        if std::env::var("GREETER_LOG_JSON").is_ok() {
            self.logging.json = true;
        }
    }

    pub fn validate(&self) -> GreeterResult<()> {
        if self.tree_depth == 0 || self.tree_depth > MAX_TREE_DEPTH {
            return Err(GreeterError::Config(format!(
                "tree_depth must be between 1 and {}",
                MAX_TREE_DEPTH
            )));
        }

        if self.event_buffer == 0 {
            return Err(GreeterError::Config("event_buffer cannot be 0".into()));
        }

        if self.root_history_size > MAX_ROOT_HISTORY {
            return Err(GreeterError::Config(format!(
                "root_history_size cannot exceed {}",
                MAX_ROOT_HISTORY
            )));
        }

        if self.tree_depth != DEFAULT_TREE_DEPTH {
            warn!(
                "tree_depth {} differs from the deployed circuit depth {}; keys must match",
                self.tree_depth, DEFAULT_TREE_DEPTH
            );
        }

        Ok(())
    }
}
