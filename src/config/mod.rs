//! Relay configuration
//!
//! One JSON file, every field optional:
//!
//! ```json
//! {
//!   "port": 8000,
//!   "data_dir": "~/.shadow-relay/sessions",
//!   "idle_timeout_secs": 30,
//!   "allowed_work_dirs": ["."],
//!   "permissions": {"default_policy": "ask", "tools": {"fs_read": "allow"}},
//!   "profiles": {"coder": {"provider": "anthropic", "model": "claude-sonnet-4-5"}},
//!   "log": {"dir": "logs", "json": true}
//! }
//! ```

mod profile;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{RelayError, RelayResult};
use crate::permissions::PermissionSchema;

pub use profile::{Profile, ProfileSet, Provider, DEFAULT_PROFILE};

/// Directory under `$HOME` holding config, sessions and context files
pub const HOME_DIR_NAME: &str = ".shadow-relay";

/// Top-level relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub host: String,

    pub port: u16,

    /// Where session records are stored
    pub data_dir: PathBuf,

    /// Seconds with no connections before the process shuts down
    pub idle_timeout_secs: u64,

    /// Auto-deny approval requests after this many seconds (unset = wait forever)
    pub approval_timeout_secs: Option<u64>,

    /// Roots the file tools may touch
    pub allowed_work_dirs: Vec<String>,

    /// Schema for profiles without their own
    pub permissions: Option<PermissionSchema>,

    pub profiles: HashMap<String, Profile>,

    pub log: LogConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            data_dir: home_dir().join(HOME_DIR_NAME).join("sessions"),
            idle_timeout_secs: 30,
            approval_timeout_secs: None,
            allowed_work_dirs: vec![".".to_string()],
            permissions: None,
            profiles: HashMap::new(),
            log: LogConfig::default(),
        }
    }
}

/// Logging options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory for daily-rolling log files (unset = stderr only)
    pub dir: Option<PathBuf>,

    pub file_prefix: String,

    /// Write JSON lines to the log file
    pub json: bool,

    /// Filter used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            file_prefix: "shadow-relay.log".to_string(),
            json: false,
            filter: "shadow_relay=info".to_string(),
        }
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

impl RelayConfig {
    /// `~/.shadow-relay/config.json`
    pub fn default_path() -> PathBuf {
        home_dir().join(HOME_DIR_NAME).join("config.json")
    }

    /// Load a config file
    pub fn load(path: &Path) -> RelayResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RelayError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: RelayConfig = serde_json::from_str(&raw).map_err(|e| {
            RelayError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load `path` if given, else the default file if present, else defaults
    pub fn load_or_default(path: Option<&Path>) -> RelayResult<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let default_path = Self::default_path();
        if default_path.is_file() {
            Self::load(&default_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> RelayResult<()> {
        if self.idle_timeout_secs == 0 {
            return Err(RelayError::InvalidConfig(
                "idle_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.approval_timeout_secs == Some(0) {
            return Err(RelayError::InvalidConfig(
                "approval_timeout_secs must be greater than zero when set".into(),
            ));
        }
        if self.allowed_work_dirs.iter().any(|d| d.trim().is_empty()) {
            return Err(RelayError::InvalidConfig(
                "allowed_work_dirs entries must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout_secs.map(Duration::from_secs)
    }

    pub fn profile_set(&self) -> ProfileSet {
        ProfileSet::new(self.profiles.clone())
    }

    /// Schema for a profile: its own, else the relay-wide one, else the fallback
    pub fn schema_for(&self, profile: &Profile) -> PermissionSchema {
        profile
            .permissions
            .clone()
            .or_else(|| self.permissions.clone())
            .unwrap_or_default()
    }

    /// `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `data_dir` with a leading `~` expanded
    pub fn sessions_dir(&self) -> PathBuf {
        match self.data_dir.strip_prefix("~") {
            Ok(rest) => home_dir().join(rest),
            Err(_) => self.data_dir.clone(),
        }
    }
}
