use crate::domain::PathRules;
use crate::infra::{FailureKind, ResolveProjectsDirError, resolve_projects_dir};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Settings read from `config.json` in the state directory. Every field is
/// optional in the file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub projects_dir: Option<PathBuf>,
    pub path_prefixes: Vec<String>,
    pub heartbeat_secs: u64,
    pub replay_existing: bool,
    pub channel_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            projects_dir: None,
            path_prefixes: Vec::new(),
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            replay_existing: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Settings {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    /// `CLAUDE_PROJECTS_DIR` wins over the file, the file over the default.
    pub fn resolve_projects_dir(&self) -> Result<PathBuf, ResolveProjectsDirError> {
        if std::env::var_os("CLAUDE_PROJECTS_DIR").is_none() {
            if let Some(dir) = &self.projects_dir {
                return Ok(dir.clone());
            }
        }
        resolve_projects_dir()
    }

    pub fn path_rules(&self) -> PathRules {
        let home = dirs::home_dir().map(|home| home.to_string_lossy().to_string());
        PathRules::new(home.as_deref(), &self.path_prefixes)
    }
}

#[derive(Debug, Error)]
pub enum ResolveStateDirError {
    #[error("home directory not found")]
    HomeDirNotFound,
}

pub fn resolve_state_dir() -> Result<PathBuf, ResolveStateDirError> {
    if let Some(override_dir) = std::env::var_os("CCTHREADS_STATE_DIR") {
        return Ok(PathBuf::from(override_dir));
    }
    let Some(home) = dirs::home_dir() else {
        return Err(ResolveStateDirError::HomeDirNotFound);
    };
    Ok(home.join(".ccthreads"))
}

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error(transparent)]
    StateDir(#[from] ResolveStateDirError),

    #[error("failed to read config: {0}")]
    Read(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

impl LoadConfigError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Read(_) => FailureKind::Transient,
            Self::StateDir(_) | Self::Parse(_) | Self::Invalid(_) => FailureKind::Setup,
        }
    }
}

fn config_path(state_dir: &Path) -> PathBuf {
    state_dir.join("config.json")
}

pub fn load_settings(state_dir: &Path) -> Result<Settings, LoadConfigError> {
    let path = config_path(state_dir);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Ok(Settings::default());
        }
        Err(error) => return Err(error.into()),
    };

    let settings: Settings = serde_json::from_str(&raw)?;
    if settings.heartbeat_secs == 0 {
        return Err(LoadConfigError::Invalid("heartbeatSecs must be positive"));
    }
    if settings.channel_capacity == 0 {
        return Err(LoadConfigError::Invalid("channelCapacity must be positive"));
    }
    tracing::debug!(path = %path.display(), "loaded settings");
    Ok(settings)
}

pub fn load_default_settings() -> Result<Settings, LoadConfigError> {
    load_settings(&resolve_state_dir()?)
}
