//! Startup configuration.
//!
//! Settings are resolved once, before the terminal is taken over, from (in
//! order of precedence) command-line overrides, environment variables, the
//! optional `config.toml`, and built-in defaults. The resolved [`Settings`]
//! are immutable for the rest of the session.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_THEME: &str = "dark";

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const MODEL_VAR: &str = "OPENAI_MODEL";
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
pub const CONFIG_PATH_VAR: &str = "PARLEY_CONFIG";

/// How replies are requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Server-sent events; the reply grows on screen as it arrives.
    #[default]
    Streaming,
    /// One request, one complete reply.
    Batched,
}

impl ResponseMode {
    pub fn is_streaming(self) -> bool {
        self == ResponseMode::Streaming
    }
}

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub default_model: Option<String>,
    pub base_url: Option<String>,
    pub theme: Option<String>,
    pub stream: Option<bool>,
}

/// Values supplied on the command line; they win over everything else.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub theme: Option<String>,
    pub batch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub theme: String,
    pub mode: ResponseMode,
}

/// Errors that can occur while resolving configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as valid TOML.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// No API credential in the environment.
    MissingApiKey,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config at {}: {}", path.display(), source)
            }
            ConfigError::MissingApiKey => write!(f, "{API_KEY_VAR} not found in environment or .env file"),
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::MissingApiKey => None,
        }
    }
}

impl ConfigFile {
    /// Load `config.toml` from `path`. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Location of `config.toml`, honouring the `PARLEY_CONFIG` override.
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = non_empty(std::env::var(CONFIG_PATH_VAR).ok()) {
        return Some(PathBuf::from(path));
    }
    ProjectDirs::from("org", "parley", "parley").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load a `.env` file into the process environment. With no path, the file
/// is searched for from the working directory upwards. Variables that are
/// already set keep their values.
pub fn load_dotenv(path: Option<&Path>) -> Option<PathBuf> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };

    match loaded {
        Ok(path) => {
            debug!(path = %path.display(), "loaded .env file");
            Some(path)
        }
        Err(err) if err.not_found() => {
            debug!("no .env file found");
            None
        }
        Err(err) => {
            warn!(error = %err, "ignoring unreadable .env file");
            None
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Settings {
    /// Resolve settings from the process environment and the config file.
    pub fn load(overrides: &Overrides) -> Result<Self, ConfigError> {
        let file = match config_path() {
            Some(path) => ConfigFile::load_from_path(&path)?,
            None => ConfigFile::default(),
        };
        Self::resolve(overrides, &file, |name| std::env::var(name).ok())
    }

    /// Merge the layers. `env` looks up an environment variable by name.
    pub fn resolve<F>(overrides: &Overrides, file: &ConfigFile, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = non_empty(env(API_KEY_VAR)).ok_or(ConfigError::MissingApiKey)?;

        let model = non_empty(overrides.model.clone())
            .or_else(|| non_empty(env(MODEL_VAR)))
            .or_else(|| non_empty(file.default_model.clone()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let base_url = non_empty(overrides.base_url.clone())
            .or_else(|| non_empty(env(BASE_URL_VAR)))
            .or_else(|| non_empty(file.base_url.clone()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let theme = non_empty(overrides.theme.clone())
            .or_else(|| non_empty(file.theme.clone()))
            .unwrap_or_else(|| DEFAULT_THEME.to_string());

        let mode = if overrides.batch || file.stream == Some(false) {
            ResponseMode::Batched
        } else {
            ResponseMode::Streaming
        };

        Ok(Settings {
            api_key,
            model,
            base_url,
            theme,
            mode,
        })
    }
}
