use crate::error::{DaylogError, Result};
use crate::levels::LevelDescriptor;
use crate::logs::ConsoleOutput;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Logical log name used when a logger does not name one
pub const DEFAULT_LOG_NAME: &str = "daemon";

/// Process-wide defaults consulted when a logger leaves a setting unspecified
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDefaults {
    /// Directory for log files; `None` disables file logging
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Threshold level name
    #[serde(default)]
    pub log_level: Option<String>,
}

impl LogDefaults {
    /// Load defaults from a file (supports TOML and JSON)
    ///
    /// The settings may sit at the top level or under a `[logging]` table.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DaylogError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut defaults = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(DaylogError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        defaults.log_dir = defaults.log_dir.map(|dir| expand_env_in_path(&dir));
        Ok(defaults)
    }

    fn parse_toml(contents: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct ConfigFile {
            logging: Option<LogDefaults>,
            #[serde(flatten)]
            top_level: LogDefaults,
        }

        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| DaylogError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?;

        Ok(file.logging.unwrap_or(file.top_level))
    }

    fn parse_json(contents: &str) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ConfigFile {
            Nested { logging: LogDefaults },
            TopLevel(LogDefaults),
        }

        let file: ConfigFile = serde_json::from_str(contents)
            .map_err(|e| DaylogError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?;

        Ok(match file {
            ConfigFile::Nested { logging } => logging,
            ConfigFile::TopLevel(defaults) => defaults,
        })
    }
}

/// Per-logger construction options. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerOptions {
    /// Directory for log files (falls back to [`LogDefaults::log_dir`])
    pub log_dir: Option<PathBuf>,

    /// Disable file logging regardless of any directory
    pub no_file: bool,

    /// Threshold level name (falls back to [`LogDefaults::log_level`], then "debug")
    pub log_level: Option<String>,

    /// Logical log name shared with other loggers (defaults to "daemon")
    pub log_name: Option<String>,

    /// Extra or replacement levels merged over the standard table
    pub levels: HashMap<String, LevelDescriptor>,

    /// Disable console output
    pub no_console: bool,

    /// Write one persistent file instead of one per day
    pub no_rotation: bool,

    /// Log panics at `emerg` through this logger
    pub handle_exceptions: bool,

    /// Console destination
    #[serde(skip)]
    pub console_output: ConsoleOutput,
}

/// Expand `$VAR` and `${VAR}` in a string.
///
/// `$VAR` takes the longest run of name characters; unset variables are left
/// as written.
fn expand_env_in_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        match valid.then(|| std::env::var(name).ok()).flatten() {
            Some(value) => result.push_str(&value),
            None => result.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }

    result.push_str(rest);
    result
}

fn expand_env_in_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_env_in_string(&path.to_string_lossy()))
}
