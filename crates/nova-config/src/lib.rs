//! Configuration for the notebook debug adapter.
//!
//! Config files are TOML. Every key is optional; missing keys fall back to the
//! defaults documented on each field.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod diagnostics;
mod logging;
mod schema;

pub use diagnostics::{ConfigDiagnostics, ConfigValidationError};
pub use logging::{global_log_buffer, init_tracing, LogBuffer, LogRecord};
pub use schema::json_schema;

/// Adapter-type identifier the host uses to route session requests to us.
pub const DEFAULT_ADAPTER_TYPE: &str = "kernel-notebook-debugger";

/// URI scheme the editor uses for cells inside a notebook document.
pub const DEFAULT_CELL_SCHEME: &str = "vscode-notebook-cell";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct NovaConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub debugger: DebuggerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level for all Nova crates.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Mirror logs to stderr (in addition to the in-memory buffer).
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to the given file path (in addition to the in-memory buffer).
    ///
    /// If the file cannot be opened, file logging is disabled while other sinks
    /// remain active.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub file: Option<PathBuf>,

    /// Number of log lines kept in memory for bug reports.
    #[serde(default = "LoggingConfig::default_buffer_lines")]
    #[schemars(range(min = 1))]
    pub buffer_lines: usize,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    pub(crate) fn default_buffer_lines() -> usize {
        2_000
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            // Anything else is treated as an `EnvFilter` directive string.
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// Create the effective `EnvFilter`.
    ///
    /// `level` may be either a simple level (`info`, `debug`, ...) or a full
    /// `tracing_subscriber::EnvFilter` directive string. If `RUST_LOG` is set,
    /// it is merged into the resulting filter.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
            buffer_lines: Self::default_buffer_lines(),
        }
    }
}

/// What to do when a session is toggled off while another debug session is
/// in the host's foreground.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Only stop the session when it is the host's active debug session.
    #[default]
    Foreground,
    /// Stop the session regardless of which session is in the foreground.
    Always,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct DebuggerConfig {
    /// Adapter-type identifier registered with the host.
    #[serde(default = "DebuggerConfig::default_adapter_type")]
    pub adapter_type: String,

    /// Display name used when asking the host to start a session.
    #[serde(default = "DebuggerConfig::default_session_name")]
    pub session_name: String,

    /// URI scheme identifying notebook cell addresses.
    #[serde(default = "DebuggerConfig::default_cell_scheme")]
    pub cell_scheme: String,

    #[serde(default)]
    pub stop_policy: StopPolicy,
}

impl DebuggerConfig {
    fn default_adapter_type() -> String {
        DEFAULT_ADAPTER_TYPE.to_owned()
    }

    fn default_session_name() -> String {
        "Debug Notebook".to_owned()
    }

    fn default_cell_scheme() -> String {
        DEFAULT_CELL_SCHEME.to_owned()
    }
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            adapter_type: Self::default_adapter_type(),
            session_name: Self::default_session_name(),
            cell_scheme: Self::default_cell_scheme(),
            stop_policy: StopPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` includes a source snippet; keep just the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl NovaConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = read_config_file(path.as_ref())?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a config file from TOML and return diagnostics (unknown keys and
    /// semantic validation failures).
    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let text = read_config_file(path.as_ref())?;
        Self::load_from_str_with_diagnostics(&text)
    }

    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let (config, unknown_keys) =
            diagnostics::deserialize_toml_with_unknown_keys::<NovaConfig>(text)?;

        let diagnostics = ConfigDiagnostics {
            unknown_keys,
            errors: config.validate(),
        };
        Ok((config, diagnostics))
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        if self.debugger.adapter_type.trim().is_empty() {
            errors.push(ConfigValidationError::EmptyValue {
                toml_path: "debugger.adapter_type".to_owned(),
            });
        }
        if self.debugger.cell_scheme.trim().is_empty() {
            errors.push(ConfigValidationError::EmptyValue {
                toml_path: "debugger.cell_scheme".to_owned(),
            });
        }
        if self.logging.buffer_lines == 0 {
            errors.push(ConfigValidationError::InvalidValue {
                toml_path: "logging.buffer_lines".to_owned(),
                message: "must be at least 1".to_owned(),
            });
        }
        errors
    }
}

fn read_config_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}
