//! Server and worker configuration files.
//!
//! Both files are TOML; every field has a default so an empty file is a
//! valid configuration, apart from the worker's processor command.

use crate::run::services::ShutdownSettings;
use crate::worker::services::WorkerSettings;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {reason}")]
    Io {
        /// Configuration file path.
        path: String,
        /// Underlying I/O message.
        reason: String,
    },

    /// The file is not valid TOML for the expected shape.
    #[error("failed to parse {path}: {reason}")]
    Parse {
        /// Configuration file path.
        path: String,
        /// Parser message.
        reason: String,
    },

    /// A field holds an unusable value.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Configuration of `repowright server`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address the HTTP API listens on.
    pub listen_addr: String,
    /// SQLite database file.
    pub database_path: Utf8PathBuf,
    /// Directory of task files.
    pub tasks_dir: Utf8PathBuf,
    /// Secret for GitHub webhook signatures; the route is mounted only when
    /// set.
    pub github_webhook_secret: Option<String>,
    /// Shared token for GitLab webhooks; the route is mounted only when set.
    pub gitlab_webhook_token: Option<String>,
    /// Interval between running-run counts while draining.
    pub shutdown_check_interval_ms: u64,
    /// Upper bound on the drain.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3035".to_owned(),
            database_path: Utf8PathBuf::from("repowright.db"),
            tasks_dir: Utf8PathBuf::from("tasks"),
            github_webhook_secret: None,
            gitlab_webhook_token: None,
            shutdown_check_interval_ms: 1_000,
            shutdown_timeout_secs: 300,
        }
    }
}

impl ServerConfig {
    /// Loads and validates a server configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed or
    /// validated.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let config: Self = load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the text does not parse or validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = parse_toml("<inline>", text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks field values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.shutdown_check_interval_ms == 0 {
            return Err(invalid("shutdown_check_interval_ms", "must be greater than zero"));
        }
        if self.shutdown_timeout_secs == 0 {
            return Err(invalid("shutdown_timeout_secs", "must be greater than zero"));
        }
        reject_blank("github_webhook_secret", self.github_webhook_secret.as_deref())?;
        reject_blank("gitlab_webhook_token", self.gitlab_webhook_token.as_deref())
    }

    /// Returns the parsed listen address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `listen_addr` is not a socket
    /// address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|err: std::net::AddrParseError| invalid("listen_addr", &err.to_string()))
    }

    /// Returns the drain timing.
    #[must_use]
    pub const fn shutdown_settings(&self) -> ShutdownSettings {
        ShutdownSettings {
            check_interval: Duration::from_millis(self.shutdown_check_interval_ms),
            timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }
}

/// Configuration of `repowright worker`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Base URL of the server, e.g. `http://localhost:3035`.
    pub server_base_url: String,
    /// Directory of task files; must match the server's.
    pub tasks_dir: Utf8PathBuf,
    /// Maximum number of runs executing at once.
    pub parallel_executions: usize,
    /// Interval between work requests.
    pub poll_interval_ms: u64,
    /// Interval between progress messages while draining.
    pub drain_log_interval_secs: u64,
    /// Program and arguments executing one run.
    pub processor_command: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server_base_url: "http://localhost:3035".to_owned(),
            tasks_dir: Utf8PathBuf::from("tasks"),
            parallel_executions: 1,
            poll_interval_ms: 10_000,
            drain_log_interval_secs: 10,
            processor_command: Vec::new(),
        }
    }
}

impl WorkerConfig {
    /// Loads and validates a worker configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed or
    /// validated.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let config: Self = load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the text does not parse or validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = parse_toml("<inline>", text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks field values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server_base_url.starts_with("http://") || self.server_base_url.starts_with("https://")) {
            return Err(invalid("server_base_url", "must be an http or https URL"));
        }
        if self.parallel_executions == 0 {
            return Err(invalid("parallel_executions", "must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", "must be greater than zero"));
        }
        if self.drain_log_interval_secs == 0 {
            return Err(invalid("drain_log_interval_secs", "must be greater than zero"));
        }
        match self.processor_command.first() {
            Some(program) if !program.trim().is_empty() => Ok(()),
            _ => Err(invalid("processor_command", "must name a program")),
        }
    }

    /// Returns the worker loop tunables.
    #[must_use]
    pub const fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            parallel_executions: self.parallel_executions,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            drain_log_interval: Duration::from_secs(self.drain_log_interval_secs),
        }
    }

    /// Splits the processor command into program and arguments.
    #[must_use]
    pub fn processor_program(&self) -> Option<(&str, &[String])> {
        self.processor_command
            .split_first()
            .map(|(program, args)| (program.as_str(), args))
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_owned(),
    }
}

fn reject_blank(field: &'static str, value: Option<&str>) -> Result<(), ConfigError> {
    match value {
        Some(text) if text.trim().is_empty() => Err(invalid(field, "must not be blank")),
        _ => Ok(()),
    }
}

fn load_toml<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, ConfigError> {
    let io_error = |err: std::io::Error| ConfigError::Io {
        path: path.to_string(),
        reason: err.to_string(),
    };
    let parent = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| ConfigError::Io {
        path: path.to_string(),
        reason: "path has no file name".to_owned(),
    })?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(io_error)?;
    let text = dir.read_to_string(file_name).map_err(io_error)?;
    parse_toml(path.as_str(), &text)
}

fn parse_toml<T: DeserializeOwned>(path: &str, text: &str) -> Result<T, ConfigError> {
    toml::from_str(text).map_err(|err| ConfigError::Parse {
        path: path.to_owned(),
        reason: err.to_string(),
    })
}
