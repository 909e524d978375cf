//! Reporting configuration loading and handling
//!
//! Configuration is resolved from two sources, environment variables taking
//! precedence over an optional `.testreporter.conf` properties file (INI
//! format with a [DEFAULT] section). When `REPORTING_ENABLED` is absent from
//! both sources the agent stays disabled and detaches from the test host.

use crate::error::{Error, Result};
use crate::model::LaunchMode;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable names understood by [`ReportingConfig::from_env`].
pub mod env_keys {
    pub const ENABLED: &str = "REPORTING_ENABLED";
    pub const RUN_DISPLAY_NAME: &str = "REPORTING_RUN_DISPLAY_NAME";
    pub const RUN_BUILD: &str = "REPORTING_RUN_BUILD";
    pub const RUN_ENVIRONMENT: &str = "REPORTING_RUN_ENVIRONMENT";
    pub const RUN_LOCALE: &str = "REPORTING_RUN_LOCALE";
    pub const RUN_TREAT_SKIPS_AS_FAILURES: &str = "REPORTING_RUN_TREAT_SKIPS_AS_FAILURES";
    pub const MILESTONE_ID: &str = "REPORTING_MILESTONE_ID";
    pub const MILESTONE_NAME: &str = "REPORTING_MILESTONE_NAME";
    pub const DEBUG_LOGS_ENABLED: &str = "REPORTING_DEBUG_LOGS_ENABLED";
    pub const CAPTURE_CONSOLE_LOGS: &str = "REPORTING_CAPTURE_CONSOLE_LOGS";
    pub const LOG_FLUSH_INTERVAL_SECONDS: &str = "REPORTING_LOG_FLUSH_INTERVAL_SECONDS";
}

/// Default interval between periodic captured-log flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Resolved agent configuration
#[derive(Debug, Clone)]
pub struct ReportingConfig {
    /// Whether reporting is enabled at all; when false the observer facade
    /// detaches and every callback becomes a no-op.
    pub enabled: bool,

    /// Display name for the run; falls back to "Test Run" when unset.
    pub run_display_name: Option<String>,

    /// Whether standard output is captured in addition to standard error.
    pub launch_mode: LaunchMode,

    /// Whether console streams are intercepted at all. Embedders that manage
    /// their own log forwarding can turn the descriptor redirection off.
    pub capture_console: bool,

    /// Report skipped cases as failed.
    pub skips_as_failures: bool,

    /// Interval between periodic captured-log flushes.
    pub flush_interval: Duration,

    /// Locale label attached to the run.
    pub locale: Option<String>,

    /// Milestone the run belongs to.
    pub milestone_id: Option<u64>,
    pub milestone_name: Option<String>,

    /// Build identifier recorded in the run configuration.
    pub build: Option<String>,

    /// Environment name recorded in the run configuration.
    pub environment: Option<String>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        ReportingConfig {
            enabled: false,
            run_display_name: None,
            launch_mode: LaunchMode::Default,
            capture_console: true,
            skips_as_failures: false,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            locale: None,
            milestone_id: None,
            milestone_name: None,
            build: None,
            environment: None,
        }
    }
}

impl ReportingConfig {
    /// Returns an enabled configuration with defaults, for embedding callers
    /// that configure the agent in code rather than via the environment.
    pub fn enabled() -> Self {
        ReportingConfig {
            enabled: true,
            ..Default::default()
        }
    }

    /// Resolve configuration from the process environment.
    ///
    /// Missing `REPORTING_ENABLED` yields a disabled configuration rather
    /// than an error.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    /// Resolve configuration from an explicit key/value map using the
    /// environment-variable key names.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        let mut config = ReportingConfig::default();

        match vars.get(env_keys::ENABLED) {
            Some(value) => config.enabled = value == "true",
            None => return Ok(config),
        }
        if !config.enabled {
            return Ok(config);
        }

        config.run_display_name = vars.get(env_keys::RUN_DISPLAY_NAME).cloned();
        config.locale = vars.get(env_keys::RUN_LOCALE).cloned();
        config.build = vars.get(env_keys::RUN_BUILD).cloned();
        config.environment = vars.get(env_keys::RUN_ENVIRONMENT).cloned();
        config.milestone_name = vars.get(env_keys::MILESTONE_NAME).cloned();

        if let Some(value) = vars.get(env_keys::RUN_TREAT_SKIPS_AS_FAILURES) {
            config.skips_as_failures = value == "true";
        }
        if let Some(value) = vars.get(env_keys::DEBUG_LOGS_ENABLED) {
            if value == "true" {
                config.launch_mode = LaunchMode::Debug;
            }
        }
        if let Some(value) = vars.get(env_keys::CAPTURE_CONSOLE_LOGS) {
            config.capture_console = value != "false";
        }
        if let Some(value) = vars.get(env_keys::MILESTONE_ID) {
            let id = value
                .parse::<u64>()
                .map_err(|_| Error::Config(format!("Invalid milestone id: {}", value)))?;
            config.milestone_id = Some(id);
        }
        if let Some(value) = vars.get(env_keys::LOG_FLUSH_INTERVAL_SECONDS) {
            let seconds = value.parse::<u64>().map_err(|_| {
                Error::Config(format!("Invalid log flush interval: {}", value))
            })?;
            if seconds == 0 {
                return Err(Error::Config(
                    "Log flush interval must be at least one second".to_string(),
                ));
            }
            config.flush_interval = Duration::from_secs(seconds);
        }

        Ok(config)
    }

    /// Load configuration from a .testreporter.conf properties file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        Self::parse(&contents)
    }

    /// Parse configuration from an INI string with a [DEFAULT] section
    pub fn parse(contents: &str) -> Result<Self> {
        let ini: HashMap<String, HashMap<String, String>> = serde_ini::from_str(contents)
            .map_err(|e| Error::Config(format!("Failed to parse configuration: {}", e)))?;

        let default = ini
            .get("DEFAULT")
            .ok_or_else(|| Error::Config("No [DEFAULT] section in configuration".to_string()))?;

        // Reuse the env-key resolution so both sources share one vocabulary:
        // file keys are the env names lowercased without the REPORTING_ prefix.
        let mut vars = HashMap::new();
        for (key, env_key) in [
            ("enabled", env_keys::ENABLED),
            ("run_display_name", env_keys::RUN_DISPLAY_NAME),
            ("run_build", env_keys::RUN_BUILD),
            ("run_environment", env_keys::RUN_ENVIRONMENT),
            ("run_locale", env_keys::RUN_LOCALE),
            (
                "run_treat_skips_as_failures",
                env_keys::RUN_TREAT_SKIPS_AS_FAILURES,
            ),
            ("milestone_id", env_keys::MILESTONE_ID),
            ("milestone_name", env_keys::MILESTONE_NAME),
            ("debug_logs_enabled", env_keys::DEBUG_LOGS_ENABLED),
            ("capture_console_logs", env_keys::CAPTURE_CONSOLE_LOGS),
            (
                "log_flush_interval_seconds",
                env_keys::LOG_FLUSH_INTERVAL_SECONDS,
            ),
        ] {
            if let Some(value) = default.get(key) {
                vars.insert(env_key.to_string(), value.clone());
            }
        }

        Self::from_map(&vars)
    }

    /// Resolve configuration from the environment, falling back to the given
    /// properties file when `REPORTING_ENABLED` is not set in the environment.
    pub fn resolve(fallback_file: Option<&Path>) -> Result<Self> {
        let from_env = Self::from_env()?;
        if std::env::var(env_keys::ENABLED).is_ok() {
            return Ok(from_env);
        }
        match fallback_file {
            Some(path) if path.exists() => Self::load_from_file(path),
            _ => Ok(from_env),
        }
    }
}
