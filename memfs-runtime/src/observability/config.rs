//! Logging configuration read from the environment.

use std::str::FromStr;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi-line human-readable output.
    Pretty,
    /// Compact single-line format.
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            "compact" => Self::Compact,
            _ => Self::default(),
        })
    }
}

/// What [`init_tracing`](super::init_tracing) installs.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    log_format: LogFormat,
    /// Filter directives, e.g. "info" or "warn,memfs::guest=info".
    log_filter: String,
    include_location: bool,
    include_thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_filter: "warn".to_string(),
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl TracingConfig {
    /// Read the configuration from the process environment.
    ///
    /// - `MEMFS_LOG_FORMAT`: "json", "pretty", or "compact"; defaults to
    ///   compact on a terminal and json otherwise
    /// - `MEMFS_LOG_LEVEL` or `RUST_LOG`: filter directives
    /// - `MEMFS_LOG_LOCATION`: "true" or "1" to print file and line
    /// - `MEMFS_LOG_THREAD_IDS`: "true" or "1" to print thread ids
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok(), stderr_is_terminal())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>, terminal: bool) -> Self {
        let log_format = match lookup("MEMFS_LOG_FORMAT") {
            Some(format) => format.parse::<LogFormat>().unwrap_or_default(),
            None if terminal => LogFormat::Compact,
            None => LogFormat::Json,
        };
        let log_filter = lookup("MEMFS_LOG_LEVEL")
            .or_else(|| lookup("RUST_LOG"))
            .unwrap_or_else(|| Self::default().log_filter);
        let flag = |name: &str| lookup(name).is_some_and(|v| v == "true" || v == "1");

        Self {
            log_format,
            log_filter,
            include_location: flag("MEMFS_LOG_LOCATION"),
            include_thread_ids: flag("MEMFS_LOG_THREAD_IDS"),
        }
    }

    /// Replace the filter directives.
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Get the log format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Get the log filter.
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Check if source location should be included.
    pub fn include_location(&self) -> bool {
        self.include_location
    }

    /// Check if thread IDs should be included.
    pub fn include_thread_ids(&self) -> bool {
        self.include_thread_ids
    }
}

/// Logs go to stderr; guest output owns stdout.
fn stderr_is_terminal() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)], terminal: bool) -> TracingConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TracingConfig::from_lookup(|name| vars.get(name).cloned(), terminal)
    }

    #[test]
    fn format_defaults_depend_on_terminal() {
        assert_eq!(from_vars(&[], true).log_format(), LogFormat::Compact);
        assert_eq!(from_vars(&[], false).log_format(), LogFormat::Json);
        assert_eq!(
            from_vars(&[("MEMFS_LOG_FORMAT", "Pretty")], false).log_format(),
            LogFormat::Pretty
        );
    }

    #[test]
    fn memfs_level_wins_over_rust_log() {
        let config = from_vars(&[("RUST_LOG", "debug")], true);
        assert_eq!(config.log_filter(), "debug");

        let config = from_vars(
            &[("RUST_LOG", "debug"), ("MEMFS_LOG_LEVEL", "trace")],
            true,
        );
        assert_eq!(config.log_filter(), "trace");

        assert_eq!(from_vars(&[], true).log_filter(), "warn");
    }

    #[test]
    fn flags_accept_true_or_one() {
        let config = from_vars(
            &[("MEMFS_LOG_LOCATION", "1"), ("MEMFS_LOG_THREAD_IDS", "yes")],
            true,
        );
        assert!(config.include_location());
        assert!(!config.include_thread_ids());

        let config = from_vars(&[("MEMFS_LOG_THREAD_IDS", "true")], true);
        assert!(config.include_thread_ids());
    }
}
