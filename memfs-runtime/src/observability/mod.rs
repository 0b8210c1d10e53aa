//! Host-side logging.
//!
//! Format and filtering are controlled by environment variables when
//! configured through [`TracingConfig::from_env`]:
//! - `MEMFS_LOG_FORMAT` - `json`, `pretty` or `compact`
//! - `MEMFS_LOG_LEVEL` (falling back to `RUST_LOG`) - filter directives
//! - `MEMFS_LOG_LOCATION`, `MEMFS_LOG_THREAD_IDS` - `true` or `1` to enable
//!
//! Lines printed by guests through [`memfs_core::TracingSink`] and the
//! filesystem's own `memfs_log` messages use the `memfs::guest` target, so
//! `MEMFS_LOG_LEVEL=warn,memfs::guest=info` shows guest chatter only.
//!
//! ```ignore
//! use memfs_runtime::observability::{TracingConfig, init_tracing};
//!
//! let config = TracingConfig::from_env().with_log_filter("debug");
//! init_tracing(config)?;
//! ```

mod config;
mod tracing_setup;

pub use config::{LogFormat, TracingConfig};
pub use tracing_setup::init_tracing;

pub use memfs_core::output::GUEST_TARGET;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.log_format(), LogFormat::Compact);
        assert_eq!(config.log_filter(), "warn");
        assert!(!config.include_location());
    }

    #[test]
    fn filter_override_keeps_other_settings() {
        let config = TracingConfig::from_env();
        let format = config.log_format();
        let location = config.include_location();

        let config = config.with_log_filter("trace");
        assert_eq!(config.log_filter(), "trace");
        assert_eq!(config.log_format(), format);
        assert_eq!(config.include_location(), location);
    }

    #[test]
    fn unknown_format_falls_back() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("fancy".parse::<LogFormat>().unwrap(), LogFormat::Compact);
    }

    #[test]
    fn tracing_sink_logs_under_guest_target() {
        use memfs_core::{LineSink, OutputAggregator, TracingSink};
        use std::io::Write;
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl Write for Captured {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut out = OutputAggregator::new(TracingSink);
            out.write("compiling a.c\npart");
            out.flush();
            TracingSink.emit_line("done");
        });

        let text = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.contains(GUEST_TARGET)));
        assert!(lines[0].ends_with("compiling a.c"));
        assert!(lines[1].ends_with("part"));
        assert!(lines[2].ends_with("done"));
    }

    #[test]
    fn config_from_env() {
        // Must not panic with or without the variables set.
        let config = TracingConfig::from_env();
        assert!(!config.log_filter().is_empty());
    }
}
