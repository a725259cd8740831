//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the configured level. When a log directory is
//! configured, output goes to a daily rolling file through a non-blocking
//! writer; the returned guard must be held until shutdown so buffered lines
//! are flushed.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSection;

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(cfg: &LoggingSection) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);

    match &cfg.dir {
        Some(dir) => {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("Failed to create log directory {}: {}", dir.display(), e);
                return None;
            }
            let appender = tracing_appender::rolling::daily(dir, "panichd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let builder = builder.with_writer(writer).with_ansi(false);
            let _ = if cfg.json {
                builder.json().try_init()
            } else {
                builder.try_init()
            };
            Some(guard)
        }
        None => {
            let _ = if cfg.json {
                builder.json().try_init()
            } else {
                builder.try_init()
            };
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        let cfg = LoggingSection::default();
        assert!(init_logging(&cfg).is_none());
        assert!(init_logging(&cfg).is_none());
    }

    #[test]
    fn test_init_logging_with_dir_returns_guard() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = LoggingSection {
            level: "debug".to_string(),
            json: true,
            dir: Some(dir.path().join("logs")),
        };
        let guard = init_logging(&cfg);
        assert!(guard.is_some());
        assert!(dir.path().join("logs").exists());
    }
}
