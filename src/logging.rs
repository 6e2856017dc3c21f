/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::RouterConfig;
use crate::error::{Result, RouterError};

/// Directive used when `RUST_LOG` is not set
pub fn default_directive(config: &RouterConfig) -> String {
    let level = if config.verbose {
        Level::DEBUG
    } else {
        config.log_level.to_tracing_level()
    };
    format!("lz_router={}", level)
}

/// Initialize structured logging based on configuration
pub fn init_logging(config: &RouterConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(config)))
        .map_err(|e| RouterError::Config(format!("Failed to create log filter: {}", e)))?;

    if let Some(ref log_path) = config.log_file {
        init_file_logging(log_path, env_filter)?;
    } else {
        init_stderr_logging(env_filter);
    }

    Ok(())
}

/// Initialize logging to stderr, leaving stdout for command output
fn init_stderr_logging(env_filter: EnvFilter) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Initialize JSON logging to a file
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = File::create(log_path)
        .map_err(|e| RouterError::Config(format!("Failed to create log file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

/// Initialize logging for tests
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lz_router=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_default_directive_uses_level() {
        let config = RouterConfig {
            log_level: LogLevel::Warn,
            ..Default::default()
        };
        assert_eq!(default_directive(&config), "lz_router=WARN");
    }

    #[test]
    fn test_verbose_overrides_log_level() {
        let config = RouterConfig {
            log_level: LogLevel::Error,
            verbose: true,
            ..Default::default()
        };
        assert_eq!(default_directive(&config), "lz_router=DEBUG");
    }

    #[test]
    fn test_bad_log_file_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = RouterConfig {
            log_file: Some(dir.path().join("missing-dir").join("router.log")),
            ..Default::default()
        };
        // Fails before a subscriber is installed, so it cannot clash with other tests
        let err = init_logging(&config).unwrap_err();
        assert!(matches!(err, RouterError::Config(_)));
    }
}
