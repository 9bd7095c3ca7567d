//! Logging setup for the prodmap binary.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "PRODMAP_LOG";

/// Pick the filter directive.
///
/// `PRODMAP_LOG` wins over `RUST_LOG`; without either, `-v` and `-vv` raise
/// the default `warn` level.
pub fn filter_directive(verbosity: u8) -> String {
    for var in [LOG_ENV, "RUST_LOG"] {
        if let Ok(value) = std::env::var(var) {
            if !value.trim().is_empty() {
                return value;
            }
        }
    }

    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
    .to_string()
}

/// Install the stderr subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(verbosity: u8) {
    let filter = EnvFilter::try_new(filter_directive(verbosity))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_verbosity_levels() {
        env::remove_var(LOG_ENV);
        env::remove_var("RUST_LOG");

        assert_eq!(filter_directive(0), "warn");
        assert_eq!(filter_directive(1), "info");
        assert_eq!(filter_directive(5), "debug");
    }

    #[test]
    #[serial]
    fn test_env_precedence() {
        env::set_var("RUST_LOG", "info");
        env::set_var(LOG_ENV, "prodmap=debug");
        assert_eq!(filter_directive(0), "prodmap=debug");

        env::remove_var(LOG_ENV);
        assert_eq!(filter_directive(2), "info");

        env::remove_var("RUST_LOG");
    }
}
