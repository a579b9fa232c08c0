use crate::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, fmt};
use std::sync::OnceLock;

static LOG_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber once; later calls are no-ops.
/// `RUST_LOG` takes precedence over the configured filter.
pub fn setup_logging(config: &LoggingConfig) {
    LOG_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.filter))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(filter);

        let result = if config.json {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .try_init()
        } else {
            registry
                .with(fmt::layer().with_target(true).with_line_number(true))
                .try_init()
        };

        if let Err(e) = result {
            eprintln!("logging already initialized: {}", e);
        }
    });
}

#[macro_export]
macro_rules! log_dependency {
    ($level:ident, $dependency:expr, $($arg:tt)*) => {
        tracing::$level!(
            target: "dependency",
            dependency = $dependency,
            $($arg)*
        )
    };
}
