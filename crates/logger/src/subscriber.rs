use std::env::var;
use std::str::FromStr;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Initialize tracing, taking the format from `RUST_LOG_FORMAT`
pub fn init_tracing() {
    init_tracing_with(None);
}

/// Initialize tracing with a configured format
///
/// `RUST_LOG_FORMAT` wins over `configured` when set. Filtering follows
/// `RUST_LOG` with INFO as the default level.
pub fn init_tracing_with(configured: Option<LogFormat>) {
    let env_filter =
        EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy();

    let format = resolve_format(var("RUST_LOG_FORMAT").ok().as_deref(), configured);

    let log_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_filter(env_filter)
            .boxed(),
    };

    // A test harness or embedding binary may have installed one already
    if let Err(error) = tracing_subscriber::registry().with(log_layer).try_init() {
        warn!("Tracing already initialized: {error}");
    }
}

fn resolve_format(env_value: Option<&str>, configured: Option<LogFormat>) -> LogFormat {
    match env_value.map(LogFormat::from_str) {
        Some(Ok(format)) => format,
        Some(Err(error)) => {
            eprintln!("Ignoring RUST_LOG_FORMAT: {error}");
            configured.unwrap_or_default()
        }
        None => configured.unwrap_or_default(),
    }
}
