use anyhow::Result;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,derma_api_server=debug,tower_http=info";
const DEFAULT_DIRECTORY: &str = "logs";
const FILE_PREFIX: &str = "derma-api";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub filter: String,
    pub format: LogFormat,
    pub directory: String,
}

impl LogOptions {
    /// `RUST_LOG`, `LOG_FORMAT` (`json` | `pretty`) and `LOG_DIR`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            filter: non_blank("RUST_LOG").unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            format: non_blank("LOG_FORMAT")
                .map(|value| LogFormat::parse(&value))
                .unwrap_or(LogFormat::Pretty),
            directory: non_blank("LOG_DIR").unwrap_or_else(|| DEFAULT_DIRECTORY.to_string()),
        }
    }
}

/// Install the global subscriber: stdout plus a daily rolling file.
///
/// File output goes through a background writer; keep the returned guard alive
/// until shutdown so buffered lines are flushed.
pub fn init_logger() -> Result<WorkerGuard> {
    let options = LogOptions::from_env();

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(FILE_PREFIX)
        .filename_suffix("log")
        .build(&options.directory)?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry().with(EnvFilter::try_new(&options.filter)?);

    match options.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stdout)
                    .with_current_span(true)
                    .with_thread_ids(true),
            )
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(file_writer),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stdout))
            .with(fmt::layer().with_writer(file_writer).with_ansi(false))
            .try_init()?,
    }

    Ok(guard)
}
