//! Tracing subscriber setup.
//!
//! Console output goes to stderr so command output on stdout stays clean.
//! `RUST_LOG` wins over the configured level when set.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `timestamp LEVEL target: message`
    Compact,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Unknown names fall back to compact; `validate()` reports them.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    directive_filter(level)
}

fn directive_filter(level: &str) -> Result<EnvFilter> {
    // Suppress noisy transport crates
    let directives = format!("{level},hyper=warn,h2=warn");
    EnvFilter::try_new(&directives)
        .map_err(|e| anyhow!("Invalid tracing filter '{}': {}", directives, e))
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool, level: &str) -> Result<BoxedLayer>
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = build_env_filter(level)?;
    let base = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);
    Ok(match format {
        LogFormat::Json => base.json().with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_filter(filter).boxed(),
    })
}

/// Split a log file path into the directory and file-name prefix that the
/// daily roller expects.
fn log_file_parts(path: &Path) -> Result<(&Path, &str)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Log file path has no file name: {}", path.display()))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Ok((dir, name))
}

/// Install the global subscriber.
///
/// Returns the file writer's guard when a log file is configured; hold it
/// until exit or buffered lines are lost.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let format = LogFormat::parse(&config.format);
    let mut layers: Vec<BoxedLayer> = vec![format_layer(
        format,
        std::io::stderr,
        true,
        &config.level,
    )?];

    let guard = match &config.file {
        Some(path) => {
            let (dir, name) = log_file_parts(path)?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(format_layer(format, writer, false, &config.level)?);
            Some(guard)
        }
        None => None,
    };

    if let Err(e) = tracing_subscriber::registry().with(layers).try_init() {
        bail!("Failed to install tracing subscriber: {}", e);
    }
    Ok(guard)
}
