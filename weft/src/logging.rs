// Logging for weft
//
// Thin layer over the `tracing` ecosystem. The runtime itself only emits events;
// applications pick a subscriber with one of the `init*` functions below.
//
// ```rust
// use weft::logging;
//
// // INFO level, human readable console output
// logging::init_default();
//
// // or choose the details
// logging::init(logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     target_filters: Some("weft::pool=trace".to_string()),
//     ..Default::default()
// });
// ```
//
// Worker threads capture the creator's dispatcher when they are spawned, so a
// subscriber installed with `tracing::subscriber::set_default` in a test also sees
// events emitted inside workers.

use std::io;
use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, registry::LookupSpan, EnvFilter, Layer};

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Lowest level emitted unless a target filter says otherwise
    pub level: Level,
    /// One JSON object per event instead of human-readable lines
    pub json_format: bool,
    pub show_file_line: bool,
    /// Worker threads are named, so this shows which worker logged an event.
    pub show_thread_info: bool,
    pub show_time: bool,
    /// Extra directives, comma separated: `"weft::pool=trace,weft::stream=debug"`
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

impl LogConfig {
    /// `RUST_LOG` first, then `level`, then every parseable `target_filters` entry.
    /// Entries that do not parse are skipped.
    pub fn env_filter(&self) -> EnvFilter {
        let base = EnvFilter::from_default_env().add_directive(self.level.into());
        self.target_filters
            .iter()
            .flat_map(|filters| filters.split(','))
            .filter_map(|directive| directive.trim().parse::<Directive>().ok())
            .fold(base, EnvFilter::add_directive)
    }

    fn console_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    {
        if self.json_format {
            return fmt::layer().json().flatten_event(true).boxed();
        }
        let layer = fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(self.show_file_line)
            .with_line_number(self.show_file_line)
            .with_thread_names(self.show_thread_info)
            .with_thread_ids(self.show_thread_info);
        if self.show_time {
            layer.boxed()
        } else {
            layer.without_time().boxed()
        }
    }
}

// The global subscriber can be installed once per process.
static INIT: Once = Once::new();

/// Install the global subscriber described by `config`. Later calls are no-ops.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::registry()
            .with(config.env_filter())
            .with(config.console_layer());
        install(subscriber);
    });
}

fn install<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("weft: tracing subscriber already set: {err}");
    }
}

/// Open `path` in append mode for use as a log writer.
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(Box::new(file))
}

/// Console output as configured, plus a plain-text copy of every event appended to
/// `log_file`. An unusable path is reported before anything is installed.
pub fn init_with_file(config: LogConfig, log_file: &str) -> Result<(), io::Error> {
    file_writer(log_file)?;

    INIT.call_once(|| {
        let path = log_file.to_string();
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || {
                file_writer(&path).unwrap_or_else(|_| Box::new(io::stderr()))
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true);

        let subscriber = tracing_subscriber::registry()
            .with(config.env_filter())
            .with(config.console_layer())
            .with(file_layer);
        install(subscriber);
    });

    Ok(())
}

pub fn init_default() {
    init(LogConfig::default());
}

/// DEBUG for the runtime, TRACE for worker protocol traffic and pool admission.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        target_filters: Some("weft=debug,weft::worker=trace,weft::pool=trace".to_string()),
        ..LogConfig::default()
    });
}

/// JSON lines, no source locations.
pub fn init_production() {
    init(LogConfig {
        json_format: true,
        show_file_line: false,
        ..LogConfig::default()
    });
}

/// Warnings and errors only, without timestamps or thread ids.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        show_thread_info: false,
        show_time: false,
        ..LogConfig::default()
    });
}

/// Span covering everything a worker thread does.
///
/// ```rust,ignore
/// let span = weft::worker_span!("service", "weft-worker-3");
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! worker_span {
    ($kind:expr, $worker_id:expr) => {
        tracing::info_span!("worker", kind = $kind, id = %$worker_id)
    };
    ($kind:expr, $worker_id:expr, $($fields:tt)*) => {
        tracing::info_span!("worker", kind = $kind, id = %$worker_id, $($fields)*)
    };
}

/// Log worker lifecycle events (spawned, initialized, exited, ...)
#[macro_export]
macro_rules! log_lifecycle {
    ($kind:expr, $worker_id:expr, $event:expr) => {
        tracing::info!(kind = $kind, worker = %$worker_id, event = $event);
    };
    ($kind:expr, $worker_id:expr, $event:expr, $($fields:tt)*) => {
        tracing::info!(kind = $kind, worker = %$worker_id, event = $event, $($fields)*);
    };
}

/// Log protocol traffic; one line per message, DEBUG level.
#[macro_export]
macro_rules! log_protocol {
    ($direction:expr, $message_kind:expr) => {
        tracing::debug!(direction = $direction, message = $message_kind);
    };
    ($direction:expr, $message_kind:expr, $($fields:tt)*) => {
        tracing::debug!(direction = $direction, message = $message_kind, $($fields)*);
    };
}

/// Log error events
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        tracing::error!(error = %$error);
    };
    ($error:expr, $($fields:tt)*) => {
        tracing::error!(error = %$error, $($fields)*);
    };
}

/// Log pool admission events
#[macro_export]
macro_rules! log_pool {
    ($event:expr) => {
        tracing::debug!(scheduler = "pool", event = $event);
    };
    ($event:expr, $($fields:tt)*) => {
        tracing::debug!(scheduler = "pool", event = $event, $($fields)*);
    };
}

/// Current dispatcher, for handing to freshly spawned threads.
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}

pub use tracing::{debug, error, info, trace, warn};

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn target_filters_are_added() {
        let config = LogConfig {
            level: Level::WARN,
            target_filters: Some("weft::pool=trace, weft::stream=debug,not a directive=".to_string()),
            ..LogConfig::default()
        };
        assert_eq!(config.env_filter().max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn init_is_idempotent() {
        init_test();
        init_default();
        tracing::warn!("still logging");
    }
}
