//! Structured logging facade over `slog`, standing in for the firmware's
//! SPIFFS-backed "database" sink and serial console sink. The core never
//! touches storage directly -- it only ever calls [`LogSink::log_event`] /
//! [`LogSink::log_message`], so the out-of-scope persistence layer (recent /
//! error / critical JSON logs) can be swapped in without touching any
//! calling code.

use serde::Serialize;
use slog::{Drain, Level as SlogLevel};
use std::fmt;
use std::sync::Mutex;

/// Log categories, matching the firmware's own taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    System,
    Power,
    Mining,
    Network,
    Asic,
    Api,
    Theme,
    Settings,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::System => "system",
            Category::Power => "power",
            Category::Mining => "mining",
            Category::Network => "network",
            Category::Asic => "asic",
            Category::Api => "api",
            Category::Theme => "theme",
            Category::Settings => "settings",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log levels, ordered from least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    None,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Level {
    fn to_slog(self) -> Option<SlogLevel> {
        match self {
            Level::None => None,
            Level::Error => Some(SlogLevel::Error),
            Level::Warn => Some(SlogLevel::Warning),
            Level::Info => Some(SlogLevel::Info),
            Level::Debug => Some(SlogLevel::Debug),
            Level::Trace => Some(SlogLevel::Trace),
        }
    }
}

/// A log event, as handed to the database sink. `json_data` carries
/// structured context (e.g. the overheat snapshot) alongside the message.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub category: &'static str,
    pub level: &'static str,
    pub message: String,
    pub json_data: Option<serde_json::Value>,
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::None => "none",
        Level::Error => "error",
        Level::Warn => "warn",
        Level::Info => "info",
        Level::Debug => "debug",
        Level::Trace => "trace",
    }
}

/// Per-category minimum level for one sink.
#[derive(Debug, Clone)]
pub struct SinkLevels {
    default: Level,
    overrides: std::collections::HashMap<Category, Level>,
}

impl SinkLevels {
    pub fn new(default: Level) -> Self {
        Self {
            default,
            overrides: std::collections::HashMap::new(),
        }
    }

    pub fn with_override(mut self, category: Category, level: Level) -> Self {
        self.overrides.insert(category, level);
        self
    }

    pub fn min_level(&self, category: Category) -> Level {
        self.overrides.get(&category).copied().unwrap_or(self.default)
    }
}

/// Anything that can receive log events and formatted messages. The
/// firmware's real database sink (SPIFFS JSON rotation) and serial console
/// are both out of scope; they live behind this trait.
pub trait LogSink: Send + Sync {
    fn log_event(&self, category: Category, level: Level, message: &str, json_data: Option<serde_json::Value>);
    fn log_message(&self, category: Category, level: Level, message: &str);
}

/// Default sink: an async `slog` drain to the terminal (the "serial" sink),
/// plus an in-process callback standing in for the "database" sink. Per
/// spec, database writes happen for every event regardless of level; serial
/// output is filtered per-category.
pub struct StdLogSink {
    logger: slog::Logger,
    serial_levels: SinkLevels,
    database: Mutex<Vec<LogEvent>>,
}

impl StdLogSink {
    pub fn new(serial_levels: SinkLevels) -> Self {
        let decorator = slog_term::TermDecorator::new().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        let logger = slog::Logger::root(drain, slog::o!());
        Self {
            logger,
            serial_levels,
            database: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of every event ever logged to the "database" sink, for
    /// tests and for the out-of-scope SPIFFS writer to drain.
    pub fn database_events(&self) -> Vec<LogEvent> {
        self.database.lock().expect("log database mutex poisoned").clone()
    }
}

impl Default for StdLogSink {
    fn default() -> Self {
        Self::new(SinkLevels::new(Level::Warn).with_override(Category::System, Level::Error))
    }
}

impl LogSink for StdLogSink {
    fn log_event(&self, category: Category, level: Level, message: &str, json_data: Option<serde_json::Value>) {
        // Database sink always records the event, independent of level.
        self.database.lock().expect("log database mutex poisoned").push(LogEvent {
            category: category.as_str(),
            level: level_name(level),
            message: message.to_string(),
            json_data,
        });
        self.log_message(category, level, message);
    }

    fn log_message(&self, category: Category, level: Level, message: &str) {
        if level < self.serial_levels.min_level(category) {
            return;
        }
        if let Some(slog_level) = level.to_slog() {
            slog::log!(self.logger, slog_level, "{}", message; "category" => category.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_sink_records_regardless_of_level() {
        let sink = StdLogSink::new(SinkLevels::new(Level::Error));
        sink.log_event(Category::Power, Level::Trace, "tick", None);
        assert_eq!(sink.database_events().len(), 1);
    }

    #[test]
    fn per_category_override_is_honored() {
        let levels = SinkLevels::new(Level::Warn).with_override(Category::Asic, Level::Trace);
        assert_eq!(levels.min_level(Category::Asic), Level::Trace);
        assert_eq!(levels.min_level(Category::Power), Level::Warn);
    }

    #[test]
    fn level_ordering() {
        assert!(Level::Error < Level::Warn);
        assert!(Level::Warn < Level::Info);
        assert!(Level::Trace > Level::Debug);
    }
}
