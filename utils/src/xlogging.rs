use serde::{Deserialize, Serialize};
use slog::{o, Drain, Logger};

pub use slog;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
    Critical,
}

impl From<LogLevel> for slog::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => slog::Level::Trace,
            LogLevel::Debug => slog::Level::Debug,
            LogLevel::Info => slog::Level::Info,
            LogLevel::Warning => slog::Level::Warning,
            LogLevel::Error => slog::Level::Error,
            LogLevel::Critical => slog::Level::Critical,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingSettings {
    pub stdout: bool,
    pub level: LogLevel,
    pub log_path: Option<String>,
    pub name: String,
}

pub fn init_log(config: &LoggingSettings) -> Result<Logger, std::io::Error> {
    let LoggingSettings {
        stdout,
        level,
        log_path,
        name,
    } = config;

    let level = slog::Level::from(*level);

    let file_drain = match log_path {
        Some(path) => Some(build_file_drain(path)?),
        None => None,
    };

    let drain_stdout_async = if *stdout || file_drain.is_none() {
        let decorator = slog_term::TermDecorator::new().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        Some(slog_async::Async::new(drain).build().fuse())
    } else {
        None
    };

    let logger = match (drain_stdout_async, file_drain) {
        (Some(drain_stdout), Some(file_drain)) => {
            // both a file drain and a stdout drain
            let drain = slog::Duplicate::new(drain_stdout, file_drain).fuse();
            let filter_drain = slog::LevelFilter::new(drain, level).fuse();
            slog::Logger::root(filter_drain, o!("name" => name.to_string()))
        }
        (None, Some(drain)) | (Some(drain), None) => {
            let filter_drain = slog::LevelFilter::new(drain, level).fuse();
            slog::Logger::root(filter_drain, o!("name" => name.to_string()))
        }
        (None, None) => discard(),
    };
    Ok(logger)
}

/// Logger that drops every record, used by tests and library defaults.
pub fn discard() -> Logger {
    slog::Logger::root(slog::Discard, o!())
}

fn build_file_drain(log_path: &str) -> Result<slog::Fuse<slog_async::Async>, std::io::Error> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    let decorator = slog_term::PlainSyncDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Ok(drain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        logging: LoggingSettings,
    }

    #[test]
    fn test_level_parsing() {
        let json = r#"{"logging": {"stdout": true, "level": "warn", "log_path": null, "name": "zapd"}}"#;
        let wrapper = serde_json::from_str::<Wrapper>(json).unwrap();
        assert_eq!(wrapper.logging.level, LogLevel::Warning);

        let json = r#"{"logging": {"stdout": true, "level": "verbose", "log_path": null, "name": "zapd"}}"#;
        assert!(serde_json::from_str::<Wrapper>(json).is_err());
    }
}
