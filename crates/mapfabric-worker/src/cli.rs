//! Worker command line

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// MapFabric worker: consumes rendering and query jobs from the broker
#[derive(Debug, Parser)]
#[command(name = "mapfabric-worker", version)]
pub struct Args {
    /// Broker URL, e.g. redis://127.0.0.1:6379/0
    #[arg(long = "redis-url")]
    pub redis_url: String,

    /// Log level
    #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Absolute path to the data directory
    #[arg(long = "data-root", default_value = "/io/data")]
    pub data_root: PathBuf,

    /// Absolute paths to additional svg files, separated by `:`
    #[arg(long = "svg-path", default_value = "/io/svg")]
    pub svg_path: String,
}

impl Args {
    pub fn svg_paths(&self) -> Vec<String> {
        self.svg_path.split(':').map(str::to_string).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by the tracing env filter
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["mapfabric-worker", "--redis-url", "redis://localhost/0"]);
        assert_eq!(args.redis_url, "redis://localhost/0");
        assert_eq!(args.log_level, LogLevel::Info);
        assert_eq!(args.data_root, PathBuf::from("/io/data"));
        assert_eq!(args.svg_paths(), vec!["/io/svg".to_string()]);
    }

    #[test]
    fn test_redis_url_is_required() {
        assert!(Args::try_parse_from(["mapfabric-worker"]).is_err());
    }

    #[test]
    fn test_svg_path_splits_on_colon() {
        let args = Args::parse_from([
            "mapfabric-worker",
            "--redis-url",
            "redis://localhost/0",
            "--svg-path",
            "/a:/b",
        ]);
        assert_eq!(args.svg_paths(), vec!["/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn test_log_level_names() {
        let args = Args::parse_from([
            "mapfabric-worker",
            "--redis-url",
            "redis://localhost/0",
            "--log-level",
            "warning",
        ]);
        assert_eq!(args.log_level, LogLevel::Warning);
        assert_eq!(args.log_level.as_filter(), "warn");
    }
}
