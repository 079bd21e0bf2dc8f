use thiserror::Error;

/// Main error type for daylog
#[derive(Debug, Error)]
pub enum DaylogError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    // Log file errors
    #[error("Failed to open log file {path}: {source}")]
    LogFileError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write log file {path}: {source}")]
    LogWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No async runtime available for log file {0}")]
    NoRuntime(String),
}

/// Result type alias for daylog operations
pub type Result<T> = std::result::Result<T, DaylogError>;
