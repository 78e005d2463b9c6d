//! Error types for TradeLab.

use thiserror::Error;

/// Core error type for TradeLab operations.
#[derive(Error, Debug)]
pub enum TradeLabError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type alias for TradeLab operations.
pub type Result<T> = std::result::Result<T, TradeLabError>;
