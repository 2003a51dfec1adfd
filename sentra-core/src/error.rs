//! Error types for sentra-core

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using sentra Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for sentra
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(sentra::config))]
    Config(String),

    #[error("Database error: {0}")]
    #[diagnostic(code(sentra::database))]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(sentra::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(sentra::serde))]
    Serde(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    #[diagnostic(code(sentra::toml))]
    Toml(#[from] toml::de::Error),

    #[error("Policy violation: {0}")]
    #[diagnostic(code(sentra::policy))]
    Policy(String),

    #[error("Execution error: {0}")]
    #[diagnostic(code(sentra::exec))]
    Execution(String),

    #[error("Store error: {0}")]
    #[diagnostic(code(sentra::store))]
    Store(String),

    #[error("Parser not registered for intent: {0}")]
    #[diagnostic(code(sentra::parser))]
    ParserMissing(String),
}
