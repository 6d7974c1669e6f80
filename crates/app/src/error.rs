//! Application error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] cuecannon_core::Error),

    #[error(transparent)]
    Net(#[from] cuecannon_net::Error),

    #[error("Remote canon error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Script format error: {0}")]
    ScriptFormat(#[from] serde_json::Error),

    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    #[error("Engine not started")]
    NotStarted,

    #[error("Engine stopped")]
    EngineStopped,
}

pub type Result<T> = std::result::Result<T, AppError>;
