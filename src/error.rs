use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
