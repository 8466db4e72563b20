//! Server error types.

use thiserror::Error;

/// Errors raised while starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that could not be bound.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Other listener I/O failure.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The Prometheus recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
    /// The analytics HTTP client could not be built.
    #[error("failed to build analytics client: {0}")]
    Analytics(#[from] reqwest::Error),
}
