//! Server lifecycle errors.

use thiserror::Error;

/// Failure to start or run the HTTP listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The accept loop terminated with an error.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}
