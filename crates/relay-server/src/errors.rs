//! Server error types.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced while starting or running the relay server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The bound socket's local address could not be read.
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
    /// The HTTP server stopped with an error.
    #[error("server on {addr} failed: {source}")]
    Serve {
        /// Address the server was listening on.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The Prometheus recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_display() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:80".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let text = err.to_string();
        assert!(text.contains("0.0.0.0:80"));
        assert!(text.contains("denied"));
    }

    #[test]
    fn metrics_error_display() {
        let err = ServerError::Metrics("already installed".into());
        assert_eq!(
            err.to_string(),
            "failed to install metrics recorder: already installed"
        );
    }

    #[test]
    fn bind_error_exposes_source() {
        use std::error::Error as _;
        let err = ServerError::Bind {
            addr: "x".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.source().is_some());
    }
}
