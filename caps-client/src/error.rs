/// Errors surfaced by the CAPS client.
///
/// Expected outcomes — server end-of-data and user cancellation — are not
/// errors; they are reported through [`ConnectionState`](crate::ConnectionState)
/// and `next()` returning `None`.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// TCP or socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol-level parse error (bad frame, bad record header, ...).
    #[error("protocol error: {0}")]
    Protocol(#[from] caps_rs_protocol::CapsError),

    /// Server address did not parse as `host[:port]`.
    #[error("invalid server address: {0:?}")]
    BadAddress(String),

    /// The server rejected the handshake or answered with an unexpected
    /// status line.
    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// Convenience alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;
