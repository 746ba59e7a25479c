/// Connection lifecycle state.
///
/// Transitions: `EndOfData` →(handshake)→ `Active`; `Active` →(server EOD)→
/// `EndOfData`; any I/O or protocol failure → `Error`; `abort()`/`close()` →
/// `Aborted`; `reset()` → `EndOfData`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No protocol error, but nothing is currently being streamed. The
    /// initial state, and the only state in which requests may be added.
    EndOfData,
    /// Handshake accepted; data frames are flowing.
    Active,
    /// A fatal I/O or protocol failure occurred; `reset()` is required
    /// before the connection can be used again.
    Error,
    /// The user cancelled via `abort()` or `close()`.
    Aborted,
}

impl ConnectionState {
    /// Returns the state name as a static string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndOfData => "EndOfData",
            Self::Active => "Active",
            Self::Error => "Error",
            Self::Aborted => "Aborted",
        }
    }
}
