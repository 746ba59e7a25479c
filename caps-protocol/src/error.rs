#[derive(Debug, thiserror::Error)]
pub enum CapsError {
    #[error("invalid time spec: {0}")]
    InvalidTimeSpec(String),

    #[error("invalid session line: {0}")]
    InvalidSessionLine(String),

    #[error("invalid record type: {0:?}")]
    InvalidRecordType(String),

    #[error("invalid stream id: {0:?} (expected net.sta.loc.cha)")]
    InvalidStreamId(String),

    #[error("invalid miniseed header: {0}")]
    InvalidMseedHeader(String),

    #[error("timestamp out of range: {0} seconds")]
    TimeOutOfRange(i64),

    #[error("record too short: expected at least {expected} bytes, actual {actual}")]
    RecordTooShort { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, CapsError>;
