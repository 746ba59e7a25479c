use crate::error::{CapsError, Result};
use crate::time::Time;

/// Record encoding of a data stream, announced by the session table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// Compact raw packet: 12-byte time sub-header + i32 samples.
    Raw,
    /// One complete miniSEED v2 record.
    Miniseed,
}

impl RecordType {
    /// Parse the type token used in session `ID` lines.
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "RAW" => Ok(Self::Raw),
            "MSEED" => Ok(Self::Miniseed),
            _ => Err(CapsError::InvalidRecordType(token.to_owned())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "RAW",
            Self::Miniseed => "MSEED",
        }
    }
}

/// One decoded waveform record as delivered to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRecord {
    /// `net.sta.loc.cha` identifier of the originating stream.
    pub stream_id: String,
    /// Time of the first sample.
    pub start_time: Time,
    /// Time one sample past the last one; the resume point for backfill.
    pub end_time: Time,
    /// Effective sampling rate in Hz.
    pub sampling_frequency: f64,
    /// Encoded sample payload (raw i32 samples or the full miniSEED record).
    pub payload: Vec<u8>,
}

/// Join stream components into the canonical dotted identifier.
pub fn stream_id(net: &str, sta: &str, loc: &str, cha: &str) -> String {
    format!("{net}.{sta}.{loc}.{cha}")
}

/// Validate a dotted stream id (exactly four dot-separated components,
/// location may be empty).
pub fn validate_stream_id(id: &str) -> Result<()> {
    let parts: Vec<&str> = id.split('.').collect();
    if parts.len() != 4 || parts[0].is_empty() || parts[1].is_empty() || parts[3].is_empty() {
        return Err(CapsError::InvalidStreamId(id.to_owned()));
    }
    Ok(())
}
