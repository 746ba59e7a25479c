//! miniSEED v2 fixed-header parsing.
//!
//! Only the fixed section is interpreted: stream codes (bytes 8..20),
//! BTime (20..30, big-endian, day-of-year based), sample count (30..32)
//! and rate factor/multiplier (32..36). Sample decoding itself is out of
//! scope; the record payload travels opaque.

use crate::error::{CapsError, Result};
use crate::record::stream_id;
use crate::time::Time;

/// Minimum bytes needed to read the fixed header fields we use.
pub const FIXED_HEADER_LEN: usize = 48;

/// Parsed miniSEED v2 fixed header.
#[derive(Debug, Clone, PartialEq)]
pub struct MseedHeader {
    pub stream_id: String,
    pub start_time: Time,
    pub sample_count: u32,
    pub sampling_frequency: f64,
}

impl MseedHeader {
    /// Parse the fixed header from the beginning of a record buffer.
    pub fn parse(record: &[u8]) -> Result<Self> {
        if record.len() < FIXED_HEADER_LEN {
            return Err(CapsError::RecordTooShort {
                expected: FIXED_HEADER_LEN,
                actual: record.len(),
            });
        }

        let station = ascii_field(&record[8..13])?;
        let location = ascii_field(&record[13..15])?;
        let channel = ascii_field(&record[15..18])?;
        let network = ascii_field(&record[18..20])?;

        let year = u16::from_be_bytes([record[20], record[21]]) as i64;
        let doy = u16::from_be_bytes([record[22], record[23]]) as u32;
        let hour = record[24] as u32;
        let minute = record[25] as u32;
        let second = record[26] as u32;
        // BTime fraction counts 0.0001 s ticks
        let fract = u16::from_be_bytes([record[28], record[29]]) as u32;

        let start_time = Time::from_year_doy(year, doy, hour, minute, second, fract * 100)
            .ok_or_else(|| {
                CapsError::InvalidMseedHeader(format!(
                    "bad BTime {year},{doy} {hour}:{minute}:{second}"
                ))
            })?;

        let sample_count = u16::from_be_bytes([record[30], record[31]]) as u32;
        let factor = i16::from_be_bytes([record[32], record[33]]);
        let multiplier = i16::from_be_bytes([record[34], record[35]]);

        Ok(Self {
            stream_id: stream_id(&network, &station, &location, &channel),
            start_time,
            sample_count,
            sampling_frequency: sampling_rate(factor, multiplier),
        })
    }

    /// Time one sample past the last one. Equals the start time for
    /// rate-less (state-of-health) records.
    pub fn end_time(&self) -> Time {
        if self.sampling_frequency <= 0.0 || self.sample_count == 0 {
            return self.start_time;
        }
        let span = (self.sample_count as f64 / self.sampling_frequency * 1e6).round() as i64;
        self.start_time.add_micros(span)
    }
}

/// SEED sampling rate from the factor/multiplier pair. Either value may
/// encode a reciprocal via its sign; zero means no rate (log channels).
fn sampling_rate(factor: i16, multiplier: i16) -> f64 {
    if factor == 0 || multiplier == 0 {
        return 0.0;
    }
    let f = factor as f64;
    let m = multiplier as f64;
    match (factor > 0, multiplier > 0) {
        (true, true) => f * m,
        (true, false) => -f / m,
        (false, true) => -m / f,
        (false, false) => 1.0 / (f * m),
    }
}

fn ascii_field(bytes: &[u8]) -> Result<String> {
    let s = std::str::from_utf8(bytes)
        .map_err(|_| CapsError::InvalidMseedHeader("non-ASCII stream code".into()))?;
    Ok(s.trim().to_owned())
}
