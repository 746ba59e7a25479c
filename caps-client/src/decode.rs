//! Payload decoders for the two record encodings a session can announce.

use std::io::Read;

use caps_rs_protocol::frame::RAW_HEADER_LEN;
use caps_rs_protocol::{CapsError, DataRecord, MseedHeader, RawHeader, SessionItem};

use crate::error::Result;
use crate::reader::FrameReader;

/// Bytes per sample in a raw packet. Only 32-bit integer samples are
/// carried on the wire.
const RAW_SAMPLE_LEN: usize = 4;

/// Decode a raw packet body of `size` bytes: a timestamp header followed
/// by little-endian i32 samples. Timing metadata comes from the header,
/// stream identity and sampling rate from the session `item`.
pub(crate) fn decode_raw<R: Read>(
    reader: &mut FrameReader<R>,
    size: usize,
    item: &SessionItem,
) -> Result<DataRecord> {
    if size < RAW_HEADER_LEN {
        return Err(CapsError::RecordTooShort {
            expected: RAW_HEADER_LEN,
            actual: size,
        }
        .into());
    }
    let header = RawHeader::read(reader)?;
    let mut payload = vec![0u8; size - RAW_HEADER_LEN];
    reader.read_exact(&mut payload)?;

    let start_time = header
        .start_time()
        .ok_or(CapsError::TimeOutOfRange(header.seconds))?;
    let sample_count = payload.len() / RAW_SAMPLE_LEN;
    let rate = item.sampling_rate();
    let span_micros = if rate > 0.0 {
        (sample_count as f64 / rate * 1_000_000.0).round() as i64
    } else {
        0
    };

    Ok(DataRecord {
        stream_id: item.stream_id.clone(),
        start_time,
        end_time: start_time.add_micros(span_micros),
        sampling_frequency: rate,
        payload,
    })
}

/// Decode a miniSEED packet body of `size` bytes. The record is
/// self-describing, so stream identity and timing are taken from its own
/// fixed header rather than the session entry.
pub(crate) fn decode_mseed<R: Read>(reader: &mut FrameReader<R>, size: usize) -> Result<DataRecord> {
    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload)?;
    let header = MseedHeader::parse(&payload)?;

    Ok(DataRecord {
        stream_id: header.stream_id.clone(),
        start_time: header.start_time,
        end_time: header.end_time(),
        sampling_frequency: header.sampling_frequency,
        payload,
    })
}
