//! Server-mirrored session table.
//!
//! Control frames (id 0) carry newline-delimited lines that keep the
//! client's view of the server's session registry in sync:
//!
//! - `ID <id> <RAW|MSEED> <fs>/<div> <net>.<sta>.<loc>.<cha>` registers
//!   the stream descriptor behind a data-frame id,
//! - `DEL <id>` removes it again,
//! - `EOD` signals that the server has nothing more to send.
//!
//! Removal fires the caller-supplied invalidation callback so that a
//! cached item reference is never used after its table entry is gone.

use std::collections::HashMap;

use crate::error::{CapsError, Result};
use crate::record::{RecordType, validate_stream_id};

/// Server-assigned descriptor for one data-frame id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionItem {
    pub id: u32,
    pub stream_id: String,
    pub record_type: RecordType,
    pub sampling_frequency: u32,
    pub divider: u32,
}

impl SessionItem {
    /// Effective rate in Hz; a divider > 1 encodes sub-1 Hz streams.
    pub fn sampling_rate(&self) -> f64 {
        if self.divider == 0 {
            return self.sampling_frequency as f64;
        }
        self.sampling_frequency as f64 / self.divider as f64
    }
}

/// Outcome of feeding one control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Line consumed, keep reading.
    Ok,
    /// Server end-of-data signal.
    EndOfData,
    /// Malformed line; the connection must be torn down.
    Error,
}

/// Registry mapping data-frame ids to stream descriptors.
#[derive(Debug, Default)]
pub struct SessionTable {
    items: HashMap<u32, SessionItem>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one control line. `on_remove` is invoked with the id of any
    /// item about to be dropped from the table.
    pub fn feed_line(&mut self, line: &str, on_remove: &mut dyn FnMut(u32)) -> Status {
        let line = line.trim();
        if line.is_empty() {
            return Status::Ok;
        }
        if line == "EOD" {
            return Status::EndOfData;
        }
        if let Some(rest) = line.strip_prefix("ID ") {
            match parse_id_line(rest) {
                Ok(item) => {
                    if self.items.contains_key(&item.id) {
                        on_remove(item.id);
                    }
                    self.items.insert(item.id, item);
                    return Status::Ok;
                }
                Err(_) => return Status::Error,
            }
        }
        if let Some(rest) = line.strip_prefix("DEL ") {
            match rest.trim().parse::<u32>() {
                Ok(id) => {
                    if self.items.remove(&id).is_some() {
                        on_remove(id);
                    }
                    return Status::Ok;
                }
                Err(_) => return Status::Error,
            }
        }
        Status::Error
    }

    pub fn get(&self, id: u32) -> Option<&SessionItem> {
        self.items.get(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionItem> {
        self.items.values()
    }
}

fn parse_id_line(rest: &str) -> Result<SessionItem> {
    let bad = || CapsError::InvalidSessionLine(format!("ID {rest}"));

    let mut parts = rest.split_whitespace();
    let id: u32 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let record_type = RecordType::parse(parts.next().ok_or_else(bad)?)?;

    let rate = parts.next().ok_or_else(bad)?;
    let (fs, div) = rate.split_once('/').ok_or_else(bad)?;
    let sampling_frequency: u32 = fs.parse().map_err(|_| bad())?;
    let divider: u32 = div.parse().map_err(|_| bad())?;
    if divider == 0 {
        return Err(bad());
    }

    let stream_id = parts.next().ok_or_else(bad)?.to_owned();
    validate_stream_id(&stream_id)?;
    if parts.next().is_some() {
        return Err(bad());
    }

    Ok(SessionItem {
        id,
        stream_id,
        record_type,
        sampling_frequency,
        divider,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_remove() -> impl FnMut(u32) {
        |_| {}
    }

    #[test]
    fn register_and_lookup() {
        let mut table = SessionTable::new();
        let status = table.feed_line("ID 1 MSEED 20/1 GE.APE..BHZ", &mut no_remove());
        assert_eq!(status, Status::Ok);

        let item = table.get(1).unwrap();
        assert_eq!(item.stream_id, "GE.APE..BHZ");
        assert_eq!(item.record_type, RecordType::Miniseed);
        assert_eq!(item.sampling_rate(), 20.0);
        assert!(table.get(2).is_none());
    }

    #[test]
    fn divider_encodes_sub_hertz() {
        let mut table = SessionTable::new();
        table.feed_line("ID 3 RAW 1/10 XX.AAA..LHZ", &mut no_remove());
        assert_eq!(table.get(3).unwrap().sampling_rate(), 0.1);
    }

    #[test]
    fn removal_fires_callback() {
        let mut table = SessionTable::new();
        table.feed_line("ID 5 RAW 100/1 XX.AAA..HHZ", &mut no_remove());

        let mut removed = Vec::new();
        let status = table.feed_line("DEL 5", &mut |id| removed.push(id));
        assert_eq!(status, Status::Ok);
        assert_eq!(removed, vec![5]);
        assert!(table.get(5).is_none());
    }

    #[test]
    fn removing_unknown_id_is_quiet() {
        let mut table = SessionTable::new();
        let mut removed = Vec::new();
        assert_eq!(table.feed_line("DEL 9", &mut |id| removed.push(id)), Status::Ok);
        assert!(removed.is_empty());
    }

    #[test]
    fn reregistering_id_invalidates_old_item() {
        let mut table = SessionTable::new();
        table.feed_line("ID 1 RAW 20/1 XX.AAA..BHZ", &mut no_remove());

        let mut removed = Vec::new();
        table.feed_line("ID 1 MSEED 50/1 XX.BBB..BHZ", &mut |id| removed.push(id));
        assert_eq!(removed, vec![1]);
        assert_eq!(table.get(1).unwrap().stream_id, "XX.BBB..BHZ");
    }

    #[test]
    fn eod_line() {
        let mut table = SessionTable::new();
        assert_eq!(table.feed_line("EOD", &mut no_remove()), Status::EndOfData);
    }

    #[test]
    fn malformed_lines_are_errors() {
        let mut table = SessionTable::new();
        assert_eq!(table.feed_line("GARBAGE", &mut no_remove()), Status::Error);
        assert_eq!(
            table.feed_line("ID x MSEED 20/1 A.B..C", &mut no_remove()),
            Status::Error
        );
        assert_eq!(
            table.feed_line("ID 1 FOO 20/1 A.B..C", &mut no_remove()),
            Status::Error
        );
        assert_eq!(
            table.feed_line("ID 1 MSEED 20/0 A.B..C", &mut no_remove()),
            Status::Error
        );
        assert_eq!(table.feed_line("DEL abc", &mut no_remove()), Status::Error);
    }

    #[test]
    fn blank_lines_are_tolerated() {
        let mut table = SessionTable::new();
        assert_eq!(table.feed_line("", &mut no_remove()), Status::Ok);
        assert_eq!(table.feed_line("  \r", &mut no_remove()), Status::Ok);
    }

    #[test]
    fn clear_empties_table() {
        let mut table = SessionTable::new();
        table.feed_line("ID 1 RAW 20/1 XX.AAA..BHZ", &mut no_remove());
        table.feed_line("ID 2 MSEED 50/1 XX.BBB..BHZ", &mut no_remove());
        assert_eq!(table.len(), 2);
        table.clear();
        assert!(table.is_empty());
    }
}
