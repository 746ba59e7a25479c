//! CAPS waveform acquisition protocol types and codecs.
//!
//! This crate provides the shared protocol layer — frame framing, the
//! TIME grammar, session-table bookkeeping, and miniSEED header parsing —
//! used by the client crate. It performs no network I/O.

pub mod error;
pub mod frame;
pub mod mseed;
pub mod record;
pub mod session;
pub mod time;

pub use error::{CapsError, Result};
pub use frame::{FrameHeader, RawHeader};
pub use mseed::MseedHeader;
pub use record::{DataRecord, RecordType};
pub use session::{SessionItem, SessionTable, Status};
pub use time::Time;
