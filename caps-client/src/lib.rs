//! Blocking client for CAPS waveform acquisition servers.
//!
//! [`Connection`] manages one server connection: subscribe streams with
//! [`Connection::add_stream`], then pull records with [`Connection::next`]
//! from one thread while any other thread may cancel via
//! [`Connection::abort`].
//!
//! ```no_run
//! use caps_rs_client::Connection;
//!
//! # fn main() -> caps_rs_client::Result<()> {
//! let conn = Connection::new();
//! conn.set_server("localhost:18002")?;
//! conn.add_stream("GE", "APE", "", "BHZ");
//! while let Some(record) = conn.next()? {
//!     println!("{} {} .. {}", record.stream_id, record.start_time, record.end_time);
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod state;

mod decode;
mod reader;

#[cfg(test)]
mod mock;

pub use connection::{Connection, DEFAULT_PORT, StreamRequest};
pub use error::{ClientError, Result};
pub use state::ConnectionState;

pub use caps_rs_protocol::{DataRecord, RecordType, Time};
