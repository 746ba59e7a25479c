//! Binary frame framing: every unit on the wire is a fixed 8-byte header
//! followed by exactly `size` body bytes.
//!
//! Header id 0 marks a control frame carrying newline-delimited session
//! lines; any other id is a data frame for the session item with that id.
//! Raw data frames additionally start with a compact 12-byte sub-header
//! carrying the record start time.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::time::Time;

/// Length in bytes of the encoded [`FrameHeader`].
pub const HEADER_LEN: usize = 8;

/// Length in bytes of the encoded [`RawHeader`].
pub const RAW_HEADER_LEN: usize = 12;

/// Header preceding every frame: session id plus declared body size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub id: u32,
    pub size: u32,
}

impl FrameHeader {
    /// Id carried by control frames.
    pub const CONTROL: u32 = 0;

    pub fn read<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let id = r.read_u32::<LittleEndian>()?;
        let size = r.read_u32::<LittleEndian>()?;
        Ok(Self { id, size })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.id)?;
        w.write_u32::<LittleEndian>(self.size)?;
        Ok(())
    }

    pub fn is_control(&self) -> bool {
        self.id == Self::CONTROL
    }
}

/// Sub-header prefixed to raw data frame bodies: the record start time as
/// epoch seconds plus microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    pub seconds: i64,
    pub micros: i32,
}

impl RawHeader {
    pub fn read<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let seconds = r.read_i64::<LittleEndian>()?;
        let micros = r.read_i32::<LittleEndian>()?;
        Ok(Self { seconds, micros })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_i64::<LittleEndian>(self.seconds)?;
        w.write_i32::<LittleEndian>(self.micros)?;
        Ok(())
    }

    /// Record start time, `None` when the seconds field is outside the
    /// representable range.
    pub fn start_time(&self) -> Option<Time> {
        Time::from_epoch(self.seconds, self.micros as i64)
    }
}
