//! Buffered frame reader with an explicit read limit.
//!
//! The limit mirrors the declared body size of the frame being consumed:
//! all reads are charged against it, so a decoder can never overrun into
//! the next frame, and whatever it leaves behind can be drained with
//! [`FrameReader::skip_remaining`]. Sockets cannot seek, so skipping is a
//! read-and-discard loop.

use std::io::{self, BufReader, Read};

use caps_rs_protocol::FrameHeader;

/// Longest accepted control/status line, matching the reference client.
const MAX_LINE: usize = 200;

pub(crate) struct FrameReader<R: Read> {
    inner: BufReader<R>,
    limit: Option<usize>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            limit: None,
        }
    }

    /// Bytes of the current frame body not yet consumed.
    pub fn remaining(&self) -> usize {
        self.limit.unwrap_or(0)
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = Some(limit);
    }

    pub fn clear_limit(&mut self) {
        self.limit = None;
    }

    /// Read the next frame header. Only valid between frames; any previous
    /// limit must have been consumed or skipped first.
    pub fn read_header(&mut self) -> io::Result<FrameHeader> {
        debug_assert_eq!(self.remaining(), 0);
        self.clear_limit();
        FrameHeader::read(self)
    }

    /// Read one newline-terminated line, charged against the limit. The
    /// returned line excludes the terminator (and a trailing `\r`).
    pub fn read_line(&mut self) -> io::Result<String> {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            if self.read(&mut byte)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "line truncated",
                ));
            }
            if byte[0] == b'\n' {
                break;
            }
            out.push(byte[0]);
            if out.len() > MAX_LINE {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line exceeds maximum of {MAX_LINE} characters"),
                ));
            }
        }
        if out.last() == Some(&b'\r') {
            out.pop();
        }
        String::from_utf8(out)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "line is not valid UTF-8"))
    }

    /// Drain and discard whatever is left of the current frame body.
    /// Returns the number of bytes skipped and clears the limit.
    pub fn skip_remaining(&mut self) -> io::Result<usize> {
        let mut skipped = 0usize;
        let mut chunk = [0u8; 512];
        while self.remaining() > 0 {
            let want = self.remaining().min(chunk.len());
            let n = self.read(&mut chunk[..want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "frame body truncated",
                ));
            }
            skipped += n;
        }
        self.clear_limit();
        Ok(skipped)
    }
}

impl<R: Read> Read for FrameReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let allowed = match self.limit {
            Some(rem) => rem.min(buf.len()),
            None => buf.len(),
        };
        if allowed == 0 {
            return Ok(0);
        }
        let n = self.inner.read(&mut buf[..allowed])?;
        if let Some(rem) = &mut self.limit {
            *rem -= n;
        }
        Ok(n)
    }
}
