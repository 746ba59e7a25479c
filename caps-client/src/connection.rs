//! Blocking connection engine.
//!
//! The intended usage is two threads: one sits in [`Connection::next`],
//! which blocks on the socket, while another may call
//! [`Connection::abort`] or [`Connection::close`] at any time. Settings,
//! the request table and the lifecycle state live behind one mutex that
//! is only held for short, non-blocking sections; the frame reader lives
//! behind a second mutex that the reading thread holds across blocking
//! reads. Cancellation works by shutting the socket down through a cloned
//! handle, which makes the blocked read fail without touching the reader
//! lock.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use caps_rs_protocol::record::{stream_id, validate_stream_id};
use caps_rs_protocol::time::format_spec;
use caps_rs_protocol::{CapsError, DataRecord, RecordType, SessionItem, SessionTable, Status, Time};

use crate::decode::{decode_mseed, decode_raw};
use crate::error::{ClientError, Result};
use crate::reader::FrameReader;
use crate::state::ConnectionState;

/// Port used when the server address carries none.
pub const DEFAULT_PORT: u16 = 18002;

/// Pause between failed connect attempts, sliced so an abort is noticed
/// quickly.
const RETRY_SLICE: Duration = Duration::from_millis(500);
const RETRY_SLICES: u32 = 10;

/// One subscribed stream with its (possibly advanced) time window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub stream_id: String,
    /// Window start; `None` falls back to the connection-wide start time.
    pub start: Option<Time>,
    /// Window end; `None` falls back to the connection-wide end time.
    pub end: Option<Time>,
    /// Whether any record has arrived for this stream. Once set, `start`
    /// tracks the end time of the last record so a renewed handshake
    /// resumes where the stream left off.
    pub received_data: bool,
}

#[derive(Debug, Clone)]
struct Settings {
    host: String,
    port: u16,
    user: String,
    password: String,
    start: Option<Time>,
    end: Option<Time>,
    realtime: bool,
    meta_only: bool,
    read_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            user: String::new(),
            password: String::new(),
            start: None,
            end: None,
            realtime: true,
            meta_only: false,
            read_timeout: None,
        }
    }
}

struct Shared {
    state: ConnectionState,
    requests: BTreeMap<String, StreamRequest>,
    settings: Settings,
}

struct Io {
    reader: Option<FrameReader<TcpStream>>,
    session: SessionTable,
    current: Option<SessionItem>,
}

enum Step {
    Record(DataRecord),
    EndOfData,
    Continue,
}

/// Client connection to one acquisition server.
pub struct Connection {
    shared: Mutex<Shared>,
    io: Mutex<Io>,
    /// Cloned socket handle used for shutdown and handshake writes, so
    /// neither needs the reader lock.
    sock: Mutex<Option<TcpStream>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(Shared {
                state: ConnectionState::EndOfData,
                requests: BTreeMap::new(),
                settings: Settings::default(),
            }),
            io: Mutex::new(Io {
                reader: None,
                session: SessionTable::new(),
                current: None,
            }),
            sock: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.shared).state
    }

    /// Snapshot of the current request table.
    pub fn requests(&self) -> Vec<StreamRequest> {
        lock(&self.shared).requests.values().cloned().collect()
    }

    /// Point the connection at `host[:port]`. Tears down any open socket
    /// and returns the state to `EndOfData`; requests are kept.
    pub fn set_server(&self, addr: &str) -> Result<()> {
        let (host, port) = parse_address(addr)?;
        self.disconnect();
        let mut shared = lock(&self.shared);
        shared.settings.host = host;
        shared.settings.port = port;
        shared.state = ConnectionState::EndOfData;
        Ok(())
    }

    /// Credentials sent as an `AUTH` line. An empty user disables it.
    pub fn set_credentials(&self, user: &str, password: &str) {
        let mut shared = lock(&self.shared);
        shared.settings.user = user.to_string();
        shared.settings.password = password.to_string();
    }

    /// Connection-wide window start, used by requests without their own.
    pub fn set_start_time(&self, start: Option<Time>) {
        lock(&self.shared).settings.start = start;
    }

    /// Connection-wide window end, used by requests without their own.
    pub fn set_end_time(&self, end: Option<Time>) {
        lock(&self.shared).settings.end = end;
    }

    pub fn set_time_window(&self, start: Option<Time>, end: Option<Time>) {
        let mut shared = lock(&self.shared);
        shared.settings.start = start;
        shared.settings.end = end;
    }

    /// Whether the server should keep streaming live data after the
    /// backlog (`REALTIME ON`, the default) or stop at end of archive.
    pub fn set_realtime(&self, realtime: bool) {
        lock(&self.shared).settings.realtime = realtime;
    }

    /// Request stream metadata only, without waveform payloads.
    pub fn set_meta_only(&self, meta_only: bool) {
        lock(&self.shared).settings.meta_only = meta_only;
    }

    /// Socket read timeout. Applies to the live socket immediately and to
    /// future connects.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        lock(&self.shared).settings.read_timeout = timeout;
        if let Some(sock) = lock(&self.sock).as_ref() {
            sock.set_read_timeout(timeout)?;
        }
        Ok(())
    }

    /// Subscribe a stream by its components. See [`Connection::add_request`].
    pub fn add_stream(&self, net: &str, sta: &str, loc: &str, cha: &str) -> bool {
        self.add_request(&stream_id(net, sta, loc, cha), None, None)
    }

    /// Subscribe a stream with an optional per-stream window. Only allowed
    /// while no data is being streamed; a duplicate id replaces the
    /// earlier request. Returns whether the request was accepted.
    pub fn add_request(&self, stream: &str, start: Option<Time>, end: Option<Time>) -> bool {
        if validate_stream_id(stream).is_err() {
            warn!(stream, "rejected malformed stream id");
            return false;
        }
        let mut shared = lock(&self.shared);
        if shared.state != ConnectionState::EndOfData {
            warn!(
                stream,
                state = shared.state.as_str(),
                "requests can only be added while idle"
            );
            return false;
        }
        shared.requests.insert(
            stream.to_string(),
            StreamRequest {
                stream_id: stream.to_string(),
                start,
                end,
                received_data: false,
            },
        );
        true
    }

    /// Block until the next record arrives. Returns `Ok(None)` when the
    /// server signalled end of data, the connection was aborted, or there
    /// is nothing to request; calling again after end of data starts a
    /// fresh handshake that resumes each stream past its last record.
    pub fn next(&self) -> Result<Option<DataRecord>> {
        let mut io = lock(&self.io);
        loop {
            match self.state() {
                ConnectionState::Aborted | ConnectionState::Error => return Ok(None),
                ConnectionState::EndOfData => {
                    if lock(&self.shared).requests.is_empty() {
                        return Ok(None);
                    }
                    match self.handshake(&mut io) {
                        Ok(true) => continue,
                        Ok(false) => return Ok(None),
                        Err(err) => return self.fail(&mut io, err),
                    }
                }
                ConnectionState::Active => {}
            }

            match self.read_frame(&mut io) {
                Ok(Step::Record(record)) => {
                    self.advance_request(&record);
                    return Ok(Some(record));
                }
                Ok(Step::EndOfData) => {
                    info!("server signalled end of data");
                    let mut shared = lock(&self.shared);
                    if shared.state == ConnectionState::Active {
                        shared.state = ConnectionState::EndOfData;
                    }
                    return Ok(None);
                }
                Ok(Step::Continue) => {}
                Err(err) => return self.fail(&mut io, err),
            }
        }
    }

    /// Cancel from another thread: best-effort `ABORT` to the server when
    /// streaming, then shut the socket down so a blocked [`Connection::next`]
    /// returns promptly.
    pub fn abort(&self) {
        let was_active = {
            let mut shared = lock(&self.shared);
            if shared.state == ConnectionState::Aborted {
                warn!("abort called twice");
                return;
            }
            let was_active = shared.state == ConnectionState::Active;
            shared.state = ConnectionState::Aborted;
            was_active
        };
        info!("aborting connection");
        let mut sock = lock(&self.sock);
        if let Some(sock) = sock.as_mut() {
            if was_active {
                let _ = sock.write_all(b"ABORT\n");
            }
            let _ = sock.shutdown(Shutdown::Both);
        }
    }

    /// Terminate the connection. Like [`Connection::abort`] but also tears
    /// the socket down and clears the mirrored session table. Safe to call
    /// repeatedly.
    pub fn close(&self) {
        {
            let mut shared = lock(&self.shared);
            shared.state = ConnectionState::Aborted;
        }
        self.disconnect();
    }

    /// Drop the socket and the mirrored session table without touching the
    /// lifecycle state. Safe to call repeatedly and from any thread; the
    /// shutdown happens before the reader lock is taken so a blocked read
    /// cannot hold this up.
    pub fn disconnect(&self) {
        {
            let mut sock = lock(&self.sock);
            if let Some(sock) = sock.take() {
                let _ = sock.shutdown(Shutdown::Both);
            }
        }
        let mut io = lock(&self.io);
        self.disconnect_locked(&mut io);
    }

    /// Return to a usable `EndOfData` state after an abort or error. With
    /// `clear_streams` the request table is emptied; otherwise requests
    /// keep their advanced start times and the next handshake resumes
    /// each stream where it left off.
    pub fn reset(&self, clear_streams: bool) {
        {
            let mut shared = lock(&self.shared);
            if shared.state == ConnectionState::Active {
                shared.state = ConnectionState::Aborted;
            }
        }
        self.disconnect();
        let mut shared = lock(&self.shared);
        shared.state = ConnectionState::EndOfData;
        if clear_streams {
            shared.requests.clear();
        }
    }

    fn fail(&self, io: &mut Io, err: ClientError) -> Result<Option<DataRecord>> {
        self.disconnect_locked(io);
        let mut shared = lock(&self.shared);
        if shared.state == ConnectionState::Aborted {
            debug!("read interrupted by abort");
            return Ok(None);
        }
        shared.state = ConnectionState::Error;
        warn!(error = %err, "connection failed");
        Err(err)
    }

    fn disconnect_locked(&self, io: &mut Io) {
        {
            let mut sock = lock(&self.sock);
            if let Some(sock) = sock.take() {
                let _ = sock.shutdown(Shutdown::Both);
            }
        }
        io.reader = None;
        io.session.clear();
        io.current = None;
    }

    /// Send the request block and wait for the status reply. Returns
    /// `Ok(false)` when the connection was aborted or closed before the
    /// handshake could complete.
    fn handshake(&self, io: &mut Io) -> Result<bool> {
        let (text, host, port, timeout) = {
            let shared = lock(&self.shared);
            (
                build_handshake(&shared.settings, &shared.requests),
                shared.settings.host.clone(),
                shared.settings.port,
                shared.settings.read_timeout,
            )
        };

        if io.reader.is_none() {
            let Some(stream) = self.connect(&host, port, timeout)? else {
                return Ok(false);
            };
            *lock(&self.sock) = Some(stream.try_clone()?);
            io.reader = Some(FrameReader::new(stream));
        }
        io.session.clear();
        io.current = None;

        {
            let mut sock = lock(&self.sock);
            let Some(sock) = sock.as_mut() else {
                return Ok(false);
            };
            sock.write_all(text.as_bytes())?;
            sock.flush()?;
        }
        debug!(host = %host, port, "request block sent");

        let reader = match io.reader.as_mut() {
            Some(reader) => reader,
            None => return Ok(false),
        };
        let header = reader.read_header()?;
        if !header.is_control() {
            return Err(ClientError::Handshake(format!(
                "expected a control frame, got id {}",
                header.id
            )));
        }
        reader.set_limit(header.size as usize);
        let status = reader.read_line()?;
        if reader.remaining() > 0 {
            warn!(extra = reader.remaining(), "discarding bytes after status line");
            reader.skip_remaining()?;
        }

        let upper = status.to_ascii_uppercase();
        if upper.starts_with("STATUS OK") {
            let mut shared = lock(&self.shared);
            if shared.state == ConnectionState::EndOfData {
                shared.state = ConnectionState::Active;
                info!(host = %host, port, "handshake accepted");
            }
            Ok(true)
        } else if upper.starts_with("ERROR") {
            Err(ClientError::Handshake(status))
        } else {
            Err(ClientError::Handshake(format!(
                "unexpected status line: {status}"
            )))
        }
    }

    /// Connect with indefinite retries, pausing 5 s between attempts in
    /// abort-checked slices. Returns `Ok(None)` on abort.
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> Result<Option<TcpStream>> {
        loop {
            if self.state() == ConnectionState::Aborted {
                return Ok(None);
            }
            match TcpStream::connect((host, port)) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(timeout)?;
                    info!(host, port, "connected");
                    return Ok(Some(stream));
                }
                Err(err) => {
                    warn!(host, port, error = %err, "connect failed, retrying");
                    for _ in 0..RETRY_SLICES {
                        thread::sleep(RETRY_SLICE);
                        if self.state() == ConnectionState::Aborted {
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }

    fn read_frame(&self, io: &mut Io) -> Result<Step> {
        let Io {
            reader,
            session,
            current,
        } = io;
        let reader = match reader.as_mut() {
            Some(reader) => reader,
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "no open connection",
                )
                .into());
            }
        };

        if reader.remaining() > 0 {
            warn!(
                leftover = reader.remaining(),
                "skipping unread frame remainder"
            );
            reader.skip_remaining()?;
        }

        let header = reader.read_header()?;
        reader.set_limit(header.size as usize);

        if header.is_control() {
            while reader.remaining() > 0 {
                let line = reader.read_line()?;
                let status = session.feed_line(&line, &mut |id| {
                    debug!(id, "session item invalidated");
                    if current.as_ref().map(|item| item.id) == Some(id) {
                        *current = None;
                    }
                });
                match status {
                    Status::Ok => {}
                    Status::EndOfData => {
                        // the socket is reused for the next handshake, so
                        // anything after the EOD line must be consumed
                        reader.skip_remaining()?;
                        return Ok(Step::EndOfData);
                    }
                    Status::Error => {
                        return Err(CapsError::InvalidSessionLine(line).into());
                    }
                }
            }
            return Ok(Step::Continue);
        }

        let item = match current.as_ref().filter(|item| item.id == header.id) {
            Some(item) => item.clone(),
            None => match session.get(header.id) {
                Some(item) => {
                    let item = item.clone();
                    *current = Some(item.clone());
                    item
                }
                None => {
                    warn!(
                        id = header.id,
                        size = header.size,
                        "skipping data frame for unknown session id"
                    );
                    reader.skip_remaining()?;
                    return Ok(Step::Continue);
                }
            },
        };

        let record = match item.record_type {
            RecordType::Raw => decode_raw(reader, header.size as usize, &item)?,
            RecordType::Miniseed => decode_mseed(reader, header.size as usize)?,
        };
        Ok(Step::Record(record))
    }

    /// Advance the request behind a delivered record so a renewed
    /// handshake resumes past it.
    fn advance_request(&self, record: &DataRecord) {
        let mut shared = lock(&self.shared);
        if let Some(request) = shared.requests.get_mut(&record.stream_id) {
            request.start = Some(record.end_time);
            request.received_data = true;
        }
    }
}

/// Render the request block. Streams that already received data come
/// first so their continuation windows are registered before any fresh
/// subscriptions.
fn build_handshake(settings: &Settings, requests: &BTreeMap<String, StreamRequest>) -> String {
    let mut out = String::new();
    if !settings.user.is_empty() {
        let _ = writeln!(out, "AUTH {} {}", settings.user, settings.password);
    }
    out.push_str("BEGIN REQUEST\n");
    let _ = writeln!(out, "META {}", on_off(settings.meta_only));
    let _ = writeln!(out, "REALTIME {}", on_off(settings.realtime));
    for continuation in [true, false] {
        for request in requests
            .values()
            .filter(|r| r.received_data == continuation)
        {
            let _ = writeln!(out, "STREAM ADD {}", request.stream_id);
            let start = request.start.or(settings.start);
            let end = request.end.or(settings.end);
            // the TIME line is part of the wire format even when both
            // sides are unset
            let _ = writeln!(out, "TIME {}:{}", format_spec(start), format_spec(end));
        }
    }
    out.push_str("END\n");
    out
}

fn on_off(flag: bool) -> &'static str {
    if flag { "ON" } else { "OFF" }
}

/// Parse `host[:port]`, defaulting the port to [`DEFAULT_PORT`].
fn parse_address(addr: &str) -> Result<(String, u16)> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(ClientError::BadAddress(addr.to_string()));
    }
    match addr.rsplit_once(':') {
        None => Ok((addr.to_string(), DEFAULT_PORT)),
        Some((host, port)) => {
            if host.is_empty() {
                return Err(ClientError::BadAddress(addr.to_string()));
            }
            let port = port
                .parse()
                .map_err(|_| ClientError::BadAddress(addr.to_string()))?;
            Ok((host.to_string(), port))
        }
    }
}
