//! In-process mock server for exercising the client against scripted
//! connections without a real acquisition server.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use caps_rs_protocol::FrameHeader;

/// Scripted reply to one handshake.
#[derive(Debug, Clone, Default)]
pub struct MockSession {
    /// Status line for the handshake reply frame, e.g. `STATUS OK`.
    pub status: String,
    /// Pre-encoded frames (header plus body) streamed after the status.
    pub frames: Vec<Vec<u8>>,
    /// Keep the connection open after the frames and send nothing more.
    pub hang: bool,
    /// Drop the connection after the frames.
    pub close_after: bool,
}

impl MockSession {
    pub fn ok() -> Self {
        Self {
            status: "STATUS OK".to_string(),
            ..Self::default()
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: format!("ERROR: {message}"),
            close_after: true,
            ..Self::default()
        }
    }

    pub fn frame(mut self, frame: Vec<u8>) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }
}

/// Encode a control frame (id 0) carrying the given lines.
pub fn control_frame(lines: &[&str]) -> Vec<u8> {
    let mut body = String::new();
    for line in lines {
        body.push_str(line);
        body.push('\n');
    }
    let mut out = Vec::new();
    let header = FrameHeader {
        id: FrameHeader::CONTROL,
        size: body.len() as u32,
    };
    header.write(&mut out).unwrap();
    out.extend_from_slice(body.as_bytes());
    out
}

/// Encode a data frame for the given session id.
pub fn data_frame(id: u32, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let header = FrameHeader {
        id,
        size: body.len() as u32,
    };
    header.write(&mut out).unwrap();
    out.extend_from_slice(body);
    out
}

pub struct MockServer {
    addr: String,
    handshakes: Arc<Mutex<Vec<Vec<String>>>>,
    trailing: Arc<Mutex<Vec<u8>>>,
}

impl MockServer {
    /// Bind an ephemeral port and serve the scripted sessions, one per
    /// handshake, reusing the connection when the client does.
    pub fn start(sessions: Vec<MockSession>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handshakes = Arc::new(Mutex::new(Vec::new()));
        let trailing = Arc::new(Mutex::new(Vec::new()));

        let captured = Arc::clone(&handshakes);
        let stray = Arc::clone(&trailing);
        thread::spawn(move || {
            let mut pending: VecDeque<MockSession> = sessions.into();
            while !pending.is_empty() {
                let Ok((stream, _)) = listener.accept() else {
                    break;
                };
                serve_connection(stream, &mut pending, &captured, &stray);
            }
        });

        Self {
            addr,
            handshakes,
            trailing,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Handshake command lines captured so far, one vector per handshake.
    pub fn handshakes(&self) -> Vec<Vec<String>> {
        self.handshakes.lock().unwrap().clone()
    }

    /// Bytes received outside a handshake, e.g. an `ABORT` line sent
    /// while a hanging session held the connection open.
    pub fn trailing(&self) -> Vec<u8> {
        self.trailing.lock().unwrap().clone()
    }
}

fn serve_connection(
    stream: TcpStream,
    pending: &mut VecDeque<MockSession>,
    captured: &Arc<Mutex<Vec<Vec<String>>>>,
    trailing: &Arc<Mutex<Vec<u8>>>,
) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;

    while !pending.is_empty() {
        // one handshake: lines up to and including END
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let line = line.trim_end().to_string();
            let done = line == "END";
            lines.push(line);
            if done {
                break;
            }
        }
        captured.lock().unwrap().push(lines);

        let Some(session) = pending.pop_front() else {
            return;
        };
        if writer.write_all(&control_frame(&[&session.status])).is_err() {
            return;
        }
        for frame in &session.frames {
            if writer.write_all(frame).is_err() {
                return;
            }
        }
        let _ = writer.flush();

        if session.close_after {
            return;
        }
        if session.hang {
            // hold the connection open until the client gives up,
            // recording anything it still sends
            let mut sink = [0u8; 64];
            loop {
                match reader.read(&mut sink) {
                    Ok(0) | Err(_) => return,
                    Ok(n) => trailing.lock().unwrap().extend_from_slice(&sink[..n]),
                }
            }
        }
    }
}
