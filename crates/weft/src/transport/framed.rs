// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multipart framing and the connection handshake over TCP streams.
//!
//! TCP is a byte stream; message boundaries come from an outer `u32`
//! big-endian length prefix around the multipart body produced by
//! [`crate::wire::encode_frames`]. The decoder accumulates partial reads,
//! so readers can use short socket timeouts to stay responsive to the
//! exit flag without ever corrupting frame state.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::wire;

/// Outer length header size.
const MESSAGE_HEADER: usize = 4;

/// Upper bound on a single multipart message.
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Socket timeout used by reader loops between exit-flag checks.
pub(crate) const READ_TICK: Duration = Duration::from_millis(250);

/// How long a handshake may take before the connection is abandoned.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Serialize a multipart message with its outer length prefix.
pub(crate) fn encode_message(frames: &[Vec<u8>]) -> Vec<u8> {
    let body = wire::encode_frames(frames);
    let mut out = Vec::with_capacity(MESSAGE_HEADER + body.len());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// Write one multipart message to the stream.
pub(crate) fn write_message(mut stream: &TcpStream, frames: &[Vec<u8>]) -> io::Result<()> {
    stream.write_all(&encode_message(frames))
}

/// Incremental multipart decoder with partial-read state.
#[derive(Debug, Default)]
pub(crate) struct MessageDecoder {
    buf: Vec<u8>,
}

impl MessageDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes.
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next complete message, if one is buffered.
    ///
    /// Errors mean the stream is corrupt (oversized or malformed frame
    /// structure) and the connection must be dropped.
    pub(crate) fn next_message(&mut self) -> io::Result<Option<Vec<Vec<u8>>>> {
        if self.buf.len() < MESSAGE_HEADER {
            return Ok(None);
        }
        let len =
            u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("message of {} bytes exceeds limit", len),
            ));
        }
        if self.buf.len() < MESSAGE_HEADER + len {
            return Ok(None);
        }
        let body: Vec<u8> = self.buf[MESSAGE_HEADER..MESSAGE_HEADER + len].to_vec();
        self.buf.drain(..MESSAGE_HEADER + len);
        match wire::decode_frames(&body) {
            Some(frames) => Ok(Some(frames)),
            None => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "malformed multipart body",
            )),
        }
    }
}

/// Read until one complete message is available.
///
/// Returns `Ok(None)` on orderly EOF or when the exit flag is raised.
/// With a deadline, a silent peer produces `TimedOut` instead of blocking
/// forever (used during handshakes).
pub(crate) fn read_message(
    stream: &mut TcpStream,
    decoder: &mut MessageDecoder,
    exit: &AtomicBool,
    deadline: Option<Instant>,
) -> io::Result<Option<Vec<Vec<u8>>>> {
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(frames) = decoder.next_message()? {
            return Ok(Some(frames));
        }
        if exit.load(Ordering::Relaxed) {
            return Ok(None);
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "peer silent past deadline",
                ));
            }
        }
        match stream.read(&mut chunk) {
            Ok(0) => return Ok(None),
            Ok(n) => decoder.push(&chunk[..n]),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

/// The handshake each connection starts with: the peer's socket identity
/// plus optional PLAIN credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Hello {
    pub socket_id: String,
    pub username: String,
    pub password: String,
}

impl Hello {
    pub(crate) fn with_id(socket_id: &str) -> Self {
        Self {
            socket_id: socket_id.to_string(),
            ..Self::default()
        }
    }

    fn frames(&self) -> Vec<Vec<u8>> {
        vec![
            self.socket_id.clone().into_bytes(),
            self.username.clone().into_bytes(),
            self.password.clone().into_bytes(),
        ]
    }

    fn parse(frames: &[Vec<u8>]) -> Option<Self> {
        if frames.len() < 3 {
            return None;
        }
        Some(Self {
            socket_id: String::from_utf8(frames[0].clone()).ok()?,
            username: String::from_utf8(frames[1].clone()).ok()?,
            password: String::from_utf8(frames[2].clone()).ok()?,
        })
    }
}

fn read_hello(
    stream: &mut TcpStream,
    decoder: &mut MessageDecoder,
    exit: &AtomicBool,
) -> io::Result<Hello> {
    let deadline = Some(Instant::now() + HANDSHAKE_TIMEOUT);
    match read_message(stream, decoder, exit, deadline)? {
        Some(frames) => Hello::parse(&frames).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "malformed handshake")
        }),
        None => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed during handshake",
        )),
    }
}

/// Initiator side: announce ourselves, then learn the peer's identity.
pub(crate) fn client_handshake(
    stream: &mut TcpStream,
    decoder: &mut MessageDecoder,
    own: &Hello,
    exit: &AtomicBool,
) -> io::Result<Hello> {
    write_message(stream, &own.frames())?;
    read_hello(stream, decoder, exit)
}

/// Acceptor side: learn the peer first, verify credentials if a gate is
/// configured, then announce ourselves. Rejected peers see the connection
/// close before any reply.
pub(crate) fn server_handshake(
    stream: &mut TcpStream,
    decoder: &mut MessageDecoder,
    own: &Hello,
    gate: Option<&crate::transport::AuthGate>,
    exit: &AtomicBool,
) -> io::Result<Hello> {
    let peer = read_hello(stream, decoder, exit)?;
    if let Some(gate) = gate {
        if !gate.check(&peer.username, &peer.password) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "invalid username or password",
            ));
        }
    }
    write_message(stream, &own.frames())?;
    Ok(peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::AtomicBool;

    #[test]
    fn decoder_handles_partial_delivery() {
        let frames = vec![b"topic".to_vec(), vec![1, 2, 3]];
        let buf = encode_message(&frames);

        let mut decoder = MessageDecoder::new();
        decoder.push(&buf[..3]);
        assert!(decoder.next_message().unwrap().is_none());
        decoder.push(&buf[3..buf.len() - 1]);
        assert!(decoder.next_message().unwrap().is_none());
        decoder.push(&buf[buf.len() - 1..]);
        assert_eq!(decoder.next_message().unwrap().unwrap(), frames);
    }

    #[test]
    fn decoder_rejects_oversized_message() {
        let mut decoder = MessageDecoder::new();
        decoder.push(&u32::MAX.to_be_bytes());
        assert!(decoder.next_message().is_err());
    }

    #[test]
    fn decoder_yields_back_to_back_messages() {
        let a = vec![b"a".to_vec()];
        let b = vec![b"b".to_vec(), b"bb".to_vec()];
        let mut buf = encode_message(&a);
        buf.extend(encode_message(&b));

        let mut decoder = MessageDecoder::new();
        decoder.push(&buf);
        assert_eq!(decoder.next_message().unwrap().unwrap(), a);
        assert_eq!(decoder.next_message().unwrap().unwrap(), b);
        assert!(decoder.next_message().unwrap().is_none());
    }

    #[test]
    fn handshake_exchanges_identities() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let exit = AtomicBool::new(false);

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let exit = AtomicBool::new(false);
            let mut decoder = MessageDecoder::new();
            server_handshake(
                &mut stream,
                &mut decoder,
                &Hello::with_id("server-id"),
                None,
                &exit,
            )
            .unwrap()
        });

        let mut stream = TcpStream::connect(addr).unwrap();
        let mut decoder = MessageDecoder::new();
        let peer = client_handshake(
            &mut stream,
            &mut decoder,
            &Hello::with_id("client-id"),
            &exit,
        )
        .unwrap();
        assert_eq!(peer.socket_id, "server-id");
        assert_eq!(server.join().unwrap().socket_id, "client-id");
    }
}
