//! # Transports
//!
//! A transport is one socket bound to a single remote endpoint. Sessions only
//! need three primitives from it: send a payload, wait a bounded time for one
//! response, and close.
//!
//! - [`UdpTransport`] - connected datagram socket, one response per datagram
//! - [`TcpTransport`] - stream socket carrying `[length: u32 LE][payload]` frames
//!
//! Neither transport retries or reorders anything; that is the session's job.
//!
//! Responses carry no request identifier, so before every send both
//! transports drop whatever responses are already queued. A late answer to
//! an earlier request can then never be taken for the answer to this one.

use crate::config::SessionConfig;
use bytes::{Buf, BytesMut};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, UdpSocket};
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use ut2query_core::{QueryError, Result};

/// Bytes in front of every stream frame
pub const FRAME_HEADER_LEN: usize = 4;

const STREAM_READ_CHUNK: usize = 4096;

/// Socket abstraction used by [`crate::Session`]
pub trait Transport {
    /// Bind a socket to `remote`
    fn connect(remote: SocketAddr, config: &SessionConfig) -> Result<Self>
    where
        Self: Sized;

    /// Send one request payload, discarding responses queued before it
    fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for one response; `Ok(None)` when the wait expires
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Release the socket. Safe to call more than once.
    fn close(&mut self);
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn closed() -> QueryError {
    QueryError::Connection("Transport is closed".to_string())
}

/// Connected datagram socket
#[derive(Debug)]
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    remote: SocketAddr,
    recv_buffer: Vec<u8>,
}

impl UdpTransport {
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Drop datagrams that arrived before the next send
    fn discard_stale(&mut self) -> Result<()> {
        let socket = self.socket.as_ref().ok_or_else(closed)?;
        socket.set_nonblocking(true)?;

        let mut stale = 0usize;
        let drained = loop {
            match socket.recv(&mut self.recv_buffer) {
                Ok(_) => stale += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };
        socket.set_nonblocking(false)?;

        if stale > 0 {
            debug!("Discarded {} stale datagram(s) from {}", stale, self.remote);
        }
        drained.map_err(|e| {
            QueryError::Connection(format!("Failed to receive from {}: {}", self.remote, e))
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let socket = self.socket.as_ref().ok_or_else(closed)?;
        Ok(socket.local_addr()?)
    }
}

impl Transport for UdpTransport {
    fn connect(remote: SocketAddr, config: &SessionConfig) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(remote), Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| QueryError::Connection(format!("Failed to create datagram socket: {}", e)))?;

        if let Some(size) = config.socket_recv_buffer_size {
            socket.set_recv_buffer_size(size).map_err(|e| {
                QueryError::Connection(format!("Failed to set receive buffer size: {}", e))
            })?;
        }

        let local: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        socket
            .bind(&local.into())
            .map_err(|e| QueryError::Connection(format!("Failed to bind datagram socket: {}", e)))?;

        // Connecting filters out datagrams from any other source
        socket
            .connect(&remote.into())
            .map_err(|e| QueryError::Connection(format!("Failed to connect to {}: {}", remote, e)))?;

        let socket: UdpSocket = socket.into();
        debug!("Datagram socket {:?} bound for {}", socket.local_addr().ok(), remote);

        Ok(Self {
            socket: Some(socket),
            remote,
            recv_buffer: vec![0u8; config.max_response_size],
        })
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.discard_stale()?;
        let socket = self.socket.as_ref().ok_or_else(closed)?;
        trace!("UDP -> {}: {:02X?}", self.remote, payload);
        socket
            .send(payload)
            .map_err(|e| QueryError::Connection(format!("Failed to send to {}: {}", self.remote, e)))?;
        Ok(())
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let socket = self.socket.as_ref().ok_or_else(closed)?;
        socket.set_read_timeout(Some(timeout))?;

        match socket.recv(&mut self.recv_buffer) {
            Ok(n) => {
                trace!("UDP <- {}: {:02X?}", self.remote, &self.recv_buffer[..n]);
                Ok(Some(self.recv_buffer[..n].to_vec()))
            }
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(QueryError::Connection(format!(
                "Failed to receive from {}: {}",
                self.remote, e
            ))),
        }
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("Closed datagram socket for {}", self.remote);
        }
    }
}

/// Stream socket carrying length-prefixed frames
///
/// Bytes of a partially received frame are kept across `recv_timeout` calls,
/// so a frame split over two waits is still delivered whole.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    remote: SocketAddr,
    pending: BytesMut,
    max_frame: usize,
}

impl TcpTransport {
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Drop complete frames that arrived before the next send
    ///
    /// The bytes of a partial frame are kept so the stream stays in step.
    fn discard_stale(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(closed)?;
        stream.set_nonblocking(true)?;

        let mut chunk = [0u8; STREAM_READ_CHUNK];
        let drained = loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    break Err(QueryError::Connection(format!(
                        "{} closed the stream",
                        self.remote
                    )))
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    break Err(QueryError::Connection(format!(
                        "Failed to receive from {}: {}",
                        self.remote, e
                    )))
                }
            }
        };
        stream.set_nonblocking(false)?;
        drained?;

        let mut stale = 0usize;
        while self.take_frame()?.is_some() {
            stale += 1;
        }
        if stale > 0 {
            debug!("Discarded {} stale frame(s) from {}", stale, self.remote);
        }
        Ok(())
    }

    /// Pop one complete frame from the pending bytes
    fn take_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.pending.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut header = &self.pending[..FRAME_HEADER_LEN];
        let len = header.get_u32_le() as usize;
        if len > self.max_frame {
            self.pending.clear();
            return Err(QueryError::Connection(format!(
                "Frame of {} bytes from {} exceeds limit of {}",
                len, self.remote, self.max_frame
            )));
        }

        if self.pending.len() < FRAME_HEADER_LEN + len {
            return Ok(None);
        }

        self.pending.advance(FRAME_HEADER_LEN);
        Ok(Some(self.pending.split_to(len).to_vec()))
    }
}

impl Transport for TcpTransport {
    fn connect(remote: SocketAddr, config: &SessionConfig) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&remote, config.timeout)
            .map_err(|e| QueryError::Connection(format!("Failed to connect to {}: {}", remote, e)))?;

        // Requests are tiny; send them immediately
        stream.set_nodelay(true).map_err(|e| {
            QueryError::Connection(format!("Failed to set TCP_NODELAY: {}", e))
        })?;

        debug!("Stream connected to {}", remote);

        Ok(Self {
            stream: Some(stream),
            remote,
            pending: BytesMut::new(),
            max_frame: config.max_response_size,
        })
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.discard_stale()?;
        let stream = self.stream.as_mut().ok_or_else(closed)?;

        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(payload);

        trace!("TCP -> {}: {:02X?}", self.remote, frame);
        stream
            .write_all(&frame)
            .map_err(|e| QueryError::Connection(format!("Failed to send to {}: {}", self.remote, e)))?;
        Ok(())
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; STREAM_READ_CHUNK];

        loop {
            if let Some(frame) = self.take_frame()? {
                trace!("TCP <- {}: {:02X?}", self.remote, frame);
                return Ok(Some(frame));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let stream = self.stream.as_mut().ok_or_else(closed)?;
            stream.set_read_timeout(Some(deadline - now))?;

            match stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(QueryError::Connection(format!(
                        "{} closed the stream",
                        self.remote
                    )))
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(QueryError::Connection(format!(
                        "Failed to receive from {}: {}",
                        self.remote, e
                    )))
                }
            }
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            self.pending.clear();
            debug!("Closed stream to {}", self.remote);
        }
    }
}
