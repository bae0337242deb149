//! The per-connection TLS session handle.
//!
//! A session owns one handshake and one bidirectional encrypted stream. Its
//! operations follow the familiar non-blocking SSL calling convention: each
//! call either makes progress or reports which direction it is waiting on,
//! and a write that reported [`SessionError::WantWrite`] must be retried with
//! the same region until it succeeds.

use std::fmt;
use std::io;

use crate::connection::Socket;
use crate::error_queue::ErrorQueue;

/// Which side of the handshake a session plays. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

#[derive(Debug)]
pub enum SessionError {
    /// More ciphertext from the peer is needed before the call can progress.
    WantRead,
    /// The socket cannot currently take more ciphertext.
    WantWrite,
    /// The peer sent a clean close notification.
    ZeroReturn,
    /// The underlying socket failed.
    Syscall(io::Error),
    /// The TLS library rejected the peer's records.
    Protocol(String),
}

impl SessionError {
    /// Whether this is plain backpressure rather than a failure.
    pub fn is_would_block(&self) -> bool {
        matches!(self, SessionError::WantRead | SessionError::WantWrite)
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::WantRead => write!(f, "want read"),
            SessionError::WantWrite => write!(f, "want write"),
            SessionError::ZeroReturn => write!(f, "peer closed the session"),
            SessionError::Syscall(e) => write!(f, "transport error: {e}"),
            SessionError::Protocol(reason) => write!(f, "protocol error: {reason}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<SessionError> for io::Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::WantRead | SessionError::WantWrite => {
                io::Error::new(io::ErrorKind::WouldBlock, err.to_string())
            }
            SessionError::ZeroReturn => {
                io::Error::new(io::ErrorKind::ConnectionAborted, err.to_string())
            }
            SessionError::Syscall(e) => e,
            SessionError::Protocol(reason) => io::Error::new(io::ErrorKind::InvalidData, reason),
        }
    }
}

/// Identity material negotiated during the handshake.
pub trait PeerIdentity {
    /// DER encoding of the peer's end-entity certificate, if it sent one.
    fn peer_certificate(&self) -> Option<&[u8]>;

    /// Protocol selected through ALPN, if any.
    fn alpn_protocol(&self) -> Option<&[u8]>;
}

pub trait TlsSession: PeerIdentity {
    fn role(&self) -> Role;

    /// Perform the next handshake step against `socket`.
    ///
    /// Returns `Ok(())` once the handshake is complete and all of its records
    /// have been flushed.
    fn do_handshake(&mut self, socket: &mut dyn Socket) -> Result<(), SessionError>;

    /// Decrypt application data into `buf`, returning the byte count.
    fn read(&mut self, socket: &mut dyn Socket, buf: &mut [u8]) -> Result<usize, SessionError>;

    /// Encrypt and transmit `buf`, returning how many bytes of it were sent.
    fn write(&mut self, socket: &mut dyn Socket, buf: &[u8]) -> Result<usize, SessionError>;

    /// Send a close notification to the peer.
    fn shutdown(&mut self, socket: &mut dyn Socket) -> Result<(), SessionError>;

    /// Errors recorded by failed calls since the queue was last drained.
    fn error_queue(&mut self) -> &mut ErrorQueue;
}
