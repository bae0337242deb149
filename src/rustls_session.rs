//! [`TlsSession`] implementation backed by a `rustls::Connection`.
//!
//! rustls is a buffered state machine: ciphertext is pushed in with
//! `read_tls()` + `process_new_packets()` and pulled out with `write_tls()`.
//! This module drives it against a non-blocking socket and reports progress
//! the way the non-blocking SSL calls do: `WantRead` when the socket has no
//! more ciphertext for us, `WantWrite` when it cannot take the records we
//! produced.

use std::io::{self, Read, Write};
use std::sync::Arc;

use log::trace;
use rustls::pki_types::ServerName;

use crate::connection::Socket;
use crate::error_queue::{ErrorQueue, ErrorSource};
use crate::tls_session::{PeerIdentity, Role, SessionError, TlsSession};

pub struct RustlsSession {
    connection: rustls::Connection,
    role: Role,
    /// Plaintext length accepted by a write that then hit `WantWrite`. The
    /// retry with the same region reports exactly this many bytes.
    pending_write: Option<usize>,
    errors: ErrorQueue,
}

impl RustlsSession {
    pub fn new_server(config: Arc<rustls::ServerConfig>) -> io::Result<Self> {
        let connection = rustls::ServerConnection::new(config).map_err(|e| {
            io::Error::other(format!("failed to create rustls server connection: {e}"))
        })?;
        Ok(Self::from_connection(connection.into()))
    }

    pub fn new_client(
        config: Arc<rustls::ClientConfig>,
        server_name: ServerName<'static>,
    ) -> io::Result<Self> {
        let connection = rustls::ClientConnection::new(config, server_name).map_err(|e| {
            io::Error::other(format!("failed to create rustls client connection: {e}"))
        })?;
        Ok(Self::from_connection(connection.into()))
    }

    fn from_connection(mut connection: rustls::Connection) -> Self {
        // Outbound plaintext is already bounded by the connection's send buffer.
        let role = match connection {
            rustls::Connection::Client(ref mut conn) => {
                conn.set_buffer_limit(None);
                Role::Client
            }
            rustls::Connection::Server(ref mut conn) => {
                conn.set_buffer_limit(None);
                Role::Server
            }
        };
        Self {
            connection,
            role,
            pending_write: None,
            errors: ErrorQueue::new(),
        }
    }

    pub fn is_handshaking(&self) -> bool {
        self.connection.is_handshaking()
    }

    fn transport_error(&mut self, e: io::Error) -> SessionError {
        self.errors.push(ErrorSource::Transport, e.to_string());
        SessionError::Syscall(e)
    }

    /// Write every pending record to the socket.
    fn flush_tls(&mut self, socket: &mut dyn Socket) -> Result<(), SessionError> {
        while self.connection.wants_write() {
            match self.connection.write_tls(&mut &mut *socket) {
                Ok(0) => {
                    return Err(self.transport_error(io::ErrorKind::WriteZero.into()));
                }
                Ok(n) => {
                    trace!("wrote {} bytes of TLS records", n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Err(SessionError::WantWrite);
                }
                Err(e) => return Err(self.transport_error(e)),
            }
        }
        Ok(())
    }

    /// Read one chunk of ciphertext from the socket and process it.
    ///
    /// Returns the number of bytes read; 0 means the peer closed the socket.
    fn fill_tls(&mut self, socket: &mut dyn Socket) -> Result<usize, SessionError> {
        let n = match self.connection.read_tls(&mut &mut *socket) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(SessionError::WantRead);
            }
            Err(e) => return Err(self.transport_error(e)),
        };
        trace!("read {} bytes of TLS records", n);

        if n > 0
            && let Err(e) = self.connection.process_new_packets()
        {
            self.errors.push(ErrorSource::Tls, e.to_string());
            // rustls queued an alert describing the failure; the peer
            // gets it only if the socket takes it right away.
            let _ = self.flush_tls(socket);
            return Err(SessionError::Protocol(e.to_string()));
        }
        Ok(n)
    }
}

impl PeerIdentity for RustlsSession {
    fn peer_certificate(&self) -> Option<&[u8]> {
        self.connection
            .peer_certificates()
            .and_then(|certs| certs.first())
            .map(|cert| cert.as_ref())
    }

    fn alpn_protocol(&self) -> Option<&[u8]> {
        self.connection.alpn_protocol()
    }
}

impl TlsSession for RustlsSession {
    fn role(&self) -> Role {
        self.role
    }

    fn do_handshake(&mut self, socket: &mut dyn Socket) -> Result<(), SessionError> {
        loop {
            self.flush_tls(socket)?;
            if !self.connection.is_handshaking() {
                return Ok(());
            }
            if self.fill_tls(socket)? == 0 {
                return Err(self.transport_error(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "EOF during TLS handshake",
                )));
            }
        }
    }

    fn read(&mut self, socket: &mut dyn Socket, buf: &mut [u8]) -> Result<usize, SessionError> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.connection.reader().read(buf) {
                Ok(0) => return Err(SessionError::ZeroReturn),
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(self.transport_error(e)),
            }

            // After EOF the reader reports either a clean close or
            // UnexpectedEof, so this loop always terminates.
            self.fill_tls(socket)?;

            // Post-handshake messages (key updates, alerts) may need an answer.
            match self.flush_tls(socket) {
                Ok(()) | Err(SessionError::WantWrite) => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn write(&mut self, socket: &mut dyn Socket, buf: &[u8]) -> Result<usize, SessionError> {
        let accepted = match self.pending_write.take() {
            Some(accepted) => {
                debug_assert!(
                    accepted <= buf.len(),
                    "write retried with a shorter region: accepted={}, len={}",
                    accepted,
                    buf.len()
                );
                accepted
            }
            None => {
                if buf.is_empty() {
                    return Ok(0);
                }
                match self.connection.writer().write(buf) {
                    Ok(n) => n,
                    Err(e) => return Err(self.transport_error(e)),
                }
            }
        };

        match self.flush_tls(socket) {
            Ok(()) => Ok(accepted),
            Err(SessionError::WantWrite) => {
                self.pending_write = Some(accepted);
                Err(SessionError::WantWrite)
            }
            Err(e) => Err(e),
        }
    }

    fn shutdown(&mut self, socket: &mut dyn Socket) -> Result<(), SessionError> {
        self.connection.send_close_notify();
        self.flush_tls(socket)
    }

    fn error_queue(&mut self) -> &mut ErrorQueue {
        &mut self.errors
    }
}
