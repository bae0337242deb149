//! The TLS connection I/O engine.
//!
//! [`SslConnection`] sits between a raw non-blocking [`Transport`] and the
//! plaintext consumer. Each call is one complete, non-blocking step: it drives
//! the handshake, decrypts whatever ciphertext is available into the receive
//! buffer, or encrypts the send buffer onto the socket, and resolves every
//! session error into a [`PostIoAction`]. When a step returns
//! [`PostIoAction::KeepOpen`] without finishing its work, the reactor calls
//! again once the transport is ready.

use std::io;
use std::sync::Arc;

use log::{debug, trace};

use crate::buffer::Buffer;
use crate::connection::{ConnectionEvent, ConnectionState, PostIoAction, Transport};
use crate::error_queue::ErrorSource;
use crate::tls_context::TlsContext;
use crate::tls_session::{PeerIdentity, Role, SessionError, TlsSession};
use crate::util::sha256_hex;

/// Upper bound of plaintext decrypted per reservation of the receive buffer.
pub const READ_CHUNK_SIZE: usize = 16384;

const READ_SLICES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    NotStarted,
    InProgress,
    /// Terminal. The peer passed verification and `Connected` was raised.
    Complete,
    /// Terminal.
    Failed,
}

/// Readiness reported by the reactor for one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ready {
    pub readable: bool,
    pub writable: bool,
}

pub struct SslConnection<C: TlsContext, T: Transport> {
    ctx: Arc<C>,
    transport: T,
    session: Option<C::Session>,
    handshake_state: HandshakeState,
    read_buffer: Buffer,
    write_buffer: Buffer,
}

fn drain_error_queue<S: TlsSession>(id: u64, session: &mut S) {
    let queue = session.error_queue();
    while let Some(entry) = queue.pop() {
        debug!("[C{}] TLS error: {}", id, entry);
    }
}

impl<C: TlsContext, T: Transport> SslConnection<C, T> {
    /// Wrap `transport`, creating a session that plays `role`.
    pub fn new(ctx: Arc<C>, transport: T, role: Role) -> io::Result<Self> {
        let session = ctx.new_session(role)?;
        debug!("[C{}] new TLS {:?} connection", transport.id(), role);
        Ok(Self {
            ctx,
            transport,
            session: Some(session),
            handshake_state: HandshakeState::NotStarted,
            read_buffer: Buffer::new(),
            write_buffer: Buffer::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.transport.id()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The session, until the connection is closed.
    pub fn session(&self) -> Option<&C::Session> {
        self.session.as_ref()
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake_state
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.handshake_state == HandshakeState::Complete
    }

    /// Decrypted application data. Consumers drain what they have handled.
    pub fn read_buffer(&mut self) -> &mut Buffer {
        &mut self.read_buffer
    }

    /// Plaintext waiting to be encrypted.
    pub fn write_buffer(&self) -> &Buffer {
        &self.write_buffer
    }

    /// Queue `data` for encryption, leaving `data` empty. It is sent by the
    /// next write pump.
    pub fn write(&mut self, data: &mut Buffer) {
        self.write_buffer.move_from(data);
    }

    /// Lowercase hex SHA-256 of the peer's DER certificate, or "" when there
    /// is none.
    pub fn sha256_peer_certificate_digest(&self) -> String {
        self.session
            .as_ref()
            .and_then(|session| session.peer_certificate())
            .map(sha256_hex)
            .unwrap_or_default()
    }

    /// The ALPN protocol agreed with the peer, or "".
    pub fn next_protocol(&self) -> String {
        self.session
            .as_ref()
            .and_then(|session| session.alpn_protocol())
            .map(|protocol| String::from_utf8_lossy(protocol).into_owned())
            .unwrap_or_default()
    }

    fn drain_errors(&mut self) {
        let id = self.transport.id();
        if let Some(session) = self.session.as_mut() {
            drain_error_queue(id, session);
        }
    }

    /// Fail a pump on a renegotiation request, which this engine never
    /// answers.
    fn unsupported_renegotiation(&mut self, during: &str) -> PostIoAction {
        let id = self.transport.id();
        debug!("[C{}] peer requested renegotiation during {}", id, during);
        if let Some(session) = self.session.as_mut() {
            session
                .error_queue()
                .push(ErrorSource::Tls, "renegotiation is not supported");
        }
        self.drain_errors();
        PostIoAction::Close
    }

    /// Advance the handshake by one non-blocking step.
    ///
    /// Once the handshake has finished the session is left alone: a
    /// completed handshake keeps the connection open and a failed one
    /// closes it.
    pub fn do_handshake(&mut self) -> PostIoAction {
        match self.handshake_state {
            HandshakeState::Complete => return PostIoAction::KeepOpen,
            HandshakeState::Failed => return PostIoAction::Close,
            HandshakeState::NotStarted | HandshakeState::InProgress => {}
        }

        let id = self.transport.id();
        let Some(session) = self.session.as_mut() else {
            return PostIoAction::Close;
        };
        self.handshake_state = HandshakeState::InProgress;

        match session.do_handshake(self.transport.socket()) {
            Ok(()) => {
                if !self.ctx.verify_peer(&*session) {
                    debug!("[C{}] peer verification failed", id);
                    self.handshake_state = HandshakeState::Failed;
                    self.drain_errors();
                    return PostIoAction::Close;
                }

                debug!(
                    "[C{}] handshake complete, alpn={:?}",
                    id,
                    session
                        .alpn_protocol()
                        .map(|protocol| String::from_utf8_lossy(protocol).into_owned())
                );
                self.handshake_state = HandshakeState::Complete;
                self.transport.raise_event(ConnectionEvent::Connected);

                // A callback may have closed the connection while handling
                // the event.
                if self.transport.state() == ConnectionState::Open {
                    PostIoAction::KeepOpen
                } else {
                    PostIoAction::Close
                }
            }
            Err(SessionError::WantRead) | Err(SessionError::WantWrite) => PostIoAction::KeepOpen,
            Err(e) => {
                debug!("[C{}] handshake failed: {}", id, e);
                self.handshake_state = HandshakeState::Failed;
                self.drain_errors();
                PostIoAction::Close
            }
        }
    }

    /// Runs the handshake if it is still pending. `None` means the record
    /// pump may proceed.
    fn ensure_handshake(&mut self) -> Option<PostIoAction> {
        match self.handshake_state {
            HandshakeState::Complete => None,
            HandshakeState::Failed => Some(PostIoAction::Close),
            HandshakeState::NotStarted | HandshakeState::InProgress => {
                let action = self.do_handshake();
                if action == PostIoAction::Close || !self.is_handshake_complete() {
                    Some(action)
                } else {
                    None
                }
            }
        }
    }

    /// Decrypt all currently available ciphertext into the receive buffer.
    pub fn do_read_from_socket(&mut self) -> PostIoAction {
        if let Some(action) = self.ensure_handshake() {
            return action;
        }

        let id = self.transport.id();
        let Some(session) = self.session.as_mut() else {
            return PostIoAction::Close;
        };

        loop {
            let mut reservation = self.read_buffer.reserve(READ_CHUNK_SIZE, READ_SLICES);
            let mut stopped = None;
            for i in 0..reservation.len() {
                match session.read(self.transport.socket(), reservation.slice_mut(i)) {
                    Ok(n) => {
                        trace!("[C{}] decrypted {} bytes", id, n);
                        reservation.set_filled(i, n);
                    }
                    Err(e) => {
                        stopped = Some(e);
                        break;
                    }
                }
            }
            // Data decrypted before an error still belongs to the consumer.
            reservation.commit();

            match stopped {
                None => continue,
                Some(SessionError::WantRead) => return PostIoAction::KeepOpen,
                Some(SessionError::WantWrite) => return self.unsupported_renegotiation("read"),
                Some(SessionError::ZeroReturn) => {
                    debug!("[C{}] peer closed the TLS session", id);
                    self.drain_errors();
                    return PostIoAction::Close;
                }
                Some(e) => {
                    debug!("[C{}] read failed: {}", id, e);
                    self.drain_errors();
                    return PostIoAction::Close;
                }
            }
        }
    }

    /// Encrypt as much of the send buffer as the socket accepts.
    pub fn do_write_to_socket(&mut self) -> PostIoAction {
        if let Some(action) = self.ensure_handshake() {
            return action;
        }

        if self.write_buffer.is_empty() {
            return PostIoAction::KeepOpen;
        }

        let id = self.transport.id();
        let Some(session) = self.session.as_mut() else {
            return PostIoAction::Close;
        };

        let mut bytes_written = 0;
        let mut failed = None;
        for slice in self.write_buffer.raw_slices() {
            match session.write(self.transport.socket(), slice) {
                Ok(n) => {
                    bytes_written += n;
                    if n < slice.len() {
                        break;
                    }
                }
                Err(SessionError::WantWrite) => break,
                Err(e) => {
                    failed = Some(e);
                    break;
                }
            }
        }

        match failed {
            None => {}
            Some(SessionError::WantRead) => return self.unsupported_renegotiation("write"),
            Some(e) => {
                debug!("[C{}] write failed: {}", id, e);
                self.drain_errors();
                return PostIoAction::Close;
            }
        }

        trace!("[C{}] encrypted {} bytes", id, bytes_written);
        self.write_buffer.drain(bytes_written);
        PostIoAction::KeepOpen
    }

    /// Dispatch one reactor readiness event: write first, then read. The
    /// connection is closed as soon as a pump asks for it or the transport
    /// leaves `Open`.
    pub fn on_io_ready(&mut self, ready: Ready) -> ConnectionState {
        if ready.writable && self.transport.state() == ConnectionState::Open {
            let action = self.do_write_to_socket();
            if action == PostIoAction::Close || self.transport.state() != ConnectionState::Open {
                self.close();
                return self.transport.state();
            }
        }

        if ready.readable && self.transport.state() == ConnectionState::Open {
            let action = self.do_read_from_socket();
            if action == PostIoAction::Close || self.transport.state() != ConnectionState::Open {
                self.close();
                return self.transport.state();
            }
        }

        self.transport.state()
    }

    /// Tear the connection down: one best-effort close notification if the
    /// handshake completed, then the socket, then the session.
    ///
    /// Calling this again is a no-op.
    pub fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let id = self.transport.id();

        if self.handshake_state == HandshakeState::Complete {
            match session.shutdown(self.transport.socket()) {
                Ok(()) => debug!("[C{}] sent close notify", id),
                Err(e) => debug!("[C{}] close notify not sent: {}", id, e),
            }
        }
        drain_error_queue(id, &mut session);

        self.transport.close_socket();
        drop(session);
    }
}

impl<C: TlsContext, T: Transport> Drop for SslConnection<C, T> {
    fn drop(&mut self) {
        self.close();
    }
}
