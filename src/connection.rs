//! Transport-agnostic connection interface.
//!
//! [`crate::ssl_connection::SslConnection`] decorates a [`Transport`]: the
//! transport owns the raw non-blocking socket, the connection state and the
//! registered callbacks, and the TLS layer only borrows the socket for
//! record I/O and asks the transport to raise events or close.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

/// A raw non-blocking byte stream.
pub trait Socket: Read + Write {}

impl<T: Read + Write + ?Sized> Socket for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    /// Closure was requested; the owner has not torn the socket down yet.
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The secure channel is established and the peer passed verification.
    Connected,
    /// The socket was closed locally.
    LocalClose,
}

/// Outcome of every handshake or record pump step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostIoAction {
    KeepOpen,
    Close,
}

/// The view of a connection handed to callbacks.
pub trait ConnectionControl {
    fn id(&self) -> u64;

    fn state(&self) -> ConnectionState;

    /// Request closure. An open connection moves to [`ConnectionState::Closing`].
    fn close(&mut self);
}

pub trait ConnectionCallbacks {
    fn on_event(&mut self, event: ConnectionEvent, connection: &mut dyn ConnectionControl);
}

pub trait Transport: ConnectionControl {
    fn socket(&mut self) -> &mut dyn Socket;

    /// Deliver `event` to every registered callback.
    fn raise_event(&mut self, event: ConnectionEvent);

    /// Release the socket. The connection ends up [`ConnectionState::Closed`].
    fn close_socket(&mut self);
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(0);

struct ClosedSocket;

impl Read for ClosedSocket {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::ErrorKind::NotConnected.into())
    }
}

impl Write for ClosedSocket {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::ErrorKind::NotConnected.into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::ErrorKind::NotConnected.into())
    }
}

/// A [`Transport`] over any non-blocking `Read + Write` stream.
pub struct StreamTransport<S> {
    id: u64,
    socket: Option<S>,
    closed_socket: ClosedSocket,
    state: ConnectionState,
    callbacks: Vec<Box<dyn ConnectionCallbacks>>,
}

impl<S: Read + Write> StreamTransport<S> {
    pub fn new(socket: S) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            socket: Some(socket),
            closed_socket: ClosedSocket,
            state: ConnectionState::Open,
            callbacks: vec![],
        }
    }

    pub fn add_callbacks(&mut self, callbacks: Box<dyn ConnectionCallbacks>) {
        self.callbacks.push(callbacks);
    }
}

impl StreamTransport<TcpStream> {
    /// Wrap a connected TCP stream, switching it to non-blocking mode.
    pub fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S: Read + Write> ConnectionControl for StreamTransport<S> {
    fn id(&self) -> u64 {
        self.id
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn close(&mut self) {
        if self.state == ConnectionState::Open {
            debug!("[C{}] closing", self.id);
            self.state = ConnectionState::Closing;
        }
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn socket(&mut self) -> &mut dyn Socket {
        match self.socket {
            Some(ref mut socket) => socket as &mut dyn Socket,
            None => &mut self.closed_socket,
        }
    }

    fn raise_event(&mut self, event: ConnectionEvent) {
        // Callbacks may register further callbacks while being dispatched.
        let mut callbacks = std::mem::take(&mut self.callbacks);
        for callback in callbacks.iter_mut() {
            callback.on_event(event, self);
        }
        callbacks.append(&mut self.callbacks);
        self.callbacks = callbacks;
    }

    fn close_socket(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        debug!("[C{}] closing socket", self.id);
        self.socket = None;
        self.state = ConnectionState::Closed;
        self.raise_event(ConnectionEvent::LocalClose);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::test_util::MemorySocket;

    struct Recorder(Rc<RefCell<Vec<ConnectionEvent>>>);

    impl ConnectionCallbacks for Recorder {
        fn on_event(&mut self, event: ConnectionEvent, _connection: &mut dyn ConnectionControl) {
            self.0.borrow_mut().push(event);
        }
    }

    struct CloseOnConnect;

    impl ConnectionCallbacks for CloseOnConnect {
        fn on_event(&mut self, event: ConnectionEvent, connection: &mut dyn ConnectionControl) {
            if event == ConnectionEvent::Connected {
                connection.close();
            }
        }
    }

    #[test]
    fn test_callback_close_request_moves_to_closing() {
        let (socket, _peer) = MemorySocket::pair();
        let mut transport = StreamTransport::new(socket);
        transport.add_callbacks(Box::new(CloseOnConnect));

        transport.raise_event(ConnectionEvent::Connected);
        assert_eq!(transport.state(), ConnectionState::Closing);
    }

    #[test]
    fn test_close_socket_is_idempotent() {
        let (socket, _peer) = MemorySocket::pair();
        let events = Rc::new(RefCell::new(vec![]));
        let mut transport = StreamTransport::new(socket);
        transport.add_callbacks(Box::new(Recorder(events.clone())));

        transport.close_socket();
        transport.close_socket();
        assert_eq!(transport.state(), ConnectionState::Closed);
        assert_eq!(*events.borrow(), vec![ConnectionEvent::LocalClose]);

        let err = transport.socket().write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let (a, b) = MemorySocket::pair();
        let first = StreamTransport::new(a);
        let second = StreamTransport::new(b);
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_from_tcp_sets_nonblocking() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (_server, _) = listener.accept().unwrap();

        let mut transport = StreamTransport::from_tcp(client).unwrap();
        let mut buf = [0u8; 8];
        let err = transport.socket().read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
