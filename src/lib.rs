//! ssl-conn - a TLS connection I/O engine for a non-blocking proxy.
//!
//! [`SslConnection`] wraps a raw non-blocking byte stream ([`Transport`]) in a
//! TLS channel. The reactor reports readiness through
//! [`SslConnection::on_io_ready`] (or calls the pumps directly) and each call
//! makes as much progress as the socket allows without blocking:
//!
//! - the handshake is driven to completion, the peer is checked against the
//!   [`TlsContext`] policy and [`ConnectionEvent::Connected`] is raised once
//! - ciphertext is decrypted into the receive buffer in 16 KiB chunks
//! - the send buffer is encrypted onto the socket, draining only what was sent
//!
//! Every failure is resolved into [`PostIoAction::Close`] after the session's
//! error queue has been logged and drained.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ssl_conn::{
//!     ConnectionState, Ready, Role, RustlsContext, SslConnection, StreamTransport, config,
//! };
//!
//! # fn main() -> std::io::Result<()> {
//! let config = config::load_config("tls.yaml")?;
//! let ctx = Arc::new(RustlsContext::from_config(&config)?);
//!
//! let listener = std::net::TcpListener::bind("127.0.0.1:8443")?;
//! let (stream, _) = listener.accept()?;
//! let mut conn = SslConnection::new(ctx, StreamTransport::from_tcp(stream)?, Role::Server)?;
//!
//! // Called by the event loop whenever the socket becomes ready.
//! let state = conn.on_io_ready(Ready { readable: true, writable: true });
//! if state == ConnectionState::Open {
//!     println!("peer: {}", conn.sha256_peer_certificate_digest());
//! }
//! # Ok(())
//! # }
//! ```

mod slide_buffer;

pub mod buffer;
pub mod config;
pub mod connection;
pub mod error_queue;
pub mod option_util;
pub mod rustls_session;
pub mod ssl_connection;
pub mod tls_context;
pub mod tls_session;
pub mod util;

#[cfg(test)]
mod test_util;

pub use buffer::Buffer;
pub use config::TlsContextConfig;
pub use connection::{
    ConnectionCallbacks, ConnectionControl, ConnectionEvent, ConnectionState, PostIoAction,
    Socket, StreamTransport, Transport,
};
pub use rustls_session::RustlsSession;
pub use ssl_connection::{HandshakeState, Ready, SslConnection};
pub use tls_context::{RustlsContext, TlsContext};
pub use tls_session::{PeerIdentity, Role, SessionError, TlsSession};
