//! In-memory sockets and certificate fixtures shared by the unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

pub const CA_CERT: &str = include_str!("testdata/ca.crt");
pub const SERVER_CERT: &str = include_str!("testdata/server.crt");
pub const SERVER_KEY: &str = include_str!("testdata/server.key");
pub const CLIENT_CERT: &str = include_str!("testdata/client.crt");
pub const CLIENT_KEY: &str = include_str!("testdata/client.key");

/// `openssl x509 -in server.crt -outform der | sha256sum`
pub const SERVER_CERT_SHA256: &str =
    "13a33d1e0e5776a3cf03daa0792118d25b46b13bd208e6674d2938876610ac43";
/// `openssl x509 -in client.crt -outform der | sha256sum`
pub const CLIENT_CERT_SHA256: &str =
    "eacc10a5d41fce5ce8739c28663d607a776152fd7bc2293eff0595f50094f01c";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct Pipe {
    data: VecDeque<u8>,
    /// Maximum number of unread bytes the pipe holds before writes block.
    capacity: Option<usize>,
    writer_closed: bool,
}

/// One end of a bidirectional non-blocking in-memory stream.
///
/// Reads report `WouldBlock` while nothing is buffered and EOF once the
/// other end was dropped. Writes report `WouldBlock` when the peer's
/// receive capacity is exhausted.
pub struct MemorySocket {
    incoming: Rc<RefCell<Pipe>>,
    outgoing: Rc<RefCell<Pipe>>,
}

impl MemorySocket {
    pub fn pair() -> (MemorySocket, MemorySocket) {
        let a_to_b = Rc::new(RefCell::new(Pipe::default()));
        let b_to_a = Rc::new(RefCell::new(Pipe::default()));
        (
            MemorySocket {
                incoming: b_to_a.clone(),
                outgoing: a_to_b.clone(),
            },
            MemorySocket {
                incoming: a_to_b,
                outgoing: b_to_a,
            },
        )
    }

    /// Limit how many unread bytes this end accepts from its peer.
    pub fn set_receive_capacity(&self, capacity: Option<usize>) {
        self.incoming.borrow_mut().capacity = capacity;
    }

    /// Number of bytes waiting to be read by this end.
    pub fn pending(&self) -> usize {
        self.incoming.borrow().data.len()
    }
}

impl Read for MemorySocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = self.incoming.borrow_mut();
        if pipe.data.is_empty() {
            if pipe.writer_closed {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(pipe.data.len());
        for (dst, src) in buf.iter_mut().zip(pipe.data.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for MemorySocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut pipe = self.outgoing.borrow_mut();
        let room = match pipe.capacity {
            Some(capacity) => capacity.saturating_sub(pipe.data.len()),
            None => buf.len(),
        };
        if room == 0 && !buf.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(room);
        pipe.data.extend(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemorySocket {
    fn drop(&mut self) {
        self.outgoing.borrow_mut().writer_closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_round_trip_and_eof() {
        let (mut a, mut b) = MemorySocket::pair();
        let mut buf = [0u8; 8];
        assert_eq!(
            b.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::WouldBlock
        );

        a.write_all(b"ping").unwrap();
        assert_eq!(b.pending(), 4);
        assert_eq!(b.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"ping");

        drop(a);
        assert_eq!(b.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_receive_capacity_blocks_writer() {
        let (mut a, b) = MemorySocket::pair();
        b.set_receive_capacity(Some(3));
        assert_eq!(a.write(b"hello").unwrap(), 3);
        assert_eq!(
            a.write(b"lo").unwrap_err().kind(),
            io::ErrorKind::WouldBlock
        );
    }
}
