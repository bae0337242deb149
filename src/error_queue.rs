//! Accumulated low-level errors from a TLS session.
//!
//! The session pushes an entry for every protocol or transport failure it
//! observes. The connection drains the queue on each failing path so a stale
//! entry can never be attributed to a later, unrelated operation.

use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    /// Raised by the TLS library while processing records.
    Tls,
    /// Raised by the underlying socket.
    Transport,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSource::Tls => write!(f, "tls"),
            ErrorSource::Transport => write!(f, "transport"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    pub source: ErrorSource,
    pub reason: String,
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

#[derive(Debug, Default)]
pub struct ErrorQueue {
    entries: VecDeque<ErrorEntry>,
}

impl ErrorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: ErrorSource, reason: impl Into<String>) {
        self.entries.push_back(ErrorEntry {
            source,
            reason: reason.into(),
        });
    }

    /// Remove and return the oldest entry.
    pub fn pop(&mut self) -> Option<ErrorEntry> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
