//! Append/drain byte queue used for the receive and send sides of a connection.
//!
//! The buffer is a chain of [`SlideBuffer`] blocks. Writers either copy into
//! the tail (`add`), move whole blocks in (`move_from`), or fill reserved
//! regions in place (`reserve` + [`Reservation::commit`]). Readers look at the
//! contiguous readable regions (`raw_slices`) and `drain` from the front.
//!
//! Readable bytes are never moved or rewritten while they sit in the buffer,
//! so a region handed to the TLS session keeps its start address until it is
//! drained.

use std::collections::VecDeque;

use crate::slide_buffer::SlideBuffer;

/// Capacity of each newly allocated block.
pub const DEFAULT_BLOCK_SIZE: usize = 16384;

#[derive(Default)]
pub struct Buffer {
    blocks: VecDeque<SlideBuffer>,
    length: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of readable bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Copy `data` onto the end of the buffer.
    pub fn add(&mut self, mut data: &[u8]) {
        self.length += data.len();
        if let Some(tail) = self.blocks.back_mut() {
            let n = tail.append(data);
            data = &data[n..];
        }
        while !data.is_empty() {
            let mut block = SlideBuffer::new(DEFAULT_BLOCK_SIZE.max(data.len()));
            let n = block.append(data);
            data = &data[n..];
            self.blocks.push_back(block);
        }
    }

    /// Move every block of `other` onto the end of this buffer, leaving
    /// `other` empty. No bytes are copied.
    pub fn move_from(&mut self, other: &mut Buffer) {
        if other.is_empty() {
            return;
        }
        self.blocks.retain(|block| !block.is_empty());
        self.blocks
            .extend(other.blocks.drain(..).filter(|block| !block.is_empty()));
        self.length += other.length;
        other.length = 0;
    }

    /// Remove `n` bytes from the front of the buffer.
    pub fn drain(&mut self, n: usize) {
        debug_assert!(
            n <= self.length,
            "Buffer drain underflow: n={}, len={}",
            n,
            self.length
        );
        let mut remaining = n.min(self.length);
        self.length -= remaining;
        while remaining > 0 {
            let Some(front) = self.blocks.front_mut() else {
                break;
            };
            let take = front.len().min(remaining);
            front.consume(take);
            remaining -= take;
            if front.is_empty() {
                self.blocks.pop_front();
            }
        }
    }

    /// The contiguous readable regions, front to back.
    pub fn raw_slices(&self) -> Vec<&[u8]> {
        self.blocks
            .iter()
            .filter(|block| !block.is_empty())
            .map(|block| block.as_slice())
            .collect()
    }

    /// Copy all readable bytes out into a single vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length);
        for slice in self.raw_slices() {
            out.extend_from_slice(slice);
        }
        out
    }

    /// Reserve up to `len` writable bytes spread over at most `max_slices`
    /// contiguous regions at the end of the buffer.
    ///
    /// Spare capacity in the tail block is used first. Nothing becomes
    /// readable until the returned reservation is committed.
    pub fn reserve(&mut self, len: usize, max_slices: usize) -> Reservation<'_> {
        let mut reserved = Vec::with_capacity(max_slices);
        let mut first = self.blocks.len();
        let mut remaining = len;

        if max_slices > 0
            && remaining > 0
            && let Some(tail) = self.blocks.back()
            && tail.remaining_capacity() > 0
        {
            let n = tail.remaining_capacity().min(remaining);
            first -= 1;
            reserved.push(n);
            remaining -= n;
        }

        while remaining > 0 && reserved.len() < max_slices {
            let block = SlideBuffer::new(DEFAULT_BLOCK_SIZE);
            let n = block.remaining_capacity().min(remaining);
            self.blocks.push_back(block);
            reserved.push(n);
            remaining -= n;
        }

        let filled = vec![0; reserved.len()];
        Reservation {
            buffer: self,
            first,
            reserved,
            filled,
        }
    }
}

/// Writable regions handed out by [`Buffer::reserve`].
///
/// Dropping a reservation without calling [`Reservation::commit`] leaves the
/// buffer's readable contents untouched. Reserved blocks left empty are
/// released either way.
pub struct Reservation<'a> {
    buffer: &'a mut Buffer,
    first: usize,
    reserved: Vec<usize>,
    filled: Vec<usize>,
}

impl Reservation<'_> {
    /// Number of reserved regions.
    pub fn len(&self) -> usize {
        self.reserved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reserved.is_empty()
    }

    /// Writable memory of region `index`.
    pub fn slice_mut(&mut self, index: usize) -> &mut [u8] {
        let len = self.reserved[index];
        &mut self.buffer.blocks[self.first + index].write_slice()[..len]
    }

    /// Record that the first `n` bytes of region `index` hold data.
    pub fn set_filled(&mut self, index: usize, n: usize) {
        debug_assert!(
            n <= self.reserved[index],
            "Reservation overfill: index={}, n={}, reserved={}",
            index,
            n,
            self.reserved[index]
        );
        self.filled[index] = n;
    }

    /// Make every filled byte readable, returning how many were committed.
    pub fn commit(mut self) -> usize {
        let mut total = 0;
        for (index, n) in self.filled.iter_mut().enumerate() {
            if *n > 0 {
                self.buffer.blocks[self.first + index].advance_write(*n);
                total += *n;
                *n = 0;
            }
        }
        self.buffer.length += total;
        total
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        // Blocks that received no data are released so a later reservation
        // starts in the last block that holds data.
        while self.buffer.blocks.len() > self.first
            && let Some(block) = self.buffer.blocks.back()
            && block.is_empty()
        {
            self.buffer.blocks.pop_back();
        }
    }
}
