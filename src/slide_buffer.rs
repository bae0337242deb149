//! Fixed-capacity block used as one link of a [`crate::buffer::Buffer`] chain.
//!
//! A block keeps start and end offsets into a single allocation. Bytes are
//! appended at the end and consumed from the front. Readable bytes are never
//! moved once written, so a region keeps its address until it is consumed.

pub struct SlideBuffer {
    data: Box<[u8]>,
    /// Offset of the first readable byte.
    start: usize,
    /// Offset one past the last readable byte.
    end: usize,
}

impl SlideBuffer {
    #[inline]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    /// Readable bytes in the block.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Bytes that can still be written after the readable region.
    #[inline]
    pub fn remaining_capacity(&self) -> usize {
        self.data.len() - self.end
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// Spare capacity after the readable region. Bytes written here become
    /// readable through `advance_write`.
    #[inline]
    pub fn write_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.end..]
    }

    /// Copy as much of `data` as fits into the spare capacity, returning the
    /// number of bytes taken.
    #[inline]
    pub fn append(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining_capacity());
        let end = self.end;
        self.data[end..end + n].copy_from_slice(&data[..n]);
        self.end += n;
        n
    }

    /// Make the first `n` bytes of `write_slice()` readable.
    #[inline]
    pub fn advance_write(&mut self, n: usize) {
        debug_assert!(
            self.end + n <= self.data.len(),
            "block overfilled: end={}, n={}, capacity={}",
            self.end,
            n,
            self.data.len()
        );
        self.end += n;
    }

    /// Drop `n` bytes from the front. Offsets rewind only once the block is
    /// empty.
    #[inline]
    pub fn consume(&mut self, n: usize) {
        debug_assert!(
            n <= self.len(),
            "block underflow: n={}, len={}",
            n,
            self.len()
        );
        self.start += n;

        if self.start >= self.end {
            self.start = 0;
            self.end = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_truncates_at_capacity() {
        let mut block = SlideBuffer::new(4);
        assert!(block.is_empty());
        assert_eq!(block.append(b"hello"), 4);
        assert_eq!(block.as_slice(), b"hell");
        assert_eq!(block.remaining_capacity(), 0);
        assert_eq!(block.append(b"o"), 0);
    }

    #[test]
    fn test_partial_consume_does_not_move_bytes() {
        let mut block = SlideBuffer::new(64);
        block.append(b"record header|payload");
        let payload = block.as_slice()[14..].as_ptr();

        block.consume(14);
        assert_eq!(block.as_slice(), b"payload");
        assert_eq!(block.as_slice().as_ptr(), payload);
        assert_eq!(block.remaining_capacity(), 64 - 21);
    }

    #[test]
    fn test_full_consume_rewinds() {
        let mut block = SlideBuffer::new(8);
        block.append(b"abcdefgh");
        block.consume(8);
        assert!(block.is_empty());
        assert_eq!(block.remaining_capacity(), 8);
    }

    #[test]
    fn test_fill_in_place() {
        let mut block = SlideBuffer::new(16);
        block.append(b"ab");
        block.write_slice()[..3].copy_from_slice(b"cde");
        assert_eq!(block.len(), 2);

        block.advance_write(3);
        assert_eq!(block.as_slice(), b"abcde");
        assert_eq!(block.write_slice().len(), 11);
    }
}
