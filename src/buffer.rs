/// Grow-on-demand socket buffer.
///
/// `data[..len]` holds pending bytes, the rest of the allocation is spare
/// capacity for the next `recv`. Growth follows the read-buffer policy: when
/// the spare room drops under 128 bytes the allocation doubles until it
/// reaches 2 KiB, after that it grows in 1 KiB steps.
#[derive(Debug, Default)]
pub(crate) struct Buffer {
    data: Vec<u8>,
    len: usize,
}

pub(crate) const READ_CHUNK_MIN: usize = 128;
pub(crate) const READ_DOUBLE_CAP: usize = 2048;
pub(crate) const READ_STEP: usize = 1024;
pub(crate) const INITIAL_READ_SIZE: usize = 1024;

impl Buffer {
    pub(crate) fn new() -> Buffer {
        Buffer {
            data: Vec::new(),
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn filled(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Spare room behind the pending bytes, for `recv` to fill.
    pub(crate) fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    /// Marks `n` freshly received bytes as filled.
    pub(crate) fn advance(&mut self, n: usize) {
        debug_assert!(self.len + n <= self.data.len());
        self.len += n;
    }

    /// Whether the last `recv` filled the buffer to the brim, which makes
    /// the read path loop immediately to drain the socket.
    pub(crate) fn is_full(&self) -> bool {
        self.len == self.data.len() && !self.data.is_empty()
    }

    /// Drops the first `n` pending bytes, compacting the tail to the start.
    pub(crate) fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.data.copy_within(n..self.len, 0);
        self.len -= n;
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    /// Appends bytes, growing the allocation with a little headroom.
    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        let required = self.len + bytes.len();
        if self.data.len() < required {
            self.reserve_total(required + 2);
        }
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
    }

    /// Applies the read growth policy ahead of a `recv`.
    pub(crate) fn ensure_read_room(&mut self) {
        if self.data.is_empty() {
            self.reserve_total(INITIAL_READ_SIZE);
            return;
        }
        if self.data.len() - self.len < READ_CHUNK_MIN {
            let add = if self.data.len() >= READ_DOUBLE_CAP {
                READ_STEP
            } else {
                self.data.len()
            };
            self.reserve_total(self.data.len() + add);
        }
    }

    fn reserve_total(&mut self, total: usize) {
        if self.data.len() < total {
            self.data.resize(total, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_policy() {
        let mut buf = Buffer::new();
        buf.ensure_read_room();
        assert_eq!(buf.capacity(), 1024);

        // Plenty of room left, no growth.
        buf.advance(100);
        buf.ensure_read_room();
        assert_eq!(buf.capacity(), 1024);

        // Less than 128 spare: double.
        buf.advance(850);
        buf.ensure_read_room();
        assert_eq!(buf.capacity(), 2048);

        // At the doubling cap growth continues in 1 KiB steps.
        buf.advance(buf.capacity() - buf.len() - 10);
        buf.ensure_read_room();
        assert_eq!(buf.capacity(), 3072);
    }

    #[test]
    fn consume_compacts() {
        let mut buf = Buffer::new();
        buf.extend(b"hello world");
        buf.consume(6);
        assert_eq!(buf.filled(), b"world");
        buf.consume(100);
        assert!(buf.is_empty());
    }

    #[test]
    fn extend_grows() {
        let mut buf = Buffer::new();
        buf.extend(b"abcd");
        buf.extend(b"efgh");
        assert_eq!(buf.filled(), b"abcdefgh");
        assert!(buf.capacity() >= 8);
    }
}
