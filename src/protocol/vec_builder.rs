//! Helper to build vectors from untrusted length prefixes w/o blowing up memory.

/// Default block size (1MB).
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// Builds a `Vec<u8>` of a declared size without trusting that size for the
/// initial allocation.
///
/// A broker (or something pretending to be one) can claim an arbitrarily
/// large payload in a length prefix. Allocating that up front would let a
/// 9-byte frame pin gigabytes. Instead the buffer grows in bounded blocks
/// while the bytes actually arrive; a short read fails with the underlying
/// I/O error before the next block is reserved.
#[derive(Debug)]
pub struct VecBuilder {
    block_size: usize,
    buf: Vec<u8>,
    remaining: usize,
}

impl VecBuilder {
    /// Create a new builder expecting exactly `expected_bytes`.
    pub fn new(expected_bytes: usize) -> Self {
        Self::new_with_block_size(expected_bytes, DEFAULT_BLOCK_SIZE)
    }

    pub fn new_with_block_size(expected_bytes: usize, block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be non-zero");
        Self {
            block_size,
            buf: Vec::with_capacity(expected_bytes.min(block_size)),
            remaining: expected_bytes,
        }
    }

    /// Read all remaining declared bytes from `reader`.
    pub fn read_exact<R>(mut self, reader: &mut R) -> Result<Self, std::io::Error>
    where
        R: std::io::Read,
    {
        while self.remaining > 0 {
            let to_read = self.remaining.min(self.block_size);
            let start = self.buf.len();
            self.buf.resize(start + to_read, 0);

            reader.read_exact(&mut self.buf[start..])?;
            self.remaining -= to_read;
        }

        Ok(self)
    }
}

impl From<VecBuilder> for Vec<u8> {
    fn from(builder: VecBuilder) -> Self {
        builder.buf
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_read() {
        let data = b"abcde".to_vec();
        let mut reader = Cursor::new(data.clone());

        let builder = VecBuilder::new_with_block_size(data.len(), 2)
            .read_exact(&mut reader)
            .unwrap();

        let actual: Vec<u8> = builder.into();
        assert_eq!(actual, data);
    }

    #[test]
    fn test_short_input_errors_before_full_allocation() {
        let mut reader = Cursor::new(b"xy".to_vec());

        // Claims 10MB but only two bytes exist.
        let res = VecBuilder::new_with_block_size(10 * 1024 * 1024, 4).read_exact(&mut reader);
        assert_eq!(
            res.unwrap_err().kind(),
            std::io::ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn test_empty() {
        let mut reader = Cursor::new(Vec::<u8>::new());
        let builder = VecBuilder::new(0).read_exact(&mut reader).unwrap();
        let actual: Vec<u8> = builder.into();
        assert!(actual.is_empty());
    }
}
