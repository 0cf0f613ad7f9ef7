//! Read and write message frames from wire.
//!
//! A frame is a 4-byte big-endian size followed by that many payload bytes.
//! The size field comes from the peer and is validated before any allocation.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_common>

use std::io::Cursor;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{
    primitives::Int32,
    traits::{ReadType, WriteType},
};

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Cannot read data")]
    IO(#[from] std::io::Error),

    #[error("Invalid negative message size: {size}")]
    NegativeMessageSize { size: i32 },

    #[error("Message too large: {size} exceeds limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },
}

#[async_trait]
pub trait AsyncMessageRead {
    async fn read_message(&mut self, max_message_size: usize) -> Result<Vec<u8>, ReadError>;
}

#[async_trait]
impl<R> AsyncMessageRead for R
where
    R: AsyncRead + Send + Unpin,
{
    async fn read_message(&mut self, max_message_size: usize) -> Result<Vec<u8>, ReadError> {
        let mut len_buf = [0u8; 4];
        self.read_exact(&mut len_buf).await?;
        let len = Int32::read(&mut Cursor::new(len_buf))
            .expect("Reading Int32 from in-mem buffer should always work");

        if len.0 < 0 {
            return Err(ReadError::NegativeMessageSize { size: len.0 });
        }
        let len = len.0 as usize;
        if len > max_message_size {
            return Err(ReadError::MessageTooLarge {
                size: len,
                limit: max_message_size,
            });
        }

        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Cannot write data")]
    IO(#[from] std::io::Error),

    #[error("Message too large: {size}")]
    TooLarge { size: usize },
}

#[async_trait]
pub trait AsyncMessageWrite {
    async fn write_message(&mut self, msg: &[u8]) -> Result<(), WriteError>;
}

#[async_trait]
impl<W> AsyncMessageWrite for W
where
    W: AsyncWrite + Send + Unpin,
{
    async fn write_message(&mut self, msg: &[u8]) -> Result<(), WriteError> {
        let mut len_buf = Vec::<u8>::with_capacity(4);
        let len =
            Int32(i32::try_from(msg.len()).map_err(|_| WriteError::TooLarge { size: msg.len() })?);
        len.write(&mut len_buf)
            .expect("Int32 should always be writable to in-mem buffer");

        self.write_all(len_buf.as_ref()).await?;
        self.write_all(msg).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn test_roundtrip() {
        let mut stream = Cursor::new(vec![]);
        stream.write_message(b"hello world").await.unwrap();
        stream.set_position(0);

        let msg = stream.read_message(1024).await.unwrap();
        assert_eq!(msg, b"hello world");
    }

    #[tokio::test]
    async fn test_write_too_large() {
        let mut stream = Cursor::new(vec![]);
        let msg = vec![0u8; (i32::MAX as usize) + 1];
        let err = stream.write_message(&msg).await.unwrap_err();
        assert_matches!(err, WriteError::TooLarge { .. });
        assert_eq!(err.to_string(), "Message too large: 2147483648");
    }

    #[tokio::test]
    async fn test_read_negative_size() {
        let mut stream = Cursor::new((-1i32).to_be_bytes().to_vec());
        let err = stream.read_message(1024).await.unwrap_err();
        assert_matches!(err, ReadError::NegativeMessageSize { size: -1 });
    }

    #[tokio::test]
    async fn test_read_exceeds_limit() {
        let mut stream = Cursor::new(vec![]);
        stream.write_message(&vec![0u8; 32]).await.unwrap();
        stream.set_position(0);

        let err = stream.read_message(16).await.unwrap_err();
        assert_matches!(
            err,
            ReadError::MessageTooLarge {
                size: 32,
                limit: 16
            }
        );
    }

    #[tokio::test]
    async fn test_read_truncated() {
        let mut stream = Cursor::new(vec![]);
        stream.write_message(b"full message").await.unwrap();
        let mut data = stream.into_inner();
        data.truncate(data.len() - 3);

        let mut stream = Cursor::new(data);
        let err = stream.read_message(1024).await.unwrap_err();
        assert_matches!(err, ReadError::IO(_));
    }
}
