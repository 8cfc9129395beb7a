//! Length-prefixed frames over a byte stream.

use super::Error;
use bytes::Bytes;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Sends a frame prefixed by its `u32` big-endian length.
pub async fn send_frame<S: AsyncWrite + Unpin>(
    sink: &mut S,
    buf: &[u8],
    max_message_size: usize,
) -> Result<(), Error> {
    let n = buf.len();
    if n == 0 {
        return Err(Error::SendZeroSize);
    }
    if n > max_message_size {
        return Err(Error::SendTooLarge(n));
    }
    let len: u32 = n.try_into().map_err(|_| Error::SendTooLarge(n))?;

    let mut frame = Vec::with_capacity(4 + n);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(buf);
    sink.write_all(&frame).await.map_err(Error::SendFailed)?;
    sink.flush().await.map_err(Error::SendFailed)
}

/// Receives a frame, rejecting any larger than `max_message_size`.
pub async fn recv_frame<S: AsyncRead + Unpin>(
    stream: &mut S,
    max_message_size: usize,
) -> Result<Bytes, Error> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await.map_err(recv_error)?;
    let len = u32::from_be_bytes(len) as usize;
    if len > max_message_size {
        return Err(Error::RecvTooLarge(len));
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.map_err(recv_error)?;
    Ok(Bytes::from(buf))
}

fn recv_error(err: std::io::Error) -> Error {
    if err.kind() == ErrorKind::UnexpectedEof {
        return Error::StreamClosed;
    }
    Error::RecvFailed(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_send_recv() {
        let (mut a, mut b) = duplex(64);
        send_frame(&mut a, b"hello", 16).await.unwrap();
        let frame = recv_frame(&mut b, 16).await.unwrap();
        assert_eq!(frame, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_limits() {
        let (mut a, mut b) = duplex(64);
        assert!(matches!(
            send_frame(&mut a, b"", 16).await,
            Err(Error::SendZeroSize)
        ));
        assert!(matches!(
            send_frame(&mut a, b"hello", 4).await,
            Err(Error::SendTooLarge(5))
        ));

        send_frame(&mut a, b"hello", 16).await.unwrap();
        assert!(matches!(
            recv_frame(&mut b, 4).await,
            Err(Error::RecvTooLarge(5))
        ));
    }

    #[tokio::test]
    async fn test_closed() {
        let (a, mut b) = duplex(64);
        drop(a);
        assert!(matches!(
            recv_frame(&mut b, 16).await,
            Err(Error::StreamClosed)
        ));
    }
}
