//! Length-prefixed message framing.
//!
//! Wire format (symmetric in both directions):
//! - 4-byte unsigned length prefix, network (big-endian) byte order
//! - exactly `length` payload bytes, no terminator
//!
//! The length is authoritative. A declared length of zero or one larger than
//! [`MAX_MESSAGE_SIZE`] is a protocol violation and fatal to the connection;
//! the payload buffer is never sized from an unvalidated length.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum payload size accepted or produced by the codec
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Framing errors. All variants are fatal to the connection, never to the
/// process.
#[derive(Debug)]
pub enum FrameError {
    /// Declared length was zero
    ZeroLength,
    /// Declared length exceeds the maximum message size
    TooLarge(usize),
    /// Stream ended mid-payload after a valid length prefix
    Truncated,
    /// Underlying I/O failure (including short writes)
    Io(std::io::Error),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::ZeroLength => write!(f, "zero-length frame"),
            FrameError::TooLarge(len) => {
                write!(f, "frame length {} exceeds maximum {}", len, MAX_MESSAGE_SIZE)
            }
            FrameError::Truncated => write!(f, "stream ended mid-frame"),
            FrameError::Io(e) => write!(f, "frame I/O error: {}", e),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        FrameError::Io(e)
    }
}

/// Read one framed message.
///
/// Returns `Ok(None)` when the stream ends at a frame boundary (orderly
/// disconnect): an incomplete length prefix is treated the same way, matching
/// a peer that closes between messages. EOF after a valid prefix is a
/// [`FrameError::Truncated`] protocol violation.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<BytesMut>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(FrameError::Io(e)),
    }

    let length = u32::from_be_bytes(prefix) as usize;
    if length == 0 {
        return Err(FrameError::ZeroLength);
    }
    if length > MAX_MESSAGE_SIZE {
        return Err(FrameError::TooLarge(length));
    }

    let mut payload = BytesMut::zeroed(length);
    match reader.read_exact(&mut payload).await {
        Ok(_) => Ok(Some(payload)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::Truncated),
        Err(e) => Err(FrameError::Io(e)),
    }
}

/// Write one framed message: big-endian length prefix, then the payload.
///
/// The same bounds apply on the way out: an empty or oversize payload is
/// rejected before any bytes are written, so a half-framed message never
/// reaches the wire. A handler can produce an oversize response (e.g. an
/// echo of near-limit data plus its envelope); the caller treats the error
/// like any other write failure and closes the connection.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if payload.is_empty() {
        return Err(FrameError::ZeroLength);
    }
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(FrameError::TooLarge(payload.len()));
    }

    let prefix = (payload.len() as u32).to_be_bytes();
    writer.write_all(&prefix).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(8192);

        write_frame(&mut client, b"hello world").await.unwrap();
        let frame = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(&frame[..], b"hello world");
    }

    #[tokio::test]
    async fn test_round_trip_max_size() {
        let (mut client, mut server) = tokio::io::duplex(2 * MAX_MESSAGE_SIZE);

        let payload = vec![0xAB; MAX_MESSAGE_SIZE];
        write_frame(&mut client, &payload).await.unwrap();
        let frame = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(&frame[..], &payload[..]);
    }

    #[tokio::test]
    async fn test_multiple_frames_in_order() {
        let (mut client, mut server) = tokio::io::duplex(8192);

        write_frame(&mut client, b"first").await.unwrap();
        write_frame(&mut client, b"second").await.unwrap();

        let a = read_frame(&mut server).await.unwrap().unwrap();
        let b = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(&a[..], b"first");
        assert_eq!(&b[..], b"second");
    }

    #[tokio::test]
    async fn test_clean_eof_is_orderly() {
        let mut reader = tokio_test::io::Builder::new().build();
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_prefix_is_orderly() {
        // Two bytes of prefix, then the peer goes away
        let mut reader = tokio_test::io::Builder::new().read(&[0x00, 0x00]).build();
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_length_rejected() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&[0x00, 0x00, 0x00, 0x00])
            .build();
        match read_frame(&mut reader).await {
            Err(FrameError::ZeroLength) => {}
            other => panic!("expected ZeroLength, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_oversize_rejected_without_reading_payload() {
        // Declared length of 1 MiB; only the prefix is on the wire. Any
        // attempt to read the payload would hit EOF and report Truncated
        // instead, so TooLarge proves the length was rejected up front.
        let mut reader = tokio_test::io::Builder::new()
            .read(&[0x00, 0x10, 0x00, 0x00])
            .build();
        match read_frame(&mut reader).await {
            Err(FrameError::TooLarge(len)) => assert_eq!(len, 0x0010_0000),
            other => panic!("expected TooLarge, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_truncated_payload_is_framing_error() {
        // Valid prefix declaring 8 bytes, only 3 delivered
        let mut reader = tokio_test::io::Builder::new()
            .read(&[0x00, 0x00, 0x00, 0x08])
            .read(b"abc")
            .build();
        match read_frame(&mut reader).await {
            Err(FrameError::Truncated) => {}
            other => panic!("expected Truncated, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_write_oversize_rejected_before_any_bytes() {
        let mut sink = Vec::new();
        let payload = vec![0u8; MAX_MESSAGE_SIZE + 1];
        match write_frame(&mut sink, &payload).await {
            Err(FrameError::TooLarge(len)) => assert_eq!(len, MAX_MESSAGE_SIZE + 1),
            other => panic!("expected TooLarge, got {:?}", other),
        }
        // Nothing went on the wire, not even the prefix
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_write_empty_payload_rejected() {
        let mut sink = Vec::new();
        match write_frame(&mut sink, b"").await {
            Err(FrameError::ZeroLength) => {}
            other => panic!("expected ZeroLength, got {:?}", other),
        }
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_prefix_is_big_endian() {
        let (mut client, mut server) = tokio::io::duplex(64);

        write_frame(&mut client, b"abcd").await.unwrap();

        let mut raw = [0u8; 8];
        server.read_exact(&mut raw).await.unwrap();
        assert_eq!(&raw[..4], &[0x00, 0x00, 0x00, 0x04]);
        assert_eq!(&raw[4..], b"abcd");
    }
}
