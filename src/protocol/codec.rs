//! Async frame reading and writing

use super::{FrameHeader, HEADER_DELIMITER, MAX_HEADER_SIZE};
use crate::error::{AppError, Result};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Payloads up to this size are copied next to the header before writing
const COALESCE_LIMIT: usize = 16 * 1024;

/// Serialize a header and append the delimiter
pub fn encode_header(header: &FrameHeader) -> Result<Vec<u8>> {
    let mut encoded = serde_json::to_vec(header)?;
    encoded.extend_from_slice(HEADER_DELIMITER);
    if encoded.len() > MAX_HEADER_SIZE {
        return Err(AppError::protocol(format!(
            "Header of {} bytes exceeds the {} byte limit",
            encoded.len(),
            MAX_HEADER_SIZE
        )));
    }
    Ok(encoded)
}

/// Read the next header.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly between
/// frames. Callers should wrap the reader in a `BufReader`: the header is
/// scanned one byte at a time.
pub async fn read_header<R>(reader: &mut R) -> Result<Option<FrameHeader>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer: Vec<u8> = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    loop {
        let read = reader.read(&mut byte).await?;
        if read == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            return Err(AppError::disconnected(format!(
                "Connection closed after {} header bytes",
                buffer.len()
            )));
        }

        buffer.push(byte[0]);
        if buffer.len() > MAX_HEADER_SIZE {
            return Err(AppError::protocol(format!(
                "Header exceeds the {} byte limit",
                MAX_HEADER_SIZE
            )));
        }

        if buffer.ends_with(HEADER_DELIMITER) {
            buffer.truncate(buffer.len() - HEADER_DELIMITER.len());
            let header: FrameHeader = serde_json::from_slice(&buffer)
                .map_err(|e| AppError::protocol(format!("Malformed frame header: {}", e)))?;
            return Ok(Some(header));
        }
    }
}

/// Read exactly `content_length` payload bytes into memory
pub async fn read_payload<R>(reader: &mut R, content_length: u64) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let length = usize::try_from(content_length)
        .map_err(|_| AppError::protocol(format!("Payload length {} does not fit in memory", content_length)))?;
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}

/// Skip `content_length` payload bytes so the next header lines up
pub async fn discard_payload<R>(reader: &mut R, content_length: u64) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut limited = (&mut *reader).take(content_length);
    let skipped = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
    if skipped < content_length {
        return Err(AppError::disconnected(format!(
            "Connection closed after {} of {} payload bytes",
            skipped, content_length
        )));
    }
    Ok(skipped)
}

/// Write a header and its in-memory payload as one frame
pub async fn write_frame<W>(writer: &mut W, header: &FrameHeader, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if header.content_length != payload.len() as u64 {
        return Err(AppError::internal(format!(
            "Header declares {} bytes but payload has {}",
            header.content_length,
            payload.len()
        )));
    }

    let mut encoded = encode_header(header)?;
    if payload.len() <= COALESCE_LIMIT {
        // One write per small frame keeps header and payload in the same segment
        encoded.extend_from_slice(payload);
        writer.write_all(&encoded).await?;
    } else {
        writer.write_all(&encoded).await?;
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Write a header, then copy exactly `header.content_length` bytes from
/// `source` in chunks of `buffer_size`. Bytes past the declared length are
/// left unread in `source`.
///
/// An early EOF on `source` leaves a truncated frame on the wire; the
/// caller must drop the connection.
pub async fn write_stream_frame<W, R>(
    writer: &mut W,
    header: &FrameHeader,
    source: &mut R,
    buffer_size: usize,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let encoded = encode_header(header)?;
    writer.write_all(&encoded).await?;

    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut remaining = header.content_length;
    while remaining > 0 {
        let want = remaining.min(buffer.len() as u64) as usize;
        let read = source.read(&mut buffer[..want]).await?;
        if read == 0 {
            return Err(AppError::validation(format!(
                "Stream ended after {} of {} declared bytes",
                header.content_length - remaining,
                header.content_length
            )));
        }
        writer.write_all(&buffer[..read]).await?;
        remaining -= read as u64;
    }

    writer.flush().await?;
    Ok(header.content_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Metadata, MessageStatus};
    use proptest::prelude::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    async fn frame_bytes(header: &FrameHeader, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_frame(&mut out, header, payload).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_frame_read_back() {
        let mut metadata = Metadata::new();
        metadata.insert("seq".to_string(), serde_json::json!(7));
        let header = FrameHeader::data(5).with_metadata(Some(metadata));
        let bytes = frame_bytes(&header, b"hello").await;

        let mut reader = BufReader::new(Cursor::new(bytes));
        let decoded = read_header(&mut reader).await.unwrap().unwrap();
        assert_eq!(decoded, header);
        let payload = read_payload(&mut reader, decoded.content_length).await.unwrap();
        assert_eq!(&payload[..], b"hello");
        assert!(read_header(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_back_to_back_frames() {
        let mut bytes = frame_bytes(&FrameHeader::data(3), b"abc").await;
        bytes.extend(frame_bytes(&FrameHeader::control(MessageStatus::Heartbeat), b"").await);
        bytes.extend(frame_bytes(&FrameHeader::data(2), b"\r\n").await);

        let mut reader = BufReader::new(Cursor::new(bytes));
        let mut payloads = Vec::new();
        while let Some(header) = read_header(&mut reader).await.unwrap() {
            payloads.push(read_payload(&mut reader, header.content_length).await.unwrap());
        }
        assert_eq!(payloads.len(), 3);
        assert_eq!(&payloads[2][..], b"\r\n");
        assert!(payloads[1].is_empty());
    }

    #[tokio::test]
    async fn test_truncated_header_is_disconnect() {
        let mut reader = BufReader::new(Cursor::new(b"{\"len\":1".to_vec()));
        let err = read_header(&mut reader).await.unwrap_err();
        assert_eq!(err.category(), "DISCONNECTED");
    }

    #[tokio::test]
    async fn test_malformed_header_is_protocol_error() {
        let mut reader = BufReader::new(Cursor::new(b"not json\r\n\r\n".to_vec()));
        let err = read_header(&mut reader).await.unwrap_err();
        assert_eq!(err.category(), "PROTOCOL");
    }

    #[tokio::test]
    async fn test_oversized_header_rejected() {
        let junk = vec![b'a'; MAX_HEADER_SIZE + 10];
        let mut reader = BufReader::new(Cursor::new(junk));
        let err = read_header(&mut reader).await.unwrap_err();
        assert_eq!(err.category(), "PROTOCOL");
    }

    #[tokio::test]
    async fn test_truncated_payload_is_disconnect() {
        let mut reader = BufReader::new(Cursor::new(b"ab".to_vec()));
        let err = read_payload(&mut reader, 10).await.unwrap_err();
        assert_eq!(err.category(), "DISCONNECTED");

        let mut reader = BufReader::new(Cursor::new(b"ab".to_vec()));
        let err = discard_payload(&mut reader, 10).await.unwrap_err();
        assert_eq!(err.category(), "DISCONNECTED");
    }

    #[tokio::test]
    async fn test_write_frame_rejects_length_mismatch() {
        let mut out = Vec::new();
        let err = write_frame(&mut out, &FrameHeader::data(4), b"abc").await.unwrap_err();
        assert_eq!(err.category(), "INTERNAL");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_stream_frame_leaves_rest_of_source() {
        let source_bytes: Vec<u8> = (0..100u8).collect();
        let mut source = Cursor::new(source_bytes.clone());
        let mut out = Vec::new();

        let written = write_stream_frame(&mut out, &FrameHeader::data(40), &mut source, 7).await.unwrap();
        assert_eq!(written, 40);
        assert_eq!(source.position(), 40);

        let mut reader = BufReader::new(Cursor::new(out));
        let header = read_header(&mut reader).await.unwrap().unwrap();
        let payload = read_payload(&mut reader, header.content_length).await.unwrap();
        assert_eq!(&payload[..], &source_bytes[..40]);
    }

    #[tokio::test]
    async fn test_stream_frame_short_source() {
        let mut source = Cursor::new(vec![1u8; 10]);
        let mut out = Vec::new();
        let err = write_stream_frame(&mut out, &FrameHeader::data(20), &mut source, 4).await.unwrap_err();
        assert_eq!(err.category(), "VALIDATION");
    }

    proptest! {
        #[test]
        fn prop_metadata_strings_never_break_framing(key in ".{0,16}", value in ".{0,64}") {
            let mut metadata = Metadata::new();
            metadata.insert(key, serde_json::Value::String(value));
            let header = FrameHeader::data(0).with_metadata(Some(metadata));
            let encoded = encode_header(&header).unwrap();
            let body = &encoded[..encoded.len() - HEADER_DELIMITER.len()];
            prop_assert!(!body.windows(4).any(|w| w == HEADER_DELIMITER));
            let decoded: FrameHeader = serde_json::from_slice(body).unwrap();
            prop_assert_eq!(decoded, header);
        }
    }
}
