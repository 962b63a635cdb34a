//! `Content-Length` framing for JSON-RPC messages on a byte stream.
//!
//! A frame is a block of `Name: value` header lines ended by a blank line,
//! followed by exactly `Content-Length` bytes of JSON. Some servers skip the
//! header block for error notifications and write a bare JSON line instead;
//! [`read_frame`] accepts both.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::McpError;

const CONTENT_LENGTH: &str = "content-length";

/// Largest frame body accepted from a server
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

fn header_block(body_len: usize) -> String {
    format!("Content-Length: {}\r\n\r\n", body_len)
}

/// Serialize a payload into a complete frame
pub fn encode(payload: &Value) -> Result<Vec<u8>, McpError> {
    let body = serde_json::to_vec(payload)?;
    let mut frame = header_block(body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Write one frame and flush.
///
/// Header and body go out as two separate writes.
pub async fn write_frame<W>(writer: &mut W, payload: &Value) -> Result<(), McpError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let body = serde_json::to_vec(payload)?;
    writer.write_all(header_block(body.len()).as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and parse its body as JSON.
///
/// Blank lines before a frame are ignored. A first line starting with `{` is
/// taken as a complete headerless message.
pub async fn read_frame<R>(reader: &mut R) -> Result<Value, McpError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let first = loop {
        let line = next_line(reader).await?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            break trimmed.to_string();
        }
    };

    if first.starts_with('{') {
        tracing::debug!("Received headerless message from MCP server");
        return serde_json::from_str(&first)
            .map_err(|e| McpError::Protocol(format!("invalid headerless JSON message: {}", e)));
    }

    let mut headers = vec![parse_header(&first)?];
    loop {
        let line = next_line(reader).await?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        headers.push(parse_header(trimmed)?);
    }

    let length = content_length(&headers)?;
    if length > MAX_FRAME_BYTES {
        return Err(McpError::Protocol(format!(
            "Content-Length {} exceeds the {} byte frame limit",
            length, MAX_FRAME_BYTES
        )));
    }

    let mut body = Vec::with_capacity(length);
    (&mut *reader).take(length as u64).read_to_end(&mut body).await?;
    if body.len() < length {
        return Err(McpError::ConnectionClosed);
    }

    serde_json::from_slice(&body)
        .map_err(|e| McpError::Protocol(format!("invalid frame body: {}", e)))
}

async fn next_line<R>(reader: &mut R) -> Result<String, McpError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(McpError::ConnectionClosed);
    }
    Ok(line)
}

fn parse_header(line: &str) -> Result<(String, String), McpError> {
    let (name, value) = line.split_once(':').ok_or_else(|| {
        McpError::Protocol(format!("invalid header '{}': expected 'Name: value'", line))
    })?;
    Ok((name.trim().to_ascii_lowercase(), value.trim().to_string()))
}

fn content_length(headers: &[(String, String)]) -> Result<usize, McpError> {
    let (_, value) = headers
        .iter()
        .find(|(name, _)| name == CONTENT_LENGTH)
        .ok_or_else(|| McpError::Protocol("missing Content-Length header".to_string()))?;
    value
        .parse::<usize>()
        .map_err(|_| McpError::Protocol(format!("invalid Content-Length header '{}'", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    async fn decode(bytes: &[u8]) -> Result<Value, McpError> {
        let mut reader = BufReader::new(bytes);
        read_frame(&mut reader).await
    }

    #[tokio::test]
    async fn test_round_trip_values() {
        let values = [
            json!({}),
            json!({"text": "héllo wörld ✓ 日本語 🚀"}),
            json!({"a": {"b": [1, 2, {"c": null}]}, "d": true, "e": 1.5}),
            json!([]),
            json!("just a string"),
        ];

        for value in values {
            let frame = encode(&value).unwrap();
            assert_eq!(decode(&frame).await.unwrap(), value);
        }
    }

    #[tokio::test]
    async fn test_length_counts_bytes_not_chars() {
        let value = json!({"t": "é日🚀"});
        let frame = encode(&value).unwrap();
        let body = serde_json::to_vec(&value).unwrap();
        let text = String::from_utf8(frame.clone()).unwrap();

        let (header, rest) = text.split_once("\r\n\r\n").unwrap();
        assert_eq!(header, format!("Content-Length: {}", body.len()));
        assert_eq!(rest.as_bytes(), body.as_slice());
        assert!(body.len() > rest.chars().count());
    }

    #[tokio::test]
    async fn test_consecutive_frames() {
        let mut bytes = encode(&json!({"id": 1})).unwrap();
        bytes.extend(encode(&json!({"id": 2})).unwrap());
        let mut reader = BufReader::new(bytes.as_slice());

        assert_eq!(read_frame(&mut reader).await.unwrap(), json!({"id": 1}));
        assert_eq!(read_frame(&mut reader).await.unwrap(), json!({"id": 2}));
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(McpError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_headerless_json_line() {
        let value = decode(b"{\"id\": 3, \"error\": {\"code\": -32000, \"message\": \"boom\"}}\n")
            .await
            .unwrap();
        assert_eq!(value["error"]["message"], "boom");
    }

    #[tokio::test]
    async fn test_headers_are_case_insensitive_and_extra_headers_ignored() {
        let raw = b"content-TYPE: application/json\r\nCONTENT-LENGTH: 2\r\n\r\n{}";
        assert_eq!(decode(raw).await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_missing_content_length_is_protocol_failure() {
        let err = decode(b"Content-Type: application/json\r\n\r\n{}").await.unwrap_err();
        assert!(matches!(err, McpError::Protocol(ref m) if m.contains("missing")));
    }

    #[tokio::test]
    async fn test_non_numeric_content_length_is_protocol_failure() {
        let err = decode(b"Content-Length: twelve\r\n\r\n{}").await.unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_oversized_content_length_is_protocol_failure() {
        let err = decode(b"Content-Length: 18446744073709551615\r\n\r\n{}")
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Protocol(ref m) if m.contains("frame limit")));

        let just_over = format!("Content-Length: {}\r\n\r\n{{}}", MAX_FRAME_BYTES + 1);
        let err = decode(just_over.as_bytes()).await.unwrap_err();
        assert!(err.is_protocol_failure());
    }

    #[tokio::test]
    async fn test_malformed_header_line() {
        let err = decode(b"garbage\r\n\r\n{}").await.unwrap_err();
        assert!(matches!(err, McpError::Protocol(ref m) if m.contains("garbage")));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_connection_closed() {
        assert!(matches!(decode(b"").await, Err(McpError::ConnectionClosed)));
        assert!(matches!(
            decode(b"Content-Length: 10\r\n").await,
            Err(McpError::ConnectionClosed)
        ));
        assert!(matches!(
            decode(b"Content-Length: 10\r\n\r\n{\"a\"").await,
            Err(McpError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_leading_blank_lines_skipped() {
        let mut bytes = b"\r\n\n".to_vec();
        bytes.extend(encode(&json!({"ok": true})).unwrap());
        assert_eq!(decode(&bytes).await.unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_write_frame_emits_header_then_body() {
        let mut mock = tokio_test::io::Builder::new()
            .write(b"Content-Length: 10\r\n\r\n")
            .write(b"{\"a\":\"\xc3\xa9\"}")
            .build();

        write_frame(&mut mock, &json!({"a": "é"})).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_frame_from_fragmented_stream() {
        let mock = tokio_test::io::Builder::new()
            .read(b"Content-Len")
            .read(b"gth: 8\r\n")
            .read(b"\r\n{\"id\"")
            .read(b":7}")
            .build();
        let mut reader = BufReader::new(mock);

        assert_eq!(read_frame(&mut reader).await.unwrap(), json!({"id": 7}));
    }
}
