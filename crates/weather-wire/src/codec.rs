//! Async decode/encode of protocol messages.
//!
//! Decoding is a small state machine: read the start line, read header
//! lines until a blank line, then read exactly `Content-Length` bytes of
//! body. The body is never scanned for delimiters, so it may contain any
//! bytes including CRLF.

use std::fmt::Write as _;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::WireError;
use crate::message::{
    CONTENT_LENGTH, Headers, LAMPORT_CLOCK, Method, Request, Response, StatusCode, VERSION,
};

/// Longest accepted start or header line, terminator included.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// Largest accepted body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Start line and headers of a message.
struct Head {
    start: String,
    headers: Headers,
}

/// Read one request from `reader`.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let head = read_head(reader).await?;

    let mut tokens = head.start.split_whitespace();
    let (Some(method), Some(target)) = (tokens.next(), tokens.next()) else {
        return Err(WireError::MalformedRequest(format!(
            "start line {:?} needs METHOD and TARGET",
            head.start
        )));
    };
    let version = tokens.next().unwrap_or(VERSION).to_owned();
    let method = Method::parse(method);
    let target = target.to_owned();

    let body = read_body(reader, &head.headers).await?;
    trace!(%method, path = %target, body_len = body.len(), "request decoded");

    Ok(Request {
        method,
        target,
        version,
        headers: head.headers,
        body,
    })
}

/// Read one response from `reader`.
pub async fn read_response<R>(reader: &mut R) -> Result<Response, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let head = read_head(reader).await.map_err(as_response_error)?;

    let mut parts = head.start.splitn(3, ' ');
    let version = parts.next().unwrap_or_default().trim();
    let code = parts.next().unwrap_or_default().trim();
    let reason = parts.next().unwrap_or_default().trim().to_owned();
    if version.is_empty() || code.is_empty() {
        return Err(WireError::MalformedResponse(format!(
            "start line {:?} needs VERSION and STATUS",
            head.start
        )));
    }
    let status = code
        .parse::<u16>()
        .map(StatusCode::from_u16)
        .map_err(|e| WireError::MalformedResponse(format!("invalid status {code:?}: {e}")))?;
    let version = version.to_owned();

    let body = read_body(reader, &head.headers)
        .await
        .map_err(as_response_error)?;

    Ok(Response {
        version,
        status,
        reason,
        headers: head.headers,
        body,
    })
}

/// Send the greeting line carrying the server's current clock.
pub async fn write_greeting<W>(writer: &mut W, time: u64) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(format!("{LAMPORT_CLOCK}: {time}\r\n").as_bytes())
        .await?;
    writer.flush().await?;
    Ok(())
}

/// Read the greeting line and return the server's clock stamp.
///
/// An unparsable stamp is returned as `-1`.
pub async fn read_greeting<R>(reader: &mut R) -> Result<i64, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader).await?.ok_or(WireError::ConnectionClosed)?;
    match line.split_once(':') {
        Some((name, value)) if name.trim().eq_ignore_ascii_case(LAMPORT_CLOCK) => {
            Ok(value.trim().parse().unwrap_or(-1))
        }
        _ => Err(WireError::MissingGreeting(line)),
    }
}

/// Encode and send a request.
pub async fn write_request<W>(writer: &mut W, request: &Request) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_request(request)).await?;
    writer.flush().await?;
    Ok(())
}

/// Encode and send a response.
pub async fn write_response<W>(writer: &mut W, response: &Response) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_response(response)).await?;
    writer.flush().await?;
    Ok(())
}

/// Serialize a request. `Content-Length` is derived from the body.
pub fn encode_request(request: &Request) -> Vec<u8> {
    let mut head = format!("{} {} {}\r\n", request.method, request.target, request.version);
    encode_headers(&mut head, &request.headers, request.body.len());
    let mut out = head.into_bytes();
    out.extend_from_slice(&request.body);
    out
}

/// Serialize a response. `Content-Length` is derived from the body.
pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut head = format!(
        "{} {} {}\r\n",
        response.version,
        response.status.as_u16(),
        response.reason
    );
    encode_headers(&mut head, &response.headers, response.body.len());
    let mut out = head.into_bytes();
    out.extend_from_slice(&response.body);
    out
}

fn encode_headers(out: &mut String, headers: &Headers, body_len: usize) {
    for (name, value) in headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(CONTENT_LENGTH))
    {
        let _ = write!(out, "{name}: {value}\r\n");
    }
    if body_len > 0 {
        let _ = write!(out, "{CONTENT_LENGTH}: {body_len}\r\n");
    }
    out.push_str("\r\n");
}

fn as_response_error(e: WireError) -> WireError {
    match e {
        WireError::MalformedRequest(msg) => WireError::MalformedResponse(msg),
        other => other,
    }
}

async fn read_head<R>(reader: &mut R) -> Result<Head, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let start = read_line(reader).await?.ok_or(WireError::ConnectionClosed)?;
    if start.trim().is_empty() {
        return Err(WireError::MalformedRequest("empty start line".to_owned()));
    }

    let mut headers = Headers::new();
    // EOF inside the header section ends it.
    while let Some(line) = read_line(reader).await? {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim(), value.trim());
        }
    }

    Ok(Head { start, headers })
}

async fn read_body<R>(reader: &mut R, headers: &Headers) -> Result<Vec<u8>, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let declared = headers.content_length()?;
    if declared > MAX_BODY_BYTES {
        return Err(WireError::BodyTooLarge {
            declared,
            limit: MAX_BODY_BYTES,
        });
    }

    let mut body = vec![0_u8; declared];
    match reader.read_exact(&mut body).await {
        Ok(_) => Ok(body),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(WireError::ConnectionClosed),
        Err(e) => Err(WireError::Io(e)),
    }
}

/// Read one line without its CRLF (or bare LF). `None` at end of stream.
async fn read_line<R>(reader: &mut R) -> Result<Option<String>, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let limit = u64::try_from(MAX_LINE_BYTES).unwrap_or(u64::MAX);
    let mut buf = Vec::new();
    let read = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if read >= MAX_LINE_BYTES {
        return Err(WireError::LineTooLong {
            limit: MAX_LINE_BYTES,
        });
    }

    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use tokio::io::BufReader;

    use super::*;
    use crate::message::{SERVER_ID, STATION_ID};

    #[tokio::test]
    async fn decodes_put_with_body() {
        let body = b"{\"id\":\"A\"}\r\n\r\nstill body";
        let raw = format!(
            "PUT /weather.json HTTP/1.1\r\nServerID: s1\r\nLamportClock: 4\r\n\
             Content-Length: {}\r\n\r\n",
            body.len()
        );
        let mut bytes = raw.into_bytes();
        bytes.extend_from_slice(body);
        bytes.extend_from_slice(b"trailing garbage");

        let mut input: &[u8] = &bytes;
        let request = read_request(&mut input).await.unwrap();
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.target, "/weather.json");
        assert_eq!(request.server_id(), Some("s1"));
        assert_eq!(request.headers.lamport_clock(), 4);
        assert_eq!(request.body, body.to_vec());
        // Exactly Content-Length bytes were consumed.
        assert_eq!(input, b"trailing garbage");
    }

    #[tokio::test]
    async fn body_defaults_to_empty() {
        let mut input: &[u8] = b"GET /weather.json HTTP/1.1\r\nStationID: B\r\n\r\n";
        let request = read_request(&mut input).await.unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.headers.get(STATION_ID), Some("B"));
        assert_eq!(request.headers.lamport_clock(), -1);
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn missing_version_defaults() {
        let mut input: &[u8] = b"GET /\r\n\r\n";
        let request = read_request(&mut input).await.unwrap();
        assert_eq!(request.version, VERSION);
    }

    #[tokio::test]
    async fn short_or_empty_start_line_is_malformed() {
        let mut input: &[u8] = b"GET\r\n\r\n";
        assert!(matches!(
            read_request(&mut input).await,
            Err(WireError::MalformedRequest(_))
        ));

        let mut input: &[u8] = b"\r\nServerID: x\r\n\r\n";
        assert!(matches!(
            read_request(&mut input).await,
            Err(WireError::MalformedRequest(_))
        ));
    }

    #[tokio::test]
    async fn eof_before_start_line_is_connection_closed() {
        let mut input: &[u8] = b"";
        assert!(matches!(
            read_request(&mut input).await,
            Err(WireError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn truncated_body_is_connection_closed() {
        let mut input: &[u8] = b"PUT / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        let err = read_request(&mut input).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_before_reading() {
        let raw = format!("PUT / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_BODY_BYTES + 1);
        let mut input: &[u8] = raw.as_bytes();
        assert!(matches!(
            read_request(&mut input).await,
            Err(WireError::BodyTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn overlong_line_is_rejected() {
        let mut raw = vec![b'G'; MAX_LINE_BYTES + 10];
        raw.extend_from_slice(b"\r\n\r\n");
        let mut input: &[u8] = &raw;
        assert!(matches!(
            read_request(&mut input).await,
            Err(WireError::LineTooLong { .. })
        ));
    }

    #[tokio::test]
    async fn decodes_response() {
        let mut input: &[u8] = b"HTTP/1.1 201 Created\r\nLamportClock: 12\r\n\r\n";
        let response = read_response(&mut input).await.unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.reason, "Created");
        assert_eq!(response.lamport_clock(), 12);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn bad_status_is_malformed_response() {
        let mut input: &[u8] = b"HTTP/1.1 abc Nope\r\n\r\n";
        assert!(matches!(
            read_response(&mut input).await,
            Err(WireError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn encoded_request_decodes_to_same_fields() {
        let request = Request::new(Method::Put, "/weather.json")
            .header(SERVER_ID, "s1")
            .header(LAMPORT_CLOCK, 3)
            .json_body(br#"{"id":"A"}"#.to_vec());
        let bytes = encode_request(&request);
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("Content-Length: 10\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n"));

        let mut input: &[u8] = &bytes;
        let decoded = read_request(&mut input).await.unwrap();
        assert_eq!(decoded.body, request.body);
        assert_eq!(decoded.server_id(), Some("s1"));
    }

    #[test]
    fn bodyless_response_has_no_content_length() {
        let response = Response::new(StatusCode::NO_CONTENT).header(LAMPORT_CLOCK, 9);
        let text = String::from_utf8(encode_response(&response)).unwrap();
        assert_eq!(text, "HTTP/1.1 204 No Content\r\nLamportClock: 9\r\n\r\n");
    }

    #[tokio::test]
    async fn greeting_then_request_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let (server_read, mut server_write) = tokio::io::split(server);

        let server_task = tokio::spawn(async move {
            write_greeting(&mut server_write, 17).await.unwrap();
            let mut reader = BufReader::new(server_read);
            read_request(&mut reader).await.unwrap()
        });

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut reader = BufReader::new(client_read);
        assert_eq!(read_greeting(&mut reader).await.unwrap(), 17);
        let request = Request::new(Method::Get, "/weather.json").header(LAMPORT_CLOCK, 18);
        write_request(&mut client_write, &request).await.unwrap();

        let received = server_task.await.unwrap();
        assert_eq!(received.headers.lamport_clock(), 18);
    }

    #[tokio::test]
    async fn non_clock_first_line_is_missing_greeting() {
        let mut input: &[u8] = b"HTTP/1.1 200 OK\r\n";
        assert!(matches!(
            read_greeting(&mut input).await,
            Err(WireError::MissingGreeting(_))
        ));
    }
}
