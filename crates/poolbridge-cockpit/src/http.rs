//! Minimal HTTP/1.1 reader and writer.
//!
//! The bridge answers exactly one request per connection and then closes it
//! (`Connection: close`), so there is no keep-alive or pipelining here.  Every
//! limit is enforced while reading: request and header lines are bounded,
//! the header count is bounded, and the body is only read once its declared
//! length has been checked against the configured maximum.

use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::error;

use crate::error::RequestError;

/// Longest accepted request or header line, in bytes.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// Most header lines accepted in one request.
pub const MAX_HEADERS: usize = 64;

/// Sent on every response, including errors and the event stream.
pub const CORS_HEADERS: &str = "Access-Control-Allow-Origin: *\r\n\
     Access-Control-Allow-Methods: GET, PUT, POST, OPTIONS\r\n\
     Access-Control-Allow-Headers: Content-Type\r\n";

const JSON: &str = "application/json";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A fully read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Request target exactly as sent, query string included.
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// The target without its query string or fragment.
    pub fn path(&self) -> &str {
        self.target
            .split(['?', '#'])
            .next()
            .unwrap_or(self.target.as_str())
    }

    /// First value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the client asked to switch to the WebSocket protocol.
    pub fn wants_websocket(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|value| value.to_ascii_lowercase().contains("websocket"))
    }
}

/// Read one request from `reader`, refusing bodies over `max_body` bytes.
///
/// # Errors
///
/// * [`RequestError::Malformed`] – bad request line, bad header, or a limit
///   exceeded.
/// * [`RequestError::InvalidContentLength`] – `Content-Length` is not a
///   non-negative integer (`abc`, empty, `-1`).
/// * [`RequestError::PayloadTooLarge`] – declared body over `max_body`.
/// * [`RequestError::PeerClosed`] / [`RequestError::Io`] – the connection
///   failed mid-request.
pub async fn read_request<R>(reader: &mut R, max_body: usize) -> Result<Request, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let request_line = read_line(reader).await?.ok_or(RequestError::PeerClosed)?;
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(RequestError::Malformed(format!(
            "bad request line {request_line:?}"
        )));
    };
    if !version.starts_with("HTTP/") || (!target.starts_with('/') && target != "*") {
        return Err(RequestError::Malformed(format!(
            "bad request line {request_line:?}"
        )));
    }
    let method = method.to_string();
    let target = target.to_string();

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader).await?.ok_or(RequestError::PeerClosed)?;
        if line.is_empty() {
            break;
        }
        if headers.len() == MAX_HEADERS {
            return Err(RequestError::Malformed(format!(
                "more than {MAX_HEADERS} headers"
            )));
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(RequestError::Malformed(format!("bad header line {line:?}")));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(RequestError::Malformed(format!("bad header line {line:?}")));
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }

    let mut request = Request {
        method,
        target,
        headers,
        body: Vec::new(),
    };

    let Some(raw_length) = request.header("content-length") else {
        return Ok(request);
    };
    let declared: u64 = raw_length
        .parse()
        .map_err(|_| RequestError::InvalidContentLength(raw_length.to_string()))?;
    let length = usize::try_from(declared)
        .ok()
        .filter(|len| *len <= max_body)
        .ok_or(RequestError::PayloadTooLarge {
            declared,
            limit: max_body,
        })?;

    let mut body = vec![0; length];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            RequestError::PeerClosed
        } else {
            RequestError::Io(e)
        }
    })?;
    request.body = body;
    Ok(request)
}

/// Read one CRLF- (or LF-) terminated line.  `None` means a clean EOF
/// before any byte.
async fn read_line<R>(reader: &mut R) -> Result<Option<String>, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = u64::try_from(MAX_LINE_BYTES).unwrap_or(u64::MAX);
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        return Err(if n >= MAX_LINE_BYTES {
            RequestError::Malformed(format!("line longer than {MAX_LINE_BYTES} bytes"))
        } else {
            RequestError::PeerClosed
        });
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| RequestError::Malformed("request line is not UTF-8".to_string()))
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// A complete, non-streaming response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: Option<&'static str>,
    pub body: Vec<u8>,
}

impl Response {
    /// `value` serialized as a JSON body.
    pub fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: Some(JSON),
                body,
            },
            Err(e) => {
                error!(error = %e, "response serialization failed");
                Self {
                    status: 500,
                    content_type: Some(JSON),
                    body: br#"{"error":"serialization failed"}"#.to_vec(),
                }
            }
        }
    }

    /// `{"error": message}` with `status`.
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, &json!({ "error": message }))
    }

    /// `404 {"error": "not found"}`.
    pub fn not_found() -> Self {
        Self::error(404, "not found")
    }

    /// Empty `204` (CORS preflight).
    pub fn no_content() -> Self {
        Self {
            status: 204,
            content_type: None,
            body: Vec::new(),
        }
    }

    /// Status line, headers, and body, ready for the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason(self.status));
        if let Some(content_type) = self.content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        head.push_str(CORS_HEADERS);
        head.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            self.body.len()
        ));

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

/// Headers that open a Server-Sent Events stream.
pub fn event_stream_head() -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/event-stream\r\n\
         Cache-Control: no-cache\r\n\
         Connection: keep-alive\r\n\
         {CORS_HEADERS}\r\n"
    )
}

/// Write `response` and flush.
pub async fn write_response<W>(writer: &mut W, response: &Response) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&response.to_bytes()).await?;
    writer.flush().await
}

/// Reason phrase for the statuses the bridge sends.
pub fn reason(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn parse(raw: &str) -> Result<Request, RequestError> {
        parse_with_limit(raw, 1024).await
    }

    async fn parse_with_limit(raw: &str, max_body: usize) -> Result<Request, RequestError> {
        let mut reader = BufReader::new(raw.as_bytes());
        read_request(&mut reader, max_body).await
    }

    // ── Request line & headers ──────────────────────────────────────────────

    #[tokio::test]
    async fn parses_get_with_query_string() {
        let req = parse("GET /state/all?fresh=1 HTTP/1.1\r\nHost: pi\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.target, "/state/all?fresh=1");
        assert_eq!(req.path(), "/state/all");
        assert_eq!(req.header("HOST"), Some("pi"));
        assert!(req.body.is_empty());
    }

    #[tokio::test]
    async fn accepts_bare_lf_line_endings() {
        let req = parse("GET /health HTTP/1.0\nAccept: */*\n\n").await.unwrap();
        assert_eq!(req.path(), "/health");
        assert_eq!(req.header("accept"), Some("*/*"));
    }

    #[tokio::test]
    async fn reads_declared_body() {
        let req = parse(
            "PUT /state/circuit/setState HTTP/1.1\r\nContent-Length: 4\r\n\r\n{}  ",
        )
        .await
        .unwrap();
        assert_eq!(req.body, b"{}  ");
    }

    #[tokio::test]
    async fn rejects_bad_request_lines() {
        for raw in [
            "GARBAGE\r\n\r\n",
            "GET /health\r\n\r\n",
            "GET /health FTP/1.0\r\n\r\n",
            "GET /a b HTTP/1.1\r\n\r\n",
            "GET health HTTP/1.1\r\n\r\n",
        ] {
            assert!(
                matches!(parse(raw).await, Err(RequestError::Malformed(_))),
                "{raw:?} should be malformed"
            );
        }
    }

    #[tokio::test]
    async fn rejects_header_without_colon() {
        let result = parse("GET / HTTP/1.1\r\nnot a header\r\n\r\n").await;
        assert!(matches!(result, Err(RequestError::Malformed(_))));
    }

    #[tokio::test]
    async fn rejects_oversized_lines_and_header_floods() {
        let long = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(MAX_LINE_BYTES));
        assert!(matches!(parse(&long).await, Err(RequestError::Malformed(_))));

        let mut flood = String::from("GET / HTTP/1.1\r\n");
        for i in 0..=MAX_HEADERS {
            flood.push_str(&format!("X-H{i}: v\r\n"));
        }
        flood.push_str("\r\n");
        assert!(matches!(parse(&flood).await, Err(RequestError::Malformed(_))));
    }

    #[tokio::test]
    async fn empty_or_truncated_input_is_peer_closed() {
        assert!(matches!(parse("").await, Err(RequestError::PeerClosed)));
        assert!(matches!(
            parse("GET / HTTP/1.1\r\nHost: x").await,
            Err(RequestError::PeerClosed)
        ));
        assert!(matches!(
            parse("PUT / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").await,
            Err(RequestError::PeerClosed)
        ));
    }

    // ── Content-Length ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn invalid_content_lengths_are_bad_requests() {
        for value in ["abc", "", "-1", "1.5", "0x10"] {
            let raw = format!("PUT /state/circuit/setState HTTP/1.1\r\nContent-Length: {value}\r\n\r\n");
            let err = parse(&raw).await.unwrap_err();
            assert!(
                matches!(err, RequestError::InvalidContentLength(_)),
                "Content-Length {value:?} gave {err:?}"
            );
            assert_eq!(err.status_code(), Some(400));
        }
    }

    #[tokio::test]
    async fn oversized_body_is_refused_before_reading() {
        let raw = "PUT /state/circuit/setState HTTP/1.1\r\nContent-Length: 99999999999\r\n\r\n";
        let err = parse_with_limit(raw, 65_536).await.unwrap_err();
        assert!(matches!(
            err,
            RequestError::PayloadTooLarge { declared: 99_999_999_999, limit: 65_536 }
        ));
        assert_eq!(err.status_code(), Some(413));
    }

    #[tokio::test]
    async fn body_at_the_limit_is_accepted() {
        let raw = "PUT / HTTP/1.1\r\nContent-Length: 8\r\n\r\n12345678";
        assert_eq!(parse_with_limit(raw, 8).await.unwrap().body, b"12345678");
    }

    // ── Upgrade detection ───────────────────────────────────────────────────

    #[tokio::test]
    async fn detects_websocket_upgrade() {
        let ws = parse("GET /ws HTTP/1.1\r\nConnection: Upgrade\r\nUpgrade: WebSocket\r\n\r\n")
            .await
            .unwrap();
        assert!(ws.wants_websocket());

        let sse = parse("GET /ws HTTP/1.1\r\n\r\n").await.unwrap();
        assert!(!sse.wants_websocket());
    }

    // ── Response ────────────────────────────────────────────────────────────

    #[test]
    fn json_response_carries_cors_and_length() {
        let bytes = Response::json(200, &json!({"ok": true})).to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(text.contains("Access-Control-Allow-Methods: GET, PUT, POST, OPTIONS\r\n"));
        assert!(text.contains("Access-Control-Allow-Headers: Content-Type\r\n"));
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"ok\":true}"));
    }

    #[test]
    fn preflight_has_no_body_but_keeps_cors() {
        let text = String::from_utf8(Response::no_content().to_bytes()).unwrap();
        assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(!text.contains("Content-Type"));
    }

    #[test]
    fn error_and_not_found_bodies() {
        let not_found = Response::not_found();
        assert_eq!(not_found.status, 404);
        assert_eq!(not_found.body, br#"{"error":"not found"}"#);

        let invalid = Response::error(400, "invalid JSON");
        assert_eq!(invalid.body, br#"{"error":"invalid JSON"}"#);
    }

    #[test]
    fn event_stream_head_is_sse() {
        let head = event_stream_head();
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Type: text/event-stream\r\n"));
        assert!(head.contains("Cache-Control: no-cache\r\n"));
        assert!(head.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }
}
