//! WebSocket opening handshake (RFC 6455 Section 4).
//!
//! Only the HTTP/1.x head is handled here: a request or status line followed
//! by headers and an empty line. Bodies and chunked encoding never appear in
//! an upgrade exchange and are not supported. Everything after the head
//! belongs to the frame stream.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use url::{Host, Url};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this crate speaks.
pub const WS_VERSION: &str = "13";

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wsline::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    BASE64.encode(hash)
}

/// Generate a fresh Sec-WebSocket-Key: 16 random bytes, base64 encoded.
///
/// # Errors
///
/// Returns `Error::Random` if the random source is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce)?;
    Ok(BASE64.encode(nonce))
}

/// Locate the end of an HTTP head.
///
/// Returns the offset just past the terminating empty line, or `None` if
/// the head is not complete yet.
#[must_use]
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Validate that a header value does not contain CR or LF characters.
fn validate_header_value(header_name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue {
            header: header_name.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

/// HTTP protocol version of a request or response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HttpVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
}

impl HttpVersion {
    /// HTTP/1.0
    pub const HTTP_10: Self = Self { major: 1, minor: 0 };
    /// HTTP/1.1
    pub const HTTP_11: Self = Self { major: 1, minor: 1 };

    /// Parse `HTTP/<major>.<minor>`.
    fn parse(token: &str) -> Result<Self> {
        let invalid = || Error::InvalidHandshake(format!("Invalid HTTP version: {token}"));
        let numbers = token.strip_prefix("HTTP/").ok_or_else(invalid)?;
        let (major, minor) = numbers.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

/// Header list of an HTTP head, in wire order.
///
/// Lookups are case-insensitive. A header that appears more than once has no
/// single value and is reported as absent by [`Headers::get`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Single value of `name`, or `None` if it is missing or repeated.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let mut matches = self
            .entries
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name));
        let (_, value) = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(value.as_str())
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of header lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn parse<'a, I>(lines: I) -> Result<Self>
    where
        I: Iterator<Item = &'a str>,
    {
        let mut headers = Self::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::InvalidHandshake(format!("Malformed header line: {line}")))?;
            headers.push(name.trim(), value.trim());
        }
        Ok(headers)
    }

    fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        for (name, value) in self.iter() {
            validate_header_value(name, value)?;
            buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        Ok(())
    }
}

fn head_text(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data).map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))
}

/// Parsed HTTP upgrade request, before any WebSocket validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request method.
    pub method: String,
    /// The request target (e.g., "/chat").
    pub path: String,
    /// HTTP version of the request line.
    pub version: HttpVersion,
    /// Request headers.
    pub headers: Headers,
}

impl HandshakeRequest {
    /// Parse a request head.
    ///
    /// Only the structure is checked here; the WebSocket rules are applied by
    /// [`negotiate`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the data is not UTF-8, the
    /// request line is malformed, or a header line has no colon.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = head_text(data)?;
        let mut lines = text.lines();

        // Parse request line: "GET /path HTTP/1.1"
        let request_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty request".into()))?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(Error::InvalidHandshake("Invalid request line".into()));
        }

        Ok(Self {
            method: parts[0].to_string(),
            path: parts[1].to_string(),
            version: HttpVersion::parse(parts[2])?,
            headers: Headers::parse(lines)?,
        })
    }

    /// Build the informational `ws://host/path` URL of this request.
    ///
    /// Host falls back to empty and path to `/` when missing.
    #[must_use]
    pub fn connection_url(&self, secure: bool) -> String {
        let scheme = if secure { "wss:" } else { "ws:" };
        let host = self.headers.get("Host").unwrap_or("");
        let path = if self.path.is_empty() { "/" } else { &self.path };
        format!("{scheme}//{host}{path}")
    }
}

/// HTTP response to an upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// HTTP version of the status line.
    pub version: HttpVersion,
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
}

impl HandshakeResponse {
    fn with_status(version: HttpVersion, status: u16) -> Self {
        Self {
            version,
            status,
            headers: Headers::new(),
        }
    }

    /// `101 Switching Protocols` carrying the accept key.
    #[must_use]
    pub fn switching_protocols(version: HttpVersion, accept: String) -> Self {
        let mut response = Self::with_status(version, 101);
        response.headers.push("Upgrade", "websocket");
        response.headers.push("Connection", "Upgrade");
        response.headers.push("Sec-WebSocket-Accept", accept);
        response
    }

    /// `400 Bad Request`.
    #[must_use]
    pub fn bad_request(version: HttpVersion) -> Self {
        Self::with_status(version, 400)
    }

    /// `426 Upgrade Required`, advertising the supported version.
    #[must_use]
    pub fn upgrade_required(version: HttpVersion) -> Self {
        let mut response = Self::with_status(version, 426);
        response.headers.push("Sec-WebSocket-Version", WS_VERSION);
        response
    }

    /// Whether the upgrade was accepted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == 101
    }

    /// Standard reason phrase for the status code.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self.status {
            101 => "Switching Protocols",
            400 => "Bad Request",
            426 => "Upgrade Required",
            _ => "",
        }
    }

    /// Write the HTTP response head to a buffer.
    ///
    /// # Errors
    /// Returns `Error::InvalidHeaderValue` if a header value contains CR/LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(
            format!("{} {} {}\r\n", self.version, self.status, self.reason()).as_bytes(),
        );
        self.headers.write(buf)?;
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Parse a response head received by a client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the data is not UTF-8 or the
    /// status line is malformed.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = head_text(data)?;
        let mut lines = text.lines();

        // Parse status line: "HTTP/1.1 101 Switching Protocols"
        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;

        let mut parts = status_line.splitn(3, ' ');
        let version = HttpVersion::parse(parts.next().unwrap_or(""))?;
        let status = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| Error::InvalidHandshake(format!("Invalid status line: {status_line}")))?;

        Ok(Self {
            version,
            status,
            headers: Headers::parse(lines)?,
        })
    }
}

/// Apply the server-side upgrade rules to a parsed request.
///
/// Checks run in order and the first failure decides the response: an
/// already registered transport, HTTP version below 1.1, a method other than
/// GET, a missing `Host`, a bad `Upgrade` or `Connection` header, or a key
/// that does not decode to 16 bytes all yield `400`. A version other than
/// `13` yields `426`. Otherwise the result is `101` with the accept key.
///
/// `already_registered` only matters to callers that key connections on a
/// reusable transport identity. The tokio `Server` hands every
/// accepted stream a fresh key, so for it the flag is always `false`.
#[must_use]
pub fn negotiate(request: &HandshakeRequest, already_registered: bool) -> HandshakeResponse {
    let version = request.version;
    let reject = || HandshakeResponse::bad_request(version);
    let headers = &request.headers;

    if already_registered || version < HttpVersion::HTTP_11 || request.method != "GET" {
        return reject();
    }
    if headers.get("Host").is_none() {
        return reject();
    }
    if !headers
        .get("Upgrade")
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
    {
        return reject();
    }
    if !headers
        .get("Connection")
        .is_some_and(|value| value.eq_ignore_ascii_case("upgrade"))
    {
        return reject();
    }
    let Some(key) = headers.get("Sec-WebSocket-Key") else {
        return reject();
    };
    if !BASE64.decode(key).is_ok_and(|decoded| decoded.len() == 16) {
        return reject();
    }
    if headers.get("Sec-WebSocket-Version") != Some(WS_VERSION) {
        return HandshakeResponse::upgrade_required(version);
    }

    HandshakeResponse::switching_protocols(version, compute_accept_key(key))
}

/// A parsed `ws://` or `wss://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl {
    /// Whether the scheme is `wss`.
    pub secure: bool,
    /// Host name or address, without brackets for IPv6 literals.
    pub host: String,
    /// Port, defaulted from the scheme when absent.
    pub port: u16,
    /// `Host` header value: the host, plus the port unless it is the
    /// scheme's default.
    pub authority: String,
    /// Path and query sent in the request line.
    pub resource: String,
}

impl WsUrl {
    /// Parse a WebSocket URL.
    ///
    /// The fragment is dropped; an empty path becomes `/`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` for a malformed URL, any scheme other than
    /// `ws`/`wss`, a missing host, or embedded credentials.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input).map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))?;
        let secure = match url.scheme() {
            "ws" => false,
            "wss" => true,
            _ => {
                return Err(Error::InvalidUrl(format!(
                    "Expected {input} to be a WebSocket URL"
                )));
            }
        };
        if !url.username().is_empty() || url.password().is_some() {
            return Err(Error::InvalidUrl(format!("Credentials are not supported in {input}")));
        }

        let (host, host_header) = match url.host() {
            Some(Host::Ipv6(addr)) => (addr.to_string(), format!("[{addr}]")),
            Some(host) => (host.to_string(), host.to_string()),
            None => return Err(Error::InvalidUrl(format!("Missing host in {input}"))),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidUrl(format!("Missing port in {input}")))?;
        let authority = match url.port() {
            Some(port) => format!("{host_header}:{port}"),
            None => host_header,
        };

        let mut resource = url.path().to_string();
        if let Some(query) = url.query() {
            resource.push('?');
            resource.push_str(query);
        }

        Ok(Self {
            secure,
            host,
            port,
            authority,
            resource,
        })
    }
}

/// Client side of the opening handshake.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    key: String,
    expected_accept: String,
}

impl ClientHandshake {
    /// Start a handshake with a fresh random key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Random` if the random source is unavailable.
    pub fn new() -> Result<Self> {
        Ok(Self::with_key(generate_key()?))
    }

    /// Start a handshake with a caller-chosen key.
    #[must_use]
    pub fn with_key(key: String) -> Self {
        let expected_accept = compute_accept_key(&key);
        Self {
            key,
            expected_accept,
        }
    }

    /// The Sec-WebSocket-Key sent in the request.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Write the upgrade request for `url`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeaderValue` if the URL smuggles CR/LF into the
    /// request line or `Host` header.
    pub fn write_request(&self, url: &WsUrl, buf: &mut Vec<u8>) -> Result<()> {
        validate_header_value("request-target", &url.resource)?;
        if url.resource.contains(' ') {
            return Err(Error::InvalidHeaderValue {
                header: "request-target".to_string(),
                reason: "contains spaces".to_string(),
            });
        }

        let mut headers = Headers::new();
        headers.push("Host", url.authority.as_str());
        headers.push("Upgrade", "websocket");
        headers.push("Connection", "upgrade");
        headers.push("Sec-WebSocket-Key", self.key.as_str());
        headers.push("Sec-WebSocket-Version", WS_VERSION);

        buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", url.resource).as_bytes());
        headers.write(buf)?;
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Check the server's response head.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` unless the status is 101, `Connection`
    /// is `upgrade`, `Upgrade` is `websocket` (both case-insensitive) and
    /// `Sec-WebSocket-Accept` matches the expected value exactly.
    pub fn verify(&self, response: &HandshakeResponse) -> Result<()> {
        if response.status != 101 {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got {}",
                response.status
            )));
        }

        let headers = &response.headers;
        if !headers
            .get("Connection")
            .is_some_and(|value| value.eq_ignore_ascii_case("upgrade"))
        {
            return Err(Error::InvalidHandshake(
                "Missing or invalid Connection header".into(),
            ));
        }
        if !headers
            .get("Upgrade")
            .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
        {
            return Err(Error::InvalidHandshake(
                "Missing or invalid Upgrade header".into(),
            ));
        }
        if headers.get("Sec-WebSocket-Accept") != Some(self.expected_accept.as_str()) {
            return Err(Error::InvalidHandshake(
                "Sec-WebSocket-Accept does not match".into(),
            ));
        }
        Ok(())
    }
}
