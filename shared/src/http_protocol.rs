/// HTTP/1.1 wire helpers for talking to a server over a raw TCP stream.
///
/// Everything here is a free function with no shared state: endpoint
/// resolution, request formatting, header boundary scanning and
/// `Content-Length` extraction.
use std::net::{SocketAddr, ToSocketAddrs};

use url::Url;

use crate::errors::{FetchError, FetchResult};

/// Port used when the URL does not name one.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Blank line separating the header block from the body.
pub const HEADER_TERMINATOR: &[u8; 4] = b"\r\n\r\n";

/// `Content-Length` value meaning "absent or unparseable, read until close".
pub const UNKNOWN_CONTENT_LENGTH: i64 = -1;

// ====== ENDPOINT RESOLUTION ======

/// Resolve the URL's host to a connectable address.
///
/// Performs one blocking name lookup per call, no caching. The first IPv4
/// address wins; otherwise the first address of any family is used.
pub fn resolve_endpoint(url: &Url) -> FetchResult<SocketAddr> {
    let host = url.host_str().ok_or_else(|| FetchError::Resolution {
        host: url.to_string(),
        reason: "URL has no host".to_string(),
    })?;
    let port = url.port().unwrap_or(DEFAULT_HTTP_PORT);

    // `host_str` keeps the brackets around IPv6 literals.
    let lookup_host = host.trim_start_matches('[').trim_end_matches(']');

    let addrs: Vec<SocketAddr> = (lookup_host, port)
        .to_socket_addrs()
        .map_err(|e| FetchError::Resolution {
            host: host.to_string(),
            reason: e.to_string(),
        })?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| FetchError::Resolution {
            host: host.to_string(),
            reason: "no addresses returned".to_string(),
        })
}

// ====== REQUEST ======

/// Path plus query of the URL, `/` when empty.
pub fn path_and_query(url: &Url) -> String {
    let mut target = url.path().to_string();
    if target.is_empty() {
        target.push('/');
    }
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }
    target
}

/// Format the GET request for `url`.
pub fn build_request(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path_and_query(url),
        host
    )
}

/// Request bytes as sent on the wire.
///
/// `Url` percent-encodes paths and punycodes hosts, so the text is ASCII
/// and its UTF-8 bytes are the ASCII encoding.
pub fn build_request_bytes(url: &Url) -> Vec<u8> {
    build_request(url).into_bytes()
}

// ====== RESPONSE HEAD ======

/// Offset of the first `\r\n\r\n` in `buf`, if any.
///
/// The whole buffer is scanned: the marker may straddle any two reads.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

/// Extract `Content-Length` from a header block.
///
/// The field name is matched case-insensitively and the first line with a
/// numeric value decides; non-numeric duplicates are skipped. With no numeric
/// value at all the result is [`UNKNOWN_CONTENT_LENGTH`].
pub fn parse_content_length(header: &str) -> i64 {
    header
        .split("\r\n")
        .filter(|line| !line.is_empty())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if !name.trim().eq_ignore_ascii_case("content-length") {
                return None;
            }
            value.trim().parse::<i64>().ok()
        })
        .unwrap_or(UNKNOWN_CONTENT_LENGTH)
}

/// Parsed response head: the raw header text and what was extracted from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Header block without the terminating blank line.
    pub raw: String,
    /// Declared body size, [`UNKNOWN_CONTENT_LENGTH`] when absent.
    pub content_length: i64,
}

impl ResponseHead {
    /// Decode a header block. Bytes outside ASCII are replaced, not rejected.
    pub fn parse(block: &[u8]) -> Self {
        let raw = String::from_utf8_lossy(block).into_owned();
        let content_length = parse_content_length(&raw);
        Self { raw, content_length }
    }

    /// The status line, for logging.
    pub fn status_line(&self) -> &str {
        self.raw.split("\r\n").next().unwrap_or_default()
    }

    /// Declared length when it is known and positive.
    pub fn declared_length(&self) -> Option<u64> {
        (self.content_length > 0).then_some(self.content_length as u64)
    }
}
