/// Incremental HTTP response reader.
///
/// Splits one continuous byte stream, delivered in arbitrary chunks, into a
/// header block and a body. The reader does no I/O itself: the caller feeds
/// it every chunk it receives and writes the body slices it hands back to the
/// output sink, in order.
///
/// ```text
/// AccumulatingHeaders --boundary--> StreamingBody --length reached / close--> Done
///         |                               |
///         +--------- close / error -------+-------------------------------> Failed
/// ```
use tracing::debug;

use crate::errors::{FetchError, FetchResult};
use crate::http_protocol::{find_header_end, ResponseHead, HEADER_TERMINATOR, UNKNOWN_CONTENT_LENGTH};

/// Where the reader is in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    AccumulatingHeaders,
    StreamingBody,
    Done,
    Failed,
}

impl ReaderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReaderState::Done | ReaderState::Failed)
    }
}

/// What a fed chunk turned out to contain.
#[derive(Debug, PartialEq, Eq)]
pub enum Feed<'a> {
    /// Still inside the header block.
    NeedMore,
    /// The header boundary was found in the accumulated bytes. `body` holds
    /// whatever followed it and may be empty. The output sink is opened now.
    Headers { head: ResponseHead, body: Vec<u8> },
    /// Body bytes to append to the output sink.
    Body(&'a [u8]),
}

/// Per-download parse state.
#[derive(Debug)]
pub struct ResponseReader {
    state: ReaderState,
    /// Every byte received while the header boundary is unknown.
    buffer: Vec<u8>,
    content_length: i64,
    body_bytes: u64,
    /// Upper bound for `buffer`, `None` for unbounded.
    max_header_bytes: Option<usize>,
}

impl Default for ResponseReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseReader {
    /// Reader with an unbounded header buffer.
    pub fn new() -> Self {
        Self {
            state: ReaderState::AccumulatingHeaders,
            buffer: Vec::new(),
            content_length: UNKNOWN_CONTENT_LENGTH,
            body_bytes: 0,
            max_header_bytes: None,
        }
    }

    /// Fail with a malformed response once the header block exceeds `limit`
    /// bytes without a boundary. A limit of 0 means unbounded.
    pub fn with_max_header_bytes(mut self, limit: usize) -> Self {
        self.max_header_bytes = (limit > 0).then_some(limit);
        self
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ReaderState::Done
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Declared `Content-Length`, `-1` while unknown.
    pub fn content_length(&self) -> i64 {
        self.content_length
    }

    /// Body bytes classified so far.
    pub fn body_bytes(&self) -> u64 {
        self.body_bytes
    }

    /// Bytes held while waiting for the header boundary.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Classify one received chunk. Must not be called with an empty chunk;
    /// a zero-length read is reported through [`ResponseReader::on_close`].
    pub fn feed<'a>(&mut self, chunk: &'a [u8]) -> FetchResult<Feed<'a>> {
        match self.state {
            ReaderState::AccumulatingHeaders => self.feed_headers(chunk),
            ReaderState::StreamingBody => Ok(Feed::Body(self.take_body(chunk))),
            ReaderState::Done => {
                debug!("Ignoring {} bytes received after body completed", chunk.len());
                Ok(Feed::Body(&[]))
            }
            ReaderState::Failed => Err(FetchError::MalformedResponse {
                reason: "data fed to a failed reader".to_string(),
            }),
        }
    }

    /// The peer closed the stream.
    ///
    /// Inside the body this ends the download successfully even if fewer
    /// bytes than declared arrived. Before the header boundary it is a
    /// malformed response.
    pub fn on_close(&mut self) -> FetchResult<()> {
        match self.state {
            ReaderState::AccumulatingHeaders => {
                let received = self.buffer.len();
                self.fail();
                Err(FetchError::MalformedResponse {
                    reason: format!(
                        "connection closed before end of headers ({} bytes received)",
                        received
                    ),
                })
            }
            ReaderState::StreamingBody => {
                if self.content_length > 0 && (self.body_bytes as i64) < self.content_length {
                    debug!(
                        "Peer closed after {} of {} declared body bytes",
                        self.body_bytes, self.content_length
                    );
                }
                self.state = ReaderState::Done;
                Ok(())
            }
            ReaderState::Done => Ok(()),
            ReaderState::Failed => Err(FetchError::MalformedResponse {
                reason: "stream closed after failure".to_string(),
            }),
        }
    }

    /// Move to `Failed`, dropping any buffered header bytes.
    pub fn fail(&mut self) {
        self.state = ReaderState::Failed;
        self.buffer = Vec::new();
    }

    fn feed_headers<'a>(&mut self, chunk: &'a [u8]) -> FetchResult<Feed<'a>> {
        self.buffer.extend_from_slice(chunk);

        let Some(end) = find_header_end(&self.buffer) else {
            if let Some(limit) = self.max_header_bytes {
                if self.buffer.len() > limit {
                    let received = self.buffer.len();
                    self.fail();
                    return Err(FetchError::MalformedResponse {
                        reason: format!(
                            "header block exceeds {} bytes ({} received without end of headers)",
                            limit, received
                        ),
                    });
                }
            }
            return Ok(Feed::NeedMore);
        };

        let mut accumulated = std::mem::take(&mut self.buffer);
        let rest = accumulated.split_off(end + HEADER_TERMINATOR.len());
        accumulated.truncate(end);

        let head = ResponseHead::parse(&accumulated);
        self.content_length = head.content_length;
        self.state = ReaderState::StreamingBody;

        let body = self.take_body(&rest).to_vec();
        Ok(Feed::Headers { head, body })
    }

    /// Count `chunk` as body, cut to the declared length when one is known.
    fn take_body<'a>(&mut self, chunk: &'a [u8]) -> &'a [u8] {
        let slice = match self.remaining() {
            Some(remaining) if (chunk.len() as u64) > remaining => {
                debug!(
                    "Discarding {} bytes past declared Content-Length",
                    chunk.len() as u64 - remaining
                );
                &chunk[..remaining as usize]
            }
            _ => chunk,
        };

        self.body_bytes += slice.len() as u64;
        if let Some(0) = self.remaining() {
            self.state = ReaderState::Done;
        }
        slice
    }

    /// Body bytes still expected, `None` when reading until close.
    fn remaining(&self) -> Option<u64> {
        (self.content_length > 0)
            .then(|| (self.content_length as u64).saturating_sub(self.body_bytes))
    }
}
