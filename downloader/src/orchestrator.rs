/// Per-target download: resolve, connect, send the request, stream the
/// response body to disk, release the socket and the file.
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use courier_shared::errors::{FetchError, FetchResult};
use courier_shared::http_protocol::{build_request_bytes, resolve_endpoint};
use courier_shared::models::{DownloadReport, Target};
use courier_shared::response_reader::{Feed, ResponseReader};

use crate::config::{DownloaderConfig, DEFAULT_MAX_HEADER_BYTES, DEFAULT_RECV_BUFFER_SIZE};
use crate::sink::FileSink;

/// Knobs applied to every download of a run.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub recv_buffer_size: usize,
    pub max_header_bytes: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }
}

impl From<&DownloaderConfig> for DownloadOptions {
    fn from(config: &DownloaderConfig) -> Self {
        Self {
            recv_buffer_size: config.recv_buffer_size,
            max_header_bytes: config.max_header_bytes,
        }
    }
}

/// Download one target to completion and report how it ended.
///
/// Never returns an error: failures are logged and folded into the report.
pub async fn download(
    id: Uuid,
    target: Target,
    started_at: DateTime<Utc>,
    options: &DownloadOptions,
) -> DownloadReport {
    let span = info_span!("download", id = %id, url = %target.url);
    async move {
        info!("Start: {} -> {}", target.url, target.output_path.display());

        let mut reader = ResponseReader::new().with_max_header_bytes(options.max_header_bytes);
        let mut sink = FileSink::new(&target.output_path);
        match fetch(&target, &mut reader, &mut sink, options).await {
            Ok(()) => {
                let report = DownloadReport::done(
                    id,
                    target,
                    sink.written(),
                    reader.content_length(),
                    started_at,
                );
                info!(
                    bytes = report.bytes_written,
                    elapsed_ms = report.elapsed_ms(),
                    "Finished: {} -> {}",
                    report.target.url,
                    report.target.output_path.display()
                );
                report
            }
            Err(e) => {
                error!(
                    kind = e.kind(),
                    connected = !e.is_pre_connect(),
                    "Error downloading {}: {}",
                    target.url,
                    e
                );
                DownloadReport::from_error(id, target, &e, started_at)
                    .with_progress(sink.written(), reader.content_length())
            }
        }
    }
    .instrument(span)
    .await
}

/// Run the whole sequence for one target. The connection and the output file
/// are released exactly once whichever way this ends.
async fn fetch(
    target: &Target,
    reader: &mut ResponseReader,
    sink: &mut FileSink,
    options: &DownloadOptions,
) -> FetchResult<()> {
    let addr = resolve(target).await?;
    debug!("Resolved {} to {}", target.url, addr);

    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|source| FetchError::Connect { addr, source })?;
    debug!("Connected to {}", addr);

    let result = exchange(&mut stream, target, reader, sink, options).await;

    let result = match result {
        Ok(()) => sink.close().await,
        Err(e) => {
            sink.close_quietly().await;
            Err(e)
        }
    };

    if let Err(e) = stream.shutdown().await {
        debug!("Ignoring error while shutting down connection: {}", e);
    }
    drop(stream);

    result
}

/// Name resolution blocks, so it runs on the blocking pool.
async fn resolve(target: &Target) -> FetchResult<SocketAddr> {
    let url = target.url.clone();
    tokio::task::spawn_blocking(move || resolve_endpoint(&url))
        .await
        .map_err(|e| FetchError::Resolution {
            host: target.url.host_str().unwrap_or_default().to_string(),
            reason: format!("resolver task failed: {}", e),
        })?
}

async fn exchange<S>(
    stream: &mut S,
    target: &Target,
    reader: &mut ResponseReader,
    sink: &mut FileSink,
    options: &DownloadOptions,
) -> FetchResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = build_request_bytes(&target.url);
    send_request(stream, &request).await?;
    debug!("Request sent ({} bytes)", request.len());

    receive_response(stream, reader, sink, options.recv_buffer_size).await
}

/// Write the whole request, one write call at a time, until every byte is
/// accepted. A write that accepts nothing is a send failure.
pub async fn send_request<W>(stream: &mut W, request: &[u8]) -> FetchResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut sent = 0;
    while sent < request.len() {
        match stream.write(&request[sent..]).await {
            Ok(0) => {
                return Err(FetchError::Send {
                    sent,
                    total: request.len(),
                    reason: "transport accepted zero bytes".to_string(),
                })
            }
            Ok(n) => sent += n,
            Err(e) => {
                return Err(FetchError::Send {
                    sent,
                    total: request.len(),
                    reason: e.to_string(),
                })
            }
        }
    }
    stream.flush().await.map_err(|e| FetchError::Send {
        sent,
        total: request.len(),
        reason: e.to_string(),
    })
}

/// Drive `reader` over successive receives until it reaches a terminal state.
///
/// Each chunk is fully classified and written before the next receive is
/// issued. The output file is opened when the header boundary shows up.
pub async fn receive_response<R>(
    stream: &mut R,
    reader: &mut ResponseReader,
    sink: &mut FileSink,
    buffer_size: usize,
) -> FetchResult<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size.max(1)];

    while !reader.is_terminal() {
        let n = match stream.read(&mut buf).await {
            Ok(n) => n,
            Err(source) => {
                reader.fail();
                return Err(FetchError::Receive { source });
            }
        };

        if n == 0 {
            debug!("Peer closed the connection");
            reader.on_close()?;
            break;
        }

        let written = match reader.feed(&buf[..n])? {
            Feed::NeedMore => {
                debug!("Waiting for header boundary ({} bytes buffered)", reader.buffered());
                Ok(())
            }
            Feed::Headers { head, body } => {
                info!("Headers received: {}", head.status_line());
                debug!("Headers:\n{}", head.raw);
                info!("Content-Length: {}", head.content_length);
                match sink.open().await {
                    Ok(()) => sink.write(&body).await,
                    Err(e) => Err(e),
                }
            }
            Feed::Body(bytes) => sink.write(bytes).await,
        };

        if let Err(e) = written {
            reader.fail();
            return Err(e);
        }
    }

    if reader.is_done() && reader.body_bytes() != sink.written() {
        warn!(
            "Body byte count mismatch: classified {} wrote {}",
            reader.body_bytes(),
            sink.written()
        );
    }
    Ok(())
}
