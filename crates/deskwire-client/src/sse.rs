//! HTTP-stream (SSE) client session

use crate::connection::{ReconnectPolicy, SessionLink};
use crate::error::ClientError;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use tracing::{debug, trace, warn};

/// Largest frame the decoder buffers before giving up on it
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Incremental decoder for `text/event-stream` bodies.
///
/// Only `data:` fields are kept; comment lines (heartbeats) and the other
/// SSE fields are skipped. A frame that grows past the size limit without
/// terminating is discarded up to its terminator.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for a terminator
    scanned: usize,
    max_frame: usize,
    discarding: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_frame(MAX_FRAME_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_frame,
            discarding: false,
        }
    }

    /// Feed a body chunk; returns the data payload of every frame it
    /// completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        loop {
            // The terminator may straddle the previous chunk boundary
            let from = self.scanned.saturating_sub(1);
            let Some(pos) = self.buffer[from..].windows(2).position(|w| w == b"\n\n") else {
                self.scanned = self.buffer.len();
                break;
            };

            let raw: Vec<u8> = self.buffer.drain(..from + pos + 2).collect();
            self.scanned = 0;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if let Some(data) = Self::parse_frame(&String::from_utf8_lossy(&raw)) {
                frames.push(data);
            }
        }

        if self.buffer.len() > self.max_frame {
            if !self.discarding {
                warn!(limit = self.max_frame, "Discarding oversized stream frame");
            }
            self.buffer.clear();
            self.scanned = 0;
            self.discarding = true;
        }
        frames
    }

    fn parse_frame(frame: &str) -> Option<String> {
        let mut data: Vec<&str> = Vec::new();
        for line in frame.lines() {
            if line.starts_with(':') {
                trace!(comment = line, "Stream comment");
                continue;
            }
            if let Some(rest) = line.strip_prefix("data:") {
                data.push(rest.strip_prefix(' ').unwrap_or(rest));
            }
        }
        if data.is_empty() {
            None
        } else {
            Some(data.join("\n"))
        }
    }
}

/// Client for long-lived stream requests: bounded connect, no overall
/// request timeout.
pub fn stream_client(policy: &ReconnectPolicy) -> Result<reqwest::Client, ClientError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(policy.connect_timeout)
        .build()?)
}

/// Run one stream session until the body ends or goes idle
pub(crate) async fn run_session<T>(
    client: &reqwest::Client,
    url: &str,
    policy: &ReconnectPolicy,
    link: &SessionLink<T>,
) -> Result<(), ClientError> {
    let response = tokio::time::timeout(
        policy.connect_timeout,
        client.get(url).header(ACCEPT, "text/event-stream").send(),
    )
    .await
    .map_err(|_| ClientError::Timeout)??
    .error_for_status()?;

    debug!(url, "Event stream opened");
    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();

    loop {
        let chunk: Bytes = match tokio::time::timeout(policy.idle_timeout, body.next()).await {
            Err(_) => return Err(ClientError::Timeout),
            Ok(None) => return Ok(()),
            Ok(Some(chunk)) => chunk?,
        };
        for data in decoder.push(&chunk) {
            link.route(link.reconciler.ingest_stream_data(&data));
        }
    }
}
