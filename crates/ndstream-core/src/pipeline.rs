//! Complete write pipeline: head side effects, line writing and
//! disconnect classification.

use futures::Stream;
use serde::Serialize;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::codec::{JsonCodec, ValueCodec};
use crate::error::{NdjsonError, NdjsonResult};
use crate::head::{HeadGuard, ResponseHead};
use crate::media::MediaFormat;
use crate::writer::LineWriter;

/// Outcome of a finished write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: u64,
    /// The transport went away before the sequence was exhausted.
    pub disconnected: bool,
}

/// Classify a write result.
///
/// Cancellation caused by the transport's own token is the expected way
/// for a stream to end when the peer disconnects, so it becomes a clean
/// summary. Every other error, including cancellation requested by the
/// caller, is returned unchanged.
pub fn finish_write(
    result: NdjsonResult<u64>,
    transport: &CancellationToken,
) -> NdjsonResult<WriteSummary> {
    match result {
        Ok(written) => Ok(WriteSummary {
            written,
            disconnected: false,
        }),
        Err(NdjsonError::Cancelled { written }) if transport.is_cancelled() => {
            debug!(written, "peer disconnected, ndjson stream stopped");
            Ok(WriteSummary {
                written,
                disconnected: true,
            })
        }
        Err(err) => Err(err),
    }
}

/// Streams a record sequence through a transport head and body.
#[derive(Debug, Clone)]
pub struct WritePipeline<C = JsonCodec> {
    codec: C,
    format: MediaFormat,
    status: Option<u16>,
    transport: CancellationToken,
}

impl Default for WritePipeline<JsonCodec> {
    fn default() -> Self {
        Self::new(JsonCodec::default())
    }
}

impl WritePipeline<JsonCodec> {
    /// Pipeline for a media-type token; unknown tokens fail here, before
    /// any I/O.
    pub fn for_token(token: &str) -> NdjsonResult<Self> {
        Ok(Self::default().format(token.parse()?))
    }
}

impl<C: ValueCodec> WritePipeline<C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            format: MediaFormat::default(),
            status: None,
            transport: CancellationToken::new(),
        }
    }

    pub fn format(mut self, format: MediaFormat) -> Self {
        self.format = format;
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Token that fires when the transport is torn down.
    pub fn transport(mut self, token: CancellationToken) -> Self {
        self.transport = token;
        self
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn head_guard(&self) -> HeadGuard {
        let guard = HeadGuard::new(self.format);
        match self.status {
            Some(status) => guard.with_status(status),
            None => guard,
        }
    }

    /// Apply the head, then write every record as one flushed line.
    ///
    /// `cancel` is the caller's token; the transport token set with
    /// [`transport`](WritePipeline::transport) also stops the write and
    /// is reported as a disconnect rather than an error. The body writer
    /// is released but not closed.
    pub async fn run<H, W, T, S>(
        &self,
        head: &mut H,
        body: W,
        values: S,
        cancel: &CancellationToken,
    ) -> NdjsonResult<WriteSummary>
    where
        H: ResponseHead + ?Sized,
        W: AsyncWrite + Unpin,
        T: Serialize,
        S: Stream<Item = T>,
    {
        self.head_guard().apply(head)?;
        debug!(format = %self.format, "writing ndjson stream");

        let mut writer =
            LineWriter::new(body, self.codec.clone()).transport(self.transport.clone());
        let result = writer.write_all(values, cancel).await;
        drop(writer);
        finish_write(result, &self.transport)
    }
}
