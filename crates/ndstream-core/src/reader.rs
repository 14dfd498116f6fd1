//! Reader pipeline: turns an NDJSON byte source into a record sequence.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::codec::{JsonCodec, ValueCodec};
use crate::error::{NdjsonError, NdjsonResult};
use crate::framing::NdjsonCodec;
use crate::media::{MediaFormat, ensure_readable};

/// Boxed, single-pass sequence of decoded records.
pub type RecordStream<T> = Pin<Box<dyn Stream<Item = NdjsonResult<T>> + Send>>;

/// Pull-based NDJSON reader.
///
/// Records are yielded lazily as lines arrive. The first error (decode
/// failure or cancellation) is returned once and ends the sequence;
/// records yielded before it remain valid.
pub struct LineReader<R, T, C = JsonCodec> {
    framed: FramedRead<R, NdjsonCodec<T, C>>,
    yielded: u64,
    done: bool,
}

impl<R, T, C> LineReader<R, T, C>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
    C: ValueCodec,
{
    pub fn new(reader: R, codec: C) -> Self {
        Self {
            framed: FramedRead::new(reader, NdjsonCodec::new(codec)),
            yielded: 0,
            done: false,
        }
    }

    /// Check the declared content type before reading any line.
    pub fn for_content_type(
        reader: R,
        content_type: Option<&str>,
        codec: C,
    ) -> NdjsonResult<Self> {
        let format: MediaFormat = ensure_readable(content_type)?;
        debug!(format = %format, "reading ndjson stream");
        Ok(Self::new(reader, codec))
    }

    /// Records delivered so far.
    pub fn yielded(&self) -> u64 {
        self.yielded
    }

    /// Pull the next record, or `Ok(None)` at end of stream.
    pub async fn next(&mut self, cancel: &CancellationToken) -> NdjsonResult<Option<T>> {
        if self.done {
            return Ok(None);
        }

        let pulled = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            next = self.framed.next() => Some(next),
        };

        match pulled {
            None => {
                self.done = true;
                debug!(yielded = self.yielded, "ndjson read cancelled");
                Err(NdjsonError::Cancelled {
                    written: self.yielded,
                })
            }
            Some(None) => {
                self.done = true;
                debug!(yielded = self.yielded, "ndjson stream ended");
                Ok(None)
            }
            Some(Some(Ok(record))) => {
                self.yielded += 1;
                trace!(yielded = self.yielded, "ndjson record decoded");
                Ok(Some(record))
            }
            Some(Some(Err(err))) => {
                self.done = true;
                warn!(yielded = self.yielded, error = %err, "ndjson read failed");
                Err(err)
            }
        }
    }
}

impl<R, T, C> LineReader<R, T, C>
where
    R: AsyncRead + Unpin + Send + 'static,
    T: DeserializeOwned + Send + 'static,
    C: ValueCodec,
{
    /// Convert into a boxed stream that ends after the first error.
    pub fn into_stream(self, cancel: CancellationToken) -> RecordStream<T> {
        let stream = futures::stream::unfold((self, cancel), |(mut reader, cancel)| async move {
            match reader.next(&cancel).await {
                Ok(Some(record)) => Some((Ok(record), (reader, cancel))),
                Ok(None) => None,
                Err(err) => Some((Err(err), (reader, cancel))),
            }
        });
        Box::pin(stream)
    }
}
