//! Writer pipeline: pulls records and flushes one line per record.

use std::convert::Infallible;

use futures::{SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::codec::{JsonCodec, ValueCodec};
use crate::error::{BoxError, NdjsonError, NdjsonResult};
use crate::framing::NdjsonCodec;

/// Writes records to a byte sink as NDJSON, flushing after every line.
///
/// The writer borrows nothing from the transport's lifetime: dropping it
/// or calling [`into_inner`](LineWriter::into_inner) releases the sink
/// without shutting it down. Use [`close`](LineWriter::close) only when
/// this writer owns the transport.
pub struct LineWriter<W, T, C = JsonCodec> {
    framed: FramedWrite<W, NdjsonCodec<T, C>>,
    written: u64,
    transport: CancellationToken,
}

impl<W, T, C> LineWriter<W, T, C>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
    C: ValueCodec,
{
    pub fn new(writer: W, codec: C) -> Self {
        Self {
            framed: FramedWrite::new(writer, NdjsonCodec::new(codec)),
            written: 0,
            transport: CancellationToken::new(),
        }
    }

    /// Token that fires when the transport is torn down.
    ///
    /// Unlike the caller's token it also interrupts a line that is stuck
    /// in the transport, since nothing more can reach the peer.
    pub fn transport(mut self, token: CancellationToken) -> Self {
        self.transport = token;
        self
    }

    /// Records fully written and flushed so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    fn cancelled(&self) -> NdjsonError {
        NdjsonError::Cancelled {
            written: self.written,
        }
    }

    /// Encode, write and flush one record.
    ///
    /// Cancellation is checked before encoding and again before the line
    /// reaches the transport. Once the line is handed over, the write and
    /// flush run to completion, so the wire never carries half a line.
    /// Only the transport token can stop them.
    pub async fn write(&mut self, record: &T, cancel: &CancellationToken) -> NdjsonResult<()> {
        if cancel.is_cancelled() || self.transport.is_cancelled() {
            return Err(self.cancelled());
        }

        let transport = self.transport.clone();
        let sent = tokio::select! {
            biased;
            _ = transport.cancelled() => None,
            sent = self.send(record, cancel) => Some(sent),
        };
        match sent {
            Some(sent) => sent,
            None => {
                self.framed.write_buffer_mut().clear();
                debug!(written = self.written, "transport closed during ndjson write");
                Err(self.cancelled())
            }
        }
    }

    async fn send(&mut self, record: &T, cancel: &CancellationToken) -> NdjsonResult<()> {
        self.framed.feed(record).await?;

        if cancel.is_cancelled() {
            self.framed.write_buffer_mut().clear();
            return Err(self.cancelled());
        }

        SinkExt::<&T>::flush(&mut self.framed).await?;
        self.written += 1;
        trace!(written = self.written, "ndjson line flushed");
        Ok(())
    }

    /// Drive a record stream into the sink until it ends or is cancelled.
    ///
    /// Returns the total number of records this writer has flushed.
    pub async fn write_all<S>(&mut self, values: S, cancel: &CancellationToken) -> NdjsonResult<u64>
    where
        S: Stream<Item = T>,
    {
        self.write_all_fallible(values.map(Ok::<T, Infallible>), cancel)
            .await
    }

    /// Like [`write_all`](LineWriter::write_all) for producers that can fail.
    ///
    /// A producer error stops the stream; lines already flushed stay valid.
    pub async fn write_all_fallible<S, E>(
        &mut self,
        values: S,
        cancel: &CancellationToken,
    ) -> NdjsonResult<u64>
    where
        S: Stream<Item = Result<T, E>>,
        E: Into<BoxError>,
    {
        let transport = self.transport.clone();
        let mut values = std::pin::pin!(values);
        loop {
            let pulled = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                _ = transport.cancelled() => None,
                next = values.next() => Some(next),
            };
            match pulled {
                None => return Err(self.cancelled()),
                Some(None) => break,
                Some(Some(Ok(record))) => self.write(&record, cancel).await?,
                Some(Some(Err(e))) => return Err(NdjsonError::Source(e.into())),
            }
        }
        debug!(written = self.written, "ndjson stream completed");
        Ok(self.written)
    }

    /// Release the transport without closing it.
    pub fn into_inner(self) -> W {
        self.framed.into_inner()
    }

    /// Flush and shut down the transport.
    pub async fn close(mut self) -> NdjsonResult<()> {
        SinkExt::<&T>::close(&mut self.framed).await
    }
}
