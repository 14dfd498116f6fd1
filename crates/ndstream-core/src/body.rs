//! Body bridges for chunked transports.
//!
//! HTTP stacks move bodies as streams of `Bytes` chunks rather than as
//! `AsyncWrite`/`AsyncRead` handles. [`encode_stream`] yields exactly one
//! complete line per chunk, so every chunk the transport sends is a flush
//! boundary. [`decode_body`] accepts chunks split anywhere and feeds them
//! through the same line decoder as [`LineReader`](crate::LineReader).

use std::io;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::codec::Encoder;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::codec::ValueCodec;
use crate::error::{BoxError, NdjsonResult};
use crate::framing::NdjsonCodec;
use crate::reader::{LineReader, RecordStream};

/// A type-erased, fallible stream of encoded lines.
pub type ByteStream = Pin<Box<dyn Stream<Item = NdjsonResult<Bytes>> + Send>>;

struct EncodeState<S, T, C> {
    values: Pin<Box<S>>,
    framing: NdjsonCodec<T, C>,
    buf: BytesMut,
    cancel: CancellationToken,
    written: u64,
    done: bool,
}

/// Encode a record stream into one `Bytes` chunk per line.
///
/// The stream ends without error when `cancel` fires. An encode failure
/// is yielded once and ends the stream; lines already yielded are whole.
pub fn encode_stream<S, T, C>(values: S, codec: C, cancel: CancellationToken) -> ByteStream
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + 'static,
    C: ValueCodec,
{
    let state = EncodeState {
        values: Box::pin(values),
        framing: NdjsonCodec::new(codec),
        buf: BytesMut::new(),
        cancel,
        written: 0,
        done: false,
    };

    let lines = futures::stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }

        let pulled = tokio::select! {
            biased;
            _ = state.cancel.cancelled() => {
                debug!(written = state.written, "ndjson body cancelled");
                return None;
            }
            next = state.values.next() => next,
        };

        let Some(record) = pulled else {
            debug!(written = state.written, "ndjson body completed");
            return None;
        };

        match state.framing.encode(&record, &mut state.buf) {
            Ok(()) => {
                state.written += 1;
                trace!(written = state.written, "ndjson line encoded");
                let line = state.buf.split().freeze();
                Some((Ok(line), state))
            }
            Err(err) => {
                warn!(written = state.written, error = %err, "ndjson body aborted");
                state.done = true;
                Some((Err(err), state))
            }
        }
    });
    Box::pin(lines)
}

/// Decode a chunked byte body into records.
pub fn decode_body<S, E, T, C>(body: S, codec: C, cancel: CancellationToken) -> RecordStream<T>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<BoxError>,
    T: DeserializeOwned + Send + 'static,
    C: ValueCodec,
{
    let chunks = body.map(|chunk| {
        chunk.map_err(|e| {
            let err: BoxError = e.into();
            io::Error::other(err)
        })
    });
    let reader = StreamReader::new(Box::pin(chunks));
    LineReader::new(reader, codec).into_stream(cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::error::NdjsonError;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Value {
        id: u32,
        name: String,
    }

    fn value(id: u32) -> Value {
        Value {
            id,
            name: format!("Value {id:02}"),
        }
    }

    #[tokio::test]
    async fn one_line_per_chunk() {
        let chunks: Vec<_> = encode_stream(
            futures::stream::iter(vec![value(1), value(2)]),
            JsonCodec::default(),
            CancellationToken::new(),
        )
        .collect()
        .await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].as_ref().unwrap(),
            &Bytes::from_static(b"{\"id\":1,\"name\":\"Value 01\"}\n")
        );
        assert!(chunks.iter().all(|c| c.as_ref().unwrap().ends_with(b"\n")));
    }

    #[tokio::test]
    async fn empty_stream_has_no_chunks() {
        let chunks: Vec<_> = encode_stream(
            futures::stream::empty::<Value>(),
            JsonCodec::default(),
            CancellationToken::new(),
        )
        .collect()
        .await;
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn cancelled_body_ends_cleanly() {
        let cancel = CancellationToken::new();
        let mut body = encode_stream(
            futures::stream::iter(1..).map(value),
            JsonCodec::default(),
            cancel.clone(),
        );

        assert!(body.next().await.unwrap().is_ok());
        cancel.cancel();
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn encode_error_is_yielded_once() {
        let mut bad = std::collections::BTreeMap::new();
        bad.insert(vec![1u8], 1u8);
        let chunks: Vec<_> = encode_stream(
            futures::stream::iter(vec![std::collections::BTreeMap::new(), bad.clone(), bad]),
            JsonCodec::default(),
            CancellationToken::new(),
        )
        .collect()
        .await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref().unwrap(), &Bytes::from_static(b"{}\n"));
        assert!(matches!(chunks[1], Err(NdjsonError::Encode(_))));
    }

    #[tokio::test]
    async fn decode_body_handles_arbitrary_chunk_boundaries() {
        let wire = b"{\"id\":1,\"name\":\"Value 01\"}\r\n{\"id\":2,\"name\":\"Value 02\"}";
        let chunks: Vec<Result<Bytes, io::Error>> = wire
            .chunks(5)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        let records: Vec<_> = decode_body::<_, _, Value, _>(
            futures::stream::iter(chunks),
            JsonCodec::default(),
            CancellationToken::new(),
        )
        .collect()
        .await;

        let records: Vec<Value> = records.into_iter().map(Result::unwrap).collect();
        assert_eq!(records, vec![value(1), value(2)]);
    }

    #[tokio::test]
    async fn transport_error_surfaces_as_io() {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"id\":1,\"name\":\"Value 01\"}\n")),
            Err(io::Error::other("connection reset")),
        ];

        let records: Vec<_> = decode_body::<_, _, Value, _>(
            futures::stream::iter(chunks),
            JsonCodec::default(),
            CancellationToken::new(),
        )
        .collect()
        .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_ref().unwrap(), &value(1));
        assert!(matches!(records[1], Err(NdjsonError::Io(_))));
    }
}
