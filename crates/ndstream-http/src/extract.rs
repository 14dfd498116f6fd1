//! Request body extractor.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use futures::Stream;
use ndstream_core::media::ensure_readable;
use ndstream_core::{CancellationToken, JsonCodec, NdjsonResult, RecordStream, decode_body};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::NdjsonRejection;

/// Lazily decoded NDJSON request body.
///
/// The `Content-Type` must be `application/x-ndjson` or
/// `application/jsonl` with a UTF-8 or absent charset, otherwise the
/// request is rejected with 415 before any of the body is read. Records
/// are decoded as the handler pulls them. A [`JsonCodec`] placed in the
/// request extensions (for example by a layer) replaces the default one.
pub struct NdjsonStream<T>(pub RecordStream<T>);

impl<T> NdjsonStream<T> {
    pub fn into_inner(self) -> RecordStream<T> {
        self.0
    }
}

impl<T> Stream for NdjsonStream<T> {
    type Item = NdjsonResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().0.as_mut().poll_next(cx)
    }
}

impl<S, T> FromRequest<S> for NdjsonStream<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send + 'static,
{
    type Rejection = NdjsonRejection;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let format = ensure_readable(content_type)?;
        debug!(format = %format, "reading ndjson request body");

        let codec = req.extensions().get::<JsonCodec>().cloned().unwrap_or_default();
        let body = req.into_body().into_data_stream();
        Ok(Self(decode_body(body, codec, CancellationToken::new())))
    }
}
