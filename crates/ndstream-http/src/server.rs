//! Streaming NDJSON responses for axum handlers.

use axum::body::Body;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use ndstream_core::head::NO_BUFFERING_HEADERS;
use ndstream_core::{
    CancellationToken, HeadGuard, JsonCodec, MediaFormat, NdjsonError, NdjsonResult,
    ResponseHead, ValueCodec, encode_stream, negotiate_accept,
};
use serde::Serialize;
use tracing::debug;

use crate::error::NdjsonRejection;

/// Response head backed by an `http::Response`.
pub struct HttpHead<'a, B>(pub &'a mut http::Response<B>);

impl<B> ResponseHead for HttpHead<'_, B> {
    fn set_status(&mut self, status: u16) -> NdjsonResult<()> {
        let status =
            StatusCode::from_u16(status).map_err(|_| NdjsonError::InvalidStatus(status))?;
        *self.0.status_mut() = status;
        Ok(())
    }

    fn set_content_type(&mut self, content_type: &'static str) {
        self.0
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }

    fn disable_buffering(&mut self) {
        let headers = self.0.headers_mut();
        for (name, value) in NO_BUFFERING_HEADERS {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
    }
}

/// A record stream sent as an NDJSON response body.
///
/// ```ignore
/// async fn events(headers: HeaderMap) -> Result<impl IntoResponse, NdjsonRejection> {
///     Ndjson::negotiate(event_stream(), &headers)
/// }
/// ```
pub struct Ndjson<S, C = JsonCodec> {
    values: S,
    format: MediaFormat,
    status: Option<u16>,
    codec: C,
    cancel: CancellationToken,
}

impl<S> Ndjson<S> {
    pub fn new(values: S) -> Self {
        Self {
            values,
            format: MediaFormat::default(),
            status: None,
            codec: JsonCodec::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Pick the format from the request's `Accept` header.
    pub fn negotiate(values: S, headers: &HeaderMap) -> Result<Self, NdjsonRejection> {
        let accept = headers.get(ACCEPT).and_then(|v| v.to_str().ok());
        let format = negotiate_accept(accept)?;
        Ok(Self::new(values).format(format))
    }
}

impl<S, C> Ndjson<S, C> {
    pub fn format(mut self, format: MediaFormat) -> Self {
        self.format = format;
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn codec<D: ValueCodec>(self, codec: D) -> Ndjson<S, D> {
        Ndjson {
            values: self.values,
            format: self.format,
            status: self.status,
            codec,
            cancel: self.cancel,
        }
    }

    /// Stop the body early when `token` fires, e.g. on server shutdown.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

impl<S, T, C> IntoResponse for Ndjson<S, C>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + 'static,
    C: ValueCodec,
{
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::empty());
        let mut guard = HeadGuard::new(self.format);
        if let Some(status) = self.status {
            guard = guard.with_status(status);
        }
        if let Err(err) = guard.apply(&mut HttpHead(&mut response)) {
            return NdjsonRejection(err).into_response();
        }

        debug!(format = %self.format, status = %response.status(), "streaming ndjson response");
        let lines = encode_stream(self.values, self.codec, self.cancel);
        *response.body_mut() = Body::from_stream(lines);
        response
    }
}
