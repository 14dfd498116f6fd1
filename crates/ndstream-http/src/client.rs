//! HTTP/1 client side: streaming request bodies and response parsing.

use anyhow::Context;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use http::header::{ACCEPT, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request, Response};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, StreamBody};
use hyper::body::{Body, Frame, Incoming};
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use ndstream_core::media::ensure_readable;
use ndstream_core::{
    BoxError, CancellationToken, JsonCodec, MediaFormat, NdjsonError, NdjsonResult, RecordStream,
    ValueCodec, decode_body, encode_stream,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Body type for requests sent by this module.
pub type RequestBody = UnsyncBoxBody<Bytes, NdjsonError>;

const CLIENT_AGENT: &str = concat!("ndstream-http/", env!("CARGO_PKG_VERSION"));

/// Wrap a record stream as a chunked request body, one line per frame.
pub fn ndjson_body<S, T, C>(values: S, codec: C, cancel: CancellationToken) -> RequestBody
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + 'static,
    C: ValueCodec,
{
    let frames = encode_stream(values, codec, cancel).map_ok(Frame::data);
    StreamBody::new(frames).boxed_unsync()
}

fn empty_body() -> RequestBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Build a request that streams `values` as its body.
///
/// No `Content-Length` is set, so HTTP/1 uses chunked encoding and each
/// line goes out as soon as it is encoded.
pub fn ndjson_request<S, T, C>(
    method: Method,
    uri: &str,
    values: S,
    format: MediaFormat,
    codec: C,
) -> Result<Request<RequestBody>, http::Error>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + 'static,
    C: ValueCodec,
{
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, format.content_type())
        .body(ndjson_body(values, codec, CancellationToken::new()))
}

/// Check a response's content type and decode its body lazily.
pub fn read_ndjson<B, T, C>(
    response: Response<B>,
    codec: C,
    cancel: CancellationToken,
) -> NdjsonResult<RecordStream<T>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
    T: DeserializeOwned + Send + 'static,
    C: ValueCodec,
{
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let format = ensure_readable(content_type)?;
    debug!(format = %format, status = %response.status(), "reading ndjson response");

    let body = response.into_body().into_data_stream();
    Ok(decode_body(body, codec, cancel))
}

/// A single HTTP/1 connection for exchanging NDJSON streams.
pub struct NdjsonClient {
    sender: SendRequest<RequestBody>,
    host: String,
    codec: JsonCodec,
}

impl NdjsonClient {
    /// Connect to `address` (`host:port`) and drive the connection in the
    /// background.
    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let stream = tokio::net::TcpStream::connect(address)
            .await
            .with_context(|| format!("failed to connect to {address}"))?;

        let io = TokioIo::new(stream);
        let (sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .context("HTTP/1 handshake failed")?;

        let peer = address.to_string();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, %peer, "ndjson client connection closed");
            }
        });

        Ok(Self {
            sender,
            host: address.to_string(),
            codec: JsonCodec::default(),
        })
    }

    pub fn with_codec(mut self, codec: JsonCodec) -> Self {
        self.codec = codec;
        self
    }

    async fn send(&mut self, req: Request<RequestBody>) -> anyhow::Result<Response<Incoming>> {
        self.sender.ready().await.context("connection not ready")?;
        let resp = self
            .sender
            .send_request(req)
            .await
            .context("request failed")?;
        debug!(status = %resp.status(), "ndjson request sent");
        Ok(resp)
    }

    fn request(&self, method: Method, path: &str, format: MediaFormat) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, &self.host)
            .header(USER_AGENT, CLIENT_AGENT)
            .header(ACCEPT, format.content_type())
    }

    /// POST `values` as a streaming body and return the raw response.
    pub async fn post<S, T>(
        &mut self,
        path: &str,
        values: S,
        format: MediaFormat,
    ) -> anyhow::Result<Response<Incoming>>
    where
        S: Stream<Item = T> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let body = ndjson_body(values, self.codec.clone(), CancellationToken::new());
        let req = self
            .request(Method::POST, path, format)
            .header(CONTENT_TYPE, format.content_type())
            .body(body)
            .context("invalid request")?;
        self.send(req).await
    }

    /// GET `path` and decode the NDJSON response body.
    pub async fn get<T>(
        &mut self,
        path: &str,
        cancel: CancellationToken,
    ) -> anyhow::Result<RecordStream<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let req = self
            .request(Method::GET, path, MediaFormat::default())
            .body(empty_body())
            .context("invalid request")?;
        let resp = self.send(req).await?;
        if !resp.status().is_success() {
            anyhow::bail!("unexpected status {}", resp.status());
        }
        Ok(read_ndjson(resp, self.codec.clone(), cancel)?)
    }
}
