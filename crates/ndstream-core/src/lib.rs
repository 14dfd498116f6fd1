//! Streaming NDJSON / JSON Lines codec.
//!
//! Writes a lazily produced, possibly unbounded sequence of records as
//! one JSON text per line, flushing after every line, and reads such a
//! stream back as a lazy sequence of records as bytes arrive.
//!
//! # Pipelines
//!
//! - [`LineWriter`] pulls records from a `Stream`, encodes each one into a
//!   complete line and flushes it before pulling the next. A line that has
//!   started is always finished, so cancellation never leaves half a line
//!   on the wire.
//! - [`LineReader`] splits an `AsyncRead` into lines and decodes each one
//!   on demand. The first decode failure ends the sequence; records
//!   already yielded are unaffected.
//! - [`WritePipeline`] adds the response head side effects and treats a
//!   transport disconnect as a clean end of stream.
//!
//! Both sides share [`NdjsonCodec`], a `tokio_util::codec` framing that
//! delegates the per-record JSON text to a [`ValueCodec`].
//!
//! # Formats
//!
//! `application/x-ndjson` and `application/jsonl` use identical framing
//! and differ only in the `Content-Type` label; see [`media`].

pub mod body;
pub mod codec;
pub mod config;
mod error;
pub mod framing;
pub mod head;
pub mod media;
pub mod pipeline;
pub mod reader;
pub mod writer;

pub use body::{ByteStream, decode_body, encode_stream};
pub use codec::{JsonCodec, ValueCodec};
pub use config::{CodecConfig, Escaping, NamingPolicy};
pub use error::{BoxError, NdjsonError, NdjsonResult};
pub use framing::NdjsonCodec;
pub use head::{HeadEvent, HeadGuard, RecordedHead, ResponseHead};
pub use media::{MediaFormat, negotiate_accept, resolve};
pub use pipeline::{WritePipeline, WriteSummary, finish_write};
pub use reader::{LineReader, RecordStream};
pub use tokio_util::sync::CancellationToken;
pub use writer::LineWriter;
