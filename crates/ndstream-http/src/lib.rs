//! HTTP adapters for the streaming NDJSON codec.
//!
//! - [`Ndjson`] turns a record stream into an axum response whose body is
//!   written one line per chunk, with proxy buffering disabled.
//! - [`NdjsonStream`] extracts an NDJSON request body as a lazy record
//!   stream.
//! - [`NdjsonClient`], [`ndjson_request`] and [`read_ndjson`] do the same
//!   on the client side over a hyper HTTP/1 connection.

pub mod client;
mod error;
mod extract;
mod server;

pub use client::{NdjsonClient, RequestBody, ndjson_body, ndjson_request, read_ndjson};
pub use error::{NdjsonRejection, status_for};
pub use extract::NdjsonStream;
pub use server::{HttpHead, Ndjson};
