//! Response head side effects.
//!
//! Before the first line of a stream is written the transport must have
//! its status, its `Content-Type` and its buffering switched off, in that
//! order. [`HeadGuard`] applies them exactly once through whatever
//! [`ResponseHead`] the transport provides.

use tracing::debug;

use crate::error::{NdjsonError, NdjsonResult};
use crate::media::MediaFormat;

/// Headers that ask proxies and the transport not to buffer the body.
pub const NO_BUFFERING_HEADERS: [(&str, &str); 2] =
    [("x-accel-buffering", "no"), ("cache-control", "no-cache")];

/// Write-side head of a transport.
pub trait ResponseHead {
    fn set_status(&mut self, status: u16) -> NdjsonResult<()>;
    fn set_content_type(&mut self, content_type: &'static str);
    fn disable_buffering(&mut self);
}

/// Applies the head side effects for one stream.
#[derive(Debug, Clone)]
pub struct HeadGuard {
    format: MediaFormat,
    status: Option<u16>,
    applied: bool,
}

impl HeadGuard {
    pub fn new(format: MediaFormat) -> Self {
        Self {
            format,
            status: None,
            applied: false,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn format(&self) -> MediaFormat {
        self.format
    }

    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// Set status, content type and disable buffering.
    ///
    /// Returns `Ok(true)` the first time and `Ok(false)` afterwards. An
    /// out-of-range status is rejected before any side effect happens.
    pub fn apply<H: ResponseHead + ?Sized>(&mut self, head: &mut H) -> NdjsonResult<bool> {
        if self.applied {
            return Ok(false);
        }
        if let Some(status) = self.status {
            if !(100..=999).contains(&status) {
                return Err(NdjsonError::InvalidStatus(status));
            }
            debug!(status, "setting status code");
            head.set_status(status)?;
        }

        let content_type = self.format.content_type();
        debug!(content_type, "setting content type");
        head.set_content_type(content_type);

        debug!("disabling response buffering");
        head.disable_buffering();

        self.applied = true;
        Ok(true)
    }
}

/// One recorded head side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadEvent {
    Status(u16),
    ContentType(&'static str),
    BufferingDisabled,
}

/// An HTTP header as a name-value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<Header>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any existing values for `name`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|h| !h.name.eq_ignore_ascii_case(&name));
        self.entries.push(Header {
            name,
            value: value.into(),
        });
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// In-memory head for non-HTTP transports and tests.
#[derive(Debug, Clone, Default)]
pub struct RecordedHead {
    pub status: Option<u16>,
    pub headers: HeaderMap,
    pub events: Vec<HeadEvent>,
}

impl ResponseHead for RecordedHead {
    fn set_status(&mut self, status: u16) -> NdjsonResult<()> {
        self.status = Some(status);
        self.events.push(HeadEvent::Status(status));
        Ok(())
    }

    fn set_content_type(&mut self, content_type: &'static str) {
        self.headers.set("content-type", content_type);
        self.events.push(HeadEvent::ContentType(content_type));
    }

    fn disable_buffering(&mut self) {
        for (name, value) in NO_BUFFERING_HEADERS {
            self.headers.set(name, value);
        }
        self.events.push(HeadEvent::BufferingDisabled);
    }
}
