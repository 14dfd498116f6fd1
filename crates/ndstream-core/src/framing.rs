//! Line framing.
//!
//! [`NdjsonCodec`] is the single place where the wire format lives: one
//! JSON text per line, each line terminated by exactly one `\n`. It plugs
//! into `tokio_util::codec`, so the writer and reader pipelines are thin
//! wrappers around `FramedWrite` / `FramedRead`.

use std::marker::PhantomData;

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{JsonCodec, ValueCodec};
use crate::error::NdjsonError;

const DELIMITER: u8 = b'\n';
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Encoder/decoder for one NDJSON stream of `T` records.
///
/// The encoder renders a whole line into a scratch buffer before any of
/// it reaches the destination, so a failed encode never leaves a partial
/// line behind. The decoder scans incrementally and never re-reads bytes
/// it has already searched for a delimiter.
pub struct NdjsonCodec<T, C = JsonCodec> {
    codec: C,
    max_line_length: Option<usize>,
    scratch: Vec<u8>,
    next_index: usize,
    line: u64,
    at_start: bool,
    failed: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T, C: ValueCodec> NdjsonCodec<T, C> {
    pub fn new(codec: C) -> Self {
        let max_line_length = codec.max_line_length();
        Self {
            codec,
            max_line_length,
            scratch: Vec::new(),
            next_index: 0,
            line: 0,
            at_start: true,
            failed: false,
            _record: PhantomData,
        }
    }

    /// Override the line limit taken from the value codec.
    pub fn with_max_line_length(mut self, limit: Option<usize>) -> Self {
        self.max_line_length = limit;
        self
    }

    pub fn value_codec(&self) -> &C {
        &self.codec
    }

    /// Number of wire lines consumed so far, blank lines included.
    pub fn lines_read(&self) -> u64 {
        self.line
    }

    fn fail(&mut self, err: NdjsonError) -> NdjsonError {
        self.failed = true;
        err
    }

    fn check_length(&mut self, len: usize, line: u64) -> Result<(), NdjsonError> {
        match self.max_line_length {
            Some(limit) if len > limit => Err(self.fail(NdjsonError::LineTooLong { line, limit })),
            _ => Ok(()),
        }
    }

    /// Returns `false` while a possible BOM prefix is still incomplete.
    fn skip_bom(&mut self, src: &mut BytesMut, eof: bool) -> bool {
        if !self.at_start {
            return true;
        }
        if src.len() < UTF8_BOM.len() && UTF8_BOM.starts_with(&src[..]) && !eof {
            return false;
        }
        if src.starts_with(UTF8_BOM) {
            let _ = src.split_to(UTF8_BOM.len());
        }
        self.at_start = false;
        true
    }
}

impl<T: DeserializeOwned, C: ValueCodec> NdjsonCodec<T, C> {
    fn decode_text(&mut self, raw: &[u8]) -> Result<Option<T>, NdjsonError> {
        let text = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = self.line;
        self.check_length(text.len(), line)?;
        if text.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        match self.codec.decode(text) {
            Ok(record) => Ok(Some(record)),
            Err(source) => Err(self.fail(NdjsonError::Decode { line, source })),
        }
    }
}

impl<T: DeserializeOwned, C: ValueCodec> Decoder for NdjsonCodec<T, C> {
    type Item = T;
    type Error = NdjsonError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<T>, NdjsonError> {
        if self.failed || !self.skip_bom(src, false) {
            return Ok(None);
        }

        loop {
            let newline = src[self.next_index..].iter().position(|b| *b == DELIMITER);
            let Some(offset) = newline else {
                // Allow one byte of slack for a trailing '\r'.
                let pending = src.len().saturating_sub(1);
                self.check_length(pending, self.line + 1)?;
                self.next_index = src.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;
            self.line += 1;
            let raw = src.split_to(end + 1);

            if let Some(record) = self.decode_text(&raw[..end])? {
                return Ok(Some(record));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<T>, NdjsonError> {
        if self.failed {
            return Ok(None);
        }
        self.skip_bom(src, true);
        if let Some(record) = self.decode(src)? {
            return Ok(Some(record));
        }
        if src.is_empty() {
            return Ok(None);
        }

        // Final line without a trailing delimiter.
        self.next_index = 0;
        self.line += 1;
        let raw = src.split_to(src.len());
        self.decode_text(&raw)
    }
}

impl<T: Serialize, C: ValueCodec> Encoder<&T> for NdjsonCodec<T, C> {
    type Error = NdjsonError;

    fn encode(&mut self, record: &T, dst: &mut BytesMut) -> Result<(), NdjsonError> {
        self.scratch.clear();
        self.codec
            .encode(record, &mut self.scratch)
            .map_err(NdjsonError::Encode)?;
        if self.scratch.contains(&DELIMITER) {
            return Err(NdjsonError::EmbeddedNewline);
        }

        dst.reserve(self.scratch.len() + 1);
        dst.extend_from_slice(&self.scratch);
        dst.put_u8(DELIMITER);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodecConfig;
    use crate::error::BoxError;
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

    fn codec() -> NdjsonCodec<Value> {
        NdjsonCodec::new(JsonCodec::default())
    }

    fn decode_all(codec: &mut NdjsonCodec<Value>, input: &[u8]) -> Vec<Result<Value, String>> {
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        loop {
            match codec.decode_eof(&mut buf) {
                Ok(Some(v)) => out.push(Ok(v)),
                Ok(None) => break,
                Err(e) => {
                    out.push(Err(e.to_string()));
                    break;
                }
            }
        }
        out
    }

    #[test]
    fn encode_appends_single_delimiter() {
        let mut codec = codec();
        let mut dst = BytesMut::new();
        codec.encode(&value(1), &mut dst).unwrap();
        codec.encode(&value(2), &mut dst).unwrap();
        assert_eq!(
            &dst[..],
            b"{\"id\":1,\"name\":\"Value 01\"}\n{\"id\":2,\"name\":\"Value 02\"}\n"
        );
    }

    #[test]
    fn decode_waits_for_delimiter() {
        let mut codec = codec();
        let mut buf = BytesMut::from(&b"{\"id\":1,\"na"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"me\":\"Value 01\"}\n{\"id\"");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(value(1)));
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"{\"id\"");
    }

    #[test]
    fn decode_strips_crlf_and_skips_blank_lines() {
        let mut codec = codec();
        let out = decode_all(
            &mut codec,
            b"{\"id\":1,\"name\":\"Value 01\"}\r\n\n  \r\n{\"id\":2,\"name\":\"Value 02\"}\n",
        );
        assert_eq!(out, vec![Ok(value(1)), Ok(value(2))]);
        assert_eq!(codec.lines_read(), 4);
    }

    #[test]
    fn decode_eof_accepts_unterminated_last_line() {
        let mut codec = codec();
        let out = decode_all(&mut codec, b"{\"id\":1,\"name\":\"Value 01\"}");
        assert_eq!(out, vec![Ok(value(1))]);
    }

    #[test]
    fn decode_empty_input_yields_nothing() {
        let mut codec = codec();
        assert!(decode_all(&mut codec, b"").is_empty());
    }

    #[test]
    fn decode_skips_leading_bom() {
        let mut codec = codec();
        let mut input = UTF8_BOM.to_vec();
        input.extend_from_slice(b"{\"id\":3,\"name\":\"Value 03\"}\n");
        assert_eq!(decode_all(&mut codec, &input), vec![Ok(value(3))]);
    }

    #[test]
    fn decode_waits_for_split_bom() {
        let mut codec = codec();
        let mut buf = BytesMut::from(&UTF8_BOM[..2]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2);

        buf.extend_from_slice(&UTF8_BOM[2..]);
        buf.extend_from_slice(b"{\"id\":4,\"name\":\"Value 04\"}\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(value(4)));
    }

    #[test]
    fn malformed_line_reports_line_number_and_stops() {
        let mut codec = codec();
        let out = decode_all(
            &mut codec,
            b"{\"id\":1,\"name\":\"Value 01\"}\n\n{oops}\n{\"id\":2,\"name\":\"Value 02\"}\n",
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Ok(value(1)));
        let err = out[1].as_ref().unwrap_err();
        assert!(err.starts_with("failed to decode line 3"), "{err}");

        let mut rest = BytesMut::from(&b"{\"id\":2,\"name\":\"Value 02\"}\n"[..]);
        assert!(codec.decode(&mut rest).unwrap().is_none());
    }

    #[test]
    fn line_limit_applies_to_complete_and_pending_lines() {
        let config = CodecConfig::default().with_max_line_length(30);
        let mut codec: NdjsonCodec<Value> = NdjsonCodec::new(JsonCodec::new(config));
        let mut buf = BytesMut::from(&b"{\"id\":1,\"name\":\"Value 01\"}\r\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(value(1)));

        buf.extend_from_slice(&[b'x'; 40]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, NdjsonError::LineTooLong { line: 2, limit: 30 }));
    }

    #[derive(Clone)]
    struct MultilineCodec;

    impl ValueCodec for MultilineCodec {
        fn encode<T: Serialize + ?Sized>(&self, value: &T, out: &mut Vec<u8>) -> Result<(), BoxError> {
            serde_json::to_writer_pretty(out, value)?;
            Ok(())
        }

        fn decode<T: DeserializeOwned>(&self, text: &[u8]) -> Result<T, BoxError> {
            Ok(serde_json::from_slice(text)?)
        }
    }

    #[test]
    fn encoder_rejects_raw_newline_without_writing() {
        let mut codec: NdjsonCodec<Value, MultilineCodec> = NdjsonCodec::new(MultilineCodec);
        let mut dst = BytesMut::new();
        let err = codec.encode(&value(1), &mut dst).unwrap_err();
        assert!(matches!(err, NdjsonError::EmbeddedNewline));
        assert!(dst.is_empty());
    }

    #[test]
    fn encoder_failure_leaves_destination_untouched() {
        let mut codec: NdjsonCodec<std::collections::BTreeMap<Vec<u8>, u8>> =
            NdjsonCodec::new(JsonCodec::default());
        let mut record = std::collections::BTreeMap::new();
        record.insert(vec![1u8], 1u8);

        let mut dst = BytesMut::from(&b"previous\n"[..]);
        let err = codec.encode(&record, &mut dst).unwrap_err();
        assert!(matches!(err, NdjsonError::Encode(_)));
        assert_eq!(&dst[..], b"previous\n");
    }
}
