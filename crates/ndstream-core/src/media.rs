//! Format negotiation.
//!
//! Two media types share the same line framing and differ only in the
//! `Content-Type` label: `application/x-ndjson` and `application/jsonl`.
//! Everything here is pure string handling with no I/O.

use std::fmt;
use std::str::FromStr;

use crate::error::{NdjsonError, NdjsonResult};

/// Media type essence for newline-delimited JSON.
pub const NDJSON: &str = "application/x-ndjson";

/// Media type essence for JSON Lines.
pub const JSONL: &str = "application/jsonl";

/// One of the two supported wire labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MediaFormat {
    #[default]
    Ndjson,
    Jsonl,
}

impl MediaFormat {
    pub const ALL: [MediaFormat; 2] = [MediaFormat::Ndjson, MediaFormat::Jsonl];

    /// Bare media type without parameters.
    pub fn essence(self) -> &'static str {
        match self {
            MediaFormat::Ndjson => NDJSON,
            MediaFormat::Jsonl => JSONL,
        }
    }

    /// Full `Content-Type` header value sent with every written stream.
    pub fn content_type(self) -> &'static str {
        match self {
            MediaFormat::Ndjson => "application/x-ndjson; charset=utf-8",
            MediaFormat::Jsonl => "application/jsonl; charset=utf-8",
        }
    }

    pub fn from_essence(essence: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.essence().eq_ignore_ascii_case(essence.trim()))
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.essence())
    }
}

impl FromStr for MediaFormat {
    type Err = NdjsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = ContentType::parse(s);
        Self::from_essence(&parsed.essence)
            .ok_or_else(|| NdjsonError::UnsupportedMediaType(s.to_string()))
    }
}

/// Map a media-type token to its canonical `Content-Type` value.
///
/// Parameters on the token are ignored for lookup. Anything other than
/// the two supported essences is rejected.
pub fn resolve(token: &str) -> NdjsonResult<&'static str> {
    token.parse::<MediaFormat>().map(MediaFormat::content_type)
}

/// A parsed `Content-Type` header: lowercase essence plus parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    essence: String,
    params: Vec<(String, String)>,
}

impl ContentType {
    /// Lenient parse: never fails, malformed parameters are dropped.
    pub fn parse(header: &str) -> Self {
        let mut parts = split_unquoted(header, ';').into_iter();
        let essence = parts
            .next()
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let params = parts
            .filter_map(|part| {
                let (name, value) = part.split_once('=')?;
                let name = name.trim().to_ascii_lowercase();
                if name.is_empty() {
                    return None;
                }
                Some((name, unquote(value.trim())))
            })
            .collect();

        Self { essence, params }
    }

    pub fn essence(&self) -> &str {
        &self.essence
    }

    /// First parameter named `name` (case-insensitive).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }

    pub fn format(&self) -> Option<MediaFormat> {
        MediaFormat::from_essence(&self.essence)
    }
}

/// Precondition for reading: the declared content type must be one of
/// the supported formats, with no charset or a UTF-8 charset.
pub fn ensure_readable(header: Option<&str>) -> NdjsonResult<MediaFormat> {
    let Some(header) = header else {
        return Err(NdjsonError::UnsupportedMediaType(
            "missing content type".to_string(),
        ));
    };

    let parsed = ContentType::parse(header);
    let format = parsed
        .format()
        .ok_or_else(|| NdjsonError::UnsupportedMediaType(header.to_string()))?;

    match parsed.charset() {
        None => Ok(format),
        Some(charset) if is_utf8(charset) => Ok(format),
        Some(charset) => Err(NdjsonError::UnsupportedCharset(charset.to_string())),
    }
}

fn is_utf8(charset: &str) -> bool {
    charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("utf8")
}

/// Pick the response format from an `Accept` header.
///
/// The highest q-value wins; ties go to the more specific range, then to
/// header order. `*/*` and `application/*` select the first format the
/// header does not exclude with `q=0`, preferring the default. A missing
/// or blank header selects the default.
pub fn negotiate_accept(accept: Option<&str>) -> NdjsonResult<MediaFormat> {
    let Some(header) = accept.filter(|h| !h.trim().is_empty()) else {
        return Ok(MediaFormat::default());
    };

    let mut ranges = Vec::new();
    let mut excluded = Vec::new();
    for range in split_unquoted(header, ',') {
        let parsed = ContentType::parse(range);
        let quality = match parsed.param("q") {
            None => 1.0,
            Some(q) => match q.parse::<f32>() {
                Ok(q) if (0.0..=1.0).contains(&q) => q,
                _ => continue,
            },
        };
        let explicit = MediaFormat::from_essence(parsed.essence());
        if quality == 0.0 {
            excluded.extend(explicit);
            continue;
        }
        ranges.push((quality, parsed.essence().to_string(), explicit));
    }

    let wildcard = MediaFormat::ALL
        .into_iter()
        .find(|format| !excluded.contains(format));

    let mut best: Option<(f32, u8, MediaFormat)> = None;
    for (quality, essence, explicit) in ranges {
        let candidate = match (essence.as_str(), explicit) {
            (_, Some(format)) => (2, format),
            ("*/*", None) => match wildcard {
                Some(format) => (0, format),
                None => continue,
            },
            ("application/*", None) => match wildcard {
                Some(format) => (1, format),
                None => continue,
            },
            _ => continue,
        };

        let better = match best {
            None => true,
            Some((q, specificity, _)) => {
                quality > q || (quality == q && candidate.0 > specificity)
            }
        };
        if better {
            best = Some((quality, candidate.0, candidate.1));
        }
    }

    best.map(|(_, _, format)| format)
        .ok_or_else(|| NdjsonError::NotAcceptable(header.to_string()))
}

fn split_unquoted(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (idx, ch) in input.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                parts.push(&input[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}
