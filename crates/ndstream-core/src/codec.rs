//! Value codec boundary.
//!
//! The line protocol never looks inside a record. It hands each record
//! to a [`ValueCodec`], which turns it into one JSON text and back.
//! [`JsonCodec`] is the serde_json implementation and applies the
//! [`CodecConfig`] naming and escaping rules.

use std::io::{self, Write};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::ser::{Formatter, Serializer};

use crate::config::{CodecConfig, Escaping, NamingPolicy};
use crate::error::BoxError;

/// Converts single records to and from JSON text.
///
/// Implementations must produce text without raw `\n` bytes; the line
/// encoder rejects anything that would break framing.
pub trait ValueCodec: Clone + Send + Sync + 'static {
    /// Append the JSON text of `value` to `out`.
    fn encode<T: Serialize + ?Sized>(&self, value: &T, out: &mut Vec<u8>) -> Result<(), BoxError>;

    /// Parse one JSON text (delimiter already stripped).
    fn decode<T: DeserializeOwned>(&self, text: &[u8]) -> Result<T, BoxError>;

    /// Upper bound on incoming line length, if any.
    fn max_line_length(&self) -> Option<usize> {
        None
    }
}

/// serde_json-backed codec sharing one immutable configuration.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    config: Arc<CodecConfig>,
}

impl JsonCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }
}

impl From<CodecConfig> for JsonCodec {
    fn from(config: CodecConfig) -> Self {
        Self::new(config)
    }
}

impl ValueCodec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T, out: &mut Vec<u8>) -> Result<(), BoxError> {
        match self.config.naming {
            NamingPolicy::AsIs => write_json(value, out, self.config.escaping),
            policy => {
                let mut tree = serde_json::to_value(value)?;
                rename_keys(&mut tree, &|key| to_wire_case(key, policy));
                write_json(&tree, out, self.config.escaping)
            }
        }
    }

    fn decode<T: DeserializeOwned>(&self, text: &[u8]) -> Result<T, BoxError> {
        match self.config.naming {
            NamingPolicy::AsIs => Ok(serde_json::from_slice(text)?),
            policy => {
                let mut tree: Value = serde_json::from_slice(text)?;
                rename_keys(&mut tree, &|key| from_wire_case(key, policy));
                Ok(serde_json::from_value(tree)?)
            }
        }
    }

    fn max_line_length(&self) -> Option<usize> {
        self.config.max_line_length
    }
}

fn write_json<T: Serialize + ?Sized>(
    value: &T,
    out: &mut Vec<u8>,
    escaping: Escaping,
) -> Result<(), BoxError> {
    match escaping {
        Escaping::Relaxed => serde_json::to_writer(out, value)?,
        Escaping::Ascii => {
            let mut ser = Serializer::with_formatter(out, AsciiFormatter);
            value.serialize(&mut ser)?;
        }
    }
    Ok(())
}

/// Compact formatter that keeps every string 7-bit and HTML-safe.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            if ch.is_ascii() && !matches!(ch, '<' | '>' | '&' | '\'') {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..idx])?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = idx + ch.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}

fn rename_keys(value: &mut Value, rename: &dyn Fn(&str) -> String) {
    match value {
        Value::Object(map) => {
            let entries = std::mem::take(map);
            for (key, mut child) in entries {
                rename_keys(&mut child, rename);
                map.insert(rename(&key), child);
            }
        }
        Value::Array(items) => {
            for item in items {
                rename_keys(item, rename);
            }
        }
        _ => {}
    }
}

fn to_wire_case(key: &str, policy: NamingPolicy) -> String {
    match policy {
        NamingPolicy::AsIs => key.to_string(),
        NamingPolicy::KebabCase => key.replace('_', "-"),
        NamingPolicy::CamelCase | NamingPolicy::PascalCase => {
            let mut out = String::with_capacity(key.len());
            let mut upper_next = policy == NamingPolicy::PascalCase;
            for ch in key.chars() {
                if ch == '_' {
                    upper_next = !out.is_empty();
                } else if upper_next {
                    out.extend(ch.to_uppercase());
                    upper_next = false;
                } else {
                    out.push(ch);
                }
            }
            out
        }
    }
}

fn from_wire_case(key: &str, policy: NamingPolicy) -> String {
    match policy {
        NamingPolicy::AsIs => key.to_string(),
        NamingPolicy::KebabCase => key.replace('-', "_"),
        NamingPolicy::CamelCase | NamingPolicy::PascalCase => {
            let chars: Vec<char> = key.chars().collect();
            let mut out = String::with_capacity(key.len() + 4);
            for (i, &ch) in chars.iter().enumerate() {
                if ch.is_uppercase() && i > 0 {
                    let prev = chars[i - 1];
                    let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
                    if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                        out.push('_');
                    }
                }
                out.extend(ch.to_lowercase());
            }
            out
        }
    }
}
