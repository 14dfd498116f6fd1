//! Codec configuration.
//!
//! A [`CodecConfig`] is built once, at the call site, and then shared
//! read-only by every line of every stream that uses it. It can be
//! loaded from a TOML document:
//!
//! ```toml
//! naming = "camel_case"
//! escaping = "ascii"
//! max_line_length = 1048576
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NdjsonError, NdjsonResult};

/// How JSON object keys are spelled on the wire.
///
/// Rust field names are assumed to be `snake_case`. On encode the keys
/// are converted to the policy's convention; on decode they are
/// converted back to `snake_case`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingPolicy {
    #[default]
    AsIs,
    CamelCase,
    PascalCase,
    KebabCase,
}

/// Which characters are escaped inside JSON strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Escaping {
    /// Only what JSON requires. Non-ASCII text is written as UTF-8.
    #[default]
    Relaxed,
    /// Non-ASCII and HTML-sensitive characters become `\uXXXX` escapes.
    Ascii,
}

/// Value-serialization settings applied uniformly to one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    pub naming: NamingPolicy,
    pub escaping: Escaping,
    /// Maximum bytes in one incoming line, delimiter excluded.
    pub max_line_length: Option<usize>,
}

impl CodecConfig {
    pub fn with_naming(mut self, naming: NamingPolicy) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_escaping(mut self, escaping: Escaping) -> Self {
        self.escaping = escaping;
        self
    }

    pub fn with_max_line_length(mut self, limit: usize) -> Self {
        self.max_line_length = Some(limit);
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> NdjsonResult<Self> {
        let config: CodecConfig =
            toml::from_str(content).map_err(|e| NdjsonError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: &Path) -> NdjsonResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> NdjsonResult<()> {
        if self.max_line_length == Some(0) {
            return Err(NdjsonError::InvalidConfig(
                "max_line_length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
