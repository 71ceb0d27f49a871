//! @dose
//! purpose: BPE encoder abstraction owned by the tokenization worker, with the tiktoken-backed
//!     implementation used in production.
//!
//! when-editing:
//!     - !Encoders are built on the worker thread; they only need to be Send
//!     - Tests inject deterministic encoders through the Encoder trait
//!
//! gotchas:
//!     - Loading a BPE table takes noticeable time; build one encoder per worker, not per request

use anyhow::Result;
use clap::ValueEnum;
use serde::Deserialize;
use std::fmt;
use tiktoken_rs::CoreBPE;

/// Something that can turn text into a token count
pub trait Encoder: Send {
    /// Number of tokens `text` encodes to
    fn count_tokens(&self, text: &str) -> Result<usize>;
}

/// BPE vocabularies shipped with tiktoken-rs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
pub enum EncodingName {
    #[default]
    #[value(name = "cl100k_base")]
    #[serde(rename = "cl100k_base")]
    Cl100kBase,
    #[value(name = "o200k_base")]
    #[serde(rename = "o200k_base")]
    O200kBase,
    #[value(name = "p50k_base")]
    #[serde(rename = "p50k_base")]
    P50kBase,
    #[value(name = "r50k_base")]
    #[serde(rename = "r50k_base")]
    R50kBase,
}

impl fmt::Display for EncodingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncodingName::Cl100kBase => "cl100k_base",
            EncodingName::O200kBase => "o200k_base",
            EncodingName::P50kBase => "p50k_base",
            EncodingName::R50kBase => "r50k_base",
        };
        f.write_str(name)
    }
}

/// Production encoder backed by tiktoken
pub struct TiktokenEncoder {
    bpe: CoreBPE,
}

impl TiktokenEncoder {
    pub fn new(encoding: EncodingName) -> Result<Self> {
        let bpe = match encoding {
            EncodingName::Cl100kBase => tiktoken_rs::cl100k_base()?,
            EncodingName::O200kBase => tiktoken_rs::o200k_base()?,
            EncodingName::P50kBase => tiktoken_rs::p50k_base()?,
            EncodingName::R50kBase => tiktoken_rs::r50k_base()?,
        };
        Ok(Self { bpe })
    }
}

impl Encoder for TiktokenEncoder {
    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.bpe.encode_ordinary(text).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiktoken_counts_basic_text() {
        let encoder = TiktokenEncoder::new(EncodingName::Cl100kBase).unwrap();
        assert_eq!(encoder.count_tokens("").unwrap(), 0);
        assert_eq!(encoder.count_tokens("hello world").unwrap(), 2);
    }

    #[test]
    fn test_all_encodings_load() {
        for encoding in [
            EncodingName::Cl100kBase,
            EncodingName::O200kBase,
            EncodingName::P50kBase,
            EncodingName::R50kBase,
        ] {
            let encoder = TiktokenEncoder::new(encoding).unwrap();
            assert!(encoder.count_tokens("Hello, world!").unwrap() > 0, "{}", encoding);
        }
    }

    #[test]
    fn test_encoding_name_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Holder {
            encoding: EncodingName,
        }
        let holder: Holder = toml::from_str("encoding = \"o200k_base\"").unwrap();
        assert_eq!(holder.encoding, EncodingName::O200kBase);
    }
}
