//! Pipeline configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::tokenizer::DEFAULT_MAX_LEN;
use crate::vocab::VocabFamily;
use crate::{Result, SoundGuardError};

/// How the caption decoder is fed. Each variant fixes both the decoder
/// input convention and the alignment length, so the two never mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecoderConvention {
    /// Whole sequence so far on every step; encoder output block-averaged
    /// to `aligned_length` steps, which is also the valid length.
    FullSequence { aligned_length: usize },
    /// Only the latest token on every step; encoder output passed through
    /// at its native length, which is the valid length.
    Incremental,
}

impl Default for DecoderConvention {
    fn default() -> Self {
        Self::FullSequence { aligned_length: 16 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextTokenizerKind {
    WordPiece,
    #[default]
    ByteLevel,
}

impl TextTokenizerKind {
    pub fn family(self) -> VocabFamily {
        match self {
            Self::WordPiece => VocabFamily::WordPiece,
            Self::ByteLevel => VocabFamily::ByteLevel,
        }
    }
}

impl std::str::FromStr for TextTokenizerKind {
    type Err = SoundGuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "word_piece" | "wordpiece" | "bert" => Ok(Self::WordPiece),
            "byte_level" | "bytelevel" | "bpe" | "roberta" => Ok(Self::ByteLevel),
            other => Err(SoundGuardError::Invalid(format!(
                "unknown text tokenizer {other:?} (expected word-piece or byte-level)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub top_k: usize,
    /// Decoder step budget per caption.
    pub max_steps: usize,
    /// Fixed length of text tokenizer output.
    pub max_text_len: usize,
    /// Embedding width; longer model outputs are truncated to it.
    pub embedding_dim: usize,
    pub sample_rate: u32,
    /// Exact clip length handed to the encoder.
    pub clip_samples: usize,
    pub convention: DecoderConvention,
    pub text_tokenizer: TextTokenizerKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            max_steps: 30,
            max_text_len: DEFAULT_MAX_LEN,
            embedding_dim: 384,
            sample_rate: 16_000,
            clip_samples: 80_000,
            convention: DecoderConvention::default(),
            text_tokenizer: TextTokenizerKind::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(SoundGuardError::Invalid(msg.to_string()));
        if self.top_k == 0 {
            return fail("top_k must be > 0");
        }
        if self.max_text_len < 2 {
            return fail("max_text_len must be >= 2");
        }
        if self.embedding_dim == 0 {
            return fail("embedding_dim must be > 0");
        }
        if self.sample_rate == 0 {
            return fail("sample_rate must be > 0");
        }
        if self.clip_samples == 0 {
            return fail("clip_samples must be > 0");
        }
        if let DecoderConvention::FullSequence { aligned_length: 0 } = self.convention {
            return fail("aligned_length must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployed_app() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.top_k, 3);
        assert_eq!(cfg.max_steps, 30);
        assert_eq!(cfg.max_text_len, 128);
        assert_eq!(cfg.embedding_dim, 384);
        assert_eq!(cfg.clip_samples, 80_000);
        assert_eq!(
            cfg.convention,
            DecoderConvention::FullSequence { aligned_length: 16 }
        );
        assert_eq!(cfg.text_tokenizer, TextTokenizerKind::ByteLevel);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = PipelineConfig::from_json_str(
            r#"{"max_steps": 80, "convention": {"kind": "incremental"}}"#,
        )
        .expect("config");
        assert_eq!(cfg.max_steps, 80);
        assert_eq!(cfg.convention, DecoderConvention::Incremental);
        assert_eq!(cfg.top_k, 3);
    }

    #[test]
    fn serde_uses_snake_case_tags() {
        let value = serde_json::to_value(PipelineConfig::default()).expect("json");
        assert_eq!(value["convention"]["kind"], "full_sequence");
        assert_eq!(value["convention"]["aligned_length"], 16);
        assert_eq!(value["text_tokenizer"], "byte_level");
    }

    #[test]
    fn validation_rejects_degenerate_values() {
        for json in [
            r#"{"top_k": 0}"#,
            r#"{"max_text_len": 1}"#,
            r#"{"embedding_dim": 0}"#,
            r#"{"clip_samples": 0}"#,
            r#"{"convention": {"kind": "full_sequence", "aligned_length": 0}}"#,
        ] {
            assert!(
                matches!(PipelineConfig::from_json_str(json), Err(SoundGuardError::Invalid(_))),
                "{json} should be rejected"
            );
        }
    }

    #[test]
    fn tokenizer_kind_parses_cli_spellings() {
        assert_eq!("word-piece".parse::<TextTokenizerKind>().unwrap(), TextTokenizerKind::WordPiece);
        assert_eq!("BYTE-LEVEL".parse::<TextTokenizerKind>().unwrap(), TextTokenizerKind::ByteLevel);
        assert!("sentencepiece".parse::<TextTokenizerKind>().is_err());
    }
}
