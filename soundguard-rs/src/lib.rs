//! soundguard Rust core library
//!
//! Turns a short mono audio clip into a caption with an encoder/decoder
//! model pair, then ranks a fixed catalog of sound categories against the
//! caption's text embedding.
//!
//! The neural network calls are opaque and live behind [`InferenceBackend`].
//! Everything between them is implemented here: temporal alignment of the
//! encoder output, the greedy decode loop, two subword tokenizers, embedding
//! normalization and top-K cosine matching.

use thiserror::Error;

pub mod align;
pub mod audio;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod decode;
pub mod matcher;
pub mod normalize;
pub mod pipeline;
pub mod tokenizer;
pub mod vocab;

pub use align::{AlignedContext, TemporalAligner, TimeFeatureMatrix};
pub use backend::{DecoderStep, DummyBackend, InferenceBackend};
pub use catalog::{Catalog, CategoryEntry};
pub use config::{DecoderConvention, PipelineConfig, TextTokenizerKind};
pub use decode::{AutoregressiveDecoder, DecodingSession, Generation, StopReason};
pub use matcher::{CategoryMatch, CategoryMatcher, MatchResult};
pub use normalize::{Embedding, EmbeddingKind};
pub use pipeline::{ClipReport, Pipeline, PipelineOutput};
pub use tokenizer::{
    ByteLevelTokenizer, CaptionTokenizer, Encoding, SubwordTokenizer, TextTokenizer,
    WordPieceTokenizer,
};
pub use vocab::{SpecialTokens, VocabFamily, Vocabulary};

#[cfg(feature = "onnx")]
pub use backend::ort_backend::OrtBackend;
#[cfg(feature = "tract")]
pub use backend::tract_backend::TractBackend;

#[derive(Debug, Error)]
pub enum SoundGuardError {
    /// Malformed vocabulary or catalog data.
    #[error("Load error: {0}")]
    Load(String),
    /// Encoder produced fewer time steps than the decoder requires.
    #[error("Encoder output has {time_steps} time steps, decoder requires at least {target}")]
    AlignmentPrecondition { time_steps: usize, target: usize },
    /// External encoder/decoder/embedding call failed or returned a malformed shape.
    #[error("Inference failed: {0}")]
    Inference(String),
    /// Audio container could not be decoded (CLI collaborator only).
    #[error("Audio decode error: {0}")]
    AudioDecode(String),
    #[error("Invalid argument: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SoundGuardError>;
