//! Inference engine seam.
//!
//! The three neural network calls are opaque to the rest of the crate.
//! Backends own their model handles and release them on drop.

mod dummy;
#[cfg(feature = "onnx")]
pub mod ort_backend;
#[cfg(feature = "tract")]
pub mod tract_backend;

pub use dummy::DummyBackend;

use ndarray::Array2;

use crate::align::{AlignedContext, TimeFeatureMatrix};
use crate::tokenizer::Encoding;
use crate::Result;

/// Input for one decoder step.
#[derive(Debug, Clone, Copy)]
pub struct DecoderStep<'a> {
    /// Full sequence so far, or just the latest token, per the configured convention.
    pub tokens: &'a [u32],
    /// Zero-based step index within the session.
    pub step: usize,
}

/// Trait abstraction for an inference engine.
///
/// Calls are blocking. Implementations shared across threads must serialize
/// calls on any model instance that is not safe to run concurrently.
pub trait InferenceBackend: Send + Sync {
    /// Mono PCM clip in `[-1, 1]` → `(time_steps, feature_width)` features.
    fn run_encoder(&self, audio: &[f32]) -> Result<TimeFeatureMatrix>;

    /// Per-position logits, shape `(positions, vocab_size)`; only the last
    /// row is read.
    fn run_decoder_step(
        &self,
        input: DecoderStep<'_>,
        context: &AlignedContext,
    ) -> Result<Array2<f32>>;

    /// Raw (unnormalized) sentence embedding for one encoded text.
    fn run_embedding_model(&self, encoding: &Encoding) -> Result<Vec<f32>>;

    fn model_name(&self) -> &str;
}

impl InferenceBackend for Box<dyn InferenceBackend> {
    fn run_encoder(&self, audio: &[f32]) -> Result<TimeFeatureMatrix> {
        (**self).run_encoder(audio)
    }
    fn run_decoder_step(
        &self,
        input: DecoderStep<'_>,
        context: &AlignedContext,
    ) -> Result<Array2<f32>> {
        (**self).run_decoder_step(input, context)
    }
    fn run_embedding_model(&self, encoding: &Encoding) -> Result<Vec<f32>> {
        (**self).run_embedding_model(encoding)
    }
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Model files expected in a backend model directory.
#[cfg(any(feature = "onnx", feature = "tract"))]
pub(crate) mod files {
    use std::path::{Path, PathBuf};

    pub const ENCODER: &str = "encoder.onnx";
    pub const DECODER: &str = "decoder.onnx";
    pub const EMBEDDING: &str = "embedding.onnx";

    pub fn resolve(dir: &Path) -> crate::Result<(PathBuf, PathBuf, PathBuf)> {
        let paths = [ENCODER, DECODER, EMBEDDING].map(|name| dir.join(name));
        for p in &paths {
            if !p.is_file() {
                return Err(crate::SoundGuardError::Load(format!(
                    "model file missing: {}",
                    p.display()
                )));
            }
        }
        let [encoder, decoder, embedding] = paths;
        Ok((encoder, decoder, embedding))
    }
}
