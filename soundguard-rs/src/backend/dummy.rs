use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{DecoderStep, InferenceBackend};
use crate::align::{AlignedContext, TimeFeatureMatrix};
use crate::audio::{log_mel_spectrogram, MelParams};
use crate::tokenizer::Encoding;
use crate::{Result, SoundGuardError};

/// First id the dummy decoder may emit; lower ids are caption specials.
const FIRST_CONTENT_ID: usize = 4;

/// Deterministic backend that needs no model files.
///
/// Encoder: log-mel frames of the clip. Decoder: a token walk seeded by the
/// aligned context, ending in EOS after a context-dependent length.
/// Embedding: sum of seeded random projections of the real token ids.
#[derive(Debug, Clone)]
pub struct DummyBackend {
    vocab_size: usize,
    eos: u32,
    embedding_dim: usize,
    sample_rate: u32,
    mel: MelParams,
    name: String,
}

impl DummyBackend {
    pub fn new(vocab_size: usize, eos: u32, embedding_dim: usize, sample_rate: u32) -> Result<Self> {
        if vocab_size <= FIRST_CONTENT_ID {
            return Err(SoundGuardError::Invalid(format!(
                "dummy backend needs more than {FIRST_CONTENT_ID} caption tokens, got {vocab_size}"
            )));
        }
        if embedding_dim == 0 {
            return Err(SoundGuardError::Invalid("embedding_dim must be > 0".into()));
        }
        Ok(Self {
            vocab_size,
            eos,
            embedding_dim,
            sample_rate,
            mel: MelParams::for_sample_rate(sample_rate),
            name: "dummy".into(),
        })
    }

    fn context_seed(context: &AlignedContext) -> u64 {
        let energy: f32 = context.features.iter().map(|v| v.abs()).sum();
        (energy * 1000.0) as u64 ^ context.valid_length as u64
    }
}

impl InferenceBackend for DummyBackend {
    fn run_encoder(&self, audio: &[f32]) -> Result<TimeFeatureMatrix> {
        let mel = log_mel_spectrogram(audio, self.sample_rate, self.mel);
        if mel.nrows() == 0 {
            return Err(SoundGuardError::Inference(format!(
                "clip of {} samples is shorter than one {}-sample window",
                audio.len(),
                self.mel.n_fft
            )));
        }
        Ok(mel)
    }

    fn run_decoder_step(
        &self,
        input: DecoderStep<'_>,
        context: &AlignedContext,
    ) -> Result<Array2<f32>> {
        if input.tokens.is_empty() {
            return Err(SoundGuardError::Inference("decoder input is empty".into()));
        }
        let seed = Self::context_seed(context);
        let caption_len = 3 + (seed % 5) as usize;
        let next = if input.step >= caption_len {
            self.eos as usize
        } else {
            let span = (self.vocab_size - FIRST_CONTENT_ID) as u64;
            FIRST_CONTENT_ID + (seed.wrapping_add(input.step as u64 * 7) % span) as usize
        };

        let mut logits = Array2::<f32>::zeros((1, self.vocab_size.max(next + 1)));
        logits[[0, next]] = 1.0;
        Ok(logits)
    }

    fn run_embedding_model(&self, encoding: &Encoding) -> Result<Vec<f32>> {
        let mut out = vec![0.0f32; self.embedding_dim];
        for (&id, &mask) in encoding.ids.iter().zip(&encoding.attention_mask) {
            if mask != 1 {
                continue;
            }
            let mut rng = StdRng::seed_from_u64(u64::from(id));
            for x in out.iter_mut() {
                *x += rng.gen_range(-1.0f32..1.0);
            }
        }
        Ok(out)
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
