//! ONNX Runtime backend (feature `onnx`).
//!
//! Loads `encoder.onnx`, `decoder.onnx` and `embedding.onnx` from one model
//! directory. Each session sits behind its own mutex since `Session::run`
//! takes `&mut self`.

use std::path::Path;

use ndarray::Array2;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{files, DecoderStep, InferenceBackend};
use crate::align::{AlignedContext, TimeFeatureMatrix};
use crate::tokenizer::Encoding;
use crate::{Result, SoundGuardError};

pub struct OrtBackend {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    embedding: Mutex<Session>,
    name: String,
}

fn load_session(path: &Path, intra_threads: usize) -> Result<Session> {
    info!(model = %path.display(), "loading ONNX model");
    Session::builder()
        .map_err(|e| SoundGuardError::Load(format!("session builder: {e}")))?
        .with_intra_threads(intra_threads)
        .map_err(|e| SoundGuardError::Load(format!("thread config: {e}")))?
        .commit_from_file(path)
        .map_err(|e| SoundGuardError::Load(format!("model load {}: {e}", path.display())))
}

fn f32_tensor(shape: Vec<i64>, data: Vec<f32>, what: &str) -> Result<Tensor<f32>> {
    Tensor::from_array((shape, data))
        .map_err(|e| SoundGuardError::Inference(format!("{what} tensor: {e}")))
}

fn i64_tensor(shape: Vec<i64>, data: Vec<i64>, what: &str) -> Result<Tensor<i64>> {
    Tensor::from_array((shape, data))
        .map_err(|e| SoundGuardError::Inference(format!("{what} tensor: {e}")))
}

/// Collapse leading unit dimensions so `(1, T, F)` and `(T, F)` both become
/// a `(T, F)` matrix.
fn to_matrix(shape: &[i64], data: &[f32], what: &str) -> Result<Array2<f32>> {
    let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    let (rows, cols) = match dims.as_slice() {
        [rows, cols] => (*rows, *cols),
        [1, rows, cols] => (*rows, *cols),
        _ => {
            return Err(SoundGuardError::Inference(format!(
                "{what}: unexpected output shape {dims:?}"
            )))
        }
    };
    Array2::from_shape_vec((rows, cols), data.to_vec())
        .map_err(|e| SoundGuardError::Inference(format!("{what}: {e}")))
}

fn as_i64(values: &[u32]) -> Vec<i64> {
    values.iter().map(|&v| i64::from(v)).collect()
}

impl OrtBackend {
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let (encoder, decoder, embedding) = files::resolve(dir.as_ref())?;
        Self::from_paths(&encoder, &decoder, &embedding)
    }

    pub fn from_paths(encoder: &Path, decoder: &Path, embedding: &Path) -> Result<Self> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get().min(4))
            .unwrap_or(2);
        Ok(Self {
            encoder: Mutex::new(load_session(encoder, threads)?),
            decoder: Mutex::new(load_session(decoder, threads)?),
            embedding: Mutex::new(load_session(embedding, threads)?),
            name: "onnxruntime".into(),
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn run_encoder(&self, audio: &[f32]) -> Result<TimeFeatureMatrix> {
        let input = f32_tensor(vec![1, audio.len() as i64], audio.to_vec(), "audio")?;
        let mut session = self.encoder.lock();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| SoundGuardError::Inference(format!("encoder: {e}")))?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| SoundGuardError::Inference(format!("encoder output: {e}")))?;
        let features = to_matrix(shape, data, "encoder")?;
        debug!(time_steps = features.nrows(), width = features.ncols(), "encoder done");
        Ok(features)
    }

    fn run_decoder_step(
        &self,
        input: DecoderStep<'_>,
        context: &AlignedContext,
    ) -> Result<Array2<f32>> {
        let (t, f) = context.features.dim();
        let words = i64_tensor(
            vec![1, input.tokens.len() as i64],
            as_i64(input.tokens),
            "word_ids",
        )?;
        let attn = f32_tensor(
            vec![1, t as i64, f as i64],
            context.features.iter().copied().collect(),
            "attn_emb",
        )?;
        // Exported decoders take the index of the last valid frame.
        let attn_len = i64_tensor(
            vec![1],
            vec![context.valid_length.saturating_sub(1) as i64],
            "attn_emb_len",
        )?;

        let mut session = self.decoder.lock();
        let outputs = session
            .run(ort::inputs![words, attn, attn_len])
            .map_err(|e| SoundGuardError::Inference(format!("decoder step {}: {e}", input.step)))?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| SoundGuardError::Inference(format!("decoder output: {e}")))?;
        to_matrix(shape, data, "decoder")
    }

    fn run_embedding_model(&self, encoding: &Encoding) -> Result<Vec<f32>> {
        let shape = vec![1, encoding.len() as i64];
        let ids = i64_tensor(shape.clone(), as_i64(&encoding.ids), "input_ids")?;
        let mask = i64_tensor(shape.clone(), as_i64(&encoding.attention_mask), "attention_mask")?;

        let mut session = self.embedding.lock();
        let outputs = match &encoding.type_ids {
            Some(type_ids) => {
                let types = i64_tensor(shape, as_i64(type_ids), "token_type_ids")?;
                session.run(ort::inputs![ids, mask, types])
            }
            None => session.run(ort::inputs![ids, mask]),
        }
        .map_err(|e| SoundGuardError::Inference(format!("embedding: {e}")))?;
        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| SoundGuardError::Inference(format!("embedding output: {e}")))?;
        if data.is_empty() {
            return Err(SoundGuardError::Inference("embedding output is empty".into()));
        }
        Ok(data.to_vec())
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
