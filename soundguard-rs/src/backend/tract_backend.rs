//! Pure-Rust ONNX backend on tract (feature `tract`).

use std::path::Path;

use ndarray::Array2;
use tracing::{debug, info};
use tract_onnx::prelude::*;

use super::{files, DecoderStep, InferenceBackend};
use crate::align::{AlignedContext, TimeFeatureMatrix};
use crate::tokenizer::Encoding;
use crate::{Result, SoundGuardError};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

pub struct TractBackend {
    encoder: Plan,
    decoder: Plan,
    embedding: Plan,
    name: String,
}

fn load_plan(path: &Path) -> Result<Plan> {
    info!(model = %path.display(), "loading ONNX model with tract");
    let load = |e: TractError| SoundGuardError::Load(format!("{}: {e}", path.display()));
    tract_onnx::onnx()
        .model_for_path(path)
        .map_err(load)?
        .into_optimized()
        .map_err(load)?
        .into_runnable()
        .map_err(load)
}

fn i64_input(values: &[u32]) -> Result<TValue> {
    let data: Vec<i64> = values.iter().map(|&v| i64::from(v)).collect();
    let arr = tract_ndarray::Array2::from_shape_vec((1, values.len()), data)
        .map_err(|e| SoundGuardError::Inference(e.to_string()))?;
    Ok(Tensor::from(arr).into())
}

fn first_output(outputs: &TVec<TValue>, what: &str) -> Result<(Vec<usize>, Vec<f32>)> {
    let value = outputs
        .first()
        .ok_or_else(|| SoundGuardError::Inference(format!("{what}: no outputs")))?;
    let view = value
        .to_array_view::<f32>()
        .map_err(|e| SoundGuardError::Inference(format!("{what} output: {e}")))?;
    Ok((view.shape().to_vec(), view.iter().copied().collect()))
}

fn to_matrix(dims: &[usize], data: Vec<f32>, what: &str) -> Result<Array2<f32>> {
    let (rows, cols) = match dims {
        [rows, cols] | [1, rows, cols] => (*rows, *cols),
        _ => {
            return Err(SoundGuardError::Inference(format!(
                "{what}: unexpected output shape {dims:?}"
            )))
        }
    };
    Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| SoundGuardError::Inference(format!("{what}: {e}")))
}

impl TractBackend {
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let (encoder, decoder, embedding) = files::resolve(dir.as_ref())?;
        Self::from_paths(&encoder, &decoder, &embedding)
    }

    pub fn from_paths(encoder: &Path, decoder: &Path, embedding: &Path) -> Result<Self> {
        Ok(Self {
            encoder: load_plan(encoder)?,
            decoder: load_plan(decoder)?,
            embedding: load_plan(embedding)?,
            name: "tract".into(),
        })
    }
}

impl InferenceBackend for TractBackend {
    fn run_encoder(&self, audio: &[f32]) -> Result<TimeFeatureMatrix> {
        let arr = tract_ndarray::Array2::from_shape_vec((1, audio.len()), audio.to_vec())
            .map_err(|e| SoundGuardError::Inference(e.to_string()))?;
        let outputs = self
            .encoder
            .run(tvec!(Tensor::from(arr).into()))
            .map_err(|e| SoundGuardError::Inference(format!("encoder: {e}")))?;
        let (dims, data) = first_output(&outputs, "encoder")?;
        let features = to_matrix(&dims, data, "encoder")?;
        debug!(time_steps = features.nrows(), width = features.ncols(), "encoder done");
        Ok(features)
    }

    fn run_decoder_step(
        &self,
        input: DecoderStep<'_>,
        context: &AlignedContext,
    ) -> Result<Array2<f32>> {
        let (t, f) = context.features.dim();
        let attn = tract_ndarray::Array3::from_shape_vec(
            (1, t, f),
            context.features.iter().copied().collect(),
        )
        .map_err(|e| SoundGuardError::Inference(e.to_string()))?;
        // Exported decoders take the index of the last valid frame.
        let attn_len = tract_ndarray::arr1(&[context.valid_length.saturating_sub(1) as i64]);

        let outputs = self
            .decoder
            .run(tvec!(
                i64_input(input.tokens)?,
                Tensor::from(attn).into(),
                Tensor::from(attn_len).into()
            ))
            .map_err(|e| SoundGuardError::Inference(format!("decoder step {}: {e}", input.step)))?;
        let (dims, data) = first_output(&outputs, "decoder")?;
        to_matrix(&dims, data, "decoder")
    }

    fn run_embedding_model(&self, encoding: &Encoding) -> Result<Vec<f32>> {
        let mut inputs = tvec!(
            i64_input(&encoding.ids)?,
            i64_input(&encoding.attention_mask)?
        );
        if let Some(type_ids) = &encoding.type_ids {
            inputs.push(i64_input(type_ids)?);
        }
        let outputs = self
            .embedding
            .run(inputs)
            .map_err(|e| SoundGuardError::Inference(format!("embedding: {e}")))?;
        let (_, data) = first_output(&outputs, "embedding")?;
        if data.is_empty() {
            return Err(SoundGuardError::Inference("embedding output is empty".into()));
        }
        Ok(data)
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_from_output_dims() {
        let m = to_matrix(&[1, 2, 2], vec![1.0, 2.0, 3.0, 4.0], "t").expect("matrix");
        assert_eq!(m[[1, 0]], 3.0);
        assert!(to_matrix(&[4], vec![0.0; 4], "t").is_err());
    }

    #[test]
    fn missing_model_dir_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            TractBackend::from_dir(dir.path()),
            Err(SoundGuardError::Load(_))
        ));
    }
}
