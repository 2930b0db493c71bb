//! Temporal alignment of encoder output to the decoder's context length.

use ndarray::{s, Array2, ArrayView2, Axis};
use tracing::debug;

use crate::config::DecoderConvention;
use crate::{Result, SoundGuardError};

/// Encoder output, shape `(time_steps, feature_width)`.
pub type TimeFeatureMatrix = Array2<f32>;

/// Decoder conditioning: aligned features plus their valid length.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedContext {
    pub features: Array2<f32>,
    pub valid_length: usize,
}

impl AlignedContext {
    pub fn time_steps(&self) -> usize {
        self.features.nrows()
    }

    pub fn feature_width(&self) -> usize {
        self.features.ncols()
    }
}

/// Block-average `features` down to exactly `target` rows.
///
/// With `factor = T / target`, output row `t` is the column mean of input
/// rows `t*factor .. t*factor + factor`; rows past `target * factor` are
/// dropped. `T == target` passes through. `T < target` is an error.
pub fn align(features: ArrayView2<'_, f32>, target: usize) -> Result<AlignedContext> {
    let (time_steps, width) = features.dim();
    if target == 0 || time_steps < target {
        return Err(SoundGuardError::AlignmentPrecondition { time_steps, target });
    }
    if time_steps == target {
        return Ok(AlignedContext {
            features: features.to_owned(),
            valid_length: target,
        });
    }

    let factor = time_steps / target;
    let mut out = Array2::<f32>::zeros((target, width));
    for (t, mut row) in out.axis_iter_mut(Axis(0)).enumerate() {
        let block = features.slice(s![t * factor..(t + 1) * factor, ..]);
        row.assign(&(block.sum_axis(Axis(0)) / factor as f32));
    }
    debug!(
        from = time_steps,
        to = target,
        factor,
        dropped = time_steps - target * factor,
        "downsampled encoder output"
    );

    Ok(AlignedContext {
        features: out,
        valid_length: target,
    })
}

/// Applies the alignment half of a [`DecoderConvention`].
#[derive(Debug, Clone, Copy)]
pub struct TemporalAligner {
    convention: DecoderConvention,
}

impl TemporalAligner {
    pub fn new(convention: DecoderConvention) -> Self {
        Self { convention }
    }

    pub fn align(&self, features: TimeFeatureMatrix) -> Result<AlignedContext> {
        match self.convention {
            DecoderConvention::FullSequence { aligned_length } => {
                align(features.view(), aligned_length)
            }
            DecoderConvention::Incremental => {
                let valid_length = features.nrows();
                if valid_length == 0 {
                    return Err(SoundGuardError::AlignmentPrecondition {
                        time_steps: 0,
                        target: 1,
                    });
                }
                Ok(AlignedContext {
                    features,
                    valid_length,
                })
            }
        }
    }
}
