//! Embedding vectors and L2 normalization.

use serde::Serialize;

/// Norms at or below this are treated as zero and left untouched.
pub const MIN_NORM: f32 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingKind {
    Raw,
    Normalized,
}

/// Fixed-width float vector tagged with whether it has been normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embedding {
    values: Vec<f32>,
    kind: EmbeddingKind,
}

impl Embedding {
    pub fn raw(values: Vec<f32>) -> Self {
        Self {
            values,
            kind: EmbeddingKind::Raw,
        }
    }

    /// Wrap a vector that is already unit-length (e.g. a catalog reference).
    pub fn prenormalized(values: Vec<f32>) -> Self {
        Self {
            values,
            kind: EmbeddingKind::Normalized,
        }
    }

    pub fn kind(&self) -> EmbeddingKind {
        self.kind
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keep at most the first `dim` components.
    pub fn truncated(mut self, dim: usize) -> Self {
        self.values.truncate(dim);
        self
    }
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale to unit L2 norm. Vectors with norm <= [`MIN_NORM`] come back
/// unchanged (but tagged normalized), never divided by zero.
pub fn normalize(v: Embedding) -> Embedding {
    let mut values = v.values;
    let norm = l2_norm(&values);
    if norm > MIN_NORM {
        for x in values.iter_mut() {
            *x /= norm;
        }
    }
    Embedding {
        values,
        kind: EmbeddingKind::Normalized,
    }
}
