//! Fixed sound-category catalog with pre-computed reference embeddings.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::normalize::{l2_norm, Embedding};
use crate::{Result, SoundGuardError};

const UNIT_TOLERANCE: f32 = 1e-3;

/// Immutable catalog row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryEntry {
    pub id: String,
    pub label: String,
    pub description: String,
    /// Text the reference embedding was computed from.
    pub text_embedded: String,
    pub embedding: Embedding,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    categories: Vec<CategoryRecord>,
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct CategoryRecord {
    id: String,
    label: String,
    description: String,
    #[serde(default)]
    text_embedded: String,
}

/// Loaded once at startup and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CategoryEntry>,
}

impl Catalog {
    /// Parse `{"categories": [...], "embeddings": [[...], ...]}`; the two
    /// arrays are parallel.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| SoundGuardError::Load(format!("parse category catalog: {e}")))?;
        if file.categories.len() != file.embeddings.len() {
            return Err(SoundGuardError::Load(format!(
                "catalog has {} categories but {} embeddings",
                file.categories.len(),
                file.embeddings.len()
            )));
        }

        let entries: Vec<CategoryEntry> = file
            .categories
            .into_iter()
            .zip(file.embeddings)
            .map(|(record, values)| {
                let norm = l2_norm(&values);
                if (norm - 1.0).abs() > UNIT_TOLERANCE {
                    warn!(id = %record.id, norm, "catalog embedding is not unit length");
                }
                CategoryEntry {
                    id: record.id,
                    label: record.label,
                    description: record.description,
                    text_embedded: record.text_embedded,
                    embedding: Embedding::prenormalized(values),
                }
            })
            .collect();

        info!(categories = entries.len(), "loaded category catalog");
        Ok(Self { entries })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let json = std::fs::read_to_string(path_ref).map_err(|e| {
            SoundGuardError::Load(format!("read {}: {e}", path_ref.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn from_entries(entries: Vec<CategoryEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CategoryEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&CategoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding width of the first entry.
    pub fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.len())
    }
}
