//! Explicit pipeline context: caption a clip, embed the caption, rank the
//! catalog.
//!
//! A [`Pipeline`] is built once at startup and shared by reference. Every
//! request gets its own decoding session and aligned context, so clips can
//! be processed concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::align::TemporalAligner;
use crate::audio::{expand_audio_files, load_clip};
use crate::backend::InferenceBackend;
use crate::catalog::Catalog;
use crate::config::PipelineConfig;
use crate::decode::{AutoregressiveDecoder, Generation, StopReason};
use crate::matcher::{CategoryMatch, CategoryMatcher};
use crate::normalize::{normalize, Embedding};
use crate::tokenizer::{CaptionTokenizer, SubwordTokenizer, TextTokenizer};
use crate::Result;

/// Everything one successful request produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub caption: String,
    pub token_ids: Vec<u32>,
    pub stop_reason: StopReason,
    pub matches: Vec<CategoryMatch>,
}

/// One row of a batch run. Failed clips carry `error` and nothing else.
#[derive(Debug, Clone, Serialize)]
pub struct ClipReport {
    pub file: PathBuf,
    pub caption: Option<String>,
    pub token_ids: Vec<u32>,
    pub stop_reason: Option<StopReason>,
    pub matches: Vec<CategoryMatch>,
    pub model: String,
    pub error: Option<String>,
}

pub struct Pipeline<B: InferenceBackend> {
    backend: B,
    caption_tokenizer: CaptionTokenizer,
    text_tokenizer: TextTokenizer,
    matcher: CategoryMatcher,
    config: PipelineConfig,
}

impl<B: InferenceBackend> Pipeline<B> {
    pub fn new(
        backend: B,
        caption_tokenizer: CaptionTokenizer,
        text_tokenizer: TextTokenizer,
        catalog: Arc<Catalog>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        if let Some(dim) = catalog.dimension() {
            if dim != config.embedding_dim {
                warn!(
                    catalog = dim,
                    configured = config.embedding_dim,
                    "catalog width differs from embedding_dim, entries will score 0"
                );
            }
        }
        info!(
            backend = backend.model_name(),
            categories = catalog.len(),
            "pipeline ready"
        );
        Ok(Self {
            backend,
            caption_tokenizer,
            text_tokenizer,
            matcher: CategoryMatcher::new(catalog),
            config,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Encoder → alignment → greedy decode → caption text.
    pub fn caption(&self, audio: &[f32]) -> Result<(String, Generation)> {
        let features = self.backend.run_encoder(audio)?;
        let context = TemporalAligner::new(self.config.convention).align(features)?;
        let specials = self.caption_tokenizer.specials();
        let decoder = AutoregressiveDecoder::new(
            specials.bos,
            specials.eos,
            self.config.max_steps,
            self.config.convention,
        );
        let generation = decoder.generate(&self.backend, &context)?;
        let text = self.caption_tokenizer.decode(&generation.tokens);
        Ok((text, generation))
    }

    /// Unit-length embedding of `text`, truncated to `embedding_dim`.
    pub fn embed(&self, text: &str) -> Result<Embedding> {
        let encoding = self.text_tokenizer.encode(text);
        let raw = self.backend.run_embedding_model(&encoding)?;
        Ok(normalize(Embedding::raw(raw).truncated(self.config.embedding_dim)))
    }

    /// Top-`top_k` catalog entries for a caption.
    pub fn categorize(&self, caption: &str) -> Result<Vec<CategoryMatch>> {
        let query = self.embed(caption)?;
        Ok(self
            .matcher
            .find_top_matches(&query, self.config.top_k)
            .into_iter()
            .map(CategoryMatch::from)
            .collect())
    }

    /// Whole request. Any stage failure aborts it with no partial output.
    pub fn run(&self, audio: &[f32]) -> Result<PipelineOutput> {
        let (caption, generation) = self.caption(audio)?;
        let matches = self.categorize(&caption)?;
        Ok(PipelineOutput {
            caption,
            token_ids: generation.tokens,
            stop_reason: generation.stop,
            matches,
        })
    }

    pub fn infer_file(&self, file: &Path) -> Result<PipelineOutput> {
        let clip = load_clip(file, self.config.sample_rate, self.config.clip_samples)?;
        self.run(&clip)
    }

    /// Expand `paths` and run every clip in parallel. Per-clip failures are
    /// reported in their row instead of failing the batch.
    pub fn infer_paths(&self, paths: Vec<PathBuf>) -> Result<Vec<ClipReport>> {
        let files = expand_audio_files(paths)?;
        info!(files = files.len(), "running batch");
        Ok(files
            .into_par_iter()
            .map(|file| self.report(file))
            .collect())
    }

    fn report(&self, file: PathBuf) -> ClipReport {
        let model = self.backend.model_name().to_string();
        match self.infer_file(&file) {
            Ok(out) => ClipReport {
                file,
                caption: Some(out.caption),
                token_ids: out.token_ids,
                stop_reason: Some(out.stop_reason),
                matches: out.matches,
                model,
                error: None,
            },
            Err(e) => {
                warn!(file = %file.display(), error = %e, "clip failed");
                ClipReport {
                    file,
                    caption: None,
                    token_ids: Vec::new(),
                    stop_reason: None,
                    matches: Vec::new(),
                    model,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
