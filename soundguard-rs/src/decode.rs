//! Greedy autoregressive caption decoding.

use ndarray::Array2;
use serde::Serialize;
use tracing::debug;

use crate::align::AlignedContext;
use crate::backend::{DecoderStep, InferenceBackend};
use crate::config::DecoderConvention;
use crate::{Result, SoundGuardError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// EOS was generated (and kept in the sequence).
    EndOfSequence,
    /// The step budget ran out before EOS.
    StepLimit,
}

/// Mutable state of one caption generation.
#[derive(Debug, Clone)]
pub struct DecodingSession {
    tokens: Vec<u32>,
    eos: u32,
    step: usize,
    max_steps: usize,
    stop: Option<StopReason>,
}

impl DecodingSession {
    pub fn new(bos: u32, eos: u32, max_steps: usize) -> Self {
        let mut tokens = Vec::with_capacity(max_steps + 1);
        tokens.push(bos);
        Self {
            tokens,
            eos,
            step: 0,
            max_steps,
            stop: (max_steps == 0).then_some(StopReason::StepLimit),
        }
    }

    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn is_finished(&self) -> bool {
        self.stop.is_some()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// Slice handed to the decoder under `convention`.
    pub fn decoder_input(&self, convention: DecoderConvention) -> &[u32] {
        match convention {
            DecoderConvention::FullSequence { .. } => &self.tokens,
            DecoderConvention::Incremental => &self.tokens[self.tokens.len() - 1..],
        }
    }

    /// Append the chosen token and advance. No-op once finished.
    pub fn push(&mut self, next: u32) -> Option<StopReason> {
        if self.stop.is_some() {
            return self.stop;
        }
        self.tokens.push(next);
        self.step += 1;
        if next == self.eos {
            self.stop = Some(StopReason::EndOfSequence);
        } else if self.step >= self.max_steps {
            self.stop = Some(StopReason::StepLimit);
        }
        self.stop
    }

    fn finish(self) -> Generation {
        Generation {
            steps: self.step,
            stop: self.stop.unwrap_or(StopReason::StepLimit),
            tokens: self.tokens,
        }
    }
}

/// Result of one decode: `[BOS, .., EOS?]` plus why it stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generation {
    pub tokens: Vec<u32>,
    pub stop: StopReason,
    pub steps: usize,
}

/// Index of the largest logit in the last row. Ties go to the lowest id.
pub fn greedy_next_token(logits: &Array2<f32>) -> Result<u32> {
    let (positions, vocab_size) = logits.dim();
    if positions == 0 || vocab_size == 0 {
        return Err(SoundGuardError::Inference(format!(
            "decoder returned empty logits with shape ({positions}, {vocab_size})"
        )));
    }
    let last = logits.row(positions - 1);
    let mut best = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in last.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i;
        }
    }
    u32::try_from(best)
        .map_err(|_| SoundGuardError::Inference(format!("token id {best} does not fit in u32")))
}

#[derive(Debug, Clone, Copy)]
pub struct AutoregressiveDecoder {
    pub bos: u32,
    pub eos: u32,
    pub max_steps: usize,
    pub convention: DecoderConvention,
}

impl AutoregressiveDecoder {
    pub fn new(bos: u32, eos: u32, max_steps: usize, convention: DecoderConvention) -> Self {
        Self {
            bos,
            eos,
            max_steps,
            convention,
        }
    }

    /// Run the session to EOS or the step budget. Any failed or malformed
    /// decoder call abandons the whole session.
    pub fn generate<B>(&self, backend: &B, context: &AlignedContext) -> Result<Generation>
    where
        B: InferenceBackend + ?Sized,
    {
        let mut session = DecodingSession::new(self.bos, self.eos, self.max_steps);
        while !session.is_finished() {
            let input = DecoderStep {
                tokens: session.decoder_input(self.convention),
                step: session.step(),
            };
            let logits = backend.run_decoder_step(input, context)?;
            let next = greedy_next_token(&logits)?;
            session.push(next);
        }
        let generation = session.finish();
        debug!(
            steps = generation.steps,
            stop = ?generation.stop,
            tokens = ?generation.tokens,
            "caption decode finished"
        );
        Ok(generation)
    }
}
