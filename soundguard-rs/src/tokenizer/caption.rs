use std::path::Path;

use crate::vocab::{SpecialTokens, VocabFamily, Vocabulary};
use crate::{Result, SoundGuardError};

/// Decode-only tokenizer for caption decoder output.
#[derive(Debug, Clone)]
pub struct CaptionTokenizer {
    vocab: Vocabulary,
}

impl CaptionTokenizer {
    pub fn new(vocab: Vocabulary) -> Result<Self> {
        if vocab.family() != VocabFamily::Caption {
            return Err(SoundGuardError::Invalid(format!(
                "caption tokenizer needs a caption vocabulary, got {:?}",
                vocab.family()
            )));
        }
        Ok(Self { vocab })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::new(Vocabulary::from_tokenizer_json(json, VocabFamily::Caption)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Vocabulary::from_path(path, VocabFamily::Caption)?)
    }

    pub fn specials(&self) -> SpecialTokens {
        self.vocab.specials()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    pub fn decode(&self, ids: &[u32]) -> String {
        self.vocab.decode(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_generated_sequence() {
        let json = r#"{"model": {"vocab": {
            "<pad>": 0, "<start>": 1, "<end>": 2, "<unk>": 3,
            "a": 4, "bell": 5, "rings": 6
        }}}"#;
        let tok = CaptionTokenizer::from_json_str(json).expect("tokenizer");
        assert_eq!(tok.specials().bos, 1);
        assert_eq!(tok.decode(&[1, 4, 5, 6, 2]), "a bell rings");
        // Step-limited output carries no EOS.
        assert_eq!(tok.decode(&[1, 4, 5, 5, 5]), "a bell bell bell");
    }
}
