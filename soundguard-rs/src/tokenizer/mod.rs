//! Text ↔ token id conversion.
//!
//! Two encoding strategies share one trait: greedy longest-match WordPiece
//! and a simplified byte-level matcher. [`TextTokenizer`] picks one at load
//! time from the vocabulary family. Caption ids only need the decode
//! direction, which [`CaptionTokenizer`] provides.

mod byte_level;
mod caption;
mod wordpiece;

pub use byte_level::ByteLevelTokenizer;
pub use caption::CaptionTokenizer;
pub use wordpiece::WordPieceTokenizer;

use std::path::Path;

use serde::Serialize;

use crate::config::TextTokenizerKind;
use crate::vocab::{VocabFamily, Vocabulary};
use crate::{Result, SoundGuardError};

/// Default fixed sequence length for text tokenizers.
pub const DEFAULT_MAX_LEN: usize = 128;

/// Fixed-length model input produced by [`SubwordTokenizer::encode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Encoding {
    /// `[BOS, content.., terminator, PAD..]`, always `max_len` long.
    pub ids: Vec<u32>,
    /// 1 for real tokens (BOS and terminator included), 0 for padding.
    pub attention_mask: Vec<u32>,
    /// Segment ids (all 0), only for families that take them.
    pub type_ids: Option<Vec<u32>>,
}

impl Encoding {
    /// Number of real (unpadded) tokens.
    pub fn real_len(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Strategy interface implemented by every text tokenizer.
pub trait SubwordTokenizer {
    /// Subword pieces for `text`, before special tokens and truncation.
    fn tokenize(&self, text: &str) -> Vec<String>;
    fn vocabulary(&self) -> &Vocabulary;
    fn max_len(&self) -> usize;
    /// Whether the downstream model takes a token-type sequence.
    fn emits_type_ids(&self) -> bool {
        false
    }

    /// Deterministic, pure function of `text` and the loaded table.
    fn encode(&self, text: &str) -> Encoding {
        let pieces = self.tokenize(text);
        build_encoding(self.vocabulary(), &pieces, self.max_len(), self.emits_type_ids())
    }

    fn decode(&self, ids: &[u32]) -> String {
        self.vocabulary().decode(ids)
    }
}

fn check_max_len(max_len: usize) -> Result<()> {
    if max_len < 2 {
        return Err(SoundGuardError::Invalid(format!(
            "max_len must leave room for BOS and terminator, got {max_len}"
        )));
    }
    Ok(())
}

/// Wrap `pieces` in BOS/terminator, truncate and right-pad to `max_len`.
///
/// Content stops once adding one more piece would leave no room for the
/// terminator. Pieces missing from the table map to UNK.
pub(crate) fn build_encoding(
    vocab: &Vocabulary,
    pieces: &[String],
    max_len: usize,
    with_type_ids: bool,
) -> Encoding {
    let specials = vocab.specials();
    let mut ids = Vec::with_capacity(max_len);
    ids.push(specials.bos);
    for piece in pieces {
        if ids.len() >= max_len - 1 {
            break;
        }
        ids.push(vocab.id_of(piece).unwrap_or(specials.unk));
    }
    ids.push(specials.eos);

    let real = ids.len();
    let attention_mask = (0..max_len).map(|i| u32::from(i < real)).collect();
    ids.resize(max_len, specials.pad);

    Encoding {
        ids,
        attention_mask,
        type_ids: with_type_ids.then(|| vec![0; max_len]),
    }
}

/// Text tokenizer selected by which vocabulary family was loaded.
#[derive(Debug, Clone)]
pub enum TextTokenizer {
    WordPiece(WordPieceTokenizer),
    ByteLevel(ByteLevelTokenizer),
}

impl TextTokenizer {
    pub fn from_vocabulary(vocab: Vocabulary, max_len: usize) -> Result<Self> {
        match vocab.family() {
            VocabFamily::WordPiece => Ok(Self::WordPiece(WordPieceTokenizer::new(vocab, max_len)?)),
            VocabFamily::ByteLevel => Ok(Self::ByteLevel(ByteLevelTokenizer::new(vocab, max_len)?)),
            VocabFamily::Caption => Err(SoundGuardError::Invalid(
                "caption vocabulary cannot be used to encode text".into(),
            )),
        }
    }

    pub fn from_path(path: impl AsRef<Path>, kind: TextTokenizerKind, max_len: usize) -> Result<Self> {
        let vocab = Vocabulary::from_path(path, kind.family())?;
        Self::from_vocabulary(vocab, max_len)
    }

    fn inner(&self) -> &dyn SubwordTokenizer {
        match self {
            Self::WordPiece(t) => t,
            Self::ByteLevel(t) => t,
        }
    }
}

impl SubwordTokenizer for TextTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        self.inner().tokenize(text)
    }
    fn vocabulary(&self) -> &Vocabulary {
        self.inner().vocabulary()
    }
    fn max_len(&self) -> usize {
        self.inner().max_len()
    }
    fn emits_type_ids(&self) -> bool {
        self.inner().emits_type_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn byte_level_vocab() -> Vocabulary {
        let table: HashMap<String, u32> = [
            ("<s>", 0),
            ("<pad>", 1),
            ("</s>", 2),
            ("<unk>", 3),
            ("Ġdog", 4),
            ("Ġbarks", 5),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Vocabulary::from_table(table, VocabFamily::ByteLevel).expect("vocab")
    }

    #[test]
    fn encoding_is_padded_to_max_len() {
        let tok = TextTokenizer::from_vocabulary(byte_level_vocab(), 8).expect("tokenizer");
        let enc = tok.encode("Dog barks");
        assert_eq!(enc.ids, vec![0, 4, 5, 2, 1, 1, 1, 1]);
        assert_eq!(enc.attention_mask, vec![1, 1, 1, 1, 0, 0, 0, 0]);
        assert_eq!(enc.type_ids, None);
        assert_eq!(enc.real_len(), 4);
    }

    #[test]
    fn truncation_keeps_room_for_terminator() {
        let tok = TextTokenizer::from_vocabulary(byte_level_vocab(), 4).expect("tokenizer");
        let enc = tok.encode("dog barks dog barks dog");
        assert_eq!(enc.ids, vec![0, 4, 5, 2]);
        assert_eq!(enc.attention_mask, vec![1, 1, 1, 1]);
    }

    #[test]
    fn default_length_is_bounded() {
        let tok = TextTokenizer::from_vocabulary(byte_level_vocab(), DEFAULT_MAX_LEN)
            .expect("tokenizer");
        let text = "dog ".repeat(500);
        let enc = tok.encode(&text);
        assert_eq!(enc.len(), DEFAULT_MAX_LEN);
        assert_eq!(enc.ids[0], 0);
        assert_eq!(enc.ids[DEFAULT_MAX_LEN - 1], 2);
        assert_eq!(enc.real_len(), DEFAULT_MAX_LEN);
    }

    #[test]
    fn empty_text_is_bos_and_terminator() {
        let tok = TextTokenizer::from_vocabulary(byte_level_vocab(), 6).expect("tokenizer");
        let enc = tok.encode("   ");
        assert_eq!(enc.ids, vec![0, 2, 1, 1, 1, 1]);
        assert_eq!(enc.real_len(), 2);
    }

    #[test]
    fn rejects_unusable_max_len_and_caption_family() {
        assert!(TextTokenizer::from_vocabulary(byte_level_vocab(), 1).is_err());

        let table: HashMap<String, u32> = [("a".to_string(), 4)].into_iter().collect();
        let caption = Vocabulary::from_table(table, VocabFamily::Caption).expect("vocab");
        assert!(matches!(
            TextTokenizer::from_vocabulary(caption, 8),
            Err(SoundGuardError::Invalid(_))
        ));
    }

    #[test]
    fn round_trip_is_lossy_but_non_empty() {
        let tok = TextTokenizer::from_vocabulary(byte_level_vocab(), 16).expect("tokenizer");
        let enc = tok.encode("the dog barks!");
        let text = tok.decode(&enc.ids);
        assert_eq!(text, "Ġdog Ġbarks");
    }
}
