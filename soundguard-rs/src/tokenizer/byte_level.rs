use lazy_static::lazy_static;
use regex::Regex;

use super::{check_max_len, SubwordTokenizer};
use crate::vocab::{VocabFamily, Vocabulary};
use crate::{Result, SoundGuardError};

/// GPT-2 byte-level encoding of a leading space.
const WORD_BOUNDARY: char = '\u{0120}';

lazy_static! {
    static ref WORD_SEPARATORS: Regex = Regex::new(r"[\s,.!?;:]+").unwrap();
}

/// Simplified byte-level matcher (RoBERTa family).
///
/// Whole words only, no merges: `Ġword`, then `word`, then whichever single
/// characters of the word exist in the table. Characters with no entry are
/// dropped rather than mapped to UNK.
#[derive(Debug, Clone)]
pub struct ByteLevelTokenizer {
    vocab: Vocabulary,
    max_len: usize,
}

impl ByteLevelTokenizer {
    pub fn new(vocab: Vocabulary, max_len: usize) -> Result<Self> {
        if vocab.family() != VocabFamily::ByteLevel {
            return Err(SoundGuardError::Invalid(format!(
                "byte-level tokenizer needs a byte-level vocabulary, got {:?}",
                vocab.family()
            )));
        }
        check_max_len(max_len)?;
        Ok(Self { vocab, max_len })
    }

    fn push_word(&self, word: &str, out: &mut Vec<String>) {
        let prefixed = format!("{WORD_BOUNDARY}{word}");
        if self.vocab.contains(&prefixed) {
            out.push(prefixed);
        } else if self.vocab.contains(word) {
            out.push(word.to_string());
        } else {
            out.extend(
                word.chars()
                    .map(String::from)
                    .filter(|c| self.vocab.contains(c)),
            );
        }
    }
}

impl SubwordTokenizer for ByteLevelTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let mut out = Vec::new();
        for word in WORD_SEPARATORS
            .split(lowered.trim())
            .filter(|w| !w.is_empty())
        {
            self.push_word(word, &mut out);
        }
        out
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    fn max_len(&self) -> usize {
        self.max_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn tokenizer() -> ByteLevelTokenizer {
        let table: HashMap<String, u32> = [
            ("<s>", 0),
            ("<pad>", 1),
            ("</s>", 2),
            ("<unk>", 3),
            ("Ġa", 4),
            ("Ġdog", 5),
            ("barking", 6),
            ("c", 7),
            ("t", 8),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let vocab = Vocabulary::from_table(table, VocabFamily::ByteLevel).expect("vocab");
        ByteLevelTokenizer::new(vocab, 16).expect("tokenizer")
    }

    #[test]
    fn prefers_boundary_marked_word() {
        assert_eq!(tokenizer().tokenize("A dog"), vec!["Ġa", "Ġdog"]);
    }

    #[test]
    fn falls_back_to_bare_word() {
        assert_eq!(tokenizer().tokenize("barking"), vec!["barking"]);
    }

    #[test]
    fn character_fallback_drops_unknown_characters() {
        // 'a' alone is not in the table (only "Ġa"), so "cat" keeps c and t.
        assert_eq!(tokenizer().tokenize("cat"), vec!["c", "t"]);
        assert!(tokenizer().tokenize("xyz").is_empty());
    }

    #[test]
    fn splits_on_punctuation_runs() {
        assert_eq!(
            tokenizer().tokenize("  Dog!!, barking;a  "),
            vec!["Ġdog", "barking", "Ġa"]
        );
    }

    #[test]
    fn encode_uses_roberta_specials() {
        let enc = tokenizer().encode("a dog");
        assert_eq!(&enc.ids[..4], &[0, 4, 5, 2]);
        assert!(enc.ids[4..].iter().all(|&id| id == 1));
        assert_eq!(enc.type_ids, None);
    }
}
