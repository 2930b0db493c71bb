use lazy_static::lazy_static;
use regex::Regex;
use tokenizers::NormalizedString;

use super::{check_max_len, SubwordTokenizer};
use crate::vocab::{VocabFamily, Vocabulary};
use crate::{Result, SoundGuardError};

const CONTINUATION_PREFIX: &str = "##";

lazy_static! {
    static ref PUNCTUATION: Regex = Regex::new(r"([.,!?;:])").unwrap();
}

/// Greedy longest-match-first WordPiece tokenizer (BERT family).
#[derive(Debug, Clone)]
pub struct WordPieceTokenizer {
    vocab: Vocabulary,
    max_len: usize,
}

impl WordPieceTokenizer {
    pub fn new(vocab: Vocabulary, max_len: usize) -> Result<Self> {
        if vocab.family() != VocabFamily::WordPiece {
            return Err(SoundGuardError::Invalid(format!(
                "WordPiece tokenizer needs a WordPiece vocabulary, got {:?}",
                vocab.family()
            )));
        }
        check_max_len(max_len)?;
        Ok(Self { vocab, max_len })
    }

    /// Lowercase, NFD-normalize and pad punctuation with spaces.
    fn clean(text: &str) -> String {
        let mut normalized = NormalizedString::from(text);
        normalized.lowercase().nfd();
        PUNCTUATION.replace_all(normalized.get(), " $1 ").into_owned()
    }

    /// Pieces for one whitespace-free word, or `None` when some offset has
    /// no match at all.
    fn split_word(&self, word: &str) -> Option<Vec<String>> {
        let chars: Vec<char> = word.chars().collect();
        let mut pieces = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let mut end = chars.len();
            let mut matched = None;
            while start < end {
                let substr: String = chars[start..end].iter().collect();
                let candidate = if start > 0 {
                    format!("{CONTINUATION_PREFIX}{substr}")
                } else {
                    substr
                };
                if self.vocab.contains(&candidate) {
                    matched = Some(candidate);
                    break;
                }
                end -= 1;
            }
            pieces.push(matched?);
            start = end;
        }
        Some(pieces)
    }
}

impl SubwordTokenizer for WordPieceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let cleaned = Self::clean(text);
        let mut out = Vec::new();
        for word in cleaned.split_whitespace() {
            match self.split_word(word) {
                Some(pieces) => out.extend(pieces),
                None => out.push(self.vocab.unk_token().to_string()),
            }
        }
        out
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn emits_type_ids(&self) -> bool {
        true
    }
}
