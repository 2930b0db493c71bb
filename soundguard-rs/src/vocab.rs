//! Subword vocabularies loaded from HuggingFace `tokenizer.json` tables.
//!
//! A [`Vocabulary`] is built once and never mutated. Each vocabulary belongs
//! to exactly one [`VocabFamily`]; the family decides which special token
//! names are looked up and which ids are assumed when they are absent.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::{Result, SoundGuardError};

/// Tokenizer family a vocabulary was exported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocabFamily {
    /// Caption decoder vocabulary (decode only).
    Caption,
    /// BERT-style WordPiece vocabulary (`##` continuation pieces).
    WordPiece,
    /// RoBERTa/GPT-2 style byte-level vocabulary (`Ġ` word boundary).
    ByteLevel,
}

struct SpecialDefaults {
    pad: (&'static str, u32),
    bos: (&'static str, u32),
    eos: (&'static str, u32),
    unk: (&'static str, u32),
}

impl VocabFamily {
    fn defaults(self) -> SpecialDefaults {
        match self {
            Self::Caption => SpecialDefaults {
                pad: ("<pad>", 0),
                bos: ("<start>", 1),
                eos: ("<end>", 2),
                unk: ("<unk>", 3),
            },
            Self::WordPiece => SpecialDefaults {
                pad: ("[PAD]", 0),
                bos: ("[CLS]", 101),
                eos: ("[SEP]", 102),
                unk: ("[UNK]", 100),
            },
            Self::ByteLevel => SpecialDefaults {
                pad: ("<pad>", 1),
                bos: ("<s>", 0),
                eos: ("</s>", 2),
                unk: ("<unk>", 3),
            },
        }
    }
}

/// Special token ids. For WordPiece `bos` is `[CLS]` and `eos` is `[SEP]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub pad: u32,
    pub bos: u32,
    pub eos: u32,
    pub unk: u32,
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    family: VocabFamily,
    token_to_id: HashMap<String, u32>,
    id_to_token: HashMap<u32, String>,
    specials: SpecialTokens,
    unk_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenizerFile {
    model: Option<TokenizerModel>,
    #[serde(default)]
    added_tokens: Vec<AddedToken>,
}

#[derive(Debug, Deserialize)]
struct TokenizerModel {
    vocab: Option<HashMap<String, u32>>,
    #[serde(default)]
    merges: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AddedToken {
    id: u32,
    content: String,
}

impl Vocabulary {
    /// Parse a `tokenizer.json` document. `model.vocab` is required.
    pub fn from_tokenizer_json(json: &str, family: VocabFamily) -> Result<Self> {
        let file: TokenizerFile = serde_json::from_str(json)
            .map_err(|e| SoundGuardError::Load(format!("parse tokenizer table: {e}")))?;
        let model = file
            .model
            .ok_or_else(|| SoundGuardError::Load("tokenizer table has no 'model' section".into()))?;
        let mut table = model.vocab.ok_or_else(|| {
            SoundGuardError::Load("tokenizer table has no 'model.vocab' section".into())
        })?;

        for added in file.added_tokens {
            table.entry(added.content).or_insert(added.id);
        }

        match model.merges {
            Some(serde_json::Value::Array(merges)) => {
                info!(
                    ?family,
                    tokens = table.len(),
                    merges = merges.len(),
                    "loaded tokenizer table (merges are not applied)"
                );
            }
            _ => info!(?family, tokens = table.len(), "loaded tokenizer table"),
        }

        Self::from_table(table, family)
    }

    /// Parse a `vocab.txt` listing, one token per line; the id is the line index.
    pub fn from_vocab_txt(text: &str, family: VocabFamily) -> Result<Self> {
        let table: HashMap<String, u32> = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .enumerate()
            .filter(|(_, line)| !line.is_empty())
            .map(|(idx, line)| (line.to_string(), idx as u32))
            .collect();
        info!(?family, tokens = table.len(), "loaded vocab.txt");
        Self::from_table(table, family)
    }

    pub fn from_path(path: impl AsRef<Path>, family: VocabFamily) -> Result<Self> {
        let path_ref = path.as_ref();
        let text = std::fs::read_to_string(path_ref).map_err(|e| {
            SoundGuardError::Load(format!("read {}: {e}", path_ref.display()))
        })?;
        let is_txt = path_ref
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        if is_txt {
            Self::from_vocab_txt(&text, family)
        } else {
            Self::from_tokenizer_json(&text, family)
        }
    }

    /// Build from an in-memory string → id table.
    pub fn from_table(table: HashMap<String, u32>, family: VocabFamily) -> Result<Self> {
        if table.is_empty() {
            return Err(SoundGuardError::Load("vocabulary table is empty".into()));
        }

        let mut id_to_token = HashMap::with_capacity(table.len());
        for (token, &id) in &table {
            if let Some(previous) = id_to_token.insert(id, token.clone()) {
                return Err(SoundGuardError::Load(format!(
                    "id {id} is assigned to both {previous:?} and {token:?}"
                )));
            }
        }

        let defaults = family.defaults();
        let lookup = |(name, fallback): (&str, u32)| table.get(name).copied().unwrap_or(fallback);
        let specials = SpecialTokens {
            pad: lookup(defaults.pad),
            bos: lookup(defaults.bos),
            eos: lookup(defaults.eos),
            unk: lookup(defaults.unk),
        };
        let unk_token = id_to_token
            .get(&specials.unk)
            .cloned()
            .unwrap_or_else(|| defaults.unk.0.to_string());
        debug!(?family, ?specials, "resolved special tokens");

        Ok(Self {
            family,
            token_to_id: table,
            id_to_token,
            specials,
            unk_token,
        })
    }

    pub fn family(&self) -> VocabFamily {
        self.family
    }

    pub fn specials(&self) -> SpecialTokens {
        self.specials
    }

    /// String form of the unknown token, used by WordPiece word replacement.
    pub fn unk_token(&self) -> &str {
        &self.unk_token
    }

    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    pub fn id_of(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn token_of(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    /// Convert ids back to text.
    ///
    /// Scanning stops at the first terminator id. BOS, PAD and UNK ids are
    /// skipped, as are ids missing from the table. Pieces are joined with a
    /// single space; continuation markers are left untouched.
    pub fn decode(&self, ids: &[u32]) -> String {
        let SpecialTokens { pad, bos, eos, unk } = self.specials;
        let mut pieces: Vec<&str> = Vec::with_capacity(ids.len());
        for &id in ids {
            if id == eos {
                break;
            }
            if id == bos || id == pad || id == unk {
                continue;
            }
            if let Some(token) = self.token_of(id) {
                pieces.push(token);
            }
        }
        pieces.join(" ")
    }
}
