// ============================================================
// Layer 6 — Vocabulary Store
// ============================================================
// Builds, saves and loads the caption vocabulary.
//
// The vocabulary is fitted ONCE per training run on the text
// corpus and persisted next to the weights, so captions are
// numericalised identically at training and inference time.
//
// Id layout:
//   0 → [PAD]   (also the padding value of every sequence)
//   1 → [UNK]   (out-of-vocabulary words)
//   2.. → corpus words by descending frequency, ties broken
//         alphabetically so ids are stable for a given corpus
//
// The total size (specials included) never exceeds max_tokens.
//
// Storage format: a HuggingFace `tokenizers` WordLevel JSON with a
// WhitespaceSplit pre-tokenizer. WhitespaceSplit (not Whitespace)
// keeps "<start>" as one token instead of "<", "start", ">".
// Text is standardised by our Preprocessor before encoding, so the
// tokenizer JSON carries no normalizer.

use anyhow::{bail, Context, Result};
use std::{collections::HashMap, path::Path};
use tokenizers::Tokenizer;

use crate::data::preprocessor::Preprocessor;

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const PAD_ID:    u32  = 0;
pub const UNK_ID:    u32  = 1;

const SPECIAL_TOKENS: usize = 2;

/// File name of the persisted vocabulary inside a run directory
pub const VOCABULARY_FILE: &str = "tokenizer.json";

/// A fitted vocabulary plus the fixed output sequence length.
pub struct Vocabulary {
    tokenizer:    Tokenizer,
    seq_length:   usize,
    preprocessor: Preprocessor,
}

impl Vocabulary {
    /// Numericalise a caption: standardise, map words to ids, then pad
    /// with [PAD] or truncate to exactly `seq_length` ids.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let clean = self.preprocessor.standardize(text);
        let enc   = self
            .tokenizer
            .encode(clean.as_str(), false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;

        let mut ids = enc.get_ids().to_vec();
        ids.truncate(self.seq_length);
        ids.resize(self.seq_length, PAD_ID);
        Ok(ids)
    }

    pub fn token(&self, id: u32) -> Option<String> {
        self.tokenizer.id_to_token(id)
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    /// Number of distinct ids, specials included
    pub fn size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    pub fn seq_length(&self) -> usize {
        self.seq_length
    }

    /// Write the tokenizer JSON to `dir/tokenizer.json`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(VOCABULARY_FILE);
        self.tokenizer
            .save(&path, true)
            .map_err(|e| anyhow::anyhow!("Cannot write vocabulary to '{}': {e}", path.display()))?;
        tracing::debug!("Saved vocabulary to '{}'", path.display());
        Ok(())
    }
}

/// Fits and reloads vocabularies.
pub struct VocabularyStore;

impl VocabularyStore {
    /// Fit a vocabulary on `corpus`, capped at `max_tokens` entries.
    pub fn build(corpus: &[String], max_tokens: usize, seq_length: usize) -> Result<Vocabulary> {
        if max_tokens < SPECIAL_TOKENS {
            bail!("max_tokens must be at least {SPECIAL_TOKENS} to hold [PAD] and [UNK], got {max_tokens}");
        }
        if seq_length < 2 {
            bail!("seq_length must be at least 2 (a <start> token and one prediction), got {seq_length}");
        }

        // ── Step 1: count standardised words ──────────────────────────────────
        let preprocessor = Preprocessor::new();
        let mut freq: HashMap<String, usize> = HashMap::new();
        for line in corpus {
            for word in preprocessor.standardize(line).split_whitespace() {
                *freq.entry(word.to_string()).or_insert(0) += 1;
            }
        }

        // ── Step 2: order and cap ─────────────────────────────────────────────
        let mut words: Vec<(String, usize)> = freq
            .into_iter()
            .filter(|(w, _)| w != PAD_TOKEN && w != UNK_TOKEN)
            .collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        words.truncate(max_tokens - SPECIAL_TOKENS);

        // ── Step 3: id assignment ─────────────────────────────────────────────
        let mut vocab = serde_json::Map::new();
        vocab.insert(PAD_TOKEN.to_string(), serde_json::json!(PAD_ID));
        vocab.insert(UNK_TOKEN.to_string(), serde_json::json!(UNK_ID));
        for (offset, (word, _)) in words.iter().enumerate() {
            vocab.insert(word.clone(), serde_json::json!(SPECIAL_TOKENS + offset));
        }

        // ── Step 4: HuggingFace tokenizer JSON ────────────────────────────────
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                {"id": PAD_ID, "content": PAD_TOKEN, "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": UNK_ID, "content": UNK_TOKEN, "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
            ],
            "normalizer": null,
            "pre_tokenizer": { "type": "WhitespaceSplit" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK_TOKEN
            }
        });

        let tokenizer: Tokenizer = tokenizer_json
            .to_string()
            .parse()
            .map_err(|e| anyhow::anyhow!("Cannot build tokenizer: {e}"))?;

        let vocabulary = Vocabulary { tokenizer, seq_length, preprocessor };
        tracing::info!(
            "Vocabulary fitted: {} tokens (cap {}), sequence length {}",
            vocabulary.size(),
            max_tokens,
            seq_length
        );
        Ok(vocabulary)
    }

    /// Load a vocabulary previously written with [`Vocabulary::save`].
    pub fn load(dir: &Path, seq_length: usize) -> Result<Vocabulary> {
        let path = dir.join(VOCABULARY_FILE);
        if !path.is_file() {
            bail!("No vocabulary found at '{}'. Has this run finished training?", path.display());
        }
        let tokenizer = Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Cannot load vocabulary from '{}': {}", path.display(), e))
            .context("Loading vocabulary")?;
        Ok(Vocabulary { tokenizer, seq_length, preprocessor: Preprocessor::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "<start> A dog runs on the grass. <end>".to_string(),
            "<start> A dog plays with a ball <end>".to_string(),
            "<start> Two cats sleep <end>".to_string(),
        ]
    }

    #[test]
    fn test_size_never_exceeds_cap() {
        for cap in [2, 3, 5, 8, 1000] {
            let vocab = VocabularyStore::build(&corpus(), cap, 10).unwrap();
            assert!(vocab.size() <= cap, "cap {cap} exceeded: {}", vocab.size());
        }
    }

    #[test]
    fn test_cap_below_specials_is_rejected() {
        assert!(VocabularyStore::build(&corpus(), 1, 10).is_err());
    }

    #[test]
    fn test_frequency_ordering_and_specials() {
        let vocab = VocabularyStore::build(&corpus(), 1000, 10).unwrap();
        assert_eq!(vocab.id(PAD_TOKEN), Some(PAD_ID));
        assert_eq!(vocab.id(UNK_TOKEN), Some(UNK_ID));
        // "<end>" and "<start>" appear 3 times, "a" also 3 times: alphabetical tie-break
        assert_eq!(vocab.token(2).as_deref(), Some("<end>"));
        assert_eq!(vocab.token(3).as_deref(), Some("<start>"));
        assert_eq!(vocab.token(4).as_deref(), Some("a"));
    }

    #[test]
    fn test_encode_pads_and_truncates() {
        let vocab = VocabularyStore::build(&corpus(), 1000, 6).unwrap();

        let short = vocab.encode("<start> a dog <end>").unwrap();
        assert_eq!(short.len(), 6);
        assert_eq!(&short[4..], &[PAD_ID, PAD_ID]);

        let long = vocab.encode("<start> a dog runs on the grass <end>").unwrap();
        assert_eq!(long.len(), 6);
        assert!(long.iter().all(|&id| id != PAD_ID));
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let vocab = VocabularyStore::build(&corpus(), 1000, 4).unwrap();
        let ids   = vocab.encode("zebra").unwrap();
        assert_eq!(ids[0], UNK_ID);
    }

    #[test]
    fn test_save_and_load_keep_ids() {
        let dir = std::env::temp_dir()
            .join(format!("image_captioning_vocab_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let built  = VocabularyStore::build(&corpus(), 1000, 8).unwrap();
        built.save(&dir).unwrap();
        let loaded = VocabularyStore::load(&dir, 8).unwrap();

        assert_eq!(built.size(), loaded.size());
        let text = "<start> two dogs play <end>";
        assert_eq!(built.encode(text).unwrap(), loaded.encode(text).unwrap());

        std::fs::remove_dir_all(dir).ok();
    }
}
