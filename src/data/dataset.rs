use anyhow::Result;
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::caption::CaptionMapping;
use crate::infra::vocabulary::Vocabulary;

/// One (image, caption) pair. The caption is already numericalised and
/// padded to the vocabulary's sequence length:
///   <start> w1 w2 ... <end> [PAD] [PAD] ...
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionSample {
    pub image_path: String,
    pub tokens:     Vec<u32>,
}

impl CaptionSample {
    /// Number of non-padding tokens
    pub fn caption_len(&self) -> usize {
        self.tokens.iter().take_while(|&&id| id != 0).count()
    }
}

/// Cheap to clone: the same samples back both the training loader and
/// the evaluation loader.
#[derive(Clone)]
pub struct CaptionDataset {
    samples: Arc<Vec<CaptionSample>>,
    images:  usize,
}

impl CaptionDataset {
    pub fn new(samples: Vec<CaptionSample>, images: usize) -> Self {
        Self { samples: Arc::new(samples), images }
    }

    /// Window a caption mapping into one sample per (image, caption) pair.
    pub fn from_mapping(mapping: &CaptionMapping, vocab: &Vocabulary) -> Result<Self> {
        let mut samples = Vec::with_capacity(mapping.caption_count());
        for (image, captions) in mapping.iter() {
            for caption in captions {
                samples.push(CaptionSample {
                    image_path: image.to_string(),
                    tokens:     vocab.encode(caption)?,
                });
            }
        }
        Ok(Self::new(samples, mapping.len()))
    }

    pub fn sample_count(&self) -> usize { self.samples.len() }

    pub fn image_count(&self) -> usize { self.images }
}

impl Dataset<CaptionSample> for CaptionDataset {
    fn get(&self, index: usize) -> Option<CaptionSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
