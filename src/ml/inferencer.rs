// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Greedy caption generation:
//
//   image → CNN + encoder (once) → image tokens
//   words = [<start>]
//   repeat at most seq_length - 1 times:
//       logits = decoder(words, image tokens)
//       next   = argmax(logits at the last position)
//       stop if next == <end>, else append
//
// The causal mask makes feeding the unpadded prefix equivalent to
// feeding a padded sequence and reading position i.
use anyhow::{Context, Result};
use burn::prelude::*;
use std::path::Path;

use crate::data::image::load_image;
use crate::data::preprocessor::{END_TOKEN, START_TOKEN};
use crate::infra::checkpoint::RunDirectory;
use crate::infra::vocabulary::{Vocabulary, PAD_ID, UNK_ID};
use crate::ml::model::ImageCaptioningModel;

/// Run greedy decoding. `next_token` maps the current prefix (starting
/// with `start_id`) to the most likely following id. The returned ids
/// exclude both `start_id` and `end_id`.
pub fn decode_greedy(
    start_id:       u32,
    end_id:         u32,
    seq_length:     usize,
    mut next_token: impl FnMut(&[u32]) -> Result<u32>,
) -> Result<Vec<u32>> {
    let mut prefix = vec![start_id];
    for _ in 0..seq_length.saturating_sub(1) {
        let next = next_token(&prefix)?;
        if next == end_id {
            break;
        }
        prefix.push(next);
    }
    prefix.remove(0);
    Ok(prefix)
}

pub struct Inferencer<B: Backend> {
    model:      ImageCaptioningModel<B>,
    vocab:      Vocabulary,
    image_size: usize,
    start_id:   u32,
    end_id:     u32,
    device:     B::Device,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(
        model:      ImageCaptioningModel<B>,
        vocab:      Vocabulary,
        image_size: usize,
        device:     B::Device,
    ) -> Result<Self> {
        let start_id = vocab
            .id(START_TOKEN)
            .with_context(|| format!("Vocabulary has no '{START_TOKEN}' token"))?;
        let end_id = vocab
            .id(END_TOKEN)
            .with_context(|| format!("Vocabulary has no '{END_TOKEN}' token"))?;
        Ok(Self { model, vocab, image_size, start_id, end_id, device })
    }

    /// Rebuild the architecture from config_train.json, then load the
    /// vocabulary and the weights of the run.
    pub fn from_run(run_dir: &RunDirectory, device: B::Device) -> Result<Self> {
        let record    = run_dir.load_config()?;
        let model_cfg = record.model_config().with_dropout(0.0);
        let model     = run_dir.load_model(model_cfg.init::<B>(&device), &device)?;
        let vocab     = run_dir.load_vocabulary(record.config.seq_length)?;
        tracing::info!("Model loaded from run '{}'", run_dir.id());
        Self::new(model, vocab, record.config.image_size, device)
    }

    /// Caption the image stored at `path`.
    pub fn caption_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let pixels = load_image(path, self.image_size)?;
        self.caption_pixels(pixels)
    }

    /// Caption a preprocessed channel-first image buffer.
    pub fn caption_pixels(&self, pixels: Vec<f32>) -> Result<String> {
        let size   = self.image_size;
        let images = Tensor::<B, 4>::from_data(TensorData::new(pixels, [1, 3, size, size]), &self.device);
        let encoded = self.model.encode_images(images);

        let ids = decode_greedy(self.start_id, self.end_id, self.vocab.seq_length(), |prefix| {
            let flat: Vec<i32> = prefix.iter().map(|&id| id as i32).collect();
            let tokens = Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device)
                .unsqueeze::<2>();

            let logits = self.model.decode(tokens, encoded.clone());
            let [_, len, vocab] = logits.dims();
            let next: i64 = logits
                .slice([0..1, len - 1..len, 0..vocab])
                .reshape([vocab])
                .argmax(0)
                .into_scalar()
                .elem::<i64>();
            Ok(next as u32)
        })?;

        Ok(self.render(&ids))
    }

    /// Ids → text. Markers, padding and [UNK] never reach the output.
    fn render(&self, ids: &[u32]) -> String {
        let skip = [self.start_id, self.end_id, PAD_ID, UNK_ID];
        ids.iter()
            .filter(|&&id| !skip.contains(&id))
            .filter_map(|&id| self.vocab.token(id))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::image::blank_image;
    use crate::infra::vocabulary::VocabularyStore;
    use crate::ml::model::ImageCaptioningConfig;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_decode_stops_at_end_token() {
        let script = [5, 6, 3, 9];
        let ids = decode_greedy(2, 3, 10, |prefix| Ok(script[prefix.len() - 1])).unwrap();
        assert_eq!(ids, vec![5, 6]);
    }

    #[test]
    fn test_decode_is_bounded_by_seq_length() {
        let mut calls = 0;
        let ids = decode_greedy(2, 3, 5, |_| {
            calls += 1;
            Ok(7)
        })
        .unwrap();
        assert_eq!(calls, 4);
        assert_eq!(ids, vec![7, 7, 7, 7]);
    }

    #[test]
    fn test_decode_propagates_errors() {
        let result = decode_greedy(2, 3, 5, |_| anyhow::bail!("boom"));
        assert!(result.is_err());
    }

    #[test]
    fn test_tiny_model_produces_bounded_caption() {
        let corpus = vec!["<start> a dog runs <end>".to_string(), "<start> a cat <end>".to_string()];
        let vocab  = VocabularyStore::build(&corpus, 100, 6).unwrap();
        let device = Default::default();
        let model  = ImageCaptioningConfig::new(vocab.size(), 6, 8, 16, 2)
            .with_cnn_channels(2)
            .with_grid_size(1)
            .init::<TestBackend>(&device);

        let inferencer = Inferencer::new(model, vocab, 16, device).unwrap();
        let caption    = inferencer.caption_pixels(blank_image(16)).unwrap();

        assert!(caption.split_whitespace().count() <= 5);
        assert!(!caption.contains(START_TOKEN));
        assert!(!caption.contains(END_TOKEN));
    }

    #[test]
    fn test_rendered_caption_omits_markers_and_specials() {
        let corpus = vec!["<start> a dog runs <end>".to_string()];
        let vocab  = VocabularyStore::build(&corpus, 100, 6).unwrap();
        let ids: Vec<u32> = ["<start>", "a", "<start>", "dog", "<end>"]
            .iter()
            .map(|t| vocab.id(t).unwrap())
            .chain([UNK_ID, PAD_ID])
            .collect();

        let device = Default::default();
        let model  = ImageCaptioningConfig::new(vocab.size(), 6, 8, 16, 2)
            .with_cnn_channels(2)
            .with_grid_size(1)
            .init::<TestBackend>(&device);
        let inferencer = Inferencer::new(model, vocab, 16, device).unwrap();

        assert_eq!(inferencer.render(&ids), "a dog");
    }

    #[test]
    fn test_vocabulary_without_markers_is_rejected() {
        let corpus = vec!["a dog".to_string()];
        let vocab  = VocabularyStore::build(&corpus, 100, 4).unwrap();
        let device = Default::default();
        let model  = ImageCaptioningConfig::new(vocab.size(), 4, 8, 16, 2)
            .with_cnn_channels(2)
            .with_grid_size(1)
            .init::<TestBackend>(&device);
        assert!(Inferencer::new(model, vocab, 16, device).is_err());
    }
}
