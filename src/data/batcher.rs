// ============================================================
// Layer 4 — Caption Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<CaptionSample>
// into tensors:
//
//   images: [N, 3, S, S]   decoded + normalised on the fly
//   tokens: [N, T]         padded caption ids (T = seq_length)
//
// Images are decoded here rather than in the Dataset so that the
// dataset stays a cheap list of paths and the DataLoader's worker
// does the I/O. An image that fails to decode is replaced by a
// blank one and logged; the batch is never dropped.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};
use std::path::PathBuf;

use crate::data::dataset::CaptionSample;
use crate::data::image::{blank_image, load_image};

#[derive(Debug, Clone)]
pub struct CaptionBatch<B: Backend> {
    /// Shape [batch_size, 3, image_size, image_size]
    pub images: Tensor<B, 4>,

    /// Shape [batch_size, seq_length]; 0 = padding
    pub tokens: Tensor<B, 2, Int>,
}

#[derive(Clone, Debug)]
pub struct CaptionBatcher<B: Backend> {
    pub device:     B::Device,
    pub image_root: PathBuf,
    pub image_size: usize,
}

impl<B: Backend> CaptionBatcher<B> {
    pub fn new(device: B::Device, image_root: impl Into<PathBuf>, image_size: usize) -> Self {
        Self { device, image_root: image_root.into(), image_size }
    }

    /// Decode one image, falling back to a blank buffer.
    fn pixels(&self, image_path: &str) -> Vec<f32> {
        match load_image(self.image_root.join(image_path), self.image_size) {
            Ok(pixels) => pixels,
            Err(e) => {
                tracing::warn!("Using a blank image for '{}': {:#}", image_path, e);
                blank_image(self.image_size)
            }
        }
    }
}

impl<B: Backend> Batcher<CaptionSample, CaptionBatch<B>> for CaptionBatcher<B> {
    fn batch(&self, items: Vec<CaptionSample>) -> CaptionBatch<B> {
        let batch_size = items.len();
        // All captions share the same padded length
        let seq_len    = items[0].tokens.len();
        let size       = self.image_size;

        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|s| self.pixels(&s.image_path))
            .collect();

        let token_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.tokens.iter().map(|&id| id as i32))
            .collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 3, size, size]),
            &self.device,
        );

        let tokens = Tensor::<B, 1, Int>::from_ints(
            token_flat.as_slice(), &self.device
        ).reshape([batch_size, seq_len]);

        CaptionBatch { images, tokens }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_batch_shapes_with_missing_images() {
        let device  = Default::default();
        let batcher = CaptionBatcher::<TestBackend>::new(device, "/nonexistent", 8);
        let items   = vec![
            CaptionSample { image_path: "a.jpg".into(), tokens: vec![2, 5, 3, 0] },
            CaptionSample { image_path: "b.jpg".into(), tokens: vec![2, 6, 7, 3] },
        ];

        let batch = batcher.batch(items);
        assert_eq!(batch.images.dims(), [2, 3, 8, 8]);
        assert_eq!(batch.tokens.dims(), [2, 4]);

        let total: f32 = batch.images.sum().into_scalar().elem();
        assert_eq!(total, 0.0);
    }
}
