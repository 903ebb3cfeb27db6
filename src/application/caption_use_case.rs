// ============================================================
// Layer 2 — Caption Use Case
// ============================================================
// Reloads a finished training run and captions a set of images:
//
//   - by default the run's own TEST split, re-derived from the
//     validation JSON with the persisted split settings
//   - or every image key of an explicit caption JSON (--images)
//
// Output: <captions_dir>/<run id>/captions_test_results.json
//         { "<image path>": "<generated caption>", ... }

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use crate::application::train_use_case::prepare_splits;
use crate::data::loader::{load_caption_mapping, save_generated_captions};
use crate::domain::caption::GeneratedCaptions;
use crate::infra::checkpoint::{RunDirectory, RunId};
use crate::ml::inferencer::Inferencer;

type InferBackend = burn::backend::Wgpu;

pub const RESULTS_FILE: &str = "captions_test_results.json";

/// Where the generated captions of `run_id` are written.
pub fn results_path(captions_dir: impl AsRef<Path>, run_id: &RunId) -> PathBuf {
    captions_dir.as_ref().join(run_id.as_str()).join(RESULTS_FILE)
}

pub struct CaptionUseCase {
    run_dir:      PathBuf,
    captions_dir: PathBuf,
    images:       Option<PathBuf>,
}

impl CaptionUseCase {
    pub fn new(run_dir: PathBuf, captions_dir: PathBuf, images: Option<PathBuf>) -> Self {
        Self { run_dir, captions_dir, images }
    }

    /// Generate and save the captions. Returns the results file path.
    pub fn execute(&self) -> Result<PathBuf> {
        let run    = RunDirectory::open(&self.run_dir)?;
        let record = run.load_config()?;

        let images: Vec<String> = match &self.images {
            Some(path) => {
                tracing::info!("Captioning the images listed in '{}'", path.display());
                load_caption_mapping(path)?.images().map(String::from).collect()
            }
            None => {
                tracing::info!("Captioning the test split of run '{}'", run.id());
                let test = prepare_splits(&record.config)?.test;
                if test.len() != record.num_test_img {
                    tracing::warn!(
                        "Re-derived test split has {} images, the run recorded {}",
                        test.len(),
                        record.num_test_img
                    );
                }
                test.images().map(String::from).collect()
            }
        };
        if images.is_empty() {
            bail!("No images to caption");
        }

        let device     = burn::backend::wgpu::WgpuDevice::default();
        let inferencer = Inferencer::<InferBackend>::from_run(&run, device)?;
        let image_root = Path::new(&record.config.image_root);

        let mut generated = GeneratedCaptions::new();
        for (i, image) in images.iter().enumerate() {
            match inferencer.caption_file(image_root.join(image)) {
                Ok(caption) => {
                    tracing::debug!("{} → {}", image, caption);
                    generated.insert(image.as_str(), caption);
                }
                Err(e) => tracing::warn!("Skipping '{}': {:#}", image, e),
            }
            if (i + 1) % 500 == 0 {
                tracing::info!("Captioned {}/{} images", i + 1, images.len());
            }
        }

        let path = results_path(&self.captions_dir, run.id());
        save_generated_captions(&path, &generated)?;
        tracing::info!("Saved {} captions to '{}'", generated.len(), path.display());
        Ok(path)
    }
}
