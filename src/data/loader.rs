// ============================================================
// Layer 4 — Caption JSON Loader
// ============================================================
// Reads the caption datasets from disk.
//
// Two file shapes are used:
//
//   Caption mapping (train / valid / raw reference files):
//     { "images/0001.jpg": ["<start> a cat <end>", ...], ... }
//
//   Text corpus (all training captions, used for the vocabulary):
//     [ "<start> a cat <end>", "<start> a dog <end>", ... ]
//
//   Generated captions (written by `caption`, read by `evaluate`):
//     { "images/0001.jpg": "a cat sitting on a mat", ... }
//
// serde_json is built with `preserve_order`, so iterating the
// parsed Map yields keys in file order. The split policy relies
// on that.
//
// Reference: Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::domain::caption::{CaptionMapping, GeneratedCaptions};
use crate::domain::traits::CaptionSource;

/// Loads a caption mapping from one JSON file.
pub struct JsonCaptionLoader {
    path: PathBuf,
}

impl JsonCaptionLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptionSource for JsonCaptionLoader {
    fn load(&self) -> Result<CaptionMapping> {
        load_caption_mapping(&self.path)
    }
}

/// Parse `{ image: [captions] }` keeping file order.
pub fn load_caption_mapping(path: impl AsRef<Path>) -> Result<CaptionMapping> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read caption file '{}'", path.display()))?;

    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&json)
        .with_context(|| format!("'{}' is not a JSON object of image → captions", path.display()))?;

    let mut mapping = CaptionMapping::new();
    for (image, value) in object {
        let captions: Vec<String> = serde_json::from_value(value)
            .with_context(|| format!("Captions for '{image}' in '{}' are not a list of strings", path.display()))?;
        mapping.insert(image, captions);
    }

    tracing::debug!(
        "Loaded {} images / {} captions from '{}'",
        mapping.len(),
        mapping.caption_count(),
        path.display()
    );
    Ok(mapping)
}

/// Parse the JSON array of training captions used to fit the vocabulary.
pub fn load_text_corpus(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read text corpus '{}'", path.display()))?;
    let corpus: Vec<String> = serde_json::from_str(&json)
        .with_context(|| format!("'{}' is not a JSON array of strings", path.display()))?;
    tracing::debug!("Loaded {} corpus lines from '{}'", corpus.len(), path.display());
    Ok(corpus)
}

/// Drop images whose file cannot be found under `image_root`.
/// A missing image is a data problem, not a fatal one: it is logged and skipped.
pub fn retain_existing_images(mapping: &mut CaptionMapping, image_root: &Path) -> usize {
    let dropped = mapping.retain(|image, _| {
        let exists = image_root.join(image).is_file();
        if !exists {
            tracing::warn!("Skipping '{}': image file not found", image);
        }
        exists
    });
    if dropped > 0 {
        tracing::warn!("{} images dropped because their files are missing", dropped);
    }
    dropped
}

/// Read a generated-captions JSON.
pub fn load_generated_captions(path: impl AsRef<Path>) -> Result<GeneratedCaptions> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read generated captions '{}'", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("'{}' is not a JSON object of image → caption", path.display()))
}

/// Write a generated-captions JSON, creating parent directories.
pub fn save_generated_captions(path: impl AsRef<Path>, captions: &GeneratedCaptions) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create '{}'", parent.display()))?;
    }
    fs::write(path, serde_json::to_string_pretty(captions)?)
        .with_context(|| format!("Cannot write generated captions '{}'", path.display()))?;
    tracing::debug!("Wrote {} captions to '{}'", captions.len(), path.display());
    Ok(())
}
