// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between the caption JSON files on disk and the
// tensor batches fed to the model:
//
//   caption JSON files
//       │
//       ▼
//   loader          → ordered image → captions mappings
//       │
//       ▼
//   splitter        → optional reduction, validation / test split
//       │
//       ▼
//   preprocessor    → caption standardisation (lowercase, no punctuation)
//       │
//       ▼
//   Vocabulary      → word ids, padded to seq_length   (Layer 6)
//       │
//       ▼
//   CaptionDataset  → one sample per (image, caption) pair
//       │
//       ▼
//   CaptionBatcher  → image decoding + tensor stacking
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads caption mappings and the text corpus from JSON
pub mod loader;

/// Caption standardisation and <start>/<end> markers
pub mod preprocessor;

/// Dataset reduction and validation/test split policy
pub mod splitter;

/// Image decoding, resizing and normalisation
pub mod image;

/// Implements Burn's Dataset trait for caption samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
