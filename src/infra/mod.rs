// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting persistence used by several other layers:
//
//   checkpoint.rs  — the timestamped run directory: config,
//                    vocabulary, weights, history and metrics
//                    files. Each artifact is written once.
//
//   vocabulary.rs  — fits the word vocabulary on the training
//                    corpus, numericalises captions, and stores
//                    it as a `tokenizers` JSON file.
//
//   metrics.rs     — per-epoch metrics (CSV + history JSON) and
//                    the final per-split results.
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Run directory, model checkpoint and JSON artifacts
pub mod checkpoint;

/// Vocabulary fitting, encoding and persistence
pub mod vocabulary;

/// Training metrics and history
pub mod metrics;
