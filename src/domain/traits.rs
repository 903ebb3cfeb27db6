// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer programs against these traits so the
// concrete loaders and metrics can be swapped freely:
//   - JsonCaptionLoader implements CaptionSource
//   - Bleu and RougeL implement CaptionScorer
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::caption::CaptionMapping;

// ─── CaptionSource ────────────────────────────────────────────────────────────
/// Any component that can produce an image → captions mapping.
pub trait CaptionSource {
    fn load(&self) -> Result<CaptionMapping>;
}

// ─── CaptionScorer ────────────────────────────────────────────────────────────
/// A text-similarity metric between one tokenised candidate caption and
/// a set of tokenised reference captions. Scores lie in [0, 1].
pub trait CaptionScorer {
    /// Short metric name used in reports, e.g. "BLEU-4"
    fn name(&self) -> String;

    fn score(&self, candidate: &[String], references: &[Vec<String>]) -> f64;
}
