// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Scores generated captions against reference captions:
//
//   generated JSON  { image: caption }
//   reference JSONs { image: [captions] }   (merged, file order)
//
// For every generated image that has references:
//   sentence BLEU-1..4 (smoothed) and ROUGE-L
// Aggregates:
//   corpus BLEU-1..4  (n-gram counts summed over all images)
//   mean of every per-image score
//
// Both sides are tokenised the same way: standardised, markers
// removed, split on whitespace.
//
// The report is printed and written as evaluation_results.json
// next to the generated-captions file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::PathBuf};

use crate::data::{
    loader::{load_generated_captions, JsonCaptionLoader},
    preprocessor::Preprocessor,
};
use crate::domain::{
    bleu::{Bleu, BleuStats},
    caption::{CaptionMapping, GeneratedCaptions},
    rouge::RougeL,
    traits::{CaptionScorer, CaptionSource},
};

pub const MAX_BLEU_ORDER: usize = 4;
pub const REPORT_FILE:    &str  = "evaluation_results.json";

/// Per-image scores, keyed by metric name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageScore {
    pub image:     String,
    pub candidate: String,
    pub scores:    BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub images_scored:  usize,
    /// Generated images without any reference caption
    pub images_skipped: usize,
    pub corpus_bleu:    BTreeMap<String, f64>,
    pub mean_scores:    BTreeMap<String, f64>,
    pub per_image:      Vec<ImageScore>,
}

impl EvaluationReport {
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Scored {} images ({} without references skipped)",
            self.images_scored, self.images_skipped
        )];
        for (name, value) in &self.corpus_bleu {
            lines.push(format!("Corpus {name} = {value:.4}"));
        }
        for (name, value) in &self.mean_scores {
            lines.push(format!("Mean {name} = {value:.4}"));
        }
        lines
    }
}

fn default_scorers() -> Vec<Box<dyn CaptionScorer>> {
    let mut scorers: Vec<Box<dyn CaptionScorer>> = (1..=MAX_BLEU_ORDER)
        .map(|n| Box::new(Bleu::new(n)) as Box<dyn CaptionScorer>)
        .collect();
    scorers.push(Box::new(RougeL));
    scorers
}

/// Score every generated caption that has references.
/// Fails when no generated image has a reference.
pub fn evaluate_captions(
    generated:  &GeneratedCaptions,
    references: &CaptionMapping,
) -> Result<EvaluationReport> {
    let preprocessor = Preprocessor::new();
    let scorers      = default_scorers();

    let mut corpus    = BleuStats::new(MAX_BLEU_ORDER);
    let mut totals    = BTreeMap::<String, f64>::new();
    let mut per_image = Vec::new();
    let mut skipped   = 0usize;

    for (image, caption) in &generated.captions {
        let Some(refs) = references.captions(image) else {
            tracing::warn!("No reference captions for '{}'", image);
            skipped += 1;
            continue;
        };
        let candidate = preprocessor.metric_tokens(caption);
        let refs: Vec<Vec<String>> = refs.iter().map(|r| preprocessor.metric_tokens(r)).collect();

        corpus.add(&BleuStats::collect(&candidate, &refs, MAX_BLEU_ORDER));

        let scores: BTreeMap<String, f64> = scorers
            .iter()
            .map(|s| (s.name(), s.score(&candidate, &refs)))
            .collect();
        for (name, value) in &scores {
            *totals.entry(name.clone()).or_insert(0.0) += value;
        }

        per_image.push(ImageScore {
            image:     image.clone(),
            candidate: candidate.join(" "),
            scores,
        });
    }

    if per_image.is_empty() {
        bail!(
            "None of the {} generated images has reference captions",
            generated.len()
        );
    }

    let scored = per_image.len();
    let corpus_bleu = (1..=MAX_BLEU_ORDER)
        .map(|n| (format!("BLEU-{n}"), corpus.score(n)))
        .collect();
    let mean_scores = totals
        .into_iter()
        .map(|(name, sum)| (name, sum / scored as f64))
        .collect();

    Ok(EvaluationReport {
        images_scored:  scored,
        images_skipped: skipped,
        corpus_bleu,
        mean_scores,
        per_image,
    })
}

pub struct EvaluateUseCase {
    results:    PathBuf,
    references: Vec<PathBuf>,
}

impl EvaluateUseCase {
    pub fn new(results: PathBuf, references: Vec<PathBuf>) -> Self {
        Self { results, references }
    }

    pub fn execute(&self) -> Result<EvaluationReport> {
        let generated = load_generated_captions(&self.results)?;
        tracing::info!("Loaded {} generated captions from '{}'", generated.len(), self.results.display());

        let mut references = CaptionMapping::new();
        for path in &self.references {
            references.merge(JsonCaptionLoader::new(path).load()?);
        }
        tracing::info!("Loaded references for {} images", references.len());

        let report = evaluate_captions(&generated, &references)?;
        for line in report.summary_lines() {
            tracing::info!("{}", line);
        }

        let out = self.results.with_file_name(REPORT_FILE);
        fs::write(&out, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Cannot write '{}'", out.display()))?;
        tracing::info!("Saved evaluation report to '{}'", out.display());

        Ok(report)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn references() -> CaptionMapping {
        let mut m = CaptionMapping::new();
        m.insert("a.jpg", vec!["<start> a dog runs across the green field <end>".into()]);
        m.insert("b.jpg", vec![
            "<start> two cats sleep on a red sofa <end>".into(),
            "<start> cats sleeping together <end>".into(),
        ]);
        m
    }

    #[test]
    fn test_identical_captions_score_the_maximum() {
        let mut generated = GeneratedCaptions::new();
        generated.insert("a.jpg", "A dog runs across the green field.");
        generated.insert("b.jpg", "two cats sleep on a red sofa");

        let report = evaluate_captions(&generated, &references()).unwrap();
        assert_eq!(report.images_scored, 2);
        for value in report.corpus_bleu.values().chain(report.mean_scores.values()) {
            assert!((value - 1.0).abs() < 1e-9, "expected 1.0, got {value}");
        }
    }

    #[test]
    fn test_images_without_references_are_skipped() {
        let mut generated = GeneratedCaptions::new();
        generated.insert("a.jpg", "a dog in a field");
        generated.insert("zzz.jpg", "nothing to compare");

        let report = evaluate_captions(&generated, &references()).unwrap();
        assert_eq!(report.images_scored, 1);
        assert_eq!(report.images_skipped, 1);
        assert!(report.mean_scores["BLEU-1"] > 0.0 && report.mean_scores["BLEU-1"] < 1.0);
        assert!(report.mean_scores.contains_key("ROUGE-L"));
    }

    #[test]
    fn test_no_overlap_is_an_error() {
        let mut generated = GeneratedCaptions::new();
        generated.insert("other.jpg", "a caption");
        assert!(evaluate_captions(&generated, &references()).is_err());
    }

    #[test]
    fn test_execute_writes_report_next_to_results() {
        let dir = std::env::temp_dir()
            .join(format!("image_captioning_evaluate_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let results = dir.join("captions_test_results.json");
        fs::write(&results, r#"{"a.jpg": "a dog runs across the green field"}"#).unwrap();
        let refs = dir.join("refs.json");
        fs::write(&refs, r#"{"a.jpg": ["<start> a dog runs across the green field <end>"]}"#).unwrap();

        let report = EvaluateUseCase::new(results, vec![refs]).execute().unwrap();
        assert_eq!(report.images_scored, 1);

        let saved: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join(REPORT_FILE)).unwrap()).unwrap();
        assert_eq!(saved["images_scored"], 1);
        assert_eq!(saved["per_image"][0]["image"], "a.jpg");
        assert!(saved["corpus_bleu"].get("BLEU-4").is_some());

        fs::remove_dir_all(dir).ok();
    }
}
