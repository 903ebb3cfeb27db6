// ============================================================
// Layer 3 — BLEU
// ============================================================
// BLEU-n (Papineni et al., 2002):
//
//   p_k  = Σ clipped k-gram matches / Σ candidate k-grams
//   BP   = 1                  if c > r
//        = exp(1 - r / c)     otherwise
//   BLEU = BP · exp( (1/n) Σ_k ln p_k )
//
// where c is the candidate length and r the reference length
// closest to c (the shorter one on ties). A k-gram match is
// clipped to the largest count of that k-gram in any single
// reference.
//
// Two flavours:
//   - sentence level: one caption, zero counts smoothed with
//     ε / total so a short caption is not scored as exactly 0
//   - corpus level: counts summed over all captions first,
//     no smoothing (this is the number usually reported)

use std::collections::HashMap;

use crate::domain::traits::CaptionScorer;

const SMOOTHING_EPSILON: f64 = 0.1;

/// Clipped n-gram statistics for one candidate against its references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BleuStats {
    /// matches[k - 1] = clipped k-gram matches
    pub matches:          Vec<usize>,
    /// totals[k - 1]  = number of candidate k-grams
    pub totals:           Vec<usize>,
    pub candidate_len:    usize,
    pub reference_len:    usize,
}

impl BleuStats {
    pub fn new(max_order: usize) -> Self {
        Self {
            matches: vec![0; max_order],
            totals:  vec![0; max_order],
            ..Default::default()
        }
    }

    /// Collect statistics for a single candidate.
    pub fn collect(candidate: &[String], references: &[Vec<String>], max_order: usize) -> Self {
        let mut stats = BleuStats::new(max_order);
        stats.candidate_len = candidate.len();
        stats.reference_len = closest_reference_len(candidate.len(), references);

        for order in 1..=max_order {
            let cand_counts = ngram_counts(candidate, order);

            // Max count of every n-gram over the references
            let mut max_ref_counts: HashMap<&[String], usize> = HashMap::new();
            for reference in references {
                for (gram, count) in ngram_counts(reference, order) {
                    let entry = max_ref_counts.entry(gram).or_insert(0);
                    *entry = (*entry).max(count);
                }
            }

            let clipped: usize = cand_counts
                .iter()
                .map(|(gram, &count)| count.min(*max_ref_counts.get(gram).unwrap_or(&0)))
                .sum();

            stats.matches[order - 1] = clipped;
            stats.totals[order - 1]  = candidate.len().saturating_sub(order - 1);
        }
        stats
    }

    /// Accumulate another caption's statistics (corpus BLEU)
    pub fn add(&mut self, other: &BleuStats) {
        for (m, o) in self.matches.iter_mut().zip(&other.matches) {
            *m += o;
        }
        for (t, o) in self.totals.iter_mut().zip(&other.totals) {
            *t += o;
        }
        self.candidate_len += other.candidate_len;
        self.reference_len += other.reference_len;
    }

    pub fn brevity_penalty(&self) -> f64 {
        let c = self.candidate_len as f64;
        let r = self.reference_len as f64;
        if self.candidate_len == 0 {
            0.0
        } else if c > r {
            1.0
        } else {
            (1.0 - r / c).exp()
        }
    }

    /// BLEU with uniform weights over orders 1..=n, no smoothing.
    pub fn score(&self, n: usize) -> f64 {
        self.score_with(n, false)
    }

    /// BLEU with uniform weights over orders 1..=n, zero counts smoothed.
    pub fn smoothed_score(&self, n: usize) -> f64 {
        self.score_with(n, true)
    }

    fn score_with(&self, n: usize, smooth: bool) -> f64 {
        let n = n.min(self.matches.len());
        if n == 0 || self.candidate_len == 0 {
            return 0.0;
        }

        let mut log_sum = 0.0f64;
        for k in 0..n {
            let (m, t) = (self.matches[k], self.totals[k]);
            let precision = if m > 0 && t > 0 {
                m as f64 / t as f64
            } else if smooth {
                SMOOTHING_EPSILON / t.max(1) as f64
            } else {
                return 0.0;
            };
            log_sum += precision.ln();
        }

        self.brevity_penalty() * (log_sum / n as f64).exp()
    }
}

/// Sentence-level BLEU-n scorer.
#[derive(Debug, Clone, Copy)]
pub struct Bleu {
    pub max_order: usize,
}

impl Bleu {
    pub fn new(max_order: usize) -> Self {
        Self { max_order }
    }
}

impl CaptionScorer for Bleu {
    fn name(&self) -> String {
        format!("BLEU-{}", self.max_order)
    }

    fn score(&self, candidate: &[String], references: &[Vec<String>]) -> f64 {
        BleuStats::collect(candidate, references, self.max_order).smoothed_score(self.max_order)
    }
}

fn ngram_counts(tokens: &[String], order: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if order == 0 || tokens.len() < order {
        return counts;
    }
    for gram in tokens.windows(order) {
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}

fn closest_reference_len(candidate_len: usize, references: &[Vec<String>]) -> usize {
    references
        .iter()
        .map(|r| r.len())
        .min_by_key(|&len| (len.abs_diff(candidate_len), len))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_identical_caption_scores_one() {
        let cand = toks("a man riding a wave on top of a surfboard");
        let refs = vec![cand.clone()];
        for n in 1..=4 {
            assert_eq!(Bleu::new(n).score(&cand, &refs), 1.0);
        }
    }

    #[test]
    fn test_matches_are_clipped() {
        // Classic example: "the the the the" vs "the cat"
        let cand  = toks("the the the the");
        let refs  = vec![toks("the cat")];
        let stats = BleuStats::collect(&cand, &refs, 1);
        assert_eq!(stats.matches[0], 1);
        assert_eq!(stats.totals[0], 4);
    }

    #[test]
    fn test_brevity_penalty_uses_closest_reference() {
        let cand  = toks("a dog");
        let refs  = vec![toks("a dog runs"), toks("a big brown dog runs fast")];
        let stats = BleuStats::collect(&cand, &refs, 1);
        assert_eq!(stats.reference_len, 3);
        let expected = (1.0f64 - 3.0 / 2.0).exp();
        assert!((stats.brevity_penalty() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_unrelated_caption_is_near_zero() {
        let cand  = toks("zebra giraffe elephant");
        let refs  = vec![toks("a man riding a bike")];
        let score = Bleu::new(4).score(&cand, &refs);
        assert!(score < 0.05, "score was {score}");
        assert_eq!(BleuStats::collect(&cand, &refs, 4).score(4), 0.0);
    }

    #[test]
    fn test_corpus_accumulation() {
        let a = BleuStats::collect(&toks("a cat on a mat"), &[toks("a cat on a mat")], 4);
        let b = BleuStats::collect(&toks("two dogs play outside"), &[toks("two dogs play outside")], 4);
        let mut corpus = BleuStats::new(4);
        corpus.add(&a);
        corpus.add(&b);
        assert_eq!(corpus.candidate_len, 9);
        assert_eq!(corpus.score(4), 1.0);
    }

    #[test]
    fn test_empty_candidate() {
        assert_eq!(Bleu::new(4).score(&[], &[toks("a cat")]), 0.0);
    }
}
