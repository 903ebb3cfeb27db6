// ============================================================
// Layer 3 — ROUGE-L
// ============================================================
// Longest-common-subsequence F-measure (Lin, 2004) as used by
// the COCO caption evaluation toolkit:
//
//   P = max_ref LCS / |candidate|
//   R = max_ref LCS / |reference|
//   F = (1 + β²)·P·R / (R + β²·P)      with β = 1.2

use crate::domain::traits::CaptionScorer;

const BETA: f64 = 1.2;

#[derive(Debug, Clone, Copy, Default)]
pub struct RougeL;

impl CaptionScorer for RougeL {
    fn name(&self) -> String {
        "ROUGE-L".to_string()
    }

    fn score(&self, candidate: &[String], references: &[Vec<String>]) -> f64 {
        if candidate.is_empty() || references.is_empty() {
            return 0.0;
        }

        let mut best_p = 0.0f64;
        let mut best_r = 0.0f64;
        for reference in references.iter().filter(|r| !r.is_empty()) {
            let lcs = lcs_len(candidate, reference) as f64;
            best_p = best_p.max(lcs / candidate.len() as f64);
            best_r = best_r.max(lcs / reference.len() as f64);
        }

        if best_p == 0.0 || best_r == 0.0 {
            return 0.0;
        }
        let b2 = BETA * BETA;
        ((1.0 + b2) * best_p * best_r) / (best_r + b2 * best_p)
    }
}

/// Length of the longest common subsequence, O(|a|·|b|) time, O(|b|) memory.
fn lcs_len(a: &[String], b: &[String]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_lcs() {
        assert_eq!(lcs_len(&toks("a b c d"), &toks("a c d")), 3);
        assert_eq!(lcs_len(&toks("a b"), &toks("c d")), 0);
    }

    #[test]
    fn test_identical_is_one() {
        let c = toks("a cat sitting on a couch");
        assert_eq!(RougeL.score(&c, &[c.clone()]), 1.0);
    }

    #[test]
    fn test_partial_overlap_between_zero_and_one() {
        let s = RougeL.score(&toks("a cat on a couch"), &[toks("a black cat sleeping on the couch")]);
        assert!(s > 0.0 && s < 1.0);
    }

    #[test]
    fn test_no_overlap_is_zero() {
        assert_eq!(RougeL.score(&toks("dog"), &[toks("cat")]), 0.0);
    }
}
