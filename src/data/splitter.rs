// ============================================================
// Layer 4 — Dataset Reduction and Split Policy
// ============================================================
// The raw data ships as two caption files: train and valid.
// The held-out TEST set is carved out of the validation file:
//
//   valid file (file order) ──► first NUM_VALID_IMG images → validation
//                           └─► every remaining image    → test
//
// For quick experiments the datasets can also be REDUCED to the
// first NUM_TRAIN_IMG + 1 / NUM_VALID_IMG + 1 images. The extra
// image is deliberate: after reduction, the valid/test split
// still leaves exactly one test image.
//
// Invariant (checked in the tests below):
//   validation ∩ test = ∅  and  validation ∪ test = input
//
// SplitPolicy::Random shuffles the validation file with a fixed
// seed before cutting it, for datasets whose file order is
// itself biased (e.g. sorted by category).
//
// Reference: rand crate documentation (SliceRandom, StdRng)

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::caption::CaptionMapping;

/// How the validation file is divided into validation and test sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitPolicy {
    /// First N images in file order
    #[default]
    Ordered,
    /// First N images after a seeded shuffle
    Random,
}

/// Keep the first `num_train + 1` training and `num_valid + 1` validation images.
pub fn reduce_dataset_dim(
    train:     CaptionMapping,
    valid:     CaptionMapping,
    num_train: usize,
    num_valid: usize,
) -> (CaptionMapping, CaptionMapping) {
    let (train, _) = train.split_at(num_train.saturating_add(1));
    let (valid, _) = valid.split_at(num_valid.saturating_add(1));
    tracing::debug!("Reduced dataset to {} train / {} valid images", train.len(), valid.len());
    (train, valid)
}

/// Split the validation mapping into (validation, test) by file order.
pub fn valid_test_split(valid: CaptionMapping, num_valid: usize) -> (CaptionMapping, CaptionMapping) {
    valid.split_at(num_valid)
}

/// Split the validation mapping into (validation, test) after a seeded shuffle.
/// The same seed always produces the same split.
pub fn valid_test_split_random(
    valid:     CaptionMapping,
    num_valid: usize,
    seed:      u64,
) -> (CaptionMapping, CaptionMapping) {
    let mut entries = valid.into_entries();
    let mut rng     = StdRng::seed_from_u64(seed);
    entries.shuffle(&mut rng);
    entries.into_iter().collect::<CaptionMapping>().split_at(num_valid)
}

/// Apply the configured policy.
pub fn split_validation(
    policy:    SplitPolicy,
    valid:     CaptionMapping,
    num_valid: usize,
    seed:      u64,
) -> (CaptionMapping, CaptionMapping) {
    let (valid, test) = match policy {
        SplitPolicy::Ordered => valid_test_split(valid, num_valid),
        SplitPolicy::Random  => valid_test_split_random(valid, num_valid, seed),
    };
    tracing::debug!(
        "Validation split ({:?}): {} validation, {} test",
        policy,
        valid.len(),
        test.len()
    );
    (valid, test)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn mapping(n: usize) -> CaptionMapping {
        (0..n)
            .map(|i| (format!("img_{i}.jpg"), vec![format!("<start> caption {i} <end>")]))
            .collect()
    }

    fn assert_partition(original: &CaptionMapping, a: &CaptionMapping, b: &CaptionMapping) {
        let a_set = a.image_set();
        let b_set = b.image_set();
        assert!(a_set.is_disjoint(&b_set), "splits overlap");

        let union: HashSet<&str> = a_set.union(&b_set).copied().collect();
        assert_eq!(union, original.image_set());
        assert_eq!(a.len() + b.len(), original.len());
    }

    #[test]
    fn test_ordered_split_is_a_partition() {
        let original     = mapping(50);
        let (valid, test) = valid_test_split(original.clone(), 30);
        assert_eq!(valid.len(), 30);
        assert_eq!(test.len(), 20);
        assert_partition(&original, &valid, &test);
        // first N in file order stay in validation
        assert_eq!(valid.images().next(), Some("img_0.jpg"));
        assert_eq!(test.images().next(), Some("img_30.jpg"));
    }

    #[test]
    fn test_random_split_is_a_seeded_partition() {
        let original = mapping(40);
        let (v1, t1) = valid_test_split_random(original.clone(), 25, 7);
        let (v2, _)  = valid_test_split_random(original.clone(), 25, 7);
        assert_partition(&original, &v1, &t1);
        assert_eq!(v1, v2);
    }

    #[test]
    fn test_split_larger_than_input_leaves_empty_test() {
        let (valid, test) = valid_test_split(mapping(5), 100);
        assert_eq!(valid.len(), 5);
        assert!(test.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let (valid, test) = split_validation(SplitPolicy::Random, CaptionMapping::new(), 10, 1);
        assert!(valid.is_empty());
        assert!(test.is_empty());
    }

    #[test]
    fn test_reduce_keeps_one_extra_image() {
        let (train, valid) = reduce_dataset_dim(mapping(100), mapping(100), 10, 5);
        assert_eq!(train.len(), 11);
        assert_eq!(valid.len(), 6);

        // ...which becomes the single test image after the split
        let (valid, test) = valid_test_split(valid, 5);
        assert_eq!(valid.len(), 5);
        assert_eq!(test.len(), 1);
    }
}
