// ============================================================
// Layer 3 — Caption Domain Types
// ============================================================
// A caption dataset is a mapping from an image path to the list
// of reference captions written for that image, e.g.
//
//   "train2014/COCO_train2014_000000318556.jpg" → [
//       "<start> a very clean and well decorated kitchen <end>",
//       "<start> a kitchen with a window and a sink <end>",
//   ]
//
// ORDER MATTERS: the validation/test split takes the first N
// images in file order, so CaptionMapping keeps insertion order
// in a Vec and only uses a HashMap as a lookup index.
//
// Reference: Rust Book §8 (Vectors)

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Ordered image → reference captions mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptionMapping {
    entries: Vec<(String, Vec<String>)>,
    // image → position in `entries`
    index:   HashMap<String, usize>,
}

impl CaptionMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an image with its captions.
    /// Re-inserting an image appends the new captions to the existing entry
    /// so an image never appears twice.
    pub fn insert(&mut self, image: impl Into<String>, captions: Vec<String>) {
        let image = image.into();
        match self.index.get(&image) {
            Some(&pos) => self.entries[pos].1.extend(captions),
            None => {
                self.index.insert(image.clone(), self.entries.len());
                self.entries.push((image, captions));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Image paths in insertion order
    pub fn images(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(image, _)| image.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(image, captions)| (image.as_str(), captions.as_slice()))
    }

    pub fn captions(&self, image: &str) -> Option<&[String]> {
        self.index
            .get(image)
            .map(|&pos| self.entries[pos].1.as_slice())
    }

    /// Total number of (image, caption) pairs
    pub fn caption_count(&self) -> usize {
        self.entries.iter().map(|(_, c)| c.len()).sum()
    }

    /// Keep only the entries for which `keep` returns true.
    /// Returns the number of dropped images.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &[String]) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(image, captions)| keep(image, captions));
        self.reindex();
        before - self.entries.len()
    }

    /// Split into the first `n` entries and the remainder, preserving order.
    pub fn split_at(mut self, n: usize) -> (CaptionMapping, CaptionMapping) {
        let n    = n.min(self.entries.len());
        let rest = self.entries.split_off(n);
        self.reindex();
        (self, rest.into_iter().collect())
    }

    /// Merge another mapping into this one (captions of shared images are appended)
    pub fn merge(&mut self, other: CaptionMapping) {
        for (image, captions) in other.entries {
            self.insert(image, captions);
        }
    }

    /// Set of image keys, handy for disjointness checks
    pub fn image_set(&self) -> HashSet<&str> {
        self.images().collect()
    }

    pub fn into_entries(self) -> Vec<(String, Vec<String>)> {
        self.entries
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, (image, _))| (image.clone(), pos))
            .collect();
    }
}

impl FromIterator<(String, Vec<String>)> for CaptionMapping {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        let mut mapping = CaptionMapping::new();
        for (image, captions) in iter {
            mapping.insert(image, captions);
        }
        mapping
    }
}

/// One generated caption per image, as written by the `caption` command
/// and read back by `evaluate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratedCaptions {
    pub captions: BTreeMap<String, String>,
}

impl GeneratedCaptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, image: impl Into<String>, caption: impl Into<String>) {
        self.captions.insert(image.into(), caption.into());
    }

    pub fn len(&self) -> usize {
        self.captions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_keeps_order_and_merges_duplicates() {
        let mut m = CaptionMapping::new();
        m.insert("b.jpg", caps(&["one"]));
        m.insert("a.jpg", caps(&["two"]));
        m.insert("b.jpg", caps(&["three"]));

        let images: Vec<&str> = m.images().collect();
        assert_eq!(images, vec!["b.jpg", "a.jpg"]);
        assert_eq!(m.captions("b.jpg").unwrap().len(), 2);
        assert_eq!(m.caption_count(), 3);
    }

    #[test]
    fn test_split_at_clamps() {
        let m: CaptionMapping = (0..3)
            .map(|i| (format!("{i}.jpg"), caps(&["x"])))
            .collect();
        let (head, tail) = m.split_at(10);
        assert_eq!(head.len(), 3);
        assert!(tail.is_empty());
    }

    #[test]
    fn test_generated_captions_serialise_as_plain_object() {
        let mut g = GeneratedCaptions::new();
        g.insert("a.jpg", "a dog");
        let json = serde_json::to_string(&g).unwrap();
        assert_eq!(json, r#"{"a.jpg":"a dog"}"#);
    }
}
