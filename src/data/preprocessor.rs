// ============================================================
// Layer 4 — Caption Preprocessor
// ============================================================
// Standardises caption text before it reaches the vocabulary,
// the model, or the evaluation metrics.
//
// Cleaning steps (applied in order):
//   1. Lowercase
//   2. Delete punctuation, EXCEPT '<' and '>' so the sequence
//      markers <start> and <end> survive
//   3. Collapse runs of whitespace into one space and trim
//
// Reference: Rust Book §8 (Strings in Rust)

/// Marker prepended to every training caption
pub const START_TOKEN: &str = "<start>";

/// Marker appended to every training caption
pub const END_TOKEN: &str = "<end>";

const STRIPPED_PUNCTUATION: &str = "!\"#$%&'()*+,-./:;=?@[\\]^_`{|}~";

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Lowercase, strip punctuation, collapse whitespace.
    pub fn standardize(&self, text: &str) -> String {
        let lowered: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_whitespace() || c.is_control() { ' ' } else { c })
            .filter(|c| !STRIPPED_PUNCTUATION.contains(*c))
            .collect();

        lowered.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Remove the <start>/<end> markers from an already standardised caption.
    pub fn strip_markers(&self, text: &str) -> String {
        text.split_whitespace()
            .filter(|w| *w != START_TOKEN && *w != END_TOKEN)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Standardise, drop markers and split into word tokens.
    /// This is the tokenisation used by the evaluation metrics.
    pub fn metric_tokens(&self, text: &str) -> Vec<String> {
        self.strip_markers(&self.standardize(text))
            .split_whitespace()
            .map(String::from)
            .collect()
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_strips_punctuation() {
        let p = Preprocessor::new();
        assert_eq!(
            p.standardize("<start> A Dog, jumping over a fence! <end>"),
            "<start> a dog jumping over a fence <end>"
        );
    }

    #[test]
    fn test_keeps_markers() {
        let p = Preprocessor::new();
        assert_eq!(p.standardize("<START>  hi  <END>"), "<start> hi <end>");
    }

    #[test]
    fn test_collapses_whitespace() {
        let p = Preprocessor::new();
        assert_eq!(p.standardize("  two\t\tcats \n "), "two cats");
    }

    #[test]
    fn test_strip_markers() {
        let p = Preprocessor::new();
        assert_eq!(p.strip_markers("<start> a cat <end>"), "a cat");
    }

    #[test]
    fn test_metric_tokens() {
        let p = Preprocessor::new();
        assert_eq!(p.metric_tokens("<start> A cat. <end>"), vec!["a", "cat"]);
    }

    #[test]
    fn test_empty_string() {
        let p = Preprocessor::new();
        assert_eq!(p.standardize(""), "");
    }
}
