// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits that describe the captioning
// problem without any framework noise:
//
//   caption.rs — image → captions mappings (references and
//                generated output)
//   traits.rs  — CaptionSource and CaptionScorer abstractions
//   bleu.rs    — BLEU-n text similarity (sentence + corpus)
//   rouge.rs   — ROUGE-L text similarity
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only structs, enums, traits and pure functions
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Caption datasets keyed by image path
pub mod caption;

// Core abstractions (traits) that other layers implement
pub mod traits;

// BLEU score
pub mod bleu;

// ROUGE-L score
pub mod rouge;
