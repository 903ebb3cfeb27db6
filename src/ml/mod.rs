// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains the Burn model, its training loop and
// caption generation. The data layer only touches Burn through
// its Dataset / Batcher traits.
//
// What's in this layer:
//
//   model.rs          — CNN image encoder + Transformer encoder
//                       block + Transformer decoder block
//                       • strided convolutions → 8×8 image tokens
//                       • causal + padding masked self-attention
//                       • cross-attention over image tokens
//                       • padding-aware loss and token accuracy
//
//   schedule.rs       — warmup / inverse-square-root learning rate
//
//   early_stopping.rs — patience on validation loss
//
//   trainer.rs        — the fit loop: forward, loss, backward,
//                       Adam step, validation, best-weight restore
//
//   inferencer.rs     — reloads a run and decodes captions greedily
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need

/// CNN + Transformer captioning model
pub mod model;

/// Learning-rate schedule
pub mod schedule;

/// Early stopping on validation loss
pub mod early_stopping;

/// Full training loop with validation and checkpointing
pub mod trainer;

/// Inference engine — loads a run and generates captions
pub mod inferencer;
