// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `caption` and
// `evaluate`, and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;
use crate::data::splitter::SplitPolicy;

/// The three top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the captioning model and save a timestamped run directory
    Train(TrainArgs),

    /// Generate captions with a trained run
    Caption(CaptionArgs),

    /// Score generated captions with BLEU and ROUGE-L
    Evaluate(EvaluateArgs),
}

/// How the validation file is divided into validation and test images
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SplitPolicyArg {
    /// First NUM_VALID_IMG images in file order
    Ordered,
    /// First NUM_VALID_IMG images after a seeded shuffle
    Random,
}

impl From<SplitPolicyArg> for SplitPolicy {
    fn from(p: SplitPolicyArg) -> Self {
        match p {
            SplitPolicyArg::Ordered => SplitPolicy::Ordered,
            SplitPolicyArg::Random  => SplitPolicy::Random,
        }
    }
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON settings file; when given, it replaces every flag below
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Training caption mapping { image: [captions] }
    #[arg(long, default_value = "datasets/captions/captions_mapping_train.json")]
    pub train_data_path: String,

    /// Validation caption mapping; the test set is carved out of it
    #[arg(long, default_value = "datasets/captions/captions_mapping_valid.json")]
    pub valid_data_path: String,

    /// JSON array of training captions used to fit the vocabulary
    #[arg(long, default_value = "datasets/captions/text_data.json")]
    pub text_data_path: String,

    /// Directory the image paths in the caption files are relative to
    #[arg(long, default_value = ".")]
    pub image_root: String,

    /// Parent directory of the timestamped run directories
    #[arg(long, default_value = "save_train_dir")]
    pub save_dir: String,

    /// Images are resized to IMAGE_SIZE × IMAGE_SIZE
    #[arg(long, default_value_t = 299)]
    pub image_size: usize,

    /// Upper bound on the vocabulary size, special tokens included
    #[arg(long, default_value_t = 2_000_000)]
    pub max_vocab_size: usize,

    /// Fixed caption length in tokens, <start> and <end> included
    #[arg(long, default_value_t = 25)]
    pub seq_length: usize,

    /// Width of the image tokens and word embeddings
    #[arg(long, default_value_t = 512)]
    pub embed_dim: usize,

    /// Attention heads; embed_dim must be divisible by num_heads
    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    /// Inner dimension of the decoder feed-forward network
    #[arg(long, default_value_t = 1024)]
    pub ff_dim: usize,

    /// Number of (image, caption) pairs per optimiser step
    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    /// Maximum number of full passes through the training data
    #[arg(long, default_value_t = 14)]
    pub epochs: usize,

    /// Training images kept when --reduce-dataset is set
    #[arg(long, default_value_t = 68_363)]
    pub num_train_img: usize,

    /// Validation images; the rest of the validation file is the test set
    #[arg(long, default_value_t = 20_000)]
    pub num_valid_img: usize,

    /// Keep only the first NUM_TRAIN_IMG + 1 / NUM_VALID_IMG + 1 images
    #[arg(long)]
    pub reduce_dataset: bool,

    #[arg(long, value_enum, default_value_t = SplitPolicyArg::Ordered)]
    pub split_policy: SplitPolicyArg,

    /// Seed for the data loader shuffle and the random split policy
    #[arg(long, default_value_t = 42)]
    pub shuffle_seed: u64,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Channels of the first CNN convolution
    #[arg(long, default_value_t = 32)]
    pub cnn_channels: usize,

    /// Optimiser steps before the learning rate peaks
    #[arg(long, default_value_t = 4000)]
    pub warmup_steps: usize,

    /// Epochs without validation-loss improvement before stopping
    #[arg(long, default_value_t = 3)]
    pub patience: usize,

    /// Data loader worker threads
    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            train_data_path: a.train_data_path,
            valid_data_path: a.valid_data_path,
            text_data_path:  a.text_data_path,
            image_root:      a.image_root,
            save_dir:        a.save_dir,
            image_size:      a.image_size,
            max_vocab_size:  a.max_vocab_size,
            seq_length:      a.seq_length,
            embed_dim:       a.embed_dim,
            num_heads:       a.num_heads,
            ff_dim:          a.ff_dim,
            batch_size:      a.batch_size,
            epochs:          a.epochs,
            num_train_img:   a.num_train_img,
            num_valid_img:   a.num_valid_img,
            reduce_dataset:  a.reduce_dataset,
            split_policy:    a.split_policy.into(),
            shuffle_seed:    a.shuffle_seed,
            dropout:         a.dropout,
            cnn_channels:    a.cnn_channels,
            warmup_steps:    a.warmup_steps,
            patience:        a.patience,
            num_workers:     a.num_workers,
        }
    }
}

/// All arguments for the `caption` command
#[derive(Args, Debug)]
pub struct CaptionArgs {
    /// Run directory written by `train`, e.g. save_train_dir/10_30_2022_07_31_12
    #[arg(long)]
    pub run_dir: PathBuf,

    /// Results go to <captions_dir>/<run id>/captions_test_results.json
    #[arg(long, default_value = "save_captions")]
    pub captions_dir: PathBuf,

    /// Caption the keys of this mapping instead of the run's test split
    #[arg(long)]
    pub images: Option<PathBuf>,
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Generated captions JSON written by `caption`
    #[arg(long)]
    pub results: PathBuf,

    /// Reference caption mappings (repeatable)
    #[arg(
        long,
        num_args = 1..,
        default_values = [
            "datasets/captions/captions_raw_val.json",
            "datasets/captions/captions_raw_test.json",
        ]
    )]
    pub references: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["image-captioning", "train"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        assert_eq!(TrainConfig::from(args), TrainConfig::default());
    }

    #[test]
    fn test_train_flags_reach_the_config() {
        let cli = Cli::try_parse_from([
            "image-captioning", "train",
            "--epochs", "2", "--reduce-dataset", "--split-policy", "random",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg = TrainConfig::from(args);
        assert_eq!(cfg.epochs, 2);
        assert!(cfg.reduce_dataset);
        assert_eq!(cfg.split_policy, SplitPolicy::Random);
    }

    #[test]
    fn test_evaluate_has_default_references() {
        let cli = Cli::try_parse_from(["image-captioning", "evaluate", "--results", "r.json"]).unwrap();
        let Commands::Evaluate(args) = cli.command else { panic!("expected evaluate") };
        assert_eq!(args.references.len(), 2);
    }
}
