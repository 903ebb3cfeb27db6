// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`    — fits the model and saves a run directory
//   2. `caption`  — captions images with a saved run
//   3. `evaluate` — scores generated captions (BLEU, ROUGE-L)
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{CaptionArgs, Commands, EvaluateArgs, TrainArgs};

use crate::application::train_use_case::TrainConfig;

/// The main CLI struct — clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "image-captioning",
    version = "0.1.0",
    about = "Train a CNN + Transformer image captioning model, generate captions, and score them."
)]
pub struct Cli {
    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    /// This keeps the CLI layer thin — it only routes, never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => Self::run_train(args),
            Commands::Caption(args)  => Self::run_caption(args),
            Commands::Evaluate(args) => Self::run_evaluate(args),
        }
    }

    /// Handles the `train` subcommand.
    /// A settings file, when given, wins over the individual flags.
    fn run_train(args: TrainArgs) -> Result<()> {
        use crate::application::train_use_case::TrainUseCase;

        let config = match &args.settings {
            Some(path) => {
                tracing::info!("Loading settings from '{}'", path.display());
                TrainConfig::load(path)?
            }
            None => args.into(),
        };

        let run_dir = TrainUseCase::new(config).execute()?;
        println!("Training complete. Artifacts saved to '{}'.", run_dir.display());
        Ok(())
    }

    /// Handles the `caption` subcommand.
    fn run_caption(args: CaptionArgs) -> Result<()> {
        use crate::application::caption_use_case::CaptionUseCase;

        let path = CaptionUseCase::new(args.run_dir, args.captions_dir, args.images).execute()?;
        println!("Captions saved to '{}'.", path.display());
        Ok(())
    }

    /// Handles the `evaluate` subcommand and prints the aggregate scores.
    fn run_evaluate(args: EvaluateArgs) -> Result<()> {
        use crate::application::evaluate_use_case::EvaluateUseCase;

        let report = EvaluateUseCase::new(args.results, args.references).execute()?;
        println!();
        for line in report.summary_lines() {
            println!("{line}");
        }
        Ok(())
    }
}
