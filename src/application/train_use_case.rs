// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load caption JSONs          (Layer 4 - data)
//   Step 2: Reduce + split valid/test   (Layer 4 - data)
//   Step 3: Fit the vocabulary          (Layer 6 - infra)
//   Step 4: Build datasets              (Layer 4 - data)
//   Step 5: Create run dir, save config (Layer 6 - infra)
//   Step 6: Run training loop           (Layer 5 - ml)
//   Step 7: Save history + metrics      (Layer 6 - infra)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

use crate::data::{
    dataset::CaptionDataset,
    loader::{load_text_corpus, retain_existing_images, JsonCaptionLoader},
    splitter::{reduce_dataset_dim, split_validation, SplitPolicy},
};
use crate::domain::{caption::CaptionMapping, traits::CaptionSource};
use crate::infra::{
    checkpoint::{RunDirectory, RunId},
    metrics::MetricsResults,
    vocabulary::VocabularyStore,
};
use crate::ml::{
    early_stopping::DEFAULT_PATIENCE,
    model::ImageCaptioningConfig,
    schedule::DEFAULT_WARMUP_STEPS,
    trainer::{run_training, Splits},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Serialised with upper-case keys into config_train.json, and
// loadable from a (possibly partial) JSON settings file: missing
// keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct TrainConfig {
    pub train_data_path: String,
    pub valid_data_path: String,
    pub text_data_path:  String,
    pub image_root:      String,
    pub save_dir:        String,
    pub image_size:      usize,
    pub max_vocab_size:  usize,
    pub seq_length:      usize,
    pub embed_dim:       usize,
    pub num_heads:       usize,
    pub ff_dim:          usize,
    pub batch_size:      usize,
    pub epochs:          usize,
    pub num_train_img:   usize,
    pub num_valid_img:   usize,
    pub reduce_dataset:  bool,
    pub split_policy:    SplitPolicy,
    pub shuffle_seed:    u64,
    pub dropout:         f64,
    pub cnn_channels:    usize,
    pub warmup_steps:    usize,
    pub patience:        usize,
    pub num_workers:     usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_data_path: "datasets/captions/captions_mapping_train.json".to_string(),
            valid_data_path: "datasets/captions/captions_mapping_valid.json".to_string(),
            text_data_path:  "datasets/captions/text_data.json".to_string(),
            image_root:      ".".to_string(),
            save_dir:        "save_train_dir".to_string(),
            image_size:      299,
            max_vocab_size:  2_000_000,
            seq_length:      25,
            embed_dim:       512,
            num_heads:       8,
            ff_dim:          1024,
            batch_size:      64,
            epochs:          14,
            num_train_img:   68_363,
            num_valid_img:   20_000,
            reduce_dataset:  false,
            split_policy:    SplitPolicy::Ordered,
            shuffle_seed:    42,
            dropout:         0.1,
            cnn_channels:    32,
            warmup_steps:    DEFAULT_WARMUP_STEPS,
            patience:        DEFAULT_PATIENCE,
            num_workers:     1,
        }
    }
}

impl TrainConfig {
    /// Read a settings JSON. Keys absent from the file keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read settings file '{}'", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Malformed settings file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the model cannot be built with.
    pub fn validate(&self) -> Result<()> {
        if self.num_heads == 0 || self.embed_dim % self.num_heads != 0 {
            bail!(
                "EMBED_DIM ({}) must be a multiple of NUM_HEADS ({})",
                self.embed_dim, self.num_heads
            );
        }
        if self.seq_length < 2 {
            bail!("SEQ_LENGTH must be at least 2, got {}", self.seq_length);
        }
        if self.batch_size == 0 {
            bail!("BATCH_SIZE must be positive");
        }
        // four stride-2 convolutions
        if self.image_size < 16 {
            bail!("IMAGE_SIZE must be at least 16, got {}", self.image_size);
        }
        if self.warmup_steps == 0 {
            bail!("WARMUP_STEPS must be positive");
        }
        Ok(())
    }
}

// ─── Persisted record ────────────────────────────────────────────────────────
// config_train.json: every supplied hyperparameter, unchanged, plus
// what was learned from the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TrainRecord {
    #[serde(flatten)]
    pub config:       TrainConfig,
    pub vocab_size:   usize,
    pub num_test_img: usize,
}

impl TrainRecord {
    pub fn new(config: TrainConfig, vocab_size: usize, num_test_img: usize) -> Self {
        Self { config, vocab_size, num_test_img }
    }

    /// The architecture the weights of this run belong to.
    pub fn model_config(&self) -> ImageCaptioningConfig {
        let cfg = &self.config;
        ImageCaptioningConfig::new(
            self.vocab_size,
            cfg.seq_length,
            cfg.embed_dim,
            cfg.ff_dim,
            cfg.num_heads,
        )
        .with_dropout(cfg.dropout)
        .with_cnn_channels(cfg.cnn_channels)
    }
}

// ─── Caption splits ──────────────────────────────────────────────────────────
/// Train / validation / test caption mappings of a run.
pub struct CaptionSplits {
    pub train: CaptionMapping,
    pub valid: CaptionMapping,
    pub test:  CaptionMapping,
}

/// Load both caption files and derive the three splits.
/// Deterministic for a given config, so `caption` can re-derive the
/// exact test set a run was evaluated on.
pub fn prepare_splits(cfg: &TrainConfig) -> Result<CaptionSplits> {
    let image_root = Path::new(&cfg.image_root);

    let mut train = JsonCaptionLoader::new(&cfg.train_data_path).load()?;
    let mut valid = JsonCaptionLoader::new(&cfg.valid_data_path).load()?;
    retain_existing_images(&mut train, image_root);
    retain_existing_images(&mut valid, image_root);

    if cfg.reduce_dataset {
        (train, valid) = reduce_dataset_dim(train, valid, cfg.num_train_img, cfg.num_valid_img);
    }

    let (valid, test) = split_validation(cfg.split_policy, valid, cfg.num_valid_img, cfg.shuffle_seed);
    Ok(CaptionSplits { train, valid, test })
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the config and runs the full training pipeline.
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    /// Create a new TrainUseCase with the given configuration
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end.
    /// Returns the run directory holding the artifacts.
    pub fn execute(&self) -> Result<PathBuf> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1–2: Load caption files, reduce, split ───────────────────────
        tracing::info!(
            "Loading captions from '{}' and '{}'",
            cfg.train_data_path, cfg.valid_data_path
        );
        let splits = prepare_splits(cfg)?;
        tracing::info!("Number of training samples:   {}", splits.train.len());
        tracing::info!("Number of validation samples: {}", splits.valid.len());
        tracing::info!("Number of test samples:       {}", splits.test.len());

        // ── Step 3: Fit the vocabulary on the training corpus ─────────────────
        let corpus = load_text_corpus(&cfg.text_data_path)?;
        let vocab  = VocabularyStore::build(&corpus, cfg.max_vocab_size, cfg.seq_length)?;
        tracing::info!("Vocabulary size: {}", vocab.size());

        // ── Step 4: Build Burn datasets ───────────────────────────────────────
        let datasets = Splits {
            train: CaptionDataset::from_mapping(&splits.train, &vocab)?,
            valid: CaptionDataset::from_mapping(&splits.valid, &vocab)?,
            test:  CaptionDataset::from_mapping(&splits.test,  &vocab)?,
        };
        tracing::info!(
            "Windowed {} / {} / {} (image, caption) pairs",
            datasets.train.sample_count(),
            datasets.valid.sample_count(),
            datasets.test.sample_count()
        );

        // ── Step 5: Run directory, config and vocabulary ──────────────────────
        let run_dir = RunDirectory::create(&cfg.save_dir, RunId::now())?;
        let record  = TrainRecord::new(cfg.clone(), vocab.size(), splits.test.len());
        run_dir.save_config(&record)?;
        run_dir.save_vocabulary(&vocab)?;

        // ── Step 6: Run training loop (Layer 5) ───────────────────────────────
        let report = run_training(cfg, &record.model_config(), datasets, &run_dir)?;

        // ── Step 7: History and final metrics ─────────────────────────────────
        run_dir.save_history(&report.history)?;
        let results = MetricsResults::new(&report.train, &report.valid, &report.test);
        run_dir.save_metrics(&results)?;

        tracing::info!("{}", results.train_set);
        tracing::info!("{}", results.valid_set);
        tracing::info!("{}", results.test_set);
        if let Some(epoch) = report.best_epoch {
            tracing::info!("Best epoch: {} of {}", epoch, report.history.epochs());
        }

        Ok(run_dir.path().to_path_buf())
    }
}
