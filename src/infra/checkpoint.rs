// ============================================================
// Layer 6 — Run Directory (checkpoints and artifacts)
// ============================================================
// Every training run writes its artifacts into a fresh directory
// named after the run's start time:
//
//   save_train_dir/
//     10_30_2022_07_31_12/
//       config_train.json      ← hyperparameters + dataset sizes
//       tokenizer.json         ← fitted vocabulary
//       metrics.csv            ← per-epoch rows, appended during training
//       history.json           ← per-epoch loss / accuracy arrays
//       model_weights.mpk.gz   ← best weights (Burn CompactRecorder)
//       metrics_results.json   ← final train / valid / test metrics
//
// Artifacts are created once and never rewritten: the directory
// itself must not exist beforehand, and each file is opened with
// create_new so a second write fails instead of overwriting.
//
// Why save the config next to the weights?
//   The `caption` command must rebuild the exact architecture
//   (vocab size, embed dim, heads...) before loading the weights.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{bail, Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use chrono::Local;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fmt,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainRecord;
use crate::infra::metrics::{MetricsResults, TrainingHistory};
use crate::infra::vocabulary::{Vocabulary, VocabularyStore, VOCABULARY_FILE};
use crate::ml::model::ImageCaptioningModel;

/// month_day_year_hour_minute_second, e.g. 10_30_2022_07_31_12
pub const RUN_ID_FORMAT: &str = "%m_%d_%Y_%H_%M_%S";

const CONFIG_FILE:  &str = "config_train.json";
const HISTORY_FILE: &str = "history.json";
const METRICS_FILE: &str = "metrics_results.json";
const WEIGHTS_NAME: &str = "model_weights";

/// Identifies one training run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunId(String);

impl RunId {
    pub fn now() -> Self {
        Self(Local::now().format(RUN_ID_FORMAT).to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owns the artifact directory of a single run.
pub struct RunDirectory {
    dir: PathBuf,
    id:  RunId,
}

impl RunDirectory {
    /// Create `save_dir/<id>`. Fails if the run directory already exists.
    pub fn create(save_dir: impl AsRef<Path>, id: RunId) -> Result<Self> {
        let save_dir = save_dir.as_ref();
        fs::create_dir_all(save_dir)
            .with_context(|| format!("Cannot create save directory '{}'", save_dir.display()))?;

        let dir = save_dir.join(id.as_str());
        fs::create_dir(&dir).with_context(|| {
            format!("Cannot create run directory '{}' (does it already exist?)", dir.display())
        })?;

        tracing::info!("Run directory: '{}'", dir.display());
        Ok(Self { dir, id })
    }

    /// Open the directory of a finished run.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir: PathBuf = dir.into();
        if !dir.is_dir() {
            bail!("Run directory '{}' does not exist. Have you run 'train' first?", dir.display());
        }
        let id = dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(RunId::new)
            .with_context(|| format!("Run directory '{}' has no usable name", dir.display()))?;
        Ok(Self { dir, id })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    // ── JSON artifacts ────────────────────────────────────────────────────────

    pub fn save_config(&self, record: &TrainRecord) -> Result<()> {
        self.write_json(CONFIG_FILE, record)
    }

    pub fn load_config(&self) -> Result<TrainRecord> {
        self.read_json(CONFIG_FILE)
    }

    pub fn save_history(&self, history: &TrainingHistory) -> Result<()> {
        self.write_json(HISTORY_FILE, history)
    }

    pub fn save_metrics(&self, metrics: &MetricsResults) -> Result<()> {
        self.write_json(METRICS_FILE, metrics)
    }

    // ── Vocabulary ────────────────────────────────────────────────────────────

    pub fn save_vocabulary(&self, vocab: &Vocabulary) -> Result<()> {
        self.ensure_absent(VOCABULARY_FILE)?;
        vocab.save(&self.dir)
    }

    pub fn load_vocabulary(&self, seq_length: usize) -> Result<Vocabulary> {
        VocabularyStore::load(&self.dir, seq_length)
    }

    // ── Model weights ─────────────────────────────────────────────────────────

    /// Serialise the model parameters with CompactRecorder
    /// (MessagePack + gzip, half precision).
    pub fn save_model<B: Backend>(&self, model: &ImageCaptioningModel<B>) -> Result<()> {
        self.ensure_absent(&format!("{WEIGHTS_NAME}.mpk.gz"))?;
        let path = self.dir.join(WEIGHTS_NAME);

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save weights to '{}'", path.display()))?;

        tracing::info!("Saved model weights to '{}.mpk.gz'", path.display());
        Ok(())
    }

    /// Restore weights into a freshly initialised model of the same architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  ImageCaptioningModel<B>,
        device: &B::Device,
    ) -> Result<ImageCaptioningModel<B>> {
        let path = self.dir.join(WEIGHTS_NAME);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load weights '{}.mpk.gz'. Did training finish?", path.display())
            })?;

        tracing::info!("Loaded model weights from '{}'", self.dir.display());
        Ok(model.load_record(record))
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    fn ensure_absent(&self, name: &str) -> Result<()> {
        let path = self.dir.join(name);
        if path.exists() {
            bail!("Refusing to overwrite existing artifact '{}'", path.display());
        }
        Ok(())
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(value)?;

        let mut f = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("Cannot create artifact '{}'", path.display()))?;
        f.write_all(json.as_bytes())
            .with_context(|| format!("Cannot write artifact '{}'", path.display()))?;

        tracing::debug!("Wrote '{}'", path.display());
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed JSON in '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("image_captioning_run_{}_{}", name, std::process::id()))
    }

    #[test]
    fn test_run_id_format() {
        let id = RunId::now();
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 6);
        assert_eq!(parts[2].len(), 4);
    }

    #[test]
    fn test_create_refuses_existing_directory() {
        let save = scratch("twice");
        let id   = RunId::new("01_01_2024_00_00_00");
        RunDirectory::create(&save, id.clone()).unwrap();
        assert!(RunDirectory::create(&save, id).is_err());
        fs::remove_dir_all(save).ok();
    }

    #[test]
    fn test_config_is_persisted_exactly() {
        let save = scratch("config");
        let run  = RunDirectory::create(&save, RunId::new("config_run")).unwrap();

        let config = TrainConfig { embed_dim: 128, num_heads: 4, epochs: 3, ..TrainConfig::default() };
        let record = TrainRecord::new(config.clone(), 321, 17);
        run.save_config(&record).unwrap();

        // Raw JSON fields equal the supplied hyperparameters
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(run.path().join(CONFIG_FILE)).unwrap()).unwrap();
        assert_eq!(raw["EMBED_DIM"], 128);
        assert_eq!(raw["NUM_HEADS"], 4);
        assert_eq!(raw["EPOCHS"], 3);
        assert_eq!(raw["SEQ_LENGTH"], config.seq_length);
        assert_eq!(raw["MAX_VOCAB_SIZE"], config.max_vocab_size);
        assert_eq!(raw["VOCAB_SIZE"], 321);
        assert_eq!(raw["NUM_TEST_IMG"], 17);

        let reopened = RunDirectory::open(run.path()).unwrap();
        assert_eq!(reopened.load_config().unwrap(), record);

        fs::remove_dir_all(save).ok();
    }

    #[test]
    fn test_artifacts_are_never_overwritten() {
        let save = scratch("overwrite");
        let run  = RunDirectory::create(&save, RunId::new("r")).unwrap();
        run.save_history(&TrainingHistory::default()).unwrap();
        assert!(run.save_history(&TrainingHistory::default()).is_err());
        fs::remove_dir_all(save).ok();
    }

    #[test]
    fn test_open_missing_run_is_an_error() {
        assert!(RunDirectory::open("/no/such/run").is_err());
    }
}
