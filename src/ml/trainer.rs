// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Fit + evaluate using Burn's DataLoader and Adam.
//
//   for each epoch:
//     train pass   (autodiff backend, lr from WarmupSchedule per step)
//     valid pass   (model.valid() → inner backend, dropout off)
//     history / metrics.csv / early stopping
//   restore the best-epoch weights
//   evaluate train, valid and test once more
//   save weights into the run directory
//
// Key Burn insight:
//   - Training uses an AutodiffBackend (Autodiff<Wgpu> in production)
//   - model.valid() returns the model on B::InnerBackend (plain Wgpu)
//   - Evaluation loaders must therefore batch on B::InnerBackend
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{bail, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::{path::PathBuf, sync::Arc};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::{CaptionBatch, CaptionBatcher}, dataset::CaptionDataset};
use crate::infra::checkpoint::RunDirectory;
use crate::infra::metrics::{EpochMetrics, MetricsLogger, SplitMetrics, TrainingHistory};
use crate::ml::early_stopping::{Decision, EarlyStopping};
use crate::ml::model::{ImageCaptioningConfig, ImageCaptioningModel};
use crate::ml::schedule::WarmupSchedule;

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// The three datasets of a run.
pub struct Splits {
    pub train: CaptionDataset,
    pub valid: CaptionDataset,
    pub test:  CaptionDataset,
}

/// Everything the training run produced, besides the weights file.
pub struct TrainReport {
    pub history:    TrainingHistory,
    pub best_epoch: Option<usize>,
    pub train:      SplitMetrics,
    pub valid:      SplitMetrics,
    pub test:       SplitMetrics,
}

pub fn run_training(
    cfg:       &TrainConfig,
    model_cfg: &ImageCaptioningConfig,
    splits:    Splits,
    run_dir:   &RunDirectory,
) -> Result<TrainReport> {
    if splits.train.sample_count() == 0 {
        bail!("The training set is empty; nothing to fit");
    }
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<MyBackend>(cfg, model_cfg, splits, run_dir, device)
}

/// The fit loop on any autodiff backend.
pub fn train_loop<B: AutodiffBackend>(
    cfg:       &TrainConfig,
    model_cfg: &ImageCaptioningConfig,
    splits:    Splits,
    run_dir:   &RunDirectory,
    device:    B::Device,
) -> Result<TrainReport> {
    let image_root = PathBuf::from(&cfg.image_root);

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: ImageCaptioningModel<B> = model_cfg.init(&device);
    tracing::info!(
        "Model ready: embed_dim={}, heads={}, ff_dim={}, vocab={}",
        model_cfg.embed_dim, model_cfg.num_heads, model_cfg.ff_dim, model_cfg.vocab_size
    );

    // ── Adam optimiser + warmup schedule ──────────────────────────────────────
    let optim_cfg = AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.98)
        .with_epsilon(1e-9);
    let mut optim    = optim_cfg.init();
    let mut schedule = WarmupSchedule::new(cfg.embed_dim, cfg.warmup_steps);

    // ── Data loaders ──────────────────────────────────────────────────────────
    let train_batcher = CaptionBatcher::<B>::new(device.clone(), &image_root, cfg.image_size);
    let train_loader  = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(cfg.shuffle_seed)
        .num_workers(cfg.num_workers)
        .build(splits.train.clone());

    let eval_loader = |dataset: CaptionDataset| {
        let batcher = CaptionBatcher::<B::InnerBackend>::new(device.clone(), &image_root, cfg.image_size);
        DataLoaderBuilder::new(batcher)
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers)
            .build(dataset)
    };
    let valid_loader = eval_loader(splits.valid.clone());

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let logger             = MetricsLogger::new(run_dir.path())?;
    let mut history        = TrainingHistory::default();
    let mut early_stopping = EarlyStopping::new(cfg.patience);
    let mut best_model: Option<ImageCaptioningModel<B>> = None;

    for epoch in 1..=cfg.epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;
        let mut correct  = 0usize;
        let mut total    = 0usize;

        for batch in train_loader.iter() {
            let step = model.forward_loss(batch.images, batch.tokens);

            loss_sum += step.loss.clone().into_scalar().elem::<f64>();
            batches  += 1;
            correct  += step.correct;
            total    += step.total;

            // Backward pass + Adam update with the scheduled rate
            let lr    = schedule.next_lr();
            let grads = step.loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);
        }
        let train_metrics = SplitMetrics::from_totals(loss_sum, batches, correct, total);

        // ── Validation phase ──────────────────────────────────────────────────
        let valid_metrics = evaluate(&model.valid(), &valid_loader);

        let m = EpochMetrics::new(epoch, train_metrics, valid_metrics);
        history.record(&m);
        logger.log(&m)?;

        println!(
            "Epoch {:>3}/{} | loss={:.4} | acc={:.4} | val_loss={:.4} | val_acc={:.4} | lr={:.2e}",
            epoch, cfg.epochs, m.train_loss, m.train_acc, m.val_loss, m.val_acc,
            schedule.lr_at(schedule.steps()),
        );

        match early_stopping.observe(epoch, m.val_loss) {
            Decision::Improved => best_model = Some(model.clone()),
            Decision::Waiting  => {}
            Decision::Stop => {
                tracing::info!(
                    "Early stopping at epoch {}: no val_loss improvement for {} epochs",
                    epoch, cfg.patience
                );
                break;
            }
        }
    }

    // ── Restore best weights ──────────────────────────────────────────────────
    if let Some(best) = best_model {
        tracing::info!(
            "Restoring weights from epoch {} (val_loss={:.4})",
            early_stopping.best_epoch().unwrap_or_default(),
            early_stopping.best_loss()
        );
        model = best;
    }
    let final_model = model.valid();

    // ── Definitive metrics on the three splits ────────────────────────────────
    let train = evaluate(&final_model, &eval_loader(splits.train));
    let valid = evaluate(&final_model, &valid_loader);
    let test  = if splits.test.sample_count() > 0 {
        evaluate(&final_model, &eval_loader(splits.test))
    } else {
        tracing::warn!("Test split is empty; test metrics are undefined");
        SplitMetrics::from_totals(0.0, 0, 0, 0)
    };

    run_dir.save_model(&final_model)?;
    tracing::info!("Training complete!");

    Ok(TrainReport { history, best_epoch: early_stopping.best_epoch(), train, valid, test })
}

/// Average loss and masked token accuracy of `model` over every batch of `loader`.
pub fn evaluate<B: Backend>(
    model:  &ImageCaptioningModel<B>,
    loader: &Arc<dyn DataLoader<CaptionBatch<B>>>,
) -> SplitMetrics {
    let mut loss_sum = 0.0f64;
    let mut batches  = 0usize;
    let mut correct  = 0usize;
    let mut total    = 0usize;

    for batch in loader.iter() {
        let step = model.forward_loss(batch.images, batch.tokens);
        loss_sum += step.loss.into_scalar().elem::<f64>();
        batches  += 1;
        correct  += step.correct;
        total    += step.total;
    }

    SplitMetrics::from_totals(loss_sum, batches, correct, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::CaptionSample;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_evaluate_pools_token_accuracy() {
        let device = Default::default();
        let model  = ImageCaptioningConfig::new(12, 5, 8, 16, 2)
            .with_cnn_channels(2)
            .with_grid_size(1)
            .with_dropout(0.0)
            .init::<TestBackend>(&device);

        let samples = vec![
            CaptionSample { image_path: "a.jpg".into(), tokens: vec![2, 4, 5, 3, 0] },
            CaptionSample { image_path: "b.jpg".into(), tokens: vec![2, 6, 3, 0, 0] },
            CaptionSample { image_path: "c.jpg".into(), tokens: vec![2, 7, 8, 9, 3] },
        ];
        let dataset = CaptionDataset::new(samples, 3);
        let batcher = CaptionBatcher::<TestBackend>::new(device, "/nonexistent", 16);
        let loader  = DataLoaderBuilder::new(batcher).batch_size(2).build(dataset);

        let metrics = evaluate(&model, &loader);
        assert!(metrics.loss.is_finite());
        assert!((0.0..=1.0).contains(&metrics.accuracy));
    }

    #[test]
    fn test_fit_loop_records_history_and_saves_weights() {
        type TrainBackend = burn::backend::Autodiff<TestBackend>;

        let save = std::env::temp_dir()
            .join(format!("image_captioning_fit_{}", std::process::id()));
        let run_dir = RunDirectory::create(&save, crate::infra::checkpoint::RunId::new("fit")).unwrap();

        let cfg = TrainConfig {
            image_root:   "/nonexistent".into(),
            image_size:   16,
            seq_length:   5,
            embed_dim:    8,
            num_heads:    2,
            ff_dim:       16,
            batch_size:   2,
            epochs:       2,
            patience:     3,
            warmup_steps: 10,
            ..TrainConfig::default()
        };
        let model_cfg = ImageCaptioningConfig::new(12, 5, 8, 16, 2)
            .with_cnn_channels(2)
            .with_grid_size(1);

        let sample = |image: &str, tokens: Vec<u32>| CaptionSample { image_path: image.into(), tokens };
        let splits = Splits {
            train: CaptionDataset::new(vec![
                sample("a.jpg", vec![2, 4, 5, 3, 0]),
                sample("b.jpg", vec![2, 6, 3, 0, 0]),
                sample("c.jpg", vec![2, 7, 8, 9, 3]),
            ], 3),
            valid: CaptionDataset::new(vec![
                sample("d.jpg", vec![2, 4, 6, 3, 0]),
                sample("e.jpg", vec![2, 5, 3, 0, 0]),
            ], 2),
            test:  CaptionDataset::new(vec![sample("f.jpg", vec![2, 8, 3, 0, 0])], 1),
        };

        let report = train_loop::<TrainBackend>(&cfg, &model_cfg, splits, &run_dir, Default::default())
            .unwrap();

        assert!(report.history.epochs() >= 1 && report.history.epochs() <= cfg.epochs);
        assert_eq!(report.history.val_loss.len(), report.history.epochs());
        assert!(report.best_epoch.is_some());
        assert!(report.valid.loss.is_finite());
        assert!(report.test.loss.is_finite());
        assert!(run_dir.path().join("model_weights.mpk.gz").is_file());
        assert!(run_dir.path().join("metrics.csv").is_file());

        std::fs::remove_dir_all(save).ok();
    }
}
