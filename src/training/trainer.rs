//! Training loop implementation for the WGAN-GP
//!
//! Drives the per-batch adversarial updates over a data loader, records
//! epoch averages, saves checkpoints and invokes an optional end-of-epoch
//! callback (e.g. a sample visualizer).

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tch::nn::ModuleT;
use tracing::{info, warn};

use super::metrics::TrainingMetrics;
use crate::data::DataLoader;
use crate::model::Wgan;

/// Training configuration
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Number of training epochs
    pub epochs: usize,
    /// Learning rate for generator
    pub gen_lr: f64,
    /// Learning rate for critic
    pub crt_lr: f64,
    /// Save checkpoint every N epochs
    pub checkpoint_every: usize,
    /// Directory to save checkpoints
    pub checkpoint_dir: String,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            gen_lr: 1e-4,
            crt_lr: 1e-4,
            checkpoint_every: 10,
            checkpoint_dir: "checkpoints".to_string(),
        }
    }
}

/// Hook invoked after every completed epoch.
pub trait EpochCallback<G: ModuleT, C: ModuleT> {
    fn on_epoch_end(&mut self, epoch: usize, model: &Wgan<G, C>) -> Result<()>;

    /// Called once after the final epoch.
    fn on_train_end(&mut self, _model: &Wgan<G, C>) -> Result<()> {
        Ok(())
    }
}

/// WGAN-GP trainer
pub struct Trainer<G: ModuleT, C: ModuleT> {
    config: TrainerConfig,
    metrics: TrainingMetrics,
    callback: Option<Box<dyn EpochCallback<G, C>>>,
}

impl<G: ModuleT, C: ModuleT> Trainer<G, C> {
    /// Create a new trainer
    pub fn new(config: TrainerConfig) -> Self {
        Self {
            config,
            metrics: TrainingMetrics::new(),
            callback: None,
        }
    }

    /// Attach an end-of-epoch hook.
    pub fn with_callback(mut self, callback: Box<dyn EpochCallback<G, C>>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Train the model
    ///
    /// # Arguments
    ///
    /// * `model` - WGAN to train
    /// * `data_loader` - DataLoader providing high-resolution batches
    ///
    /// # Returns
    ///
    /// Training metrics
    pub fn train(
        &mut self,
        model: &mut Wgan<G, C>,
        data_loader: &mut DataLoader,
    ) -> Result<&TrainingMetrics> {
        let mut gen_opt = model.gen_optimizer(self.config.gen_lr)?;
        let mut crt_opt = model.crt_optimizer(self.config.crt_lr)?;

        let num_batches = data_loader.num_batches();
        if num_batches == 0 {
            bail!("data loader produced no batches");
        }

        info!(
            "Starting training for {} epochs, {} batches per epoch",
            self.config.epochs, num_batches
        );

        std::fs::create_dir_all(&self.config.checkpoint_dir)?;

        for epoch in 0..self.config.epochs {
            let mut sums: BTreeMap<String, f64> = BTreeMap::new();
            let mut batch_count = 0usize;

            let pb = ProgressBar::new(num_batches as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap()
                    .progress_chars("##-"),
            );

            let device = model.device;
            for batch in data_loader.iter() {
                let hr = batch.hr.to_device(device);
                let step = model.train_step(&hr, &mut gen_opt, &mut crt_opt);

                for (name, value) in &step {
                    *sums.entry(name.clone()).or_insert(0.0) += value;
                }
                batch_count += 1;

                pb.set_message(format!(
                    "G: {:.4}, D: {:.4}",
                    step.get("g_loss").copied().unwrap_or(0.0),
                    step.get("d_loss").copied().unwrap_or(0.0)
                ));
                pb.inc(1);
            }

            pb.finish_with_message("done");

            let averages: BTreeMap<String, f64> = sums
                .into_iter()
                .map(|(name, sum)| (name, sum / batch_count as f64))
                .collect();

            self.metrics.record(&averages);

            info!(
                "Epoch {}/{}: G_loss={:.4}, D_loss={:.4}, Real_acc={:.2}%, Fake_acc={:.2}%",
                epoch + 1,
                self.config.epochs,
                averages.get("g_loss").copied().unwrap_or(0.0),
                averages.get("d_loss").copied().unwrap_or(0.0),
                averages.get("real_acc").copied().unwrap_or(0.0) * 100.0,
                averages.get("fake_acc").copied().unwrap_or(0.0) * 100.0
            );

            if !self.metrics.is_balanced(10) {
                warn!("Critic is saturated; the generator may be falling behind.");
            }

            if (epoch + 1) % self.config.checkpoint_every == 0 {
                let gen_path =
                    format!("{}/generator_epoch_{}.pt", self.config.checkpoint_dir, epoch + 1);
                let crt_path =
                    format!("{}/critic_epoch_{}.pt", self.config.checkpoint_dir, epoch + 1);

                if let Err(e) = model.save(&gen_path, &crt_path) {
                    warn!("Failed to save checkpoint: {}", e);
                } else {
                    info!("Saved checkpoint at epoch {}", epoch + 1);
                }
            }

            if let Some(callback) = &mut self.callback {
                if let Err(e) = callback.on_epoch_end(epoch + 1, model) {
                    warn!("Epoch callback failed: {}", e);
                }
            }
        }

        // Save final model
        let gen_path = format!("{}/generator_final.pt", self.config.checkpoint_dir);
        let crt_path = format!("{}/critic_final.pt", self.config.checkpoint_dir);
        if let Err(e) = model.save(&gen_path, &crt_path) {
            warn!("Failed to save final model: {}", e);
        }

        // Save metrics
        let metrics_path = format!("{}/training_metrics.csv", self.config.checkpoint_dir);
        if let Err(e) = self.metrics.save_csv(&metrics_path) {
            warn!("Failed to save metrics: {}", e);
        }

        if let Some(callback) = &mut self.callback {
            if let Err(e) = callback.on_train_end(model) {
                warn!("End-of-training callback failed: {}", e);
            }
        }

        Ok(&self.metrics)
    }

    /// Evaluate the model over a loader without updating any parameters.
    pub fn evaluate(
        &self,
        model: &Wgan<G, C>,
        data_loader: &mut DataLoader,
    ) -> Result<BTreeMap<String, f64>> {
        let mut sums: BTreeMap<String, f64> = BTreeMap::new();
        let mut batch_count = 0usize;

        let device = model.device;
        for batch in data_loader.iter() {
            let hr = batch.hr.to_device(device);
            let step = model.test_step(&hr);
            for (name, value) in &step {
                *sums.entry(name.clone()).or_insert(0.0) += value;
            }
            batch_count += 1;
        }

        if batch_count == 0 {
            bail!("data loader produced no batches");
        }

        Ok(sums
            .into_iter()
            .map(|(name, sum)| (name, sum / batch_count as f64))
            .collect())
    }

    /// Get training metrics
    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    /// Get configuration
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }
}
