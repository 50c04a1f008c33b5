//! Metric registry and training history
//!
//! The registry merges loss and accuracy functions into a single named
//! table once, at construction, so every train/test step reports the same
//! set of scalars. `TrainingMetrics` accumulates those scalars per epoch
//! and persists them as CSV.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use tch::Tensor;

use super::losses;

/// A named training scalar computed from critic outputs.
///
/// Arguments are the critic scores on generated samples and, when
/// available, on real samples.
pub type MetricFn = fn(&Tensor, Option<&Tensor>) -> Tensor;

/// Merged table of loss and accuracy functions.
///
/// Built once; accuracy functions override loss functions on a key
/// collision, and `d_loss`/`g_loss` must be present because the training
/// core drives its parameter updates through them.
pub struct MetricRegistry {
    metrics: BTreeMap<String, MetricFn>,
    d_loss: MetricFn,
    g_loss: MetricFn,
}

impl MetricRegistry {
    /// Merge loss and accuracy tables into one registry.
    pub fn new(
        loss_funcs: BTreeMap<String, MetricFn>,
        acc_funcs: BTreeMap<String, MetricFn>,
    ) -> Result<Self> {
        let mut metrics = loss_funcs;
        // Later inserts win, so accuracies take precedence.
        metrics.extend(acc_funcs);

        let Some(&d_loss) = metrics.get("d_loss") else {
            bail!("metric registry requires a d_loss entry");
        };
        let Some(&g_loss) = metrics.get("g_loss") else {
            bail!("metric registry requires a g_loss entry");
        };

        Ok(Self {
            metrics,
            d_loss,
            g_loss,
        })
    }

    /// Standard WGAN registry: Wasserstein losses plus score accuracies.
    pub fn defaults() -> Self {
        let mut metrics: BTreeMap<String, MetricFn> = BTreeMap::new();
        metrics.insert("d_loss".to_string(), losses::critic_loss);
        metrics.insert("g_loss".to_string(), losses::generator_loss);
        metrics.insert("real_acc".to_string(), losses::real_score_accuracy);
        metrics.insert("fake_acc".to_string(), losses::fake_score_accuracy);

        Self {
            metrics,
            d_loss: losses::critic_loss,
            g_loss: losses::generator_loss,
        }
    }

    /// Critic training objective (before the gradient penalty).
    pub fn d_loss(&self, fake_output: &Tensor, real_output: Option<&Tensor>) -> Tensor {
        (self.d_loss)(fake_output, real_output)
    }

    /// Generator training objective.
    pub fn g_loss(&self, fake_output: &Tensor, real_output: Option<&Tensor>) -> Tensor {
        (self.g_loss)(fake_output, real_output)
    }

    /// Registered metric names, in stable order.
    pub fn names(&self) -> Vec<&str> {
        self.metrics.keys().map(String::as_str).collect()
    }

    /// Evaluate every registered metric into plain scalars.
    pub fn evaluate(&self, fake_output: &Tensor, real_output: &Tensor) -> BTreeMap<String, f64> {
        self.metrics
            .iter()
            .map(|(name, f)| {
                let value = f(fake_output, Some(real_output)).double_value(&[]);
                (name.clone(), value)
            })
            .collect()
    }
}

/// Metrics collected during training
#[derive(Debug, Clone, Default)]
pub struct TrainingMetrics {
    /// Generator losses per epoch
    pub gen_losses: Vec<f64>,
    /// Critic losses per epoch
    pub crt_losses: Vec<f64>,
    /// Critic accuracy on real samples
    pub real_acc: Vec<f64>,
    /// Critic accuracy on fake samples
    pub fake_acc: Vec<f64>,
}

impl TrainingMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record epoch metrics
    pub fn record_epoch(&mut self, gen_loss: f64, crt_loss: f64, real_acc: f64, fake_acc: f64) {
        self.gen_losses.push(gen_loss);
        self.crt_losses.push(crt_loss);
        self.real_acc.push(real_acc);
        self.fake_acc.push(fake_acc);
    }

    /// Record an epoch from an averaged metric map.
    pub fn record(&mut self, averages: &BTreeMap<String, f64>) {
        self.record_epoch(
            averages.get("g_loss").copied().unwrap_or(0.0),
            averages.get("d_loss").copied().unwrap_or(0.0),
            averages.get("real_acc").copied().unwrap_or(0.0),
            averages.get("fake_acc").copied().unwrap_or(0.0),
        );
    }

    /// Get number of recorded epochs
    pub fn num_epochs(&self) -> usize {
        self.gen_losses.len()
    }

    /// Get latest generator loss
    pub fn latest_gen_loss(&self) -> Option<f64> {
        self.gen_losses.last().copied()
    }

    /// Get latest critic loss
    pub fn latest_crt_loss(&self) -> Option<f64> {
        self.crt_losses.last().copied()
    }

    /// Calculate moving average of generator loss
    pub fn gen_loss_ma(&self, window: usize) -> f64 {
        moving_average(&self.gen_losses, window)
    }

    /// Calculate moving average of critic loss
    pub fn crt_loss_ma(&self, window: usize) -> f64 {
        moving_average(&self.crt_losses, window)
    }

    /// Check if training is balanced
    ///
    /// A healthy critic separates real and fake without saturating; both
    /// score accuracies pinned near 1.0 means the generator has fallen
    /// far behind.
    pub fn is_balanced(&self, window: usize) -> bool {
        if self.num_epochs() < window {
            return true;
        }

        let recent_real: Vec<_> = self.real_acc.iter().rev().take(window).copied().collect();
        let recent_fake: Vec<_> = self.fake_acc.iter().rev().take(window).copied().collect();

        let avg_real: f64 = recent_real.iter().sum::<f64>() / recent_real.len() as f64;
        let avg_fake: f64 = recent_fake.iter().sum::<f64>() / recent_fake.len() as f64;

        avg_real < 0.95 || avg_fake < 0.95
    }

    /// Save metrics to CSV file
    pub fn save_csv(&self, path: &str) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;

        writer.write_record(["epoch", "gen_loss", "crt_loss", "real_acc", "fake_acc"])?;

        for i in 0..self.num_epochs() {
            writer.write_record([
                (i + 1).to_string(),
                self.gen_losses[i].to_string(),
                self.crt_losses[i].to_string(),
                self.real_acc[i].to_string(),
                self.fake_acc[i].to_string(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load metrics from CSV file
    pub fn load_csv(path: &str) -> anyhow::Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut metrics = Self::new();

        for result in reader.records() {
            let record = result?;
            metrics.gen_losses.push(record[1].parse()?);
            metrics.crt_losses.push(record[2].parse()?);
            metrics.real_acc.push(record[3].parse()?);
            metrics.fake_acc.push(record[4].parse()?);
        }

        Ok(metrics)
    }
}

/// Calculate moving average of last `window` values
fn moving_average(values: &[f64], window: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let n = window.min(values.len());
    let sum: f64 = values.iter().rev().take(n).sum();
    sum / n as f64
}
