//! # SR-WGAN-GP
//!
//! Wasserstein GAN with Gradient Penalty for image super-resolution.
//!
//! The crate trains a generator/critic pair with the WGAN-GP objective:
//! the critic is regularized towards a 1-Lipschitz function by penalizing
//! the norm of its input gradients at points interpolated between real and
//! generated images. An optional perceptual content loss compares
//! intermediate activations of a frozen pretrained backbone.
//!
//! ## Modules
//!
//! - `data`: paired low/high-resolution crop dataset and batch loader
//! - `model`: generator, critic and the WGAN training core
//! - `training`: losses, metric registry, content loss and the epoch driver
//! - `utils`: configuration, checkpoints and the epoch GIF visualizer

pub mod data;
pub mod model;
pub mod training;
pub mod utils;

pub use data::{DataLoader, PairedBatch, PairedImageDataset};
pub use model::{Critic, Generator, GaussianSampler, Sampler, SrWgan, Wgan, WganConfig};
pub use training::{
    ContentLoss, MetricRegistry, Pretrained, Trainer, TrainerConfig, TrainingMetrics,
};
pub use utils::{load_checkpoint, save_checkpoint, Config, EpochVisualizer};
