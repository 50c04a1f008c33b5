//! Training module for the WGAN-GP
//!
//! This module provides:
//! - Training loop implementation with epoch callbacks
//! - Wasserstein loss and score-accuracy functions
//! - Metric registry, training history and the perceptual content loss

pub mod content;
mod losses;
mod metrics;
mod trainer;

pub use content::{ContentLoss, FeatureExtractor, Pretrained, ResNetExtractor};
pub use losses::{critic_loss, fake_score_accuracy, generator_loss, real_score_accuracy};
pub use metrics::{MetricFn, MetricRegistry, TrainingMetrics};
pub use trainer::{EpochCallback, Trainer, TrainerConfig};
