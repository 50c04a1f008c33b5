//! Model module containing GAN architecture components
//!
//! This module provides:
//! - Generator network mapping latent noise to high-resolution images
//! - Critic network producing unbounded Wasserstein scores
//! - WGAN-GP wrapper combining both networks with the training core

mod critic;
mod generator;
mod wgan;

pub use critic::{Critic, CriticConfig};
pub use generator::{Generator, GeneratorConfig};
pub use wgan::{interpolate, GaussianSampler, Sampler, SrWgan, Wgan, WganConfig};
