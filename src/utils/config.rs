//! Configuration management
//!
//! Provides unified configuration for the entire training pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::training::Pretrained;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data configuration
    pub data: DataConfig,
    /// Model configuration
    pub model: ModelConfig,
    /// Training configuration
    pub training: TrainingConfigFile,
    /// Perceptual content loss configuration
    pub content: ContentConfig,
}

/// Data-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory of training images
    pub train_dir: String,
    /// High-resolution crop size in pixels
    pub crop_size: u32,
    /// Downscale factor for the low-resolution pair
    pub upscale_factor: u32,
    /// Batch size
    pub batch_size: usize,
}

/// Model-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Latent dimension size
    pub latent_dim: i64,
    /// Output image size (square)
    pub img_size: i64,
}

/// Training-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfigFile {
    /// Number of epochs
    pub epochs: usize,
    /// Generator learning rate
    pub gen_lr: f64,
    /// Critic learning rate
    pub crt_lr: f64,
    /// Critic steps per batch
    pub dis_steps: usize,
    /// Generator steps per batch
    pub gen_steps: usize,
    /// Gradient penalty coefficient
    pub gp_weight: f64,
    /// Checkpoint save frequency
    pub checkpoint_every: usize,
    /// Checkpoint directory
    pub checkpoint_dir: String,
    /// Device: "cpu" or "cuda"
    pub device: String,
}

/// Perceptual content loss configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Overall weight of the content term in the generator loss;
    /// zero disables the term entirely
    pub weight: f64,
    /// Backbone: "resnet50" or "resnet101"
    pub pretrained: String,
    /// Feature taps to compare (backbone defaults when omitted)
    pub layer_ids: Option<Vec<usize>>,
    /// Per-tap weights (equal when omitted)
    pub layer_weights: Option<Vec<f64>>,
    /// Path to saved trunk weights (random frozen trunk when omitted)
    pub weights_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                train_dir: "data/train".to_string(),
                crop_size: 64,
                upscale_factor: 4,
                batch_size: 64,
            },
            model: ModelConfig {
                latent_dim: 128,
                img_size: 64,
            },
            training: TrainingConfigFile {
                epochs: 100,
                gen_lr: 1e-4,
                crt_lr: 1e-4,
                dis_steps: 5,
                gen_steps: 1,
                gp_weight: 10.0,
                checkpoint_every: 10,
                checkpoint_dir: "checkpoints".to_string(),
                device: "cpu".to_string(),
            },
            content: ContentConfig {
                weight: 0.0,
                pretrained: "resnet50".to_string(),
                layer_ids: None,
                layer_weights: None,
                weights_path: None,
            },
        }
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from TOML file
    pub fn from_toml(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_toml(&self, path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn from_json(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get device from configuration
    pub fn get_device(&self) -> tch::Device {
        match self.training.device.to_lowercase().as_str() {
            "cuda" | "gpu" => {
                if tch::Cuda::is_available() {
                    tch::Device::Cuda(0)
                } else {
                    tracing::warn!("CUDA requested but not available, falling back to CPU");
                    tch::Device::Cpu
                }
            }
            _ => tch::Device::Cpu,
        }
    }

    /// Parsed content backbone selector.
    pub fn pretrained(&self) -> anyhow::Result<Pretrained> {
        self.content.pretrained.parse()
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data.crop_size == 0 {
            anyhow::bail!("Crop size must be > 0");
        }
        if self.data.upscale_factor == 0 {
            anyhow::bail!("Upscale factor must be > 0");
        }
        if self.data.batch_size == 0 {
            anyhow::bail!("Batch size must be > 0");
        }
        if self.model.latent_dim <= 0 {
            anyhow::bail!("Latent dimension must be > 0");
        }
        if self.model.img_size <= 0 || self.model.img_size % 16 != 0 {
            anyhow::bail!("Image size must be a positive multiple of 16");
        }
        if self.model.img_size != i64::from(self.data.crop_size) {
            anyhow::bail!("Image size must match the high-resolution crop size");
        }
        if self.training.epochs == 0 {
            anyhow::bail!("Number of epochs must be > 0");
        }
        if self.training.dis_steps == 0 {
            anyhow::bail!("dis_steps must be > 0");
        }
        if self.training.gen_steps == 0 {
            anyhow::bail!("gen_steps must be > 0");
        }
        if self.training.gp_weight < 0.0 {
            anyhow::bail!("gp_weight must be >= 0");
        }
        if self.content.weight < 0.0 {
            anyhow::bail!("Content weight must be >= 0");
        }
        if self.content.weight > 0.0 {
            self.pretrained()?;
        }
        Ok(())
    }
}

/// Create default configuration file if it doesn't exist
pub fn ensure_config_exists(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        if path.ends_with(".toml") {
            Config::from_toml(path)
        } else {
            Config::from_json(path)
        }
    } else {
        let config = Config::default();
        if path.ends_with(".toml") {
            config.save_toml(path)?;
        } else {
            config.save_json(path)?;
        }
        Ok(config)
    }
}
