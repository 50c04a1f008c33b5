//! Critic network
//!
//! The Critic scores images with an unbounded realism value. Wasserstein
//! critics are not squashed through a sigmoid: the raw score feeds both
//! the earth-mover loss and the gradient penalty.

use tch::{nn, nn::Module, nn::ModuleT, Tensor};

/// Critic network configuration
#[derive(Debug, Clone)]
pub struct CriticConfig {
    /// Height and width of the square input image
    pub img_size: i64,
    /// Number of input channels (3 for RGB)
    pub img_channels: i64,
    /// Base number of filters
    pub base_filters: i64,
    /// Dropout rate
    pub dropout: f64,
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            img_size: 64,
            img_channels: 3,
            base_filters: 64,
            dropout: 0.3,
        }
    }
}

/// Critic network
///
/// Architecture:
/// 1. Series of strided Conv2d layers with LeakyReLU and Dropout
/// 2. Flatten and Dense layer for the final score
#[derive(Debug)]
pub struct Critic {
    config: CriticConfig,
    /// Convolution layers
    conv1: nn::Conv2D,
    conv2: nn::Conv2D,
    conv3: nn::Conv2D,
    conv4: nn::Conv2D,
    /// Final scoring layer
    fc: nn::Linear,
}

impl Critic {
    /// Create a new Critic network
    ///
    /// `img_size` must be divisible by 16 (four stride-2 convolutions).
    pub fn new(vs: &nn::Path, config: CriticConfig) -> Self {
        let base = config.base_filters;

        let conv_config = nn::ConvConfig {
            stride: 2,
            padding: 1,
            ..Default::default()
        };

        let conv1 = nn::conv2d(vs / "conv1", config.img_channels, base, 4, conv_config);
        let conv2 = nn::conv2d(vs / "conv2", base, base * 2, 4, conv_config);
        let conv3 = nn::conv2d(vs / "conv3", base * 2, base * 4, 4, conv_config);
        let conv4 = nn::conv2d(vs / "conv4", base * 4, base * 8, 4, conv_config);

        // Each stride-2 conv halves the spatial dims
        let final_size = (config.img_size / 16).max(1);
        let flat_size = base * 8 * final_size * final_size;

        let fc = nn::linear(vs / "fc", flat_size, 1, Default::default());

        Self {
            config,
            conv1,
            conv2,
            conv3,
            conv4,
            fc,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `input` - Tensor of shape (batch_size, img_channels, img_size, img_size)
    /// * `train` - Whether in training mode (affects dropout)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size, 1) with unbounded scores
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let x = self.conv1.forward(input);
        let x = x.leaky_relu();
        let x = x.dropout(self.config.dropout, train);

        let x = self.conv2.forward(&x);
        let x = x.leaky_relu();
        let x = x.dropout(self.config.dropout, train);

        let x = self.conv3.forward(&x);
        let x = x.leaky_relu();
        let x = x.dropout(self.config.dropout, train);

        let x = self.conv4.forward(&x);
        let x = x.leaky_relu();
        let x = x.dropout(self.config.dropout, train);

        let batch_size = x.size()[0];
        let x = x.view([batch_size, -1]);

        self.fc.forward(&x)
    }

    /// Score samples (inference mode)
    pub fn score(&self, input: &Tensor) -> Tensor {
        self.forward_t(input, false)
    }

    /// Get configuration
    pub fn config(&self) -> &CriticConfig {
        &self.config
    }
}

impl ModuleT for Critic {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        Critic::forward_t(self, xs, train)
    }
}
