//! Generator network
//!
//! The Generator transforms latent noise vectors into synthetic
//! high-resolution images. Architecture uses transposed 2D convolutions
//! to upsample from latent space to the target resolution.

use tch::{nn, nn::Module, nn::ModuleT, Device, Tensor};

/// Generator network configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Size of the latent noise vector
    pub latent_dim: i64,
    /// Height and width of the square output image
    pub img_size: i64,
    /// Number of output channels (3 for RGB)
    pub img_channels: i64,
    /// Base number of filters
    pub base_filters: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            latent_dim: 128,
            img_size: 64,
            img_channels: 3,
            base_filters: 128,
        }
    }
}

/// Generator network
///
/// Architecture:
/// 1. Dense layer from latent space to an initial feature map
/// 2. Series of ConvTranspose2d layers with BatchNorm and LeakyReLU
/// 3. Final Conv2d with Tanh activation, output in `[-1, 1]`
#[derive(Debug)]
pub struct Generator {
    config: GeneratorConfig,
    /// Initial dense projection
    fc: nn::Linear,
    /// Transposed convolution layers
    conv1: nn::ConvTranspose2D,
    bn1: nn::BatchNorm,
    conv2: nn::ConvTranspose2D,
    bn2: nn::BatchNorm,
    conv3: nn::ConvTranspose2D,
    bn3: nn::BatchNorm,
    conv4: nn::Conv2D,
}

impl Generator {
    /// Create a new Generator network
    ///
    /// `img_size` must be divisible by 8 so three 2x upsampling stages land
    /// exactly on the target resolution.
    pub fn new(vs: &nn::Path, config: GeneratorConfig) -> Self {
        let base = config.base_filters;

        // Project to (base_filters, img_size/8, img_size/8) then upsample 3x.
        let init_size = config.img_size / 8;
        let init_features = base * init_size * init_size;

        let fc = nn::linear(vs / "fc", config.latent_dim, init_features, Default::default());

        // kernel 4, stride 2, padding 1 doubles spatial dims exactly
        let up_config = nn::ConvTransposeConfig {
            stride: 2,
            padding: 1,
            ..Default::default()
        };

        let conv1 = nn::conv_transpose2d(vs / "conv1", base, base / 2, 4, up_config);
        let bn1 = nn::batch_norm2d(vs / "bn1", base / 2, Default::default());

        let conv2 = nn::conv_transpose2d(vs / "conv2", base / 2, base / 4, 4, up_config);
        let bn2 = nn::batch_norm2d(vs / "bn2", base / 4, Default::default());

        let conv3 = nn::conv_transpose2d(vs / "conv3", base / 4, base / 8, 4, up_config);
        let bn3 = nn::batch_norm2d(vs / "bn3", base / 8, Default::default());

        // Final layer: no batch norm, tanh activation
        let out_config = nn::ConvConfig {
            stride: 1,
            padding: 1,
            ..Default::default()
        };
        let conv4 = nn::conv2d(vs / "conv4", base / 8, config.img_channels, 3, out_config);

        Self {
            config,
            fc,
            conv1,
            bn1,
            conv2,
            bn2,
            conv3,
            bn3,
            conv4,
        }
    }

    /// Generate synthetic images from noise
    ///
    /// # Arguments
    ///
    /// * `noise` - Tensor of shape (batch_size, latent_dim)
    /// * `train` - Whether in training mode (affects batch norm)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size, img_channels, img_size, img_size)
    pub fn forward_t(&self, noise: &Tensor, train: bool) -> Tensor {
        let batch_size = noise.size()[0];
        let base = self.config.base_filters;
        let init_size = self.config.img_size / 8;

        // Project and reshape: (batch, latent) -> (batch, channels, h, w)
        let x = self.fc.forward(noise);
        let x = x.view([batch_size, base, init_size, init_size]);

        // Upsample through transposed convolutions
        let x = self.conv1.forward(&x);
        let x = self.bn1.forward_t(&x, train);
        let x = x.leaky_relu();

        let x = self.conv2.forward(&x);
        let x = self.bn2.forward_t(&x, train);
        let x = x.leaky_relu();

        let x = self.conv3.forward(&x);
        let x = self.bn3.forward_t(&x, train);
        let x = x.leaky_relu();

        let x = self.conv4.forward(&x);
        x.tanh()
    }

    /// Generate images (inference mode)
    pub fn generate(&self, noise: &Tensor) -> Tensor {
        self.forward_t(noise, false)
    }

    /// Generate random images
    pub fn generate_random(&self, num_samples: i64, device: Device) -> Tensor {
        let noise = Tensor::randn(
            [num_samples, self.config.latent_dim],
            (tch::Kind::Float, device),
        );
        self.generate(&noise)
    }

    /// Get configuration
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

impl ModuleT for Generator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        Generator::forward_t(self, xs, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::nn::VarStore;

    #[test]
    fn test_generator_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let config = GeneratorConfig {
            latent_dim: 16,
            img_size: 32,
            img_channels: 3,
            base_filters: 32,
        };
        let gen = Generator::new(&vs.root(), config);

        let noise = Tensor::randn([4, 16], (tch::Kind::Float, Device::Cpu));
        let output = gen.generate(&noise);

        assert_eq!(output.size(), vec![4, 3, 32, 32]);
    }

    #[test]
    fn test_generator_output_range() {
        let vs = VarStore::new(Device::Cpu);
        let config = GeneratorConfig {
            latent_dim: 16,
            img_size: 16,
            img_channels: 3,
            base_filters: 16,
        };
        let gen = Generator::new(&vs.root(), config);

        let noise = Tensor::randn([2, 16], (tch::Kind::Float, Device::Cpu));
        let output = gen.generate(&noise);

        let min: f64 = output.min().double_value(&[]);
        let max: f64 = output.max().double_value(&[]);
        assert!(min >= -1.0 && max <= 1.0);
    }
}
