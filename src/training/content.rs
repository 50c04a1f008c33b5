//! Perceptual content loss
//!
//! Compares generated and reference images in the feature space of a
//! frozen ResNet-style trunk instead of raw pixels. Features are tapped
//! after the stem and after every bottleneck block; the loss is a
//! weighted sum of per-layer MSE over a chosen subset of taps.

use std::str::FromStr;

use anyhow::{bail, Result};
use tch::nn::{self, ModuleT, VarStore};
use tch::{Device, Reduction, Tensor};

/// Backbone selector for the feature trunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pretrained {
    Resnet50,
    Resnet101,
}

impl FromStr for Pretrained {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "resnet50" => Ok(Self::Resnet50),
            "resnet101" => Ok(Self::Resnet101),
            other => bail!("unsupported backbone '{}', expected resnet50 or resnet101", other),
        }
    }
}

impl Pretrained {
    /// Bottleneck block counts per stage.
    fn block_counts(self) -> [i64; 4] {
        match self {
            Self::Resnet50 => [3, 4, 6, 3],
            Self::Resnet101 => [3, 4, 23, 3],
        }
    }

    /// Number of feature taps the trunk exposes (stem + one per block).
    pub fn tap_count(self) -> usize {
        let blocks: i64 = self.block_counts().iter().sum();
        blocks as usize + 1
    }

    /// Default tap subset for the content loss.
    pub fn default_layer_ids(self) -> Vec<usize> {
        match self {
            Self::Resnet50 => vec![0, 2, 5, 11, 12, 15],
            Self::Resnet101 => vec![0, 2, 5, 11, 12, 15, 20],
        }
    }
}

/// Multi-scale feature producer for perceptual comparisons.
pub trait FeatureExtractor {
    /// Feature maps from shallow to deep.
    fn features(&self, x: &Tensor) -> Vec<Tensor>;

    /// Number of taps produced per call.
    fn tap_count(&self) -> usize;
}

/// Standard bottleneck residual block (1x1 -> 3x3 -> 1x1 with skip).
#[derive(Debug)]
struct Bottleneck {
    conv1: nn::Conv2D,
    bn1: nn::BatchNorm,
    conv2: nn::Conv2D,
    bn2: nn::BatchNorm,
    conv3: nn::Conv2D,
    bn3: nn::BatchNorm,
    downsample: Option<(nn::Conv2D, nn::BatchNorm)>,
}

impl Bottleneck {
    fn new(p: &nn::Path, c_in: i64, c_mid: i64, c_out: i64, stride: i64) -> Self {
        let conv1 = nn::conv2d(p / "conv1", c_in, c_mid, 1, no_bias(1, 0));
        let bn1 = nn::batch_norm2d(p / "bn1", c_mid, Default::default());
        let conv2 = nn::conv2d(
            p / "conv2",
            c_mid,
            c_mid,
            3,
            nn::ConvConfig {
                stride,
                padding: 1,
                bias: false,
                ..Default::default()
            },
        );
        let bn2 = nn::batch_norm2d(p / "bn2", c_mid, Default::default());
        let conv3 = nn::conv2d(p / "conv3", c_mid, c_out, 1, no_bias(1, 0));
        let bn3 = nn::batch_norm2d(p / "bn3", c_out, Default::default());

        let downsample = if stride != 1 || c_in != c_out {
            let conv = nn::conv2d(p / "downsample", c_in, c_out, 1, no_bias(stride, 0));
            let bn = nn::batch_norm2d(p / "downsample_bn", c_out, Default::default());
            Some((conv, bn))
        } else {
            None
        };

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            conv3,
            bn3,
            downsample,
        }
    }

    fn forward(&self, x: &Tensor) -> Tensor {
        let y = self.bn1.forward_t(&self.conv1.forward_t(x, false), false).relu();
        let y = self.bn2.forward_t(&self.conv2.forward_t(&y, false), false).relu();
        let y = self.bn3.forward_t(&self.conv3.forward_t(&y, false), false);

        let skip = match &self.downsample {
            Some((conv, bn)) => bn.forward_t(&conv.forward_t(x, false), false),
            None => x.shallow_clone(),
        };

        (y + skip).relu()
    }
}

fn no_bias(stride: i64, padding: i64) -> nn::ConvConfig {
    nn::ConvConfig {
        stride,
        padding,
        bias: false,
        ..Default::default()
    }
}

/// Frozen ResNet trunk with a tap after the stem and after each block.
pub struct ResNetExtractor {
    vs: VarStore,
    stem_conv: nn::Conv2D,
    stem_bn: nn::BatchNorm,
    blocks: Vec<Bottleneck>,
}

impl ResNetExtractor {
    /// Build the trunk on `device` with frozen, randomly initialised
    /// weights. Call [`load_weights`](Self::load_weights) to restore a
    /// pretrained checkpoint.
    pub fn new(pretrained: Pretrained, device: Device) -> Self {
        let mut vs = VarStore::new(device);

        let (stem_conv, stem_bn, blocks) = {
            let root = vs.root();

            let stem_conv = nn::conv2d(
                &root / "stem",
                3,
                64,
                7,
                nn::ConvConfig {
                    stride: 2,
                    padding: 3,
                    bias: false,
                    ..Default::default()
                },
            );
            let stem_bn = nn::batch_norm2d(&root / "stem_bn", 64, Default::default());

            let counts = pretrained.block_counts();
            let mids = [64i64, 128, 256, 512];
            let mut blocks = Vec::new();
            let mut c_in = 64;

            for (stage, (&count, &mid)) in counts.iter().zip(mids.iter()).enumerate() {
                let c_out = mid * 4;
                // First stage keeps the stem resolution, later stages halve it.
                let stride = if stage == 0 { 1 } else { 2 };
                for block in 0..count {
                    let p = &root / format!("stage{}_block{}", stage, block);
                    let s = if block == 0 { stride } else { 1 };
                    blocks.push(Bottleneck::new(&p, c_in, mid, c_out, s));
                    c_in = c_out;
                }
            }

            (stem_conv, stem_bn, blocks)
        };

        vs.freeze();

        Self {
            vs,
            stem_conv,
            stem_bn,
            blocks,
        }
    }

    /// Load trunk weights saved from a matching architecture.
    pub fn load_weights(&mut self, path: &str) -> Result<()> {
        self.vs.load(path)?;
        self.vs.freeze();
        Ok(())
    }
}

impl FeatureExtractor for ResNetExtractor {
    fn features(&self, x: &Tensor) -> Vec<Tensor> {
        let mut taps = Vec::with_capacity(self.tap_count());

        let x = self
            .stem_bn
            .forward_t(&self.stem_conv.forward_t(x, false), false)
            .relu();
        let mut x = x.max_pool2d([3, 3], [2, 2], [1, 1], [1, 1], false);
        taps.push(x.shallow_clone());

        for block in &self.blocks {
            x = block.forward(&x);
            taps.push(x.shallow_clone());
        }

        taps
    }

    fn tap_count(&self) -> usize {
        self.blocks.len() + 1
    }
}

/// Weighted multi-layer perceptual loss.
pub struct ContentLoss {
    extractor: Box<dyn FeatureExtractor>,
    layer_ids: Vec<usize>,
    weights: Vec<f64>,
}

impl ContentLoss {
    /// Build a content loss over a frozen ResNet trunk.
    ///
    /// `layer_ids` selects which taps participate; `weights` must match it
    /// in length (equal weights when omitted).
    pub fn new(
        pretrained: Pretrained,
        layer_ids: Option<Vec<usize>>,
        weights: Option<Vec<f64>>,
        device: Device,
    ) -> Result<Self> {
        let extractor = Box::new(ResNetExtractor::new(pretrained, device));
        let layer_ids = layer_ids.unwrap_or_else(|| pretrained.default_layer_ids());
        Self::with_extractor(extractor, layer_ids, weights)
    }

    /// Build a content loss over an arbitrary extractor.
    pub fn with_extractor(
        extractor: Box<dyn FeatureExtractor>,
        layer_ids: Vec<usize>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self> {
        if layer_ids.is_empty() {
            bail!("content loss needs at least one feature tap");
        }
        let tap_count = extractor.tap_count();
        if let Some(&bad) = layer_ids.iter().find(|&&id| id >= tap_count) {
            bail!("layer id {} out of range, trunk has {} taps", bad, tap_count);
        }

        let weights = match weights {
            Some(w) => {
                if w.len() != layer_ids.len() {
                    bail!(
                        "got {} weights for {} layer ids",
                        w.len(),
                        layer_ids.len()
                    );
                }
                if w.iter().any(|&v| v < 0.0) {
                    bail!("content loss weights must be non-negative");
                }
                w
            }
            None => vec![1.0 / layer_ids.len() as f64; layer_ids.len()],
        };

        Ok(Self {
            extractor,
            layer_ids,
            weights,
        })
    }

    /// Selected tap indices.
    pub fn layer_ids(&self) -> &[usize] {
        &self.layer_ids
    }

    /// Per-tap weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Weighted feature-space distance between generated and reference
    /// images. Gradients flow to `fake` only.
    pub fn forward(&self, fake: &Tensor, real: &Tensor) -> Tensor {
        let fake_taps = self.extractor.features(fake);
        let real_taps = tch::no_grad(|| self.extractor.features(real));

        let first = self.layer_ids[0];
        let mut total =
            fake_taps[first].mse_loss(&real_taps[first], Reduction::Mean) * self.weights[0];
        for (&id, &weight) in self.layer_ids.iter().zip(self.weights.iter()).skip(1) {
            let layer = fake_taps[id].mse_loss(&real_taps[id], Reduction::Mean);
            total = total + layer * weight;
        }
        total
    }
}
