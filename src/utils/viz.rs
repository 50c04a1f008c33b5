//! Epoch sample visualization
//!
//! Renders a fixed latent batch after every epoch so training progress is
//! visible as a strip of images per epoch, and optionally as an animated
//! GIF over the whole run. Critic scores for the rendered samples are
//! squashed through a sigmoid purely for readable logging.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, RgbImage};
use tch::Tensor;
use tracing::info;

use crate::data::tensor_to_rgb;
use crate::model::{Critic, Generator, SrWgan};
use crate::training::EpochCallback;

/// Renders the same latent batch after every epoch.
pub struct EpochVisualizer {
    z: Tensor,
    out_dir: PathBuf,
    frames: Vec<RgbImage>,
}

impl EpochVisualizer {
    /// Create a visualizer with a fixed latent batch.
    ///
    /// The batch is drawn once so consecutive epochs render the same
    /// latent points and differences come from the generator alone.
    pub fn new(model: &SrWgan, num_samples: i64, out_dir: &str) -> Result<Self> {
        if num_samples <= 0 {
            bail!("num_samples must be > 0");
        }
        std::fs::create_dir_all(out_dir)?;

        let z = model.sample_z(num_samples, false);
        Ok(Self {
            z,
            out_dir: PathBuf::from(out_dir),
            frames: Vec::new(),
        })
    }

    /// Render the current generator output as one horizontal strip.
    fn render(&self, model: &SrWgan) -> Result<(RgbImage, Vec<f64>)> {
        let (samples, scores) = tch::no_grad(|| {
            let samples = model.generate(&self.z, false);
            let scores = model.criticize(&samples, false).sigmoid();
            (samples, scores)
        });

        let num = samples.size()[0];
        let img_size = samples.size()[2] as u32;
        let mut strip = RgbImage::new(img_size * num as u32, img_size);

        for i in 0..num {
            let tile = tensor_to_rgb(&samples.get(i))?;
            image::imageops::replace(&mut strip, &tile, i64::from(img_size) * i, 0);
        }

        let score_values: Vec<f64> = (0..num).map(|i| scores.double_value(&[i, 0])).collect();
        Ok((strip, score_values))
    }

    /// Render, save and retain the frame for the current epoch.
    pub fn visualize(&mut self, epoch: usize, model: &SrWgan) -> Result<()> {
        let (strip, scores) = self.render(model)?;

        let path = self.out_dir.join(format!("epoch_{:04}.png", epoch));
        strip
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;

        let formatted: Vec<String> = scores.iter().map(|s| format!("{:.3}", s)).collect();
        info!(
            "Epoch {} samples saved to {} (scores: {})",
            epoch,
            path.display(),
            formatted.join(", ")
        );

        self.frames.push(strip);
        Ok(())
    }

    /// Number of frames rendered so far.
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Combine all rendered frames into an animated GIF.
    pub fn save_gif(&self, path: &str) -> Result<()> {
        if self.frames.is_empty() {
            bail!("no frames rendered yet");
        }

        let file = File::create(Path::new(path))?;
        let mut encoder = GifEncoder::new(file);

        for frame in &self.frames {
            let rgba = image::DynamicImage::ImageRgb8(frame.clone()).to_rgba8();
            let frame = Frame::from_parts(rgba, 0, 0, Delay::from_numer_denom_ms(500, 1));
            encoder.encode_frame(frame)?;
        }

        info!("Saved training animation to {}", path);
        Ok(())
    }
}

impl EpochCallback<Generator, Critic> for EpochVisualizer {
    fn on_epoch_end(&mut self, epoch: usize, model: &SrWgan) -> Result<()> {
        self.visualize(epoch, model)
    }

    fn on_train_end(&mut self, _model: &SrWgan) -> Result<()> {
        let gif_path = self.out_dir.join("training.gif");
        self.save_gif(gif_path.to_string_lossy().as_ref())
    }
}
