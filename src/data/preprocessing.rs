//! Image preprocessing utilities for GAN training
//!
//! Networks operate on `[-1, 1]` floats (required by the generator's tanh
//! output), while decoded images and rendered frames live in `[0, 1]` or
//! `u8`. This module holds the conversions between the two worlds.

use anyhow::{ensure, Result};
use image::RgbImage;
use tch::{Kind, Tensor};

/// Map a `[0, 1]` tensor into the `[-1, 1]` range used by the networks.
pub fn centralize(x: &Tensor) -> Tensor {
    x * 2.0 - 1.0
}

/// Map a `[-1, 1]` tensor back into `[0, 1]`, clamping stray values.
///
/// Generated samples can slightly overshoot the tanh range after
/// interpolation, so the output is clamped before rendering.
pub fn decentralize(x: &Tensor) -> Tensor {
    ((x + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Convert a decoded RGB image into a `[-1, 1]` float tensor of shape
/// `(channels, height, width)`.
pub fn rgb_to_tensor(img: &RgbImage) -> Tensor {
    let (width, height) = img.dimensions();
    let pixels: Vec<f32> = img
        .as_raw()
        .iter()
        .map(|&v| f32::from(v) / 127.5 - 1.0)
        .collect();

    // Raw layout is row-major HWC; networks want CHW.
    Tensor::from_slice(&pixels)
        .view([i64::from(height), i64::from(width), 3])
        .permute([2, 0, 1])
}

/// Convert a `[-1, 1]` tensor of shape `(channels, height, width)` back
/// into an RGB image.
pub fn tensor_to_rgb(t: &Tensor) -> Result<RgbImage> {
    let size = t.size();
    ensure!(
        size.len() == 3 && size[0] == 3,
        "expected a (3, H, W) tensor, got {:?}",
        size
    );
    let (height, width) = (size[1], size[2]);

    let hwc = decentralize(t)
        .permute([1, 2, 0])
        .contiguous()
        .to_kind(Kind::Float);
    let values: Vec<f32> = hwc.flatten(0, -1).try_into()?;
    let bytes: Vec<u8> = values
        .iter()
        .map(|&v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect();

    RgbImage::from_raw(width as u32, height as u32, bytes)
        .ok_or_else(|| anyhow::anyhow!("pixel buffer does not match {}x{}", width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    #[test]
    fn test_centralize_decentralize_roundtrip() {
        let x = Tensor::rand([2, 3, 4, 4], (Kind::Float, Device::Cpu));
        let back = decentralize(&centralize(&x));

        let diff: f64 = (&x - &back).abs().max().double_value(&[]);
        assert!(diff < 1e-6);
    }

    #[test]
    fn test_decentralize_clamps() {
        let x = Tensor::from_slice(&[-2.0_f32, 0.0, 2.0]);
        let d = decentralize(&x);

        assert_eq!(d.double_value(&[0]), 0.0);
        assert_eq!(d.double_value(&[1]), 0.5);
        assert_eq!(d.double_value(&[2]), 1.0);
    }

    #[test]
    fn test_rgb_tensor_roundtrip() {
        let mut img = RgbImage::new(4, 3);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([(x * 40) as u8, (y * 80) as u8, 200]);
        }

        let t = rgb_to_tensor(&img);
        assert_eq!(t.size(), vec![3, 3, 4]);

        let back = tensor_to_rgb(&t).unwrap();
        assert_eq!(back.dimensions(), (4, 3));
        for (a, b) in img.as_raw().iter().zip(back.as_raw().iter()) {
            assert!((i16::from(*a) - i16::from(*b)).abs() <= 1);
        }
    }

    #[test]
    fn test_tensor_to_rgb_rejects_bad_shape() {
        let t = Tensor::zeros([1, 4, 4], (Kind::Float, Device::Cpu));
        assert!(tensor_to_rgb(&t).is_err());
    }
}
