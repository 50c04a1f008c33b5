//! Loss and score functions for WGAN-GP training
//!
//! All functions share the [`MetricFn`](crate::training::MetricFn)
//! signature so they can live in the metric registry: the first argument
//! is the critic output on generated samples, the second (when present)
//! the critic output on real samples.

use tch::{Kind, Tensor};

/// Critic loss: E[D(G(z))] - E[D(x)]
///
/// The critic drives fake scores down and real scores up; the gradient
/// penalty is added separately by the training core. Without real scores
/// the loss degrades to its fake term.
pub fn critic_loss(fake_output: &Tensor, real_output: Option<&Tensor>) -> Tensor {
    match real_output {
        Some(real) => fake_output.mean(Kind::Float) - real.mean(Kind::Float),
        None => fake_output.mean(Kind::Float),
    }
}

/// Generator loss: -E[D(G(z))]
pub fn generator_loss(fake_output: &Tensor, _real_output: Option<&Tensor>) -> Tensor {
    -fake_output.mean(Kind::Float)
}

/// Fraction of real samples the critic scores above zero.
///
/// Wasserstein scores are unbounded; zero is the natural decision
/// boundary for a diagnostic accuracy readout.
pub fn real_score_accuracy(fake_output: &Tensor, real_output: Option<&Tensor>) -> Tensor {
    match real_output {
        Some(real) => real.gt(0.0).to_kind(Kind::Float).mean(Kind::Float),
        None => Tensor::from(0f32).to_device(fake_output.device()),
    }
}

/// Fraction of generated samples the critic scores below zero.
pub fn fake_score_accuracy(fake_output: &Tensor, _real_output: Option<&Tensor>) -> Tensor {
    fake_output
        .lt(0.0)
        .to_kind(Kind::Float)
        .mean(Kind::Float)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    #[test]
    fn test_critic_loss_separates_means() {
        let real = Tensor::full([4, 1], 3.0, (Kind::Float, Device::Cpu));
        let fake = Tensor::full([4, 1], -2.0, (Kind::Float, Device::Cpu));

        let loss = critic_loss(&fake, Some(&real));
        assert_eq!(loss.size(), Vec::<i64>::new());
        assert!((loss.double_value(&[]) - (-5.0)).abs() < 1e-6);
    }

    #[test]
    fn test_generator_loss_negates_fake_mean() {
        let fake = Tensor::full([4, 1], 2.5, (Kind::Float, Device::Cpu));
        let loss = generator_loss(&fake, None);
        assert!((loss.double_value(&[]) - (-2.5)).abs() < 1e-6);
    }

    #[test]
    fn test_score_accuracies() {
        let real = Tensor::from_slice(&[1.0f32, 2.0, -1.0, 3.0]).view([4, 1]);
        let fake = Tensor::from_slice(&[-1.0f32, -2.0, 1.0, -3.0]).view([4, 1]);

        let real_acc = real_score_accuracy(&fake, Some(&real));
        let fake_acc = fake_score_accuracy(&fake, None);

        assert!((real_acc.double_value(&[]) - 0.75).abs() < 1e-6);
        assert!((fake_acc.double_value(&[]) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_losses_are_unbounded_below() {
        // A confident critic can push the Wasserstein loss arbitrarily negative.
        let real = Tensor::full([4, 1], 100.0, (Kind::Float, Device::Cpu));
        let fake = Tensor::full([4, 1], -100.0, (Kind::Float, Device::Cpu));

        let loss = critic_loss(&fake, Some(&real));
        assert!(loss.double_value(&[]) < -100.0);
    }
}
