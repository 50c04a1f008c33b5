//! WGAN-GP training core
//!
//! Wraps a generator/critic pair with the Wasserstein-GP objective:
//! `train_step` alternates critic and generator updates, `gradient_penalty`
//! enforces the 1-Lipschitz constraint at interpolated samples, and
//! `test_step` evaluates the registered metrics without touching any
//! parameter.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use tch::nn::{self, ModuleT, OptimizerConfig, VarStore};
use tch::{Device, Kind, Tensor};

use super::critic::{Critic, CriticConfig};
use super::generator::{Generator, GeneratorConfig};
use crate::training::{ContentLoss, MetricRegistry};

/// Source of latent noise for the generator.
///
/// Implementations must draw a fresh sample on every call; the training
/// loop never reuses a latent batch across sub-steps.
pub trait Sampler {
    /// Draw a latent batch of shape (batch_size, latent_dim).
    fn sample_z(&self, batch_size: i64, train: bool) -> Tensor;
}

/// Standard-normal latent sampler.
#[derive(Debug, Clone)]
pub struct GaussianSampler {
    pub latent_dim: i64,
    pub device: Device,
}

impl Sampler for GaussianSampler {
    fn sample_z(&self, batch_size: i64, _train: bool) -> Tensor {
        Tensor::randn([batch_size, self.latent_dim], (Kind::Float, self.device))
    }
}

/// Adversarial schedule and penalty weight.
#[derive(Debug, Clone)]
pub struct WganConfig {
    /// Critic updates per batch
    pub dis_steps: usize,
    /// Generator updates per batch
    pub gen_steps: usize,
    /// Gradient penalty coefficient (lambda)
    pub gp_weight: f64,
}

impl Default for WganConfig {
    fn default() -> Self {
        Self {
            dis_steps: 5,
            gen_steps: 1,
            gp_weight: 10.0,
        }
    }
}

/// Linear interpolation between real and fake samples.
///
/// `eps` must broadcast against the image tensors and stay inside `[0, 1]`
/// so the interpolate remains in the convex hull of the pair.
pub fn interpolate(x_real: &Tensor, x_fake: &Tensor, eps: &Tensor) -> Tensor {
    x_real + eps * (x_fake - x_real)
}

/// Complete WGAN-GP model
///
/// Generic over the generator and critic networks so the training core can
/// be exercised with stub modules; production code uses the [`SrWgan`]
/// alias.
pub struct Wgan<G: ModuleT, C: ModuleT> {
    /// Generator network
    pub generator: G,
    /// Critic network
    pub critic: C,
    /// Variable store for the generator
    pub gen_vs: VarStore,
    /// Variable store for the critic
    pub crt_vs: VarStore,
    /// Device (CPU/GPU)
    pub device: Device,
    sampler: Box<dyn Sampler>,
    config: WganConfig,
    registry: MetricRegistry,
    content: Option<(ContentLoss, f64)>,
}

/// WGAN-GP with the bundled super-resolution generator and critic.
pub type SrWgan = Wgan<Generator, Critic>;

impl<G: ModuleT, C: ModuleT> Wgan<G, C> {
    /// Create a new WGAN from prebuilt networks.
    pub fn new(
        generator: G,
        critic: C,
        gen_vs: VarStore,
        crt_vs: VarStore,
        sampler: Box<dyn Sampler>,
        config: WganConfig,
        registry: MetricRegistry,
    ) -> Result<Self> {
        if config.dis_steps == 0 {
            bail!("dis_steps must be >= 1");
        }
        if config.gen_steps == 0 {
            bail!("gen_steps must be >= 1");
        }
        if config.gp_weight < 0.0 {
            bail!("gp_weight must be >= 0");
        }
        let device = gen_vs.device();
        Ok(Self {
            generator,
            critic,
            gen_vs,
            crt_vs,
            device,
            sampler,
            config,
            registry,
            content: None,
        })
    }

    /// Add a perceptual content term to the generator loss.
    pub fn with_content_loss(mut self, loss: ContentLoss, weight: f64) -> Self {
        self.content = Some((loss, weight));
        self
    }

    /// Draw a fresh latent batch.
    pub fn sample_z(&self, batch_size: i64, train: bool) -> Tensor {
        self.sampler.sample_z(batch_size, train)
    }

    /// Generate images from a latent batch.
    pub fn generate(&self, z: &Tensor, train: bool) -> Tensor {
        self.generator.forward_t(z, train)
    }

    /// Score images with the critic.
    pub fn criticize(&self, x: &Tensor, train: bool) -> Tensor {
        self.critic.forward_t(x, train)
    }

    /// Schedule and penalty configuration.
    pub fn config(&self) -> &WganConfig {
        &self.config
    }

    /// Registered metric functions.
    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Get generator optimizer (Adam with GAN-friendly betas)
    pub fn gen_optimizer(&self, lr: f64) -> Result<nn::Optimizer> {
        Ok(nn::Adam {
            beta1: 0.5,
            beta2: 0.999,
            wd: 0.0,
            ..Default::default()
        }
        .build(&self.gen_vs, lr)?)
    }

    /// Get critic optimizer (Adam with GAN-friendly betas)
    pub fn crt_optimizer(&self, lr: f64) -> Result<nn::Optimizer> {
        Ok(nn::Adam {
            beta1: 0.5,
            beta2: 0.999,
            wd: 0.0,
            ..Default::default()
        }
        .build(&self.crt_vs, lr)?)
    }

    /// Calculate the gradient penalty.
    ///
    /// The penalty is evaluated on an image interpolated between the real
    /// and fake batches and added to the critic loss. The interpolation
    /// coefficient is Uniform(0, 1) per sample; canonical WGAN-GP, which
    /// keeps the interpolate inside the convex hull of the pair.
    pub fn gradient_penalty(&self, batch_size: i64, x_fake: &Tensor, x_real: &Tensor) -> Tensor {
        let eps = Tensor::rand([batch_size, 1, 1, 1], (Kind::Float, self.device));
        let interp = interpolate(x_real, x_fake, &eps)
            .detach()
            .set_requires_grad(true);

        // Critic in training mode, scored under gradient tracking
        let pred = self.critic.forward_t(&interp, true);

        // Gradients w.r.t. the interpolated input; create_graph keeps the
        // penalty differentiable w.r.t. the critic parameters.
        let grads = Tensor::run_backward(&[pred.sum(Kind::Float)], &[&interp], true, true);

        // L2 norm over all dimensions except the batch dimension
        let norm = grads[0]
            .reshape([batch_size, -1])
            .square()
            .sum_dim_intlist([1i64].as_slice(), false, Kind::Float)
            .sqrt();

        (norm - 1.0).square().mean(Kind::Float)
    }

    /// One adversarial update on a single batch.
    ///
    /// Performs `dis_steps` critic updates followed by `gen_steps`
    /// generator updates, then computes every registered metric from a
    /// fresh no-grad pass after the final update. A new latent batch is
    /// drawn for every individual update.
    pub fn train_step(
        &mut self,
        x_real: &Tensor,
        gen_opt: &mut nn::Optimizer,
        crt_opt: &mut nn::Optimizer,
    ) -> BTreeMap<String, f64> {
        let batch_size = x_real.size()[0];

        // Train the critic first; the WGAN-GP paper recommends several
        // critic updates per generator update.
        for _ in 0..self.config.dis_steps {
            let z = self.sampler.sample_z(batch_size, true);
            // Detach so the critic loss does not reach generator parameters
            let x_fake = self.generator.forward_t(&z, true).detach();
            let d_fake = self.critic.forward_t(&x_fake, true);
            let d_real = self.critic.forward_t(x_real, true);

            let d_cost = self.registry.d_loss(&d_fake, Some(&d_real));
            let gp = self.gradient_penalty(batch_size, &x_fake, x_real);
            let d_loss = d_cost + gp * self.config.gp_weight;

            crt_opt.zero_grad();
            d_loss.backward();
            crt_opt.step();
        }

        // Train the generator
        for _ in 0..self.config.gen_steps {
            let z = self.sampler.sample_z(batch_size, true);
            let x_fake = self.generator.forward_t(&z, true);
            let d_fake = self.critic.forward_t(&x_fake, true);

            let mut g_loss = self.registry.g_loss(&d_fake, None);
            if let Some((content, weight)) = &self.content {
                g_loss = g_loss + content.forward(&x_fake, x_real) * *weight;
            }

            gen_opt.zero_grad();
            g_loss.backward();
            gen_opt.step();
        }

        // Final state for metric computation: fresh latent draw, inference
        // mode, no gradient tracking.
        tch::no_grad(|| {
            let z = self.sampler.sample_z(batch_size, false);
            let x_fake = self.generator.forward_t(&z, false);
            let d_fake = self.critic.forward_t(&x_fake, false);
            let d_real = self.critic.forward_t(x_real, false);
            self.registry.evaluate(&d_fake, &d_real)
        })
    }

    /// Evaluate the registered metrics on a batch without updating anything.
    pub fn test_step(&self, x_real: &Tensor) -> BTreeMap<String, f64> {
        let batch_size = x_real.size()[0];
        tch::no_grad(|| {
            let z = self.sampler.sample_z(batch_size, false);
            let x_fake = self.generator.forward_t(&z, false);
            let d_fake = self.critic.forward_t(&x_fake, false);
            let d_real = self.critic.forward_t(x_real, false);
            self.registry.evaluate(&d_fake, &d_real)
        })
    }

    /// Save model weights
    pub fn save(&self, gen_path: &str, crt_path: &str) -> Result<()> {
        self.gen_vs.save(gen_path)?;
        self.crt_vs.save(crt_path)?;
        Ok(())
    }

    /// Load model weights
    pub fn load(&mut self, gen_path: &str, crt_path: &str) -> Result<()> {
        self.gen_vs.load(gen_path)?;
        self.crt_vs.load(crt_path)?;
        Ok(())
    }
}

impl SrWgan {
    /// Create the bundled super-resolution WGAN.
    ///
    /// `img_size` must be divisible by 16 (generator upsampling and critic
    /// downsampling stages must land exactly on the target resolution).
    pub fn with_defaults(
        latent_dim: i64,
        img_size: i64,
        config: WganConfig,
        device: Device,
    ) -> Result<Self> {
        if img_size % 16 != 0 {
            bail!("img_size must be divisible by 16, got {}", img_size);
        }
        if latent_dim <= 0 {
            bail!("latent_dim must be > 0");
        }

        let gen_vs = VarStore::new(device);
        let crt_vs = VarStore::new(device);

        let generator = Generator::new(
            &gen_vs.root(),
            GeneratorConfig {
                latent_dim,
                img_size,
                ..Default::default()
            },
        );
        let critic = Critic::new(
            &crt_vs.root(),
            CriticConfig {
                img_size,
                ..Default::default()
            },
        );
        let sampler = Box::new(GaussianSampler { latent_dim, device });

        Self::new(
            generator,
            critic,
            gen_vs,
            crt_vs,
            sampler,
            config,
            MetricRegistry::defaults(),
        )
    }

    /// Latent dimension of the bundled generator.
    pub fn latent_dim(&self) -> i64 {
        self.generator.config().latent_dim
    }

    /// Output resolution of the bundled generator.
    pub fn img_size(&self) -> i64 {
        self.generator.config().img_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::{Arc, Mutex};

    const STUB_LATENT: i64 = 6;
    const STUB_PIXELS: i64 = 4; // images are (1, 2, 2)

    #[derive(Debug)]
    struct StubGen {
        w: Tensor,
        calls: Cell<usize>,
    }

    impl ModuleT for StubGen {
        fn forward_t(&self, xs: &Tensor, _train: bool) -> Tensor {
            self.calls.set(self.calls.get() + 1);
            xs.matmul(&self.w).reshape([-1, 1, 2, 2])
        }
    }

    #[derive(Debug)]
    struct StubCritic {
        w: Tensor,
        calls: Cell<usize>,
    }

    impl ModuleT for StubCritic {
        fn forward_t(&self, xs: &Tensor, _train: bool) -> Tensor {
            self.calls.set(self.calls.get() + 1);
            let n = xs.size()[0];
            xs.reshape([n, -1]).matmul(&self.w)
        }
    }

    struct CountingSampler {
        draws: Arc<Mutex<Vec<f64>>>,
    }

    impl Sampler for CountingSampler {
        fn sample_z(&self, batch_size: i64, _train: bool) -> Tensor {
            let mut log = self.draws.lock().unwrap();
            let idx = log.len() as f64;
            log.push(idx);
            Tensor::full(
                [batch_size, STUB_LATENT],
                idx,
                (Kind::Float, Device::Cpu),
            )
        }
    }

    fn stub_wgan(
        config: WganConfig,
        critic_weight: f64,
    ) -> (Wgan<StubGen, StubCritic>, Arc<Mutex<Vec<f64>>>) {
        let gen_vs = VarStore::new(Device::Cpu);
        let crt_vs = VarStore::new(Device::Cpu);

        let generator = StubGen {
            w: gen_vs.root().var(
                "w",
                &[STUB_LATENT, STUB_PIXELS],
                nn::Init::Randn {
                    mean: 0.0,
                    stdev: 0.1,
                },
            ),
            calls: Cell::new(0),
        };
        let critic = StubCritic {
            w: crt_vs
                .root()
                .var("w", &[STUB_PIXELS, 1], nn::Init::Const(critic_weight)),
            calls: Cell::new(0),
        };

        let draws = Arc::new(Mutex::new(Vec::new()));
        let sampler = Box::new(CountingSampler {
            draws: Arc::clone(&draws),
        });

        let model = Wgan::new(
            generator,
            critic,
            gen_vs,
            crt_vs,
            sampler,
            config,
            MetricRegistry::defaults(),
        )
        .unwrap();

        (model, draws)
    }

    fn tiny_sr_wgan() -> SrWgan {
        let mut model = SrWgan::with_defaults(
            8,
            16,
            WganConfig {
                dis_steps: 1,
                gen_steps: 1,
                gp_weight: 10.0,
            },
            Device::Cpu,
        )
        .unwrap();
        // Deterministic inference scores regardless of dropout draw
        model.critic = Critic::new(
            &model.crt_vs.root().sub("det"),
            CriticConfig {
                img_size: 16,
                img_channels: 3,
                base_filters: 8,
                dropout: 0.0,
            },
        );
        model
    }

    fn snapshot(vs: &VarStore) -> Vec<(String, Tensor)> {
        vs.variables()
            .iter()
            .map(|(name, t)| (name.clone(), t.detach().copy()))
            .collect()
    }

    #[test]
    fn test_interpolate_boundaries() {
        let real = Tensor::rand([3, 1, 2, 2], (Kind::Float, Device::Cpu));
        let fake = Tensor::rand([3, 1, 2, 2], (Kind::Float, Device::Cpu));

        let zeros = Tensor::zeros([3, 1, 1, 1], (Kind::Float, Device::Cpu));
        let ones = Tensor::ones([3, 1, 1, 1], (Kind::Float, Device::Cpu));

        let at_real = interpolate(&real, &fake, &zeros);
        let at_fake = interpolate(&real, &fake, &ones);

        assert!(at_real.allclose(&real, 1e-6, 1e-6, false));
        assert!(at_fake.allclose(&fake, 1e-6, 1e-6, false));
    }

    #[test]
    fn test_gradient_penalty_non_negative() {
        let (model, _) = stub_wgan(WganConfig::default(), 0.3);

        let real = Tensor::randn([4, 1, 2, 2], (Kind::Float, Device::Cpu));
        let fake = Tensor::randn([4, 1, 2, 2], (Kind::Float, Device::Cpu));

        let gp: f64 = model.gradient_penalty(4, &fake, &real).double_value(&[]);
        assert!(gp >= 0.0);
        assert!(gp.is_finite());
    }

    #[test]
    fn test_gradient_penalty_linear_critic_analytic() {
        // For a linear critic c(x) = w . x the input gradient is w for every
        // interpolate, so the penalty is exactly (||w|| - 1)^2.
        let (model, _) = stub_wgan(WganConfig::default(), 1.0);

        let real = Tensor::ones([4, 1, 2, 2], (Kind::Float, Device::Cpu));
        let fake = Tensor::zeros([4, 1, 2, 2], (Kind::Float, Device::Cpu));

        let gp: f64 = model.gradient_penalty(4, &fake, &real).double_value(&[]);
        // ||w|| = sqrt(4 * 1) = 2 -> penalty = 1
        assert!((gp - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_critic_loss_with_penalty_analytic() {
        let config = WganConfig {
            dis_steps: 5,
            gen_steps: 1,
            gp_weight: 10.0,
        };
        let (model, _) = stub_wgan(config, 1.0);

        let real = Tensor::ones([4, 1, 2, 2], (Kind::Float, Device::Cpu));
        let fake = Tensor::zeros([4, 1, 2, 2], (Kind::Float, Device::Cpu));

        let d_fake = model.criticize(&fake, true);
        let d_real = model.criticize(&real, true);

        let d_cost = model.registry().d_loss(&d_fake, Some(&d_real));
        let gp = model.gradient_penalty(4, &fake, &real);
        let total: f64 = (d_cost + gp * model.config().gp_weight).double_value(&[]);

        // base = E[fake] - E[real] = 0 - 4; penalty = 10 * (2 - 1)^2
        assert!((total - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_train_step_call_counts() {
        let config = WganConfig {
            dis_steps: 3,
            gen_steps: 2,
            gp_weight: 10.0,
        };
        let (mut model, _) = stub_wgan(config, 0.3);

        let mut gen_opt = model.gen_optimizer(1e-3).unwrap();
        let mut crt_opt = model.crt_optimizer(1e-3).unwrap();

        let real = Tensor::randn([4, 1, 2, 2], (Kind::Float, Device::Cpu));
        model.train_step(&real, &mut gen_opt, &mut crt_opt);

        // Critic: 3 per dis step (fake, real, penalty), 1 per gen step,
        // 2 in the metric pass.
        assert_eq!(model.critic.calls.get(), 3 * 3 + 2 + 2);
        // Generator: 1 per dis step, 1 per gen step, 1 in the metric pass.
        assert_eq!(model.generator.calls.get(), 3 + 2 + 1);
    }

    #[test]
    fn test_latent_draw_fresh_per_update() {
        let config = WganConfig {
            dis_steps: 2,
            gen_steps: 2,
            gp_weight: 10.0,
        };
        let (mut model, draws) = stub_wgan(config, 0.3);

        let mut gen_opt = model.gen_optimizer(1e-3).unwrap();
        let mut crt_opt = model.crt_optimizer(1e-3).unwrap();

        let real = Tensor::randn([4, 1, 2, 2], (Kind::Float, Device::Cpu));
        model.train_step(&real, &mut gen_opt, &mut crt_opt);

        let log = draws.lock().unwrap();
        // One draw per critic update, per generator update, plus the metric pass.
        assert_eq!(log.len(), 2 + 2 + 1);
        for pair in log.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_train_step_metric_keys() {
        let (mut model, _) = stub_wgan(WganConfig::default(), 0.3);

        let mut gen_opt = model.gen_optimizer(1e-3).unwrap();
        let mut crt_opt = model.crt_optimizer(1e-3).unwrap();

        let real = Tensor::randn([4, 1, 2, 2], (Kind::Float, Device::Cpu));
        let metrics = model.train_step(&real, &mut gen_opt, &mut crt_opt);

        for key in ["d_loss", "g_loss", "real_acc", "fake_acc"] {
            assert!(metrics.contains_key(key), "missing metric {}", key);
        }
    }

    #[test]
    fn test_train_step_updates_both_networks() {
        let (mut model, _) = stub_wgan(WganConfig::default(), 0.3);

        let gen_before = snapshot(&model.gen_vs);
        let crt_before = snapshot(&model.crt_vs);

        let mut gen_opt = model.gen_optimizer(1e-2).unwrap();
        let mut crt_opt = model.crt_optimizer(1e-2).unwrap();

        let real = Tensor::randn([4, 1, 2, 2], (Kind::Float, Device::Cpu));
        model.train_step(&real, &mut gen_opt, &mut crt_opt);

        let gen_changed = gen_before
            .iter()
            .any(|(name, old)| !model.gen_vs.variables()[name].allclose(old, 1e-9, 1e-9, false));
        let crt_changed = crt_before
            .iter()
            .any(|(name, old)| !model.crt_vs.variables()[name].allclose(old, 1e-9, 1e-9, false));

        assert!(gen_changed);
        assert!(crt_changed);
    }

    #[test]
    fn test_test_step_mutates_nothing() {
        let model = tiny_sr_wgan();

        let gen_before = snapshot(&model.gen_vs);
        let crt_before = snapshot(&model.crt_vs);

        let real = Tensor::randn([2, 3, 16, 16], (Kind::Float, Device::Cpu));
        let metrics = model.test_step(&real);

        assert!(metrics.contains_key("d_loss"));
        for (name, old) in &gen_before {
            assert!(model.gen_vs.variables()[name].allclose(old, 0.0, 0.0, false));
        }
        for (name, old) in &crt_before {
            assert!(model.crt_vs.variables()[name].allclose(old, 0.0, 0.0, false));
        }
    }

    #[test]
    fn test_sr_wgan_rejects_bad_sizes() {
        assert!(SrWgan::with_defaults(8, 20, WganConfig::default(), Device::Cpu).is_err());
        assert!(SrWgan::with_defaults(0, 16, WganConfig::default(), Device::Cpu).is_err());
    }

    #[test]
    fn test_config_validation() {
        let bad = WganConfig {
            dis_steps: 0,
            gen_steps: 1,
            gp_weight: 10.0,
        };
        let gen_vs = VarStore::new(Device::Cpu);
        let crt_vs = VarStore::new(Device::Cpu);
        let result = Wgan::new(
            StubGen {
                w: gen_vs.root().var(
                    "w",
                    &[STUB_LATENT, STUB_PIXELS],
                    nn::Init::Const(0.0),
                ),
                calls: Cell::new(0),
            },
            StubCritic {
                w: crt_vs.root().var("w", &[STUB_PIXELS, 1], nn::Init::Const(0.0)),
                calls: Cell::new(0),
            },
            gen_vs,
            crt_vs,
            Box::new(CountingSampler {
                draws: Arc::new(Mutex::new(Vec::new())),
            }),
            bad,
            MetricRegistry::defaults(),
        );
        assert!(result.is_err());
    }
}
