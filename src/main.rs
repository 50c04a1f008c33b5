//! WGAN-GP for Image Super-Resolution Training
//!
//! Main entry point providing CLI interface for:
//! - Training the WGAN-GP on a folder of images
//! - Generating samples from a trained checkpoint
//! - Evaluating a checkpoint against held-out data

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sr_wgan_gp::{
    data::{tensor_to_rgb, DataLoader, PairedImageDataset},
    model::{SrWgan, WganConfig},
    training::{ContentLoss, ResNetExtractor, Trainer, TrainerConfig},
    utils::{load_checkpoint, Config, EpochVisualizer},
};

/// WGAN-GP for Image Super-Resolution
#[derive(Parser)]
#[command(name = "sr_wgan_gp")]
#[command(version = "0.1.0")]
#[command(about = "Train a Wasserstein GAN with gradient penalty on image crops")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the WGAN-GP model
    Train {
        /// Directory of training images (overrides config)
        #[arg(short, long)]
        data: Option<String>,

        /// Number of epochs (overrides config)
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Resume from checkpoint directory
        #[arg(long)]
        resume: Option<String>,

        /// Render a fixed sample strip into this directory after each epoch
        #[arg(long)]
        visualize: Option<String>,
    },

    /// Generate samples from a trained checkpoint
    Generate {
        /// Path to checkpoint directory
        #[arg(short, long)]
        model: String,

        /// Number of samples to generate
        #[arg(short, long, default_value = "16")]
        num_samples: i64,

        /// Output directory for PNG files
        #[arg(short, long, default_value = "samples")]
        output: String,
    },

    /// Evaluate a checkpoint against a directory of images
    Evaluate {
        /// Path to checkpoint directory
        #[arg(short, long)]
        model: String,

        /// Directory of evaluation images
        #[arg(short, long)]
        data: String,
    },

    /// Initialize default configuration file
    Init {
        /// Output configuration file path
        #[arg(short, long, default_value = "config.json")]
        output: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Train {
            data,
            epochs,
            resume,
            visualize,
        } => {
            train_model(&cli.config, data, epochs, resume, visualize)?;
        }
        Commands::Generate {
            model,
            num_samples,
            output,
        } => {
            generate_samples(&cli.config, &model, num_samples, &output)?;
        }
        Commands::Evaluate { model, data } => {
            evaluate_model(&cli.config, &model, &data)?;
        }
        Commands::Init { output } => {
            init_config(&output)?;
        }
    }

    Ok(())
}

fn load_config(config_path: &str) -> Result<Config> {
    let config = if std::path::Path::new(config_path).exists() {
        Config::from_json(config_path)?
    } else {
        info!("Config file not found, using defaults");
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

/// Build the model described by the config, including the optional
/// perceptual content term.
fn build_model(config: &Config) -> Result<SrWgan> {
    let device = config.get_device();

    let wgan_config = WganConfig {
        dis_steps: config.training.dis_steps,
        gen_steps: config.training.gen_steps,
        gp_weight: config.training.gp_weight,
    };

    let mut model = SrWgan::with_defaults(
        config.model.latent_dim,
        config.model.img_size,
        wgan_config,
        device,
    )?;

    if config.content.weight > 0.0 {
        let pretrained = config.pretrained()?;
        let mut trunk = ResNetExtractor::new(pretrained, device);
        if let Some(path) = &config.content.weights_path {
            trunk.load_weights(path)?;
            info!("Loaded content trunk weights from {}", path);
        }
        let layer_ids = config
            .content
            .layer_ids
            .clone()
            .unwrap_or_else(|| pretrained.default_layer_ids());
        let loss =
            ContentLoss::with_extractor(Box::new(trunk), layer_ids, config.content.layer_weights.clone())?;
        model = model.with_content_loss(loss, config.content.weight);
        info!(
            "Content loss enabled ({}, weight {})",
            config.content.pretrained, config.content.weight
        );
    }

    Ok(model)
}

/// Train the WGAN-GP model
fn train_model(
    config_path: &str,
    data_dir: Option<String>,
    epochs: Option<usize>,
    resume: Option<String>,
    visualize: Option<String>,
) -> Result<()> {
    let config = load_config(config_path)?;

    let device = config.get_device();
    info!("Using device: {:?}", device);

    let train_dir = data_dir.unwrap_or_else(|| config.data.train_dir.clone());
    info!("Loading images from {}", train_dir);

    let dataset = PairedImageDataset::from_folder(
        &train_dir,
        config.data.crop_size,
        config.data.upscale_factor,
    )?;
    info!("Loaded {} image pairs", dataset.len());

    let mut data_loader = DataLoader::from_dataset(
        dataset,
        config.data.batch_size,
        true, // shuffle
        true, // drop_last
    );

    let mut model = build_model(&config)?;

    // Resume from checkpoint if specified
    if let Some(checkpoint_path) = resume {
        let (epoch, _metrics) = load_checkpoint(&mut model, &checkpoint_path)?;
        info!("Resumed from epoch {}", epoch);
    }

    let training_config = TrainerConfig {
        epochs: epochs.unwrap_or(config.training.epochs),
        gen_lr: config.training.gen_lr,
        crt_lr: config.training.crt_lr,
        checkpoint_every: config.training.checkpoint_every,
        checkpoint_dir: config.training.checkpoint_dir.clone(),
    };

    let mut trainer = Trainer::new(training_config);
    if let Some(sample_dir) = visualize {
        let viz = EpochVisualizer::new(&model, 8, &sample_dir)?;
        trainer = trainer.with_callback(Box::new(viz));
    }

    let metrics = trainer.train(&mut model, &mut data_loader)?;

    info!(
        "Training complete. Final G_loss: {:.4}, D_loss: {:.4}",
        metrics.latest_gen_loss().unwrap_or(0.0),
        metrics.latest_crt_loss().unwrap_or(0.0)
    );

    Ok(())
}

/// Generate samples from a trained checkpoint
fn generate_samples(
    config_path: &str,
    model_path: &str,
    num_samples: i64,
    output_dir: &str,
) -> Result<()> {
    if num_samples <= 0 {
        bail!("num_samples must be > 0");
    }

    let config = load_config(config_path)?;
    let mut model = build_model(&config)?;

    let gen_path = format!("{}/generator.pt", model_path);
    let crt_path = format!("{}/critic.pt", model_path);
    model.load(&gen_path, &crt_path)?;
    info!("Loaded model from {}", model_path);

    std::fs::create_dir_all(output_dir)?;

    info!("Generating {} samples", num_samples);
    let z = model.sample_z(num_samples, false);
    let samples = tch::no_grad(|| model.generate(&z, false));

    for i in 0..num_samples {
        let img = tensor_to_rgb(&samples.get(i))?;
        let path = format!("{}/sample_{:04}.png", output_dir, i);
        img.save(&path)?;
    }

    info!("Saved {} samples to {}", num_samples, output_dir);
    Ok(())
}

/// Evaluate a checkpoint against held-out images
fn evaluate_model(config_path: &str, model_path: &str, data_dir: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let mut model = build_model(&config)?;

    let gen_path = format!("{}/generator.pt", model_path);
    let crt_path = format!("{}/critic.pt", model_path);
    model.load(&gen_path, &crt_path)?;
    info!("Loaded model from {}", model_path);

    let dataset = PairedImageDataset::from_folder(
        data_dir,
        config.data.crop_size,
        config.data.upscale_factor,
    )?;
    let mut data_loader = DataLoader::from_dataset(dataset, config.data.batch_size, false, false);

    let trainer: Trainer<_, _> = Trainer::new(TrainerConfig::default());
    let averages = trainer.evaluate(&model, &mut data_loader)?;

    info!("Evaluation over {}:", data_dir);
    for (name, value) in &averages {
        info!("  {} = {:.4}", name, value);
    }

    Ok(())
}

/// Initialize default configuration file
fn init_config(output_path: &str) -> Result<()> {
    let config = Config::default();

    if output_path.ends_with(".toml") {
        config.save_toml(output_path)?;
    } else {
        config.save_json(output_path)?;
    }

    info!("Created default configuration at {}", output_path);
    Ok(())
}
