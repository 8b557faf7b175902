//! chortle - train and query the laughter clip embedding model

#![recursion_limit = "256"]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::wgpu::WgpuDevice;
use burn::backend::{Autodiff, NdArray, Wgpu};
use burn::config::Config;
use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use chortle_core::{FeatureConfig, FeatureExtractor, read_clip_list};
use chortle_train::artifacts::{self, embed, load_model};
use chortle_train::{EmbeddingSpace, TrainingConfig, train};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Triplet-loss embeddings for laughter clips
#[derive(Parser, Debug)]
#[command(name = "chortle")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Tensor backend
    #[arg(long, global = true, value_enum, default_value_t = BackendKind::Ndarray)]
    backend: BackendKind,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendKind {
    /// CPU
    Ndarray,
    /// GPU through wgpu
    Wgpu,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SpaceArg {
    Probabilities,
    Logits,
    Hidden,
}

impl From<SpaceArg> for EmbeddingSpace {
    fn from(space: SpaceArg) -> Self {
        match space {
            SpaceArg::Probabilities => EmbeddingSpace::Probabilities,
            SpaceArg::Logits => EmbeddingSpace::Logits,
            SpaceArg::Hidden => EmbeddingSpace::Hidden,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a model and evaluate it on the held-out split
    Train {
        /// Clip list, one path per line relative to the dataset root
        #[arg(long, default_value = "../dataset/unbalanced/10secondclipfiles.txt")]
        file_list: PathBuf,

        /// Directory holding one folder per category
        #[arg(long, default_value = "../dataset/audioset_laughter_clips/")]
        dataset_root: PathBuf,

        /// Training config (JSON); defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where config, weights and report are written
        #[arg(short, long, default_value = "artifacts")]
        artifacts: PathBuf,

        #[arg(long)]
        iterations: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        learning_rate: Option<f64>,

        /// Seed for split, triplets and weight init
        #[arg(long)]
        seed: Option<u64>,

        /// Activation treated as the embedding
        #[arg(long, value_enum)]
        space: Option<SpaceArg>,
    },

    /// Print embeddings of clips as JSON lines
    Embed {
        /// Directory written by `train`
        #[arg(short, long, default_value = "artifacts")]
        artifacts: PathBuf,

        /// Override the embedding space stored with the model
        #[arg(long, value_enum)]
        space: Option<SpaceArg>,

        #[arg(required = true)]
        clips: Vec<PathBuf>,
    },

    /// Print feature statistics for a clip
    Inspect {
        clip: PathBuf,

        /// Feature config (JSON); defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the default training config
    Config,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber already installed");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Train {
            file_list,
            dataset_root,
            config,
            artifacts,
            iterations,
            batch_size,
            learning_rate,
            seed,
            space,
        } => {
            let mut config = match config {
                Some(path) => TrainingConfig::load(&path)
                    .map_err(|e| anyhow!("failed to load config {}: {e:?}", path.display()))?,
                None => TrainingConfig::new(),
            };
            if let Some(iterations) = iterations {
                config.iterations = iterations;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            if let Some(learning_rate) = learning_rate {
                config.learning_rate = learning_rate;
            }
            if seed.is_some() {
                config.split.seed = seed;
            }
            if let Some(space) = space {
                config.embedding_space = space.into();
            }
            config.validate()?;

            let clips = read_clip_list(&file_list, &dataset_root)?;
            match cli.backend {
                BackendKind::Ndarray => {
                    run_train::<Autodiff<NdArray>>(&config, clips, &artifacts, &NdArrayDevice::default())
                }
                BackendKind::Wgpu => {
                    run_train::<Autodiff<Wgpu>>(&config, clips, &artifacts, &WgpuDevice::default())
                }
            }
        }

        Commands::Embed {
            artifacts,
            space,
            clips,
        } => match cli.backend {
            BackendKind::Ndarray => run_embed::<NdArray>(&artifacts, space, &clips, &NdArrayDevice::default()),
            BackendKind::Wgpu => run_embed::<Wgpu>(&artifacts, space, &clips, &WgpuDevice::default()),
        },

        Commands::Inspect { clip, config } => {
            let features = match config {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    serde_json::from_str::<FeatureConfig>(&text)?
                }
                None => FeatureConfig::default(),
            };
            inspect(&clip, features)
        }

        Commands::Config => {
            println!("{}", TrainingConfig::new());
            Ok(())
        }
    }
}

fn run_train<B: AutodiffBackend>(
    config: &TrainingConfig,
    clips: Vec<PathBuf>,
    artifacts_dir: &Path,
    device: &B::Device,
) -> Result<()> {
    let outcome = train::<B>(config, clips, device)?;
    let report = &outcome.report;

    if let (Some(first), Some(last)) = (report.loss_history.first(), report.loss_history.last()) {
        info!("loss {first:.5} -> {last:.5} over {} steps", report.loss_history.len());
    }
    info!("Test accuracy: {:.3}", report.test_accuracy);

    artifacts::save(artifacts_dir, config, &outcome.model.valid(), report)
}

#[derive(Serialize)]
struct EmbeddingLine<'a> {
    path: String,
    embedding: &'a [f32],
}

fn run_embed<B: Backend>(
    artifacts_dir: &Path,
    space: Option<SpaceArg>,
    clips: &[PathBuf],
    device: &B::Device,
) -> Result<()> {
    let (config, model) = load_model::<B>(artifacts_dir, device)?;
    let space = space.map(EmbeddingSpace::from).unwrap_or(config.embedding_space);
    let extractor = FeatureExtractor::new(config.features.clone())?;

    let vectors = embed(&model, &extractor, space, clips, device)?;
    for (clip, vector) in clips.iter().zip(&vectors) {
        let line = EmbeddingLine {
            path: clip.display().to_string(),
            embedding: vector,
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

fn inspect(clip: &Path, config: FeatureConfig) -> Result<()> {
    let extractor = FeatureExtractor::new(config)?;
    let samples = chortle_core::audio::decode_to_mono(clip, extractor.config().sample_rate)?;
    if samples.len() > extractor.config().clip_samples {
        warn!(
            samples = samples.len(),
            limit = extractor.config().clip_samples,
            "clip will be truncated"
        );
    }

    let features = extractor.extract(&samples);
    let log_mel = extractor.log_mel(&samples);

    let min = log_mel.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = log_mel.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let nan_count = features.iter().filter(|x| x.is_nan()).count();

    println!("samples: {}", samples.len());
    println!("feature shape: {:?}", features.shape());
    println!("log-mel stats: min={min}, max={max}, nan_count={nan_count}");
    println!("frame 0: {:?}", log_mel.column(0).to_vec());
    Ok(())
}
