//! Persisted run output: config, weights, report.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use burn::config::Config;
use burn::module::Module;
use burn::record::{DefaultFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use chortle_core::{Error, FeatureExtractor};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::batch::features_to_tensor;
use crate::config::{EmbeddingSpace, TrainingConfig};
use crate::model::EmbeddingNet;
use crate::training::TrainingReport;

pub const CONFIG_FILE: &str = "config.json";
/// The recorder appends its own extension.
pub const MODEL_FILE: &str = "model";
pub const REPORT_FILE: &str = "report.json";

fn recorder() -> DefaultFileRecorder<FullPrecisionSettings> {
    DefaultFileRecorder::<FullPrecisionSettings>::new()
}

pub fn save<B: Backend>(
    dir: &Path,
    config: &TrainingConfig,
    model: &EmbeddingNet<B>,
    report: &TrainingReport,
) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create artifact dir: {}", dir.display()))?;

    config
        .save(dir.join(CONFIG_FILE))
        .with_context(|| format!("failed to write {CONFIG_FILE}"))?;

    model
        .clone()
        .save_file(dir.join(MODEL_FILE), &recorder())
        .map_err(|e| anyhow!("failed to save model weights: {e:?}"))?;

    let report_path = dir.join(REPORT_FILE);
    let writer = BufWriter::new(
        File::create(&report_path).with_context(|| format!("failed to create {}", report_path.display()))?,
    );
    serde_json::to_writer_pretty(writer, report)?;

    info!(dir = %dir.display(), "saved artifacts");
    Ok(())
}

/// Restore the config and weights written by [`save`].
pub fn load_model<B: Backend>(dir: &Path, device: &B::Device) -> Result<(TrainingConfig, EmbeddingNet<B>)> {
    let config = TrainingConfig::load(dir.join(CONFIG_FILE))
        .map_err(|e| anyhow!("failed to read {}: {e:?}", dir.join(CONFIG_FILE).display()))?;

    // Parameters are overwritten by the record; the seed only shapes the skeleton.
    let model: EmbeddingNet<B> = config.model.init(device, &mut StdRng::seed_from_u64(0));
    let model = model
        .load_file(dir.join(MODEL_FILE), &recorder(), device)
        .map_err(|e| anyhow!("failed to load model weights from {}: {e:?}", dir.display()))?;

    Ok((config, model))
}

pub fn load_report(dir: &Path) -> Result<TrainingReport> {
    let path = dir.join(REPORT_FILE);
    let reader = BufReader::new(File::open(&path).with_context(|| format!("failed to open {}", path.display()))?);
    Ok(serde_json::from_reader(reader)?)
}

/// One embedding vector per clip. Clips need not sit in a category folder.
pub fn embed<B: Backend>(
    model: &EmbeddingNet<B>,
    extractor: &FeatureExtractor,
    space: EmbeddingSpace,
    clips: &[PathBuf],
    device: &B::Device,
) -> Result<Vec<Vec<f32>>> {
    clips
        .iter()
        .map(|clip| -> Result<Vec<f32>> {
            let features = extractor.extract_file(clip)?.insert_axis(ndarray::Axis(0));
            let output = model.forward(features_to_tensor::<B>(features.view(), device));
            let vector = output
                .embedding(space)
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| Error::Tensor(format!("{e:?}")))?;
            Ok(vector)
        })
        .collect()
}
