use std::path::PathBuf;

use anyhow::Result;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use chortle_core::{
    ExtractedBatch, FeatureExtractor, Label, build_triplets, flatten_triplets, split_dataset,
};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::batch::{features_to_tensor, one_hot_targets};
use crate::config::TrainingConfig;
use crate::evaluate::{Accuracy, evaluate};
use crate::loss::TripletLoss;
use crate::model::EmbeddingNet;

/// What a run produced besides the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub seed: u64,
    pub train_examples: usize,
    pub test_examples: usize,
    pub triplets: usize,
    /// One entry per optimizer step.
    pub loss_history: Vec<f32>,
    pub test_accuracy: f64,
}

/// Trained weights with the run report; the per-step loss history is
/// [`TrainingReport::loss_history`].
pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: EmbeddingNet<B>,
    pub report: TrainingReport,
}

/// Start of the batch window for `iteration` over a sequence of `len` clips.
///
/// Slides by `batch_size` and wraps modulo `len - batch_size`.
pub fn batch_offset(iteration: usize, batch_size: usize, len: usize) -> usize {
    let span = len.saturating_sub(batch_size);
    if span == 0 {
        0
    } else {
        (iteration * batch_size) % span
    }
}

/// Split, build triplets, run `iterations` Adam steps, then score the test
/// split.
pub fn train<B: AutodiffBackend>(
    config: &TrainingConfig,
    clips: Vec<PathBuf>,
    device: &B::Device,
) -> Result<TrainingOutcome<B>> {
    config.validate()?;

    let seed = config.split.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    info!(seed, clips = clips.len(), "starting training run");

    let split = split_dataset(clips, &config.split, &mut rng)?;
    info!("Train examples: {}", split.train.len());
    info!("Test examples: {}", split.test.len());

    // At least one full batch of triplets, even for a small train split.
    let per_batch = config.batch_size / 3;
    let triplets = build_triplets(&split.train, (split.train.len() / 3).max(per_batch), &mut rng)?;
    let sequence = flatten_triplets(&triplets);

    let extractor = FeatureExtractor::new(config.features.clone())?;
    let mut model: EmbeddingNet<B> = config.model.init(device, &mut rng);
    let mut optim = AdamConfig::new().init::<B, EmbeddingNet<B>>();
    let loss_fn = config.loss.init();

    let progress = progress_bar(config.iterations);
    let mut loss_history = Vec::with_capacity(config.iterations);

    for itr in 0..config.iterations {
        let offset = batch_offset(itr, config.batch_size, sequence.len());
        let batch = extractor.extract_batch(&sequence[offset..offset + config.batch_size])?;

        let loss = objective(&model, &loss_fn, config, &batch, device)?;
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(config.learning_rate, model, grads);

        progress.suspend(|| debug!(itr, offset, loss = loss_value, "optimizer step"));
        loss_history.push(loss_value);
        progress.set_message(format!("loss {loss_value:.5}"));
        progress.inc(1);
    }
    progress.finish_and_clear();

    let accuracy: Accuracy = evaluate(
        &model.valid(),
        &split.test,
        &extractor,
        config.eval_batch_size,
        device,
    )?;

    Ok(TrainingOutcome {
        model,
        report: TrainingReport {
            seed,
            train_examples: split.train.len(),
            test_examples: split.test.len(),
            triplets: triplets.len(),
            loss_history,
            test_accuracy: accuracy.value(),
        },
    })
}

/// Triplet loss on the chosen embedding, plus the weighted cross-entropy
/// term when enabled.
fn objective<B: AutodiffBackend>(
    model: &EmbeddingNet<B>,
    loss_fn: &TripletLoss,
    config: &TrainingConfig,
    batch: &ExtractedBatch,
    device: &B::Device,
) -> Result<Tensor<B, 1>> {
    let output = model.forward(features_to_tensor(batch.features.view(), device));
    let triplet = loss_fn.forward(output.embedding(config.embedding_space))?;

    if config.classification_weight > 0.0 {
        let ce = cross_entropy(output.logits, &batch.labels, device);
        return Ok(triplet + ce.mul_scalar(config.classification_weight));
    }
    Ok(triplet)
}

/// Mean negative log-likelihood of the true class, `[1]`.
fn cross_entropy<B: Backend>(logits: Tensor<B, 2>, labels: &[Label], device: &B::Device) -> Tensor<B, 1> {
    let targets = one_hot_targets::<B>(labels, device);
    (log_softmax(logits, 1) * targets).sum_dim(1).mean().neg()
}

fn progress_bar(iterations: usize) -> ProgressBar {
    let pb = ProgressBar::new(iterations as u64);
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{bar:30}] {pos}/{len} {msg}") {
        pb.set_style(style);
    }
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;
    use chortle_core::Error;

    #[test]
    fn offset_slides_and_wraps() {
        let offsets: Vec<usize> = (0..5).map(|i| batch_offset(i, 60, 210)).collect();
        assert_eq!(offsets, vec![0, 60, 120, 30, 90]);
    }

    #[test]
    fn offsets_stay_on_triplet_boundaries() {
        for i in 0..50 {
            let offset = batch_offset(i, 6, 33);
            assert_eq!(offset % 3, 0);
            assert!(offset + 6 <= 33);
        }
    }

    #[test]
    fn exact_fit_always_starts_at_zero() {
        assert_eq!(batch_offset(7, 60, 60), 0);
    }

    #[test]
    fn sequence_always_fills_one_batch() {
        let clips: Vec<PathBuf> = chortle_core::labels::CATEGORIES
            .iter()
            .flat_map(|c| (0..2).map(move |i| PathBuf::from(format!("/data/{c}/{i}.wav"))))
            .collect();
        let mut rng = StdRng::seed_from_u64(3);
        for batch_size in [3, 30, 60] {
            let count = (clips.len() / 3).max(batch_size / 3);
            let sequence = flatten_triplets(&build_triplets(&clips, count, &mut rng).unwrap());
            assert!(sequence.len() >= batch_size);
            assert!(batch_offset(9, batch_size, sequence.len()) + batch_size <= sequence.len());
        }
    }

    #[test]
    fn cross_entropy_of_confident_correct_prediction_is_small() {
        let device = Default::default();
        let logits = Tensor::<NdArray, 2>::from_data(
            TensorData::new(vec![10.0f32, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], [2, 5]),
            &device,
        );
        let labels = [Label::ALL[0], Label::ALL[1]];
        let ce = cross_entropy(logits, &labels, &device)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        // row 0 ~ 0, row 1 = ln 5
        let expected = (5.0f32.ln() + 4.0 * (-10.0f32).exp()) / 2.0;
        assert!((ce[0] - expected).abs() < 1e-3, "got {}", ce[0]);
    }

    #[test]
    fn invalid_config_fails_before_touching_clips() {
        type B = burn::backend::Autodiff<NdArray>;
        let cfg = TrainingConfig::new().with_batch_size(10);
        let err = train::<B>(&cfg, vec![PathBuf::from("/missing/giggle_clips/a.wav")], &Default::default())
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MalformedBatch { rows: 10 })
        ));
    }
}
