use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use burn::tensor::backend::Backend;
use chortle_core::{Error, FeatureExtractor, Label};
use ndarray::s;
use tracing::{debug, info};

use crate::batch::features_to_tensor;
use crate::model::EmbeddingNet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accuracy {
    pub correct: usize,
    pub total: usize,
}

impl Accuracy {
    pub fn value(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.value())
    }
}

/// Fraction of clips whose arg-max softmax class equals their label.
///
/// Features for all clips are extracted up front; forward passes run in
/// chunks of `eval_batch_size`.
pub fn evaluate<B: Backend>(
    model: &EmbeddingNet<B>,
    clips: &[PathBuf],
    extractor: &FeatureExtractor,
    eval_batch_size: usize,
    device: &B::Device,
) -> Result<Accuracy> {
    if clips.is_empty() {
        return Err(Error::EmptySplit { which: "test", total: 0 }.into());
    }

    let extracted = extractor.extract_batch(clips)?;
    let total = extracted.len();
    let chunk = eval_batch_size.max(1);

    let mut correct = 0;
    for start in (0..total).step_by(chunk) {
        let end = (start + chunk).min(total);
        let features = features_to_tensor::<B>(extracted.features.slice(s![start..end, .., .., ..]), device);
        let probabilities = model.forward(features).probabilities;
        let [_, classes] = probabilities.dims();

        let values = probabilities
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| Error::Tensor(format!("{e:?}")))?;
        correct += count_correct(&values, classes, &extracted.labels[start..end]);
        debug!(start, end, correct, "evaluated chunk");
    }

    let accuracy = Accuracy { correct, total };
    info!(correct, total, "Test accuracy: {accuracy}");
    Ok(accuracy)
}

fn count_correct(probabilities: &[f32], classes: usize, labels: &[Label]) -> usize {
    probabilities
        .chunks_exact(classes)
        .zip(labels)
        .filter(|(row, label)| Label::from_one_hot(row) == Some(**label))
        .count()
}
