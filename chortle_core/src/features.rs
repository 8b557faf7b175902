use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::{Array2, Array3, Array4, Axis, s};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::{MelSpectrogram, decode_to_mono, delta, power_to_db, shape_clip};
use crate::error::Error;
use crate::labels::Label;

/// Front-end settings. The defaults produce `(60, 433, 2)` tensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub sample_rate: u32,
    /// Every clip is padded or truncated to this many samples.
    pub clip_samples: usize,
    pub n_fft: usize,
    pub hop_length: usize,
    pub bands: usize,
    pub fmin: f32,
    pub fmax: Option<f32>,
    pub top_db: Option<f32>,
    pub delta_width: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            clip_samples: 221_184,
            n_fft: 2048,
            hop_length: 512,
            bands: 60,
            fmin: 0.0,
            fmax: None,
            top_db: Some(80.0),
            delta_width: 9,
        }
    }
}

impl FeatureConfig {
    pub fn frames(&self) -> usize {
        1 + self.clip_samples / self.hop_length
    }

    pub const CHANNELS: usize = 2;

    pub fn validate(&self) -> crate::Result<()> {
        if self.n_fft == 0 || self.hop_length == 0 || self.bands == 0 {
            return Err(Error::InvalidConfig(
                "n_fft, hop_length and bands must be positive".into(),
            ));
        }
        if self.delta_width < 3 || self.delta_width % 2 == 0 {
            return Err(Error::InvalidConfig(format!(
                "delta_width must be odd and >= 3, got {}",
                self.delta_width
            )));
        }
        if self.clip_samples == 0 {
            return Err(Error::InvalidConfig("clip_samples must be positive".into()));
        }
        if self.sample_rate == 0 {
            return Err(Error::InvalidConfig("sample_rate must be positive".into()));
        }
        let fmax = self.fmax.unwrap_or(self.sample_rate as f32 / 2.0);
        if !(self.fmin >= 0.0 && fmax > self.fmin) {
            return Err(Error::InvalidConfig(format!(
                "mel range must satisfy 0 <= fmin < fmax, got {} to {fmax}",
                self.fmin
            )));
        }
        Ok(())
    }
}

/// Features and labels for an ordered list of clips.
#[derive(Debug, Clone)]
pub struct ExtractedBatch {
    /// `(clips, bands, frames, 2)`
    pub features: Array4<f32>,
    pub labels: Vec<Label>,
}

impl ExtractedBatch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Turns clips into two-channel log-mel + delta tensors.
pub struct FeatureExtractor {
    config: FeatureConfig,
    mel: MelSpectrogram,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> crate::Result<Self> {
        config.validate()?;
        let mel = MelSpectrogram::new(
            config.sample_rate,
            config.n_fft,
            config.hop_length,
            config.bands,
            config.fmin,
            config.fmax,
        );
        Ok(Self { config, mel })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Log-mel spectrogram in dB, `(bands, frames)`, after normalizing length.
    pub fn log_mel(&self, samples: &[f32]) -> Array2<f32> {
        let clip = shape_clip(samples, self.config.clip_samples);
        power_to_db(&self.mel.compute(&clip), 1.0, 1e-10, self.config.top_db)
    }

    /// `(bands, frames, 2)`: channel 0 log-mel, channel 1 its delta.
    pub fn extract(&self, samples: &[f32]) -> Array3<f32> {
        let log_mel = self.log_mel(samples);
        let deltas = delta(&log_mel, self.config.delta_width);

        let mut out = Array3::<f32>::zeros((self.config.bands, self.config.frames(), 2));
        out.slice_mut(s![.., .., 0]).assign(&log_mel);
        out.slice_mut(s![.., .., 1]).assign(&deltas);
        out
    }

    pub fn extract_file<P: AsRef<Path>>(&self, path: P) -> Result<Array3<f32>> {
        let path = path.as_ref();
        let samples = decode_to_mono(path, self.config.sample_rate)?;
        Ok(self.extract(&samples))
    }

    /// Extract every clip in order. The first failing clip aborts the batch.
    pub fn extract_batch(&self, paths: &[PathBuf]) -> Result<ExtractedBatch> {
        let mut features = Array4::<f32>::zeros((
            paths.len(),
            self.config.bands,
            self.config.frames(),
            FeatureConfig::CHANNELS,
        ));
        let mut labels = Vec::with_capacity(paths.len());

        for (i, path) in paths.iter().enumerate() {
            let label = Label::from_path(path)
                .with_context(|| format!("cannot label clip {}", path.display()))?;
            let clip_features = self.extract_file(path)?;
            features.index_axis_mut(Axis(0), i).assign(&clip_features);
            labels.push(label);
        }

        debug!(clips = paths.len(), shape = ?features.shape(), "extracted batch");
        Ok(ExtractedBatch { features, labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(len: usize, hz: f32) -> Vec<f32> {
        (0..len)
            .map(|i| 0.3 * (2.0 * PI * hz * i as f32 / 22050.0).sin())
            .collect()
    }

    #[test]
    fn default_geometry() {
        let cfg = FeatureConfig::default();
        assert_eq!(cfg.frames(), 433);
        assert_eq!(cfg.bands, 60);
    }

    #[test]
    fn shape_is_fixed_regardless_of_input_length() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        for len in [0, 1000, 221_184, 300_000] {
            let features = extractor.extract(&tone(len, 660.0));
            assert_eq!(features.shape(), &[60, 433, 2], "input length {len}");
            assert!(features.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let samples = tone(50_000, 880.0);
        assert_eq!(extractor.extract(&samples), extractor.extract(&samples));
    }

    #[test]
    fn delta_channel_matches_log_mel() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let samples = tone(80_000, 300.0);
        let features = extractor.extract(&samples);
        let expected = delta(&extractor.log_mel(&samples), 9);
        assert_eq!(features.slice(s![.., .., 1]), expected);
    }

    #[test]
    fn rejects_even_delta_width() {
        let cfg = FeatureConfig {
            delta_width: 8,
            ..FeatureConfig::default()
        };
        assert!(matches!(FeatureExtractor::new(cfg), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_degenerate_mel_range() {
        let zero_rate = FeatureConfig {
            sample_rate: 0,
            ..FeatureConfig::default()
        };
        assert!(matches!(zero_rate.validate(), Err(Error::InvalidConfig(_))));

        let inverted = FeatureConfig {
            fmin: 4000.0,
            fmax: Some(2000.0),
            ..FeatureConfig::default()
        };
        assert!(matches!(FeatureExtractor::new(inverted), Err(Error::InvalidConfig(_))));

        let above_nyquist = FeatureConfig {
            fmin: 12_000.0,
            ..FeatureConfig::default()
        };
        assert!(above_nyquist.validate().is_err());

        let narrowed = FeatureConfig {
            fmin: 50.0,
            fmax: Some(8000.0),
            ..FeatureConfig::default()
        };
        assert!(narrowed.validate().is_ok());
    }

    #[test]
    fn unlabeled_clip_aborts_batch() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let err = extractor
            .extract_batch(&[PathBuf::from("/tmp/not_a_category/x.wav")])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::UnknownCategory(_))
        ));
    }
}
