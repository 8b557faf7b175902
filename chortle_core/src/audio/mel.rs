//! Power mel spectrogram, dB scaling and delta features.
//!
//! Conventions follow the usual research front end: centered frames with
//! reflect padding, periodic Hann window, Slaney mel scale with area
//! normalization.

use std::f32::consts::PI;
use std::sync::Arc;

use ndarray::{Array2, Axis};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Reusable STFT + mel filterbank for one configuration.
pub struct MelSpectrogram {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
    /// `(n_mels, n_fft / 2 + 1)`
    filters: Array2<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl MelSpectrogram {
    pub fn new(
        sample_rate: u32,
        n_fft: usize,
        hop_length: usize,
        n_mels: usize,
        fmin: f32,
        fmax: Option<f32>,
    ) -> Self {
        let fmax = fmax.unwrap_or(sample_rate as f32 / 2.0);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);
        Self {
            n_fft,
            hop_length,
            window: hann_window(n_fft),
            filters: mel_filterbank(sample_rate, n_fft, n_mels, fmin as f64, fmax as f64),
            fft,
        }
    }

    /// Frame count produced for `n_samples` input samples.
    pub fn frames_for(&self, n_samples: usize) -> usize {
        1 + n_samples / self.hop_length
    }

    /// Power mel spectrogram, shape `(n_mels, frames)`.
    pub fn compute(&self, samples: &[f32]) -> Array2<f32> {
        self.filters.dot(&self.power_spectrogram(samples))
    }

    /// `|STFT|^2`, shape `(n_fft / 2 + 1, frames)`.
    fn power_spectrogram(&self, samples: &[f32]) -> Array2<f32> {
        let pad = self.n_fft / 2;
        let padded = reflect_pad(samples, pad);
        let n_frames = self.frames_for(samples.len());
        let freq_bins = self.n_fft / 2 + 1;

        let mut spec = Array2::<f32>::zeros((freq_bins, n_frames));
        let mut frame = vec![Complex::new(0.0f32, 0.0); self.n_fft];

        for t in 0..n_frames {
            let start = t * self.hop_length;
            for (i, bin) in frame.iter_mut().enumerate() {
                let sample = padded.get(start + i).copied().unwrap_or(0.0);
                *bin = Complex::new(sample * self.window[i], 0.0);
            }
            self.fft.process(&mut frame);
            for k in 0..freq_bins {
                spec[[k, t]] = frame[k].norm_sqr();
            }
        }

        spec
    }
}

/// Periodic Hann window.
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / size as f32).cos())
        .collect()
}

/// Pad both ends by mirroring around the edge samples (edge not repeated).
fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f32> {
    let n = samples.len();
    if n < 2 {
        let mut out = vec![0.0; pad];
        out.extend_from_slice(samples);
        out.resize(n + 2 * pad, 0.0);
        return out;
    }
    let period = 2 * (n - 1) as isize;
    (-(pad as isize)..(n + pad) as isize)
        .map(|i| {
            let m = i.rem_euclid(period);
            let idx = if m >= n as isize { period - m } else { m };
            samples[idx as usize]
        })
        .collect()
}

pub fn hz_to_mel(hz: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;

    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;

    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

/// Triangular Slaney filters, `(n_mels, n_fft / 2 + 1)`.
fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize, fmin: f64, fmax: f64) -> Array2<f32> {
    let freq_bins = n_fft / 2 + 1;
    let mut filters = Array2::<f32>::zeros((n_mels, freq_bins));

    let fft_freqs: Vec<f64> = (0..freq_bins)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);
    let mel_f: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect();
    let fdiff: Vec<f64> = mel_f.windows(2).map(|w| w[1] - w[0]).collect();

    for m in 0..n_mels {
        let enorm = 2.0 / (mel_f[m + 2] - mel_f[m]);
        for (k, freq) in fft_freqs.iter().enumerate() {
            let lower = (freq - mel_f[m]) / fdiff[m];
            let upper = (mel_f[m + 2] - freq) / fdiff[m + 1];
            filters[[m, k]] = (0.0f64.max(lower.min(upper)) * enorm) as f32;
        }
    }

    filters
}

/// `10 * log10(S / ref)` with `amin` flooring, optionally clipped to
/// `max - top_db`.
pub fn power_to_db(spec: &Array2<f32>, reference: f32, amin: f32, top_db: Option<f32>) -> Array2<f32> {
    let ref_db = 10.0 * reference.abs().max(amin).log10();
    let mut db = spec.mapv(|s| 10.0 * s.max(amin).log10() - ref_db);

    if let Some(top_db) = top_db {
        let peak = db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let floor = peak - top_db;
        db.mapv_inplace(|v| v.max(floor));
    }

    db
}

/// First-order delta along the frame axis.
///
/// Slope of a least-squares line over `width` frames centered on each frame.
/// Frames closer than `width / 2` to an edge reuse the slope of the first or
/// last full window. Inputs shorter than `width` clamp indices at the edges.
pub fn delta(spec: &Array2<f32>, width: usize) -> Array2<f32> {
    let half = (width / 2).max(1);
    let n_frames = spec.len_of(Axis(1));
    let denom: f32 = (1..=half).map(|n| 2.0 * (n * n) as f32).sum();
    let mut out = Array2::<f32>::zeros(spec.raw_dim());

    if n_frames == 0 {
        return out;
    }

    let full_windows = n_frames >= 2 * half + 1;
    for t in 0..n_frames {
        let center = if full_windows {
            t.clamp(half, n_frames - 1 - half)
        } else {
            t
        };
        for (band, mut row_out) in spec.outer_iter().zip(out.outer_iter_mut()) {
            let mut acc = 0.0f32;
            for n in 1..=half {
                let ahead = (center + n).min(n_frames - 1);
                let behind = center.saturating_sub(n);
                acc += n as f32 * (band[ahead] - band[behind]);
            }
            row_out[t] = acc / denom;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn mel_scale_round_trips() {
        for hz in [0.0, 440.0, 999.0, 1000.0, 4000.0, 11025.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
    }

    #[test]
    fn filterbank_shape_and_coverage() {
        let filters = mel_filterbank(22050, 2048, 60, 0.0, 11025.0);
        assert_eq!(filters.shape(), &[60, 1025]);
        assert!(filters.iter().all(|w| *w >= 0.0));
        for row in filters.outer_iter() {
            assert!(row.sum() > 0.0, "every band must cover some bins");
        }
    }

    #[test]
    fn ten_second_clip_yields_433_frames() {
        let mel = MelSpectrogram::new(22050, 2048, 512, 60, 0.0, None);
        let samples: Vec<f32> = (0..221_184)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 22050.0).sin())
            .collect();
        let spec = mel.compute(&samples);
        assert_eq!(spec.shape(), &[60, 433]);
        assert!(spec.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn tone_energy_lands_in_matching_band() {
        let mel = MelSpectrogram::new(22050, 2048, 512, 60, 0.0, None);
        let samples: Vec<f32> = (0..22050)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 22050.0).sin())
            .collect();
        let spec = mel.compute(&samples);
        let mid = spec.column(spec.ncols() / 2);
        let loudest = mid
            .iter()
            .enumerate()
            .fold(0, |best, (i, v)| if *v > mid[best] { i } else { best });
        let target = hz_to_mel(440.0);
        let mel_max = hz_to_mel(11025.0);
        let expected = (target / mel_max * 61.0).round() as usize - 1;
        assert!(loudest.abs_diff(expected) <= 1, "loudest band {loudest}, expected ~{expected}");
    }

    #[test]
    fn reflect_pad_mirrors_edges() {
        assert_eq!(reflect_pad(&[1.0, 2.0, 3.0, 4.0], 2), vec![3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);
        assert_eq!(reflect_pad(&[5.0], 2), vec![0.0, 0.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn power_to_db_scaling() {
        let spec = array![[1.0f32, 100.0], [0.0, 0.1]];
        let db = power_to_db(&spec, 1.0, 1e-10, None);
        assert!((db[[0, 0]] - 0.0).abs() < 1e-5);
        assert!((db[[0, 1]] - 20.0).abs() < 1e-4);
        assert!((db[[1, 0]] + 100.0).abs() < 1e-3);
        assert!((db[[1, 1]] + 10.0).abs() < 1e-4);

        let clipped = power_to_db(&spec, 1.0, 1e-10, Some(80.0));
        assert!((clipped[[1, 0]] + 60.0).abs() < 1e-3);
        assert!(clipped.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn delta_of_ramp_is_its_slope() {
        let ramp = Array2::from_shape_fn((2, 20), |(b, t)| (b as f32 + 1.0) * t as f32);
        let d = delta(&ramp, 9);
        for t in 0..20 {
            assert!((d[[0, t]] - 1.0).abs() < 1e-5);
            assert!((d[[1, t]] - 2.0).abs() < 1e-5);
        }
    }

    #[test]
    fn delta_of_constant_is_zero() {
        let flat = Array2::from_elem((3, 12), -42.0f32);
        assert!(delta(&flat, 9).iter().all(|v| v.abs() < 1e-6));
    }
}
