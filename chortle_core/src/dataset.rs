use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Probability that a clip lands in the train split.
    pub train_ratio: f64,
    /// Keep at most this many clips after shuffling.
    pub max_clips: Option<usize>,
    /// Seed for shuffling, splitting, triplet sampling and weight init.
    /// A random seed is drawn (and logged) when unset.
    pub seed: Option<u64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.70,
            max_clips: Some(2250),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetSplit {
    pub train: Vec<PathBuf>,
    pub test: Vec<PathBuf>,
}

/// Read a clip list (one path per line, relative to `dataset_root`).
///
/// Blank lines, including the one after the trailing newline, are skipped.
pub fn read_clip_list<P: AsRef<Path>, R: AsRef<Path>>(list_file: P, dataset_root: R) -> Result<Vec<PathBuf>> {
    let list_file = list_file.as_ref();
    let contents = std::fs::read_to_string(list_file)
        .with_context(|| format!("failed to read clip list: {}", list_file.display()))?;

    let root = dataset_root.as_ref();
    let paths: Vec<PathBuf> = contents
        .split('\n')
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(|line| root.join(line))
        .collect();

    info!(clips = paths.len(), list = %list_file.display(), "read clip list");
    Ok(paths)
}

/// Shuffle, cap, then send each clip to train with probability
/// `train_ratio`. Classes are not stratified.
pub fn split_dataset<R: Rng + ?Sized>(
    mut paths: Vec<PathBuf>,
    config: &SplitConfig,
    rng: &mut R,
) -> crate::Result<DatasetSplit> {
    if !(config.train_ratio > 0.0 && config.train_ratio < 1.0) {
        return Err(Error::InvalidConfig(format!(
            "train_ratio must be in (0, 1), got {}",
            config.train_ratio
        )));
    }

    paths.shuffle(rng);
    if let Some(max) = config.max_clips {
        paths.truncate(max);
    }

    let total = paths.len();
    let mut split = DatasetSplit::default();
    for path in paths {
        if rng.random_bool(config.train_ratio) {
            split.train.push(path);
        } else {
            split.test.push(path);
        }
    }

    if split.train.is_empty() {
        return Err(Error::EmptySplit { which: "train", total });
    }
    if split.test.is_empty() {
        return Err(Error::EmptySplit { which: "test", total });
    }

    info!(train = split.train.len(), test = split.test.len(), "split dataset");
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::io::Write;

    fn clips(n: usize) -> Vec<PathBuf> {
        (0..n)
            .map(|i| PathBuf::from(format!("giggle_clips/{i}.wav")))
            .collect()
    }

    #[test]
    fn same_seed_same_partition() {
        let cfg = SplitConfig::default();
        let a = split_dataset(clips(200), &cfg, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = split_dataset(clips(200), &cfg, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);

        let c = split_dataset(clips(200), &cfg, &mut StdRng::seed_from_u64(8)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn partition_covers_every_clip_once() {
        let cfg = SplitConfig::default();
        let split = split_dataset(clips(500), &cfg, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(split.train.len() + split.test.len(), 500);

        let mut all: Vec<_> = split.train.iter().chain(&split.test).cloned().collect();
        all.sort();
        let mut expected = clips(500);
        expected.sort();
        assert_eq!(all, expected);

        // ~70% train
        let ratio = split.train.len() as f64 / 500.0;
        assert!((0.6..0.8).contains(&ratio), "train ratio {ratio}");
    }

    #[test]
    fn caps_clip_count() {
        let cfg = SplitConfig {
            max_clips: Some(40),
            ..SplitConfig::default()
        };
        let split = split_dataset(clips(100), &cfg, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(split.train.len() + split.test.len(), 40);
    }

    #[test]
    fn empty_side_fails_fast() {
        let cfg = SplitConfig::default();
        let err = split_dataset(Vec::new(), &cfg, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, Error::EmptySplit { which: "train", total: 0 }));

        let single = split_dataset(clips(1), &cfg, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(single, Error::EmptySplit { total: 1, .. }));
    }

    #[test]
    fn rejects_degenerate_ratio() {
        let cfg = SplitConfig {
            train_ratio: 1.0,
            ..SplitConfig::default()
        };
        assert!(matches!(
            split_dataset(clips(10), &cfg, &mut StdRng::seed_from_u64(0)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn clip_list_joins_root_and_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("clips.txt");
        let mut f = std::fs::File::create(&list).unwrap();
        write!(f, "giggle_clips/a.wav\nsnicker_clips/b.wav\n\n").unwrap();

        let paths = read_clip_list(&list, "/data/laughter").unwrap();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/data/laughter/giggle_clips/a.wav"),
                PathBuf::from("/data/laughter/snicker_clips/b.wav"),
            ]
        );
    }

    #[test]
    fn missing_clip_list_is_an_error() {
        assert!(read_clip_list("/nonexistent/clips.txt", "/data").is_err());
    }
}
