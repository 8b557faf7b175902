use std::fmt;
use std::path::Path;

use ndarray::Array2;

use crate::error::{Error, Result};

/// Category folder names, in label-id order.
pub const CATEGORIES: [&str; 5] = [
    "baby_laughter_clips",
    "belly_laugh_clips",
    "chuckle_chortle_clips",
    "giggle_clips",
    "snicker_clips",
];

pub const NUM_LABELS: usize = CATEGORIES.len();

/// Integer class id of a laughter category, always in `0..NUM_LABELS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(usize);

impl Label {
    pub const ALL: [Label; NUM_LABELS] = [Label(0), Label(1), Label(2), Label(3), Label(4)];

    /// Resolve a category folder name against the fixed vocabulary.
    pub fn from_category(name: &str) -> Result<Self> {
        CATEGORIES
            .iter()
            .position(|c| *c == name)
            .map(Self)
            .ok_or_else(|| Error::UnknownCategory(name.to_string()))
    }

    /// The label of a clip is the name of the directory holding it.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let category = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::MissingCategory(path.to_path_buf()))?;
        Self::from_category(category)
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn category(self) -> &'static str {
        CATEGORIES[self.0]
    }

    pub fn one_hot(self) -> [f32; NUM_LABELS] {
        let mut v = [0.0; NUM_LABELS];
        v[self.0] = 1.0;
        v
    }

    /// Arg-max decode. Ties resolve to the lowest index.
    pub fn from_one_hot(values: &[f32]) -> Option<Self> {
        if values.len() != NUM_LABELS {
            return None;
        }
        let mut best = 0;
        for (i, v) in values.iter().enumerate() {
            if *v > values[best] {
                best = i;
            }
        }
        Some(Self(best))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.category())
    }
}

/// Stack the one-hot vectors of `labels` into an `(n, NUM_LABELS)` matrix.
pub fn one_hot_encode(labels: &[Label]) -> Array2<f32> {
    let mut out = Array2::zeros((labels.len(), NUM_LABELS));
    for (row, label) in labels.iter().enumerate() {
        out[[row, label.index()]] = 1.0;
    }
    out
}
