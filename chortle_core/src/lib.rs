//! Audio side of the laughter embedding trainer.
//!
//! - Label vocabulary and one-hot encoding
//! - Clip decoding, normalization and log-mel + delta features
//! - Train/test splitting and explicit (anchor, positive, negative) grouping

pub mod audio;
pub mod dataset;
pub mod error;
pub mod features;
pub mod labels;
pub mod triplets;

pub use dataset::{DatasetSplit, SplitConfig, read_clip_list, split_dataset};
pub use error::{Error, Result};
pub use features::{ExtractedBatch, FeatureConfig, FeatureExtractor};
pub use labels::{Label, one_hot_encode};
pub use triplets::{Triplet, build_triplets, flatten_triplets};
