//! Triplet-loss training of the laughter embedding network on burn.
//!
//! The network definition lives in [`model`], the objective in [`loss`], and
//! [`training::train`] drives split → triplets → Adam steps → evaluation.

pub mod artifacts;
pub mod batch;
pub mod config;
pub mod evaluate;
pub mod loss;
pub mod model;
pub mod training;

pub use config::{EmbeddingSpace, TrainingConfig};
pub use evaluate::{Accuracy, evaluate};
pub use loss::{TripletLoss, TripletLossConfig};
pub use model::{EmbeddingNet, EmbeddingNetConfig, EmbeddingOutput};
pub use training::{TrainingOutcome, TrainingReport, train};
