//! Clip decoding and spectral front end.

pub mod clip;
pub mod decoder;
pub mod mel;

pub use clip::shape_clip;
pub use decoder::decode_to_mono;
pub use mel::{MelSpectrogram, delta, power_to_db};
