/// Force a waveform to exactly `required_len` samples.
///
/// Shorter clips are zero-padded at the end. Longer clips keep their first
/// `required_len` samples.
pub fn shape_clip(samples: &[f32], required_len: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(required_len);
    out.extend_from_slice(&samples[..samples.len().min(required_len)]);
    out.resize(required_len, 0.0);
    out
}
