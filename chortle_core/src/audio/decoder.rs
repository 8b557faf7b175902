use anyhow::{anyhow, Context, Result};
use std::path::Path;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use rubato::{Fft, FixedSync, Resampler};
use audioadapter_buffers::direct::InterleavedSlice;
use tracing::debug;

/// Decode an audio file to mono f32 samples at `sample_rate` Hz.
///
/// Any missing, unreadable or empty file is an error carrying the path.
pub fn decode_to_mono<P: AsRef<Path>>(path: P, sample_rate: u32) -> Result<Vec<f32>> {
    let path = path.as_ref();

    let (interleaved, sr_in, ch_in) = decode_interleaved(path)
        .with_context(|| format!("failed to decode clip: {}", path.display()))?;

    let mono = downmix(interleaved, ch_in);
    debug!(clip = %path.display(), sr_in, ch_in, samples = mono.len(), "decoded clip");

    if sr_in == sample_rate {
        return Ok(mono);
    }

    resample(&mono, sr_in, sample_rate)
        .with_context(|| format!("failed to resample {} from {sr_in} Hz", path.display()))
}

/// Returns interleaved samples, source sample rate and channel count.
fn decode_interleaved(path: &Path) -> Result<(Vec<f32>, u32, usize)> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("unsupported format or failed to probe container")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("no supported audio tracks found"))?;

    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("failed to create decoder for selected track")?;

    let mut interleaved: Vec<f32> = Vec::new();

    // Codec params may omit these; the first decoded buffer fills them in.
    let mut sample_rate: Option<u32> = track.codec_params.sample_rate;
    let mut channels: Option<usize> = track.codec_params.channels.map(|c| c.count());

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::ResetRequired) => {
                return Err(anyhow!("decoder reset required (chained streams)"));
            }
            Err(SymphoniaError::IoError(_)) => break, // end of stream
            Err(e) => return Err(e).context("error reading next packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => continue,
            Err(SymphoniaError::ResetRequired) => {
                return Err(anyhow!("decoder reset required mid-stream"));
            }
            Err(e) => return Err(e).context("unrecoverable decode error"),
        };

        sample_rate.get_or_insert(decoded.spec().rate);
        channels.get_or_insert(decoded.spec().channels.count());

        let mut sbuf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sbuf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(sbuf.samples());
    }

    let sample_rate = sample_rate.ok_or_else(|| anyhow!("could not determine input sample rate"))?;
    let channels = channels.ok_or_else(|| anyhow!("could not determine channel count"))?;

    if interleaved.is_empty() {
        return Err(anyhow!("decoded audio was empty"));
    }

    Ok((interleaved, sample_rate, channels))
}

/// Average interleaved channels into one.
fn downmix(interleaved: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved;
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample(mono: &[f32], sr_in: u32, sr_out: u32) -> Result<Vec<f32>> {
    // Offline whole-clip conversion; chunk size only affects latency.
    let chunk_size: usize = 1024;
    let sub_chunks: usize = 1;

    let mut resampler = Fft::<f32>::new(
        sr_in as usize,
        sr_out as usize,
        chunk_size,
        sub_chunks,
        1,
        FixedSync::Input,
    )
    .context("failed to construct FFT resampler")?;

    let input_len_frames = mono.len();
    let out_len_frames = resampler.process_all_needed_output_len(input_len_frames);
    let mut out = vec![0.0f32; out_len_frames];

    let input_adapter =
        InterleavedSlice::new(mono, 1, input_len_frames).context("bad input adapter")?;
    let mut output_adapter =
        InterleavedSlice::new_mut(&mut out, 1, out_len_frames).context("bad output adapter")?;

    let (_frames_read, frames_written) = resampler.process_all_into_buffer(
        &input_adapter,
        &mut output_adapter,
        input_len_frames,
        None,
    )?;

    out.truncate(frames_written);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[f32]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn downmix_averages_channels() {
        assert_eq!(downmix(vec![1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix(vec![0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn decodes_wav_at_native_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..2205).map(|i| ((i as f32) * 0.05).sin() * 0.5).collect();
        write_wav(&path, 22050, 1, &samples);

        let decoded = decode_to_mono(&path, 22050).unwrap();
        assert_eq!(decoded.len(), samples.len());
        assert!((decoded[100] - samples[100]).abs() < 1e-3);
    }

    #[test]
    fn stereo_is_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let interleaved: Vec<f32> = (0..1000).flat_map(|_| [0.5f32, -0.5]).collect();
        write_wav(&path, 22050, 2, &interleaved);

        let decoded = decode_to_mono(&path, 22050).unwrap();
        assert_eq!(decoded.len(), 1000);
        assert!(decoded.iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn resamples_to_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone_16k.wav");
        let samples: Vec<f32> = (0..16_000)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16_000.0).sin() * 0.5)
            .collect();
        write_wav(&path, 16_000, 1, &samples);

        let decoded = decode_to_mono(&path, 22050).unwrap();
        assert!(
            decoded.len().abs_diff(22050) <= 220,
            "one second at 16 kHz became {} samples",
            decoded.len()
        );
        let peak = decoded[2000..20000].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.05, "peak {peak}");
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = decode_to_mono("/nonexistent/giggle_clips/x.wav", 22050).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/giggle_clips/x.wav"));
    }
}
