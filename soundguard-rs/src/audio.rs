//! Audio collaborator for the CLI: file discovery, decoding to mono PCM,
//! resampling, fixed-length clip preparation, and a log-mel front end used
//! by the reference backend.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};
use tracing::debug;
use walkdir::WalkDir;

use crate::{Result, SoundGuardError};

pub const SUPPORTED_EXTS: &[&str] = &[".wav", ".mp3", ".flac", ".ogg", ".m4a", ".webm"];

/// Decode any supported container to mono f32 PCM at `target_sr`.
pub fn decode_and_resample(bytes: &[u8], target_sr: u32) -> Result<Vec<f32>> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;

    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &Default::default(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SoundGuardError::AudioDecode(format!("probe: {e}")))?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .cloned()
        .ok_or_else(|| SoundGuardError::AudioDecode("no audio track".into()))?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SoundGuardError::AudioDecode(format!("codec: {e}")))?;

    let mut pcm: Vec<f32> = Vec::new();
    let mut src_sr = track.codec_params.sample_rate.unwrap_or(target_sr);
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(SoundGuardError::AudioDecode(format!("read packet: {e}"))),
        };
        if packet.track_id() != track.id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(SoundGuardError::AudioDecode(format!("decode: {e}"))),
        };
        let spec = *decoded.spec();
        src_sr = spec.rate;
        let channels = spec.channels.count().max(1);
        let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        samples.copy_interleaved_ref(decoded);
        pcm.extend(
            samples
                .samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    if pcm.is_empty() {
        return Err(SoundGuardError::AudioDecode("no samples decoded".into()));
    }
    debug!(samples = pcm.len(), src_sr, target_sr, "decoded audio");
    Ok(linear_resample(&pcm, src_sr, target_sr))
}

/// Simple linear resampler (mono)
pub fn linear_resample(input: &[f32], src_sr: u32, dst_sr: u32) -> Vec<f32> {
    if src_sr == dst_sr || input.is_empty() {
        return input.to_vec();
    }
    let ratio = dst_sr as f64 / src_sr as f64;
    let out_len = (input.len() as f64 * ratio).ceil() as usize;
    let last = input.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 / ratio;
            let idx = (pos.floor() as usize).min(last);
            if idx == last {
                return input[last];
            }
            let frac = (pos - idx as f64) as f32;
            input[idx] * (1.0 - frac) + input[idx + 1] * frac
        })
        .collect()
}

/// Zero-pad or truncate to exactly `len` samples, clamping to `[-1, 1]`.
pub fn prepare_clip(pcm: &[f32], len: usize) -> Vec<f32> {
    let mut clip: Vec<f32> = pcm.iter().take(len).map(|s| s.clamp(-1.0, 1.0)).collect();
    clip.resize(len, 0.0);
    clip
}

/// Read, decode, resample and fix the length of one audio file.
pub fn load_clip(path: &Path, sample_rate: u32, clip_samples: usize) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path)?;
    let pcm = decode_and_resample(&bytes, sample_rate)?;
    Ok(prepare_clip(&pcm, clip_samples))
}

/// Log-mel front end parameters.
#[derive(Debug, Clone, Copy)]
pub struct MelParams {
    pub n_fft: usize,
    pub hop: usize,
    pub n_mels: usize,
    pub fmin: f32,
}

impl MelParams {
    /// 1024-point FFT, 10 ms hop, 64 bands.
    pub fn for_sample_rate(sample_rate: u32) -> Self {
        Self {
            n_fft: 1024,
            hop: ((sample_rate as f32 * 0.01) as usize).max(1),
            n_mels: 64,
            fmin: 50.0,
        }
    }
}

fn mel_filterbank(sr: f32, params: MelParams) -> Array2<f32> {
    fn hz_to_mel(hz: f32) -> f32 {
        2595.0 * (1.0 + hz / 700.0).log10()
    }
    fn mel_to_hz(m: f32) -> f32 {
        700.0 * (10f32.powf(m / 2595.0) - 1.0)
    }
    let MelParams {
        n_fft, n_mels, fmin, ..
    } = params;
    let fmax = sr / 2.0;
    let (mel_min, mel_max) = (hz_to_mel(fmin), hz_to_mel(fmax));
    let bins: Vec<usize> = (0..n_mels + 2)
        .map(|i| mel_min + i as f32 * (mel_max - mel_min) / (n_mels + 1) as f32)
        .map(|m| ((n_fft + 1) as f32 * mel_to_hz(m) / sr).floor() as usize)
        .collect();

    let n_bins = n_fft / 2 + 1;
    let mut fb = Array2::<f32>::zeros((n_mels, n_bins));
    for m in 1..=n_mels {
        let (lo, mid, hi) = (bins[m - 1], bins[m], bins[m + 1].min(n_bins));
        for k in lo..mid.min(n_bins) {
            fb[[m - 1, k]] = (k - lo) as f32 / (mid - lo) as f32;
        }
        for k in mid..hi {
            fb[[m - 1, k]] = (hi - k) as f32 / (hi - mid).max(1) as f32;
        }
    }
    fb
}

/// Log-mel spectrogram, shape `(frames, n_mels)`. Empty when `pcm` is
/// shorter than one FFT window.
pub fn log_mel_spectrogram(pcm: &[f32], sample_rate: u32, params: MelParams) -> Array2<f32> {
    let MelParams { n_fft, hop, n_mels, .. } = params;
    if pcm.len() < n_fft {
        return Array2::zeros((0, n_mels));
    }
    let frames = (pcm.len() - n_fft) / hop + 1;
    let window: Vec<f32> = (0..n_fft)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / n_fft as f32).cos())
        .collect();
    let fb = mel_filterbank(sample_rate as f32, params);
    let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);

    let mut out = Array2::<f32>::zeros((frames, n_mels));
    let mut buf = vec![Complex::new(0.0f32, 0.0); n_fft];
    for (frame, mut row) in out.outer_iter_mut().enumerate() {
        let start = frame * hop;
        for ((slot, s), w) in buf.iter_mut().zip(&pcm[start..start + n_fft]).zip(&window) {
            *slot = Complex::new(s * w, 0.0);
        }
        fft.process(&mut buf);
        let power: Vec<f32> = buf[..n_fft / 2 + 1].iter().map(|c| c.norm_sqr()).collect();
        for (m, value) in row.iter_mut().enumerate() {
            let energy: f32 = fb.row(m).iter().zip(&power).map(|(w, p)| w * p).sum();
            *value = (energy + 1e-10).ln();
        }
    }
    out
}

/// Recursively expand audio files from provided paths
pub fn expand_audio_files(inputs: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for p in inputs {
        if p.is_file() {
            if is_supported(&p) {
                out.push(p);
            }
        } else if p.is_dir() {
            for entry in WalkDir::new(&p).sort_by_file_name() {
                let e = entry.map_err(|e| SoundGuardError::Io(e.into()))?;
                if e.file_type().is_file() && is_supported(e.path()) {
                    out.push(e.into_path());
                }
            }
        } else {
            return Err(SoundGuardError::Invalid(format!(
                "Path not found: {}",
                p.display()
            )));
        }
    }
    Ok(out)
}

fn is_supported(p: &Path) -> bool {
    p.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = format!(".{}", ext).to_lowercase();
            SUPPORTED_EXTS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_clip_pads_and_truncates() {
        assert_eq!(prepare_clip(&[0.5, -0.5], 4), vec![0.5, -0.5, 0.0, 0.0]);
        assert_eq!(prepare_clip(&[0.1, 0.2, 0.3], 2), vec![0.1, 0.2]);
        assert_eq!(prepare_clip(&[2.0, -3.0], 2), vec![1.0, -1.0]);
    }

    #[test]
    fn resample_changes_length_by_ratio() {
        let input: Vec<f32> = (0..400).map(|i| i as f32).collect();
        let out = linear_resample(&input, 32_000, 16_000);
        assert_eq!(out.len(), 200);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 2.0);
        let up = linear_resample(&[0.0, 1.0], 8_000, 16_000);
        assert_eq!(up, vec![0.0, 0.5, 1.0, 1.0]);
        assert_eq!(linear_resample(&input, 16_000, 16_000), input);
    }

    #[test]
    fn log_mel_has_frames_by_bands() {
        let sr = 16_000;
        let params = MelParams::for_sample_rate(sr);
        let pcm: Vec<f32> = (0..sr as usize)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let mel = log_mel_spectrogram(&pcm, sr, params);
        assert_eq!(mel.ncols(), 64);
        assert_eq!(mel.nrows(), (pcm.len() - 1024) / 160 + 1);
        assert!(mel.iter().all(|v| v.is_finite()));

        let short = log_mel_spectrogram(&pcm[..100], sr, params);
        assert_eq!(short.nrows(), 0);
    }

    #[test]
    fn expand_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.wav"), b"").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.FLAC"), b"").unwrap();
        let files = expand_audio_files(vec![dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(expand_audio_files(vec![dir.path().join("missing.wav")]).is_err());
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            decode_and_resample(b"definitely not audio", 16_000),
            Err(SoundGuardError::AudioDecode(_))
        ));
    }
}
