//! 16-bit PCM conversion and RIFF/WAVE encoding.

use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};

use crate::error::{Result, TtsError};

const I16_MAX_F32: f32 = i16::MAX as f32;

/// f32 sample in [-1.0, 1.0] to i16: `round(s * 32767)`, clamped.
pub fn sample_to_i16(s: f32) -> i16 {
    if s.is_nan() {
        return 0;
    }
    (s * I16_MAX_F32).round().clamp(i16::MIN as f32, I16_MAX_F32) as i16
}

pub fn float_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples.iter().copied().map(sample_to_i16).collect()
}

/// Headerless little-endian 16-bit PCM bytes.
pub fn pcm16_le_bytes(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        out.extend_from_slice(&sample_to_i16(s).to_le_bytes());
    }
    out
}

/// Base64 of headerless 16-bit PCM, the wire format of streamed chunks.
pub fn encode_pcm_base64(samples: &[f32]) -> String {
    general_purpose::STANDARD.encode(pcm16_le_bytes(samples))
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Encode mono f32 samples as a 16-bit PCM WAV file in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    if sample_rate == 0 {
        return Err(TtsError::Encoding("sample rate must be greater than 0".to_string()));
    }
    // WAV header (44 bytes) + samples (2 bytes per sample)
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(sample_rate))?;
        for &s in samples {
            writer.write_sample(sample_to_i16(s))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// WAV container bytes as standard base64.
pub fn encode_wav_base64(samples: &[f32], sample_rate: u32) -> Result<String> {
    Ok(general_purpose::STANDARD.encode(encode_wav(samples, sample_rate)?))
}

pub fn write_wav_file(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let persist_err = |e: hound::Error| TtsError::Persistence {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut writer = hound::WavWriter::create(path, wav_spec(sample_rate)).map_err(persist_err)?;
    for &s in samples {
        writer.write_sample(sample_to_i16(s)).map_err(persist_err)?;
    }
    writer.finalize().map_err(persist_err)
}

/// Write headerless 16-bit PCM scaled so the peak maps to full scale.
/// Peaks below 0.001 are treated as 0.001 so silence is not amplified.
pub fn write_pcm_file(path: &Path, samples: &[f32]) -> Result<()> {
    let persist_err = |e: std::io::Error| TtsError::Persistence {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs())).max(0.001);
    let gain = 1.0 / peak;

    let mut out = BufWriter::new(File::create(path).map_err(persist_err)?);
    for &s in samples {
        out.write_all(&sample_to_i16(s * gain).to_le_bytes())
            .map_err(persist_err)?;
    }
    out.flush().map_err(persist_err)
}
