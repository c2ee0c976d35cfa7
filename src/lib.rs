//! # supertonic-rs
//!
//! A Rust library providing text-to-speech synthesis using the Supertonic engine.
//!
//! ## Features
//!
//! - **Supertonic TTS**: flow-matching synthesis (duration → text encoding →
//!   latent denoising → vocoding) over four ONNX inference units
//! - **Lazy, single-flight loading**: resources load once on first use, even
//!   under concurrent first requests
//! - **WAV output**: canonical 16-bit mono PCM container
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! supertonic-rs = { version = "2026.2", features = ["onnx"] }
//! ```
//!
//! ```ignore
//! use supertonic_rs::engines::supertonic::{EngineConfig, SupertonicEngine};
//!
//! let engine = SupertonicEngine::from_config(EngineConfig::from_env()?);
//! let speech = engine.synthesize("Hello, world!", None).await?;
//! std::fs::write("output.wav", &speech.wav)?;
//! println!("{:.2}s of audio", speech.duration_secs);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod engines;

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

/// Size of the canonical RIFF/WAVE header for 16-bit mono PCM.
pub const WAV_HEADER_LEN: usize = 44;

/// The result of a synthesis (text-to-speech) operation.
///
/// Contains raw f32 audio samples, the sample rate of the output audio and
/// the clip duration reported by the duration predictor.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    /// Raw audio samples as f32 values, nominally in [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate of the audio
    pub sample_rate: u32,
    /// Sum of the predicted per-chunk durations in seconds. Inter-chunk
    /// silence is not included.
    pub duration: f64,
}

impl SynthesisResult {
    /// Encode the audio as a 16-bit mono PCM WAV buffer.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, hound::Error> {
        encode_wav(&self.samples, self.sample_rate)
    }

    /// Write the audio to a 16-bit mono PCM WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let file = BufWriter::new(File::create(path)?);
        write_pcm16(file, &self.samples, self.sample_rate)
    }

    /// Duration of the sample buffer in seconds, silence included.
    pub fn playback_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Encode float samples into an in-memory 16-bit mono PCM WAV buffer.
///
/// The buffer is always `44 + 2 * samples.len()` bytes long.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2));
    write_pcm16(&mut cursor, samples, sample_rate)?;
    Ok(cursor.into_inner())
}

/// Quantize a float sample to 16-bit PCM.
///
/// Samples are clamped to [-1, 1]; negative values scale by 32768 and
/// non-negative values by 32767, truncating toward zero.
pub fn quantize_sample(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

fn write_pcm16<W: Write + Seek>(
    writer: W,
    samples: &[f32],
    sample_rate: u32,
) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::new(writer, spec)?;
    for &sample in samples {
        writer.write_sample(quantize_sample(sample))?;
    }
    writer.finalize()?;
    Ok(())
}
