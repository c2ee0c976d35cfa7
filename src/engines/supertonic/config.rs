use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::Deserialize;

use super::model::SupertonicError;

/// Numeric model configuration read from `tts.json`.
///
/// Only the fields the pipeline needs are modelled; the rest of the file is
/// ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TtsConfig {
    pub ae: AeConfig,
    pub ttl: TtlConfig,
}

/// Autoencoder (vocoder side) settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AeConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Waveform samples per raw latent step, before compression.
    pub base_chunk_size: usize,
}

/// Text-to-latent settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TtlConfig {
    pub chunk_compress_factor: usize,
    pub latent_dim: usize,
}

impl TtsConfig {
    /// Load and validate the configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SupertonicError> {
        let file = File::open(path)?;
        let config: TtsConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SupertonicError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SupertonicError> {
        if self.ae.sample_rate == 0 {
            return Err(SupertonicError::Config("ae.sample_rate must be > 0".into()));
        }
        if self.ae.base_chunk_size == 0 || self.ttl.chunk_compress_factor == 0 {
            return Err(SupertonicError::Config(
                "ae.base_chunk_size and ttl.chunk_compress_factor must be > 0".into(),
            ));
        }
        if self.ttl.latent_dim == 0 {
            return Err(SupertonicError::Config("ttl.latent_dim must be > 0".into()));
        }
        Ok(())
    }

    /// Waveform samples covered by one latent frame.
    pub fn chunk_size(&self) -> usize {
        self.ae.base_chunk_size * self.ttl.chunk_compress_factor
    }

    /// Channel dimension of the latent tensor.
    pub fn latent_channels(&self) -> usize {
        self.ttl.latent_dim * self.ttl.chunk_compress_factor
    }

    /// `floor(duration * sample_rate)`, never negative.
    ///
    /// Durations that are not finite or exceed [`MAX_CHUNK_SECS`] are
    /// rejected.
    pub fn sample_count(&self, duration_secs: f64) -> Result<usize, SupertonicError> {
        if !duration_secs.is_finite() || duration_secs > MAX_CHUNK_SECS {
            return Err(SupertonicError::DurationOutOfRange(duration_secs));
        }
        Ok((duration_secs * self.ae.sample_rate as f64).floor().max(0.0) as usize)
    }

    /// Number of latent frames needed for a clip of `duration_secs`.
    ///
    /// Fails if the `(1, channels, frames)` latent would not be addressable.
    pub fn latent_frames(&self, duration_secs: f64) -> Result<usize, SupertonicError> {
        let frames = self.sample_count(duration_secs)?.div_ceil(self.chunk_size());
        self.latent_channels()
            .checked_mul(frames)
            .filter(|&len| len <= isize::MAX as usize)
            .ok_or(SupertonicError::DurationOutOfRange(duration_secs))?;
        Ok(frames)
    }

    /// Zero samples inserted between adjacent chunks.
    pub fn silence_samples(&self, silence_secs: f32) -> usize {
        (silence_secs as f64 * self.ae.sample_rate as f64)
            .floor()
            .max(0.0) as usize
    }
}

/// Longest predicted clip a single chunk may ask for, in seconds.
pub const MAX_CHUNK_SECS: f64 = 600.0;

pub const MODEL_DIR_VAR: &str = "SUPERTONIC_MODEL_DIR";
pub const VOICE_FILE_VAR: &str = "SUPERTONIC_VOICE_FILE";
pub const SILENCE_SECS_VAR: &str = "SUPERTONIC_SILENCE_SECS";
pub const NUM_THREADS_VAR: &str = "SUPERTONIC_NUM_THREADS";
pub const SEED_VAR: &str = "SUPERTONIC_SEED";

/// Engine-level settings: where resources live and the synthesis defaults.
///
/// ```
/// use supertonic_rs::engines::supertonic::EngineConfigBuilder;
///
/// let config = EngineConfigBuilder::default()
///     .model_dir("assets/onnx")
///     .default_steps(5usize)
///     .seed(7u64)
///     .build()
///     .unwrap();
/// assert_eq!(config.default_steps, 5);
/// assert_eq!(config.default_speed, 1.0);
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(default, setter(into))]
pub struct EngineConfig {
    /// Directory holding `tts.json`, `unicode_indexer.json` and the ONNX units.
    pub model_dir: PathBuf,
    /// Voice profile loaded on first use.
    pub voice_file: PathBuf,
    /// Silence inserted between chunks, in seconds.
    pub silence_secs: f32,
    pub default_speed: f32,
    pub default_steps: usize,
    /// Intra/inter-op threads per ONNX session. `None` uses the ORT default.
    #[builder(setter(strip_option))]
    pub num_threads: Option<usize>,
    /// Fixed noise seed. With a seed, identical requests produce identical audio.
    #[builder(setter(strip_option))]
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            voice_file: PathBuf::from("voice_styles/F2.json"),
            silence_secs: 0.2,
            default_speed: 1.0,
            default_steps: 10,
            num_threads: None,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from `SUPERTONIC_*` environment variables,
    /// falling back to the defaults for unset ones.
    pub fn from_env() -> Result<Self, SupertonicError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, SupertonicError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(dir) = lookup(MODEL_DIR_VAR) {
            config.model_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup(VOICE_FILE_VAR) {
            config.voice_file = PathBuf::from(file);
        }
        if let Some(secs) = lookup(SILENCE_SECS_VAR) {
            config.silence_secs = parse_var(SILENCE_SECS_VAR, &secs)?;
        }
        if let Some(threads) = lookup(NUM_THREADS_VAR) {
            config.num_threads = Some(parse_var(NUM_THREADS_VAR, &threads)?);
        }
        if let Some(seed) = lookup(SEED_VAR) {
            config.seed = Some(parse_var(SEED_VAR, &seed)?);
        }
        Ok(config)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, SupertonicError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| SupertonicError::Config(format!("{key}={value:?}: {e}")))
}
