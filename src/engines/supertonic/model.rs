use std::sync::Arc;
use std::time::Instant;

use ndarray::Array3;

use crate::SynthesisResult;

use super::config::TtsConfig;
use super::noise::{sample_latent, NoiseSource};
use super::text::chunk_text;
use super::units::{DurationPredictor, EstimatorInputs, TextEncoder, VectorEstimator, Vocoder};
use super::vocab::UnicodeIndexer;
use super::voices::VoiceStyle;

#[derive(thiserror::Error, Debug)]
pub enum SupertonicError {
    #[cfg(feature = "onnx")]
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Failed to parse voice file: {0}")]
    VoiceParse(String),
    #[error("Text is required")]
    EmptyText,
    #[error("Speed must be a positive finite number, got {0}")]
    InvalidSpeed(f32),
    #[error("Steps must be at least 1")]
    InvalidSteps,
    #[error("Predicted duration {0}s is outside the supported range")]
    DurationOutOfRange(f64),
    #[error("{unit} failed: {message}")]
    Inference { unit: &'static str, message: String },
    #[error("{unit} returned no '{output}' output")]
    MissingOutput {
        unit: &'static str,
        output: &'static str,
    },
    #[error("{0} session lock poisoned")]
    Poisoned(&'static str),
    #[error("Synthesis task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Resource load failed: {0}")]
    LoadFailed(Arc<SupertonicError>),
}

impl SupertonicError {
    /// True for errors caused by the request itself rather than the engine.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::EmptyText | Self::InvalidSpeed(_) | Self::InvalidSteps
        )
    }
}

/// Per-request synthesis settings with all defaults resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisSettings {
    /// Divides the predicted duration; above 1.0 speaks faster.
    pub speed: f32,
    /// Denoising iterations per chunk.
    pub steps: usize,
    /// Silence between chunks, in seconds.
    pub silence_secs: f32,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            speed: 1.0,
            steps: 10,
            silence_secs: 0.2,
        }
    }
}

impl SynthesisSettings {
    pub fn validate(&self) -> Result<(), SupertonicError> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(SupertonicError::InvalidSpeed(self.speed));
        }
        if self.steps == 0 {
            return Err(SupertonicError::InvalidSteps);
        }
        Ok(())
    }
}

/// Waveform and predicted duration of one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkAudio {
    pub samples: Vec<f32>,
    /// Predicted duration in seconds, already divided by the speed factor.
    pub duration: f64,
}

/// Everything needed to synthesize: the numeric config, the token table and
/// the four inference units. Immutable once built.
pub struct ResourceBundle {
    config: TtsConfig,
    indexer: UnicodeIndexer,
    duration_predictor: Box<dyn DurationPredictor>,
    text_encoder: Box<dyn TextEncoder>,
    vector_estimator: Box<dyn VectorEstimator>,
    vocoder: Box<dyn Vocoder>,
}

impl ResourceBundle {
    pub fn new(
        config: TtsConfig,
        indexer: UnicodeIndexer,
        duration_predictor: impl DurationPredictor + 'static,
        text_encoder: impl TextEncoder + 'static,
        vector_estimator: impl VectorEstimator + 'static,
        vocoder: impl Vocoder + 'static,
    ) -> Self {
        Self {
            config,
            indexer,
            duration_predictor: Box::new(duration_predictor),
            text_encoder: Box::new(text_encoder),
            vector_estimator: Box::new(vector_estimator),
            vocoder: Box::new(vocoder),
        }
    }

    pub fn config(&self) -> &TtsConfig {
        &self.config
    }

    pub fn indexer(&self) -> &UnicodeIndexer {
        &self.indexer
    }

    /// Synthesize `text` chunk by chunk and join the results with silence.
    pub fn synthesize(
        &self,
        text: &str,
        voice: &VoiceStyle,
        settings: &SynthesisSettings,
        noise: &mut dyn NoiseSource,
    ) -> Result<SynthesisResult, SupertonicError> {
        settings.validate()?;
        let chunks = chunk_text(text);
        if chunks.is_empty() {
            return Err(SupertonicError::EmptyText);
        }

        let start = Instant::now();
        let mut assembler =
            WaveformAssembler::new(self.config.silence_samples(settings.silence_secs));
        for (i, chunk) in chunks.iter().enumerate() {
            log::debug!("Chunk {}/{}: {chunk:?}", i + 1, chunks.len());
            let audio =
                self.synthesize_chunk(chunk, voice, settings.steps, settings.speed, noise)?;
            assembler.push(audio);
        }

        let result = assembler.finish(self.config.ae.sample_rate);
        log::info!(
            "Synthesized {} chunk(s), {:.2}s of speech in {:.2?}",
            chunks.len(),
            result.duration,
            start.elapsed()
        );
        Ok(result)
    }

    /// Run duration → encode → `steps` × denoise → vocode for one chunk.
    pub fn synthesize_chunk(
        &self,
        text: &str,
        voice: &VoiceStyle,
        steps: usize,
        speed: f32,
        noise: &mut dyn NoiseSource,
    ) -> Result<ChunkAudio, SupertonicError> {
        let tokens = self.indexer.tokenize(text);

        // The predictor's output is treated as one clip-level duration.
        let predicted = self.duration_predictor.predict(
            tokens.ids.view(),
            voice.dp.view(),
            tokens.mask.view(),
        )?;
        let duration = predicted
            .first()
            .copied()
            .map(f64::from)
            .ok_or(SupertonicError::MissingOutput {
                unit: "duration_predictor",
                output: "duration",
            })?
            / f64::from(speed);
        let frames = self.config.latent_frames(duration)?;

        let text_emb =
            self.text_encoder
                .encode(tokens.ids.view(), voice.ttl.view(), tokens.mask.view())?;

        let mut latent = sample_latent(self.config.latent_channels(), frames, noise);
        let latent_mask = Array3::<f32>::ones((1, 1, frames));
        log::debug!(
            "{} tokens, {duration:.3}s -> latent {:?}",
            tokens.len(),
            latent.shape()
        );

        for step in 0..steps {
            log::trace!("Denoising step {}/{steps}", step + 1);
            let denoised = self.vector_estimator.estimate(EstimatorInputs {
                noisy_latent: latent.view(),
                text_emb: text_emb.view(),
                style_ttl: voice.ttl.view(),
                latent_mask: latent_mask.view(),
                text_mask: tokens.mask.view(),
                current_step: step,
                total_steps: steps,
            })?;
            latent = Array3::from_shape_vec(latent.raw_dim(), denoised)?;
        }

        let samples = self.vocoder.vocode(latent.view())?;
        Ok(ChunkAudio { samples, duration })
    }
}

/// Joins chunk waveforms in order with silence between adjacent chunks.
#[derive(Debug)]
pub struct WaveformAssembler {
    samples: Vec<f32>,
    duration: f64,
    chunks: usize,
    silence_samples: usize,
}

impl WaveformAssembler {
    pub fn new(silence_samples: usize) -> Self {
        Self {
            samples: Vec::new(),
            duration: 0.0,
            chunks: 0,
            silence_samples,
        }
    }

    pub fn push(&mut self, chunk: ChunkAudio) {
        if self.chunks > 0 {
            self.samples
                .resize(self.samples.len() + self.silence_samples, 0.0);
        }
        self.samples.extend_from_slice(&chunk.samples);
        self.duration += chunk.duration;
        self.chunks += 1;
    }

    /// Reported duration is the sum of predicted chunk durations; the
    /// inserted silence is not counted.
    pub fn finish(self, sample_rate: u32) -> SynthesisResult {
        SynthesisResult {
            samples: self.samples,
            sample_rate,
            duration: self.duration,
        }
    }
}
