//! Supertonic text-to-speech engine implementation.
//!
//! Supertonic synthesizes speech with four inference units run once per
//! sentence-sized chunk of text:
//!
//! 1. **Duration predictor** – predicts the clip length for the chunk
//! 2. **Text encoder** – embeds the chunk's token ids
//! 3. **Vector estimator** – refines Gaussian noise into a speech latent over
//!    a fixed number of denoising steps
//! 4. **Vocoder** – turns the final latent into waveform samples
//!
//! Chunk waveforms are joined with a short silence and encoded as 16-bit
//! mono WAV.
//!
//! # Model Directory Layout
//!
//! ```text
//! models/
//! ├── tts.json                 # sample rate, chunk size, latent dims
//! ├── unicode_indexer.json     # codepoint -> token id table
//! ├── duration_predictor.onnx
//! ├── text_encoder.onnx
//! ├── vector_estimator.onnx
//! └── vocoder.onnx
//! voice_styles/
//! └── F2.json                  # style_ttl / style_dp tensors
//! ```
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! # #[cfg(feature = "onnx")]
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use supertonic_rs::engines::supertonic::{EngineConfig, SupertonicEngine};
//!
//! let engine = SupertonicEngine::from_config(EngineConfig::default());
//! let speech = engine.synthesize("Hello, world!", None).await?;
//! println!("{} bytes, {:.2}s", speech.wav.len(), speech.duration_secs);
//! # Ok(())
//! # }
//! ```
//!
//! ## With Custom Speed and Steps
//!
//! ```rust,no_run
//! # #[cfg(feature = "onnx")]
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use supertonic_rs::engines::supertonic::{
//!     EngineConfig, SupertonicEngine, SupertonicInferenceParams,
//! };
//!
//! let engine = SupertonicEngine::from_config(EngineConfig::default());
//! let params = SupertonicInferenceParams {
//!     speed: Some(1.2),
//!     steps: Some(5),
//! };
//! let speech = engine.synthesize("Faster, with fewer steps.", Some(params)).await?;
//! std::fs::write("out.wav", &speech.wav)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod model;
pub mod noise;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod text;
pub mod units;
pub mod vocab;
pub mod voices;

pub use config::{EngineConfig, EngineConfigBuilder, TtsConfig};
pub use engine::{
    EngineState, ResourceLoader, SpeechAudio, SupertonicEngine, SupertonicInferenceParams,
};
pub use model::{ChunkAudio, ResourceBundle, SupertonicError};
pub use noise::{BoxMuller, NoiseSource};
#[cfg(feature = "onnx")]
pub use onnx::OnnxLoader;
pub use units::{DurationPredictor, EstimatorInputs, TextEncoder, VectorEstimator, Vocoder};
pub use vocab::{TokenSequence, UnicodeIndexer, UNKNOWN_TOKEN};
pub use voices::VoiceStyle;
