use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Mutex;

use crate::{encode_wav, SynthesisResult};

use super::config::EngineConfig;
use super::model::{ResourceBundle, SupertonicError, SynthesisSettings};
use super::noise::{BoxMuller, NoiseSource};
use super::voices::VoiceStyle;

/// Source of the engine's resources, consulted once on first use.
pub trait ResourceLoader: Send + Sync + 'static {
    fn load_bundle(&self) -> impl Future<Output = Result<ResourceBundle, SupertonicError>> + Send;

    fn load_voice(&self) -> impl Future<Output = Result<VoiceStyle, SupertonicError>> + Send;
}

/// Parameters for configuring a Supertonic synthesis request.
///
/// Unset fields fall back to the engine's [`EngineConfig`] defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SupertonicInferenceParams {
    /// Speech speed multiplier. Divides the predicted duration.
    pub speed: Option<f32>,
    /// Number of denoising steps per chunk.
    pub steps: Option<usize>,
}

/// Encoded speech returned by [`SupertonicEngine::synthesize`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechAudio {
    /// 16-bit mono PCM WAV file contents.
    pub wav: Vec<u8>,
    /// Sum of predicted chunk durations, excluding inter-chunk silence.
    pub duration_secs: f64,
}

/// Lifecycle of the engine's lazily loaded resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
    /// The last load attempt failed. The next request tries again.
    Failed,
}

impl EngineState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Loading,
            2 => Self::Ready,
            3 => Self::Failed,
            _ => Self::Unloaded,
        }
    }
}

struct Loaded {
    bundle: ResourceBundle,
    voice: VoiceStyle,
}

/// Supertonic text-to-speech engine.
///
/// Resources are loaded on the first request. Concurrent first requests
/// share a single load: one caller performs it while the others wait on
/// the load lock, and all of them see its outcome. Once loaded, the bundle
/// and voice are shared read-only by every request.
///
/// # Quick Start
///
/// ```rust,no_run
/// # #[cfg(feature = "onnx")]
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use supertonic_rs::engines::supertonic::{EngineConfig, SupertonicEngine};
///
/// let engine = SupertonicEngine::from_config(EngineConfig::from_env()?);
/// let speech = engine.synthesize("Hello there.", None).await?;
/// std::fs::write("hello.wav", &speech.wav)?;
/// # Ok(())
/// # }
/// ```
pub struct SupertonicEngine<L> {
    loader: L,
    config: EngineConfig,
    ready: OnceLock<Arc<Loaded>>,
    load_lock: Mutex<Option<Arc<SupertonicError>>>,
    failed_attempts: AtomicU64,
    state: AtomicU8,
}

#[cfg(feature = "onnx")]
impl SupertonicEngine<super::onnx::OnnxLoader> {
    /// Create an engine backed by ONNX Runtime, reading resources from the
    /// paths in `config`.
    pub fn from_config(config: EngineConfig) -> Self {
        let loader = super::onnx::OnnxLoader::new(&config);
        Self::new(loader, config)
    }
}

impl<L: ResourceLoader> SupertonicEngine<L> {
    pub fn new(loader: L, config: EngineConfig) -> Self {
        Self {
            loader,
            config,
            ready: OnceLock::new(),
            load_lock: Mutex::new(None),
            failed_attempts: AtomicU64::new(0),
            state: AtomicU8::new(EngineState::Unloaded as u8),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Load the resource bundle and default voice if not loaded yet.
    ///
    /// Calling this on a ready engine is a no-op.
    pub async fn load(&self) -> Result<(), SupertonicError> {
        self.ensure_loaded().await.map(|_| ())
    }

    async fn ensure_loaded(&self) -> Result<Arc<Loaded>, SupertonicError> {
        if let Some(loaded) = self.ready.get() {
            return Ok(Arc::clone(loaded));
        }

        let seen_failures = self.failed_attempts.load(Ordering::Acquire);
        let mut last_error = self.load_lock.lock().await;

        if let Some(loaded) = self.ready.get() {
            return Ok(Arc::clone(loaded));
        }
        // An attempt we were waiting on failed; report it instead of retrying.
        if self.failed_attempts.load(Ordering::Acquire) != seen_failures {
            if let Some(err) = last_error.as_ref() {
                return Err(SupertonicError::LoadFailed(Arc::clone(err)));
            }
        }

        self.set_state(EngineState::Loading);
        let start = Instant::now();
        match self.load_resources().await {
            Ok(loaded) => {
                let loaded = Arc::new(loaded);
                // Only the holder of `load_lock` ever sets the cell.
                let _ = self.ready.set(Arc::clone(&loaded));
                *last_error = None;
                self.set_state(EngineState::Ready);
                log::info!("Supertonic engine ready in {:.2?}", start.elapsed());
                Ok(loaded)
            }
            Err(err) => {
                log::warn!("Supertonic resource load failed: {err}");
                let err = Arc::new(err);
                *last_error = Some(Arc::clone(&err));
                self.failed_attempts.fetch_add(1, Ordering::AcqRel);
                self.set_state(EngineState::Failed);
                Err(SupertonicError::LoadFailed(err))
            }
        }
    }

    async fn load_resources(&self) -> Result<Loaded, SupertonicError> {
        let bundle = self.loader.load_bundle().await?;
        let voice = self.loader.load_voice().await?;
        Ok(Loaded { bundle, voice })
    }

    fn settings(
        &self,
        params: Option<SupertonicInferenceParams>,
    ) -> Result<SynthesisSettings, SupertonicError> {
        let params = params.unwrap_or_default();
        let settings = SynthesisSettings {
            speed: params.speed.unwrap_or(self.config.default_speed),
            steps: params.steps.unwrap_or(self.config.default_steps),
            silence_secs: self.config.silence_secs,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn noise_source(&self) -> BoxMuller<StdRng> {
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        BoxMuller::new(rng)
    }

    /// Synthesize `text` into raw samples.
    ///
    /// Input is validated before any resource is loaded.
    pub async fn synthesize_samples(
        &self,
        text: &str,
        params: Option<SupertonicInferenceParams>,
    ) -> Result<SynthesisResult, SupertonicError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SupertonicError::EmptyText);
        }
        let settings = self.settings(params)?;

        let loaded = self.ensure_loaded().await?;
        let text = text.to_string();
        let mut noise = self.noise_source();
        tokio::task::spawn_blocking(move || {
            let noise: &mut dyn NoiseSource = &mut noise;
            loaded
                .bundle
                .synthesize(&text, &loaded.voice, &settings, noise)
        })
        .await?
    }

    /// Synthesize `text` into a WAV buffer and its predicted duration.
    pub async fn synthesize(
        &self,
        text: &str,
        params: Option<SupertonicInferenceParams>,
    ) -> Result<SpeechAudio, SupertonicError> {
        let result = self.synthesize_samples(text, params).await?;
        let wav = encode_wav(&result.samples, result.sample_rate)?;
        Ok(SpeechAudio {
            wav,
            duration_secs: result.duration,
        })
    }
}
