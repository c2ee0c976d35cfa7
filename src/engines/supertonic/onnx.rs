//! ONNX Runtime backend for the four inference units.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use ndarray::{arr1, ArrayD, ArrayView2, ArrayView3, ArrayViewD};
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{DynValue, TensorRef};

use super::config::{EngineConfig, TtsConfig};
use super::engine::ResourceLoader;
use super::model::{ResourceBundle, SupertonicError};
use super::units::{DurationPredictor, EstimatorInputs, TextEncoder, VectorEstimator, Vocoder};
use super::vocab::UnicodeIndexer;
use super::voices::VoiceStyle;

pub const CONFIG_FILE: &str = "tts.json";
pub const INDEXER_FILE: &str = "unicode_indexer.json";

/// An ONNX session shared between requests.
///
/// `Session::run` needs exclusive access, so concurrent requests queue on
/// the lock.
struct SharedSession {
    name: &'static str,
    session: Mutex<Session>,
}

impl SharedSession {
    fn open(model_dir: &Path, name: &'static str, num_threads: Option<usize>) -> Result<Self, SupertonicError> {
        let path = model_dir.join(format!("{name}.onnx"));
        if !path.exists() {
            return Err(SupertonicError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{name} model not found at {}", path.display()),
            )));
        }
        let start = Instant::now();
        let session = init_session(&path, num_threads)?;
        log::info!("Loaded {name} from {} in {:.2?}", path.display(), start.elapsed());
        Ok(Self {
            name,
            session: Mutex::new(session),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Session>, SupertonicError> {
        self.session
            .lock()
            .map_err(|_| SupertonicError::Poisoned(self.name))
    }

    fn missing(&self, output: &'static str) -> SupertonicError {
        SupertonicError::MissingOutput {
            unit: self.name,
            output,
        }
    }
}

/// Initialize an ONNX session on the CPU provider with Level3 optimization.
fn init_session(onnx_path: &Path, num_threads: Option<usize>) -> Result<Session, SupertonicError> {
    let providers = vec![CPUExecutionProvider::default().build()];

    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_execution_providers(providers)?
        .with_parallel_execution(true)?;

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(onnx_path)?)
}

fn to_vec(value: &DynValue) -> Result<Vec<f32>, SupertonicError> {
    let array = value.try_extract_array::<f32>()?;
    Ok(array.iter().copied().collect())
}

/// `duration_predictor.onnx`: (text_ids, style_dp, text_mask) -> duration
pub struct OnnxDurationPredictor(SharedSession);

impl DurationPredictor for OnnxDurationPredictor {
    fn predict(
        &self,
        text_ids: ArrayView2<'_, i64>,
        style_dp: ArrayViewD<'_, f32>,
        text_mask: ArrayView3<'_, f32>,
    ) -> Result<Vec<f32>, SupertonicError> {
        let mut session = self.0.lock()?;
        let inputs = inputs![
            "text_ids" => TensorRef::from_array_view(text_ids)?,
            "style_dp" => TensorRef::from_array_view(style_dp)?,
            "text_mask" => TensorRef::from_array_view(text_mask)?,
        ];
        let outputs = session.run(inputs)?;
        let (_, duration) = outputs
            .iter()
            .find(|(name, _)| *name == "duration")
            .ok_or_else(|| self.0.missing("duration"))?;
        to_vec(&duration)
    }
}

/// `text_encoder.onnx`: (text_ids, style_ttl, text_mask) -> text_emb
pub struct OnnxTextEncoder(SharedSession);

impl TextEncoder for OnnxTextEncoder {
    fn encode(
        &self,
        text_ids: ArrayView2<'_, i64>,
        style_ttl: ArrayViewD<'_, f32>,
        text_mask: ArrayView3<'_, f32>,
    ) -> Result<ArrayD<f32>, SupertonicError> {
        let mut session = self.0.lock()?;
        let inputs = inputs![
            "text_ids" => TensorRef::from_array_view(text_ids)?,
            "style_ttl" => TensorRef::from_array_view(style_ttl)?,
            "text_mask" => TensorRef::from_array_view(text_mask)?,
        ];
        let outputs = session.run(inputs)?;
        let (_, text_emb) = outputs
            .iter()
            .find(|(name, _)| *name == "text_emb")
            .ok_or_else(|| self.0.missing("text_emb"))?;
        Ok(text_emb.try_extract_array::<f32>()?.to_owned())
    }
}

/// `vector_estimator.onnx`: one denoising step -> denoised_latent
pub struct OnnxVectorEstimator(SharedSession);

impl VectorEstimator for OnnxVectorEstimator {
    fn estimate(&self, step: EstimatorInputs<'_>) -> Result<Vec<f32>, SupertonicError> {
        let current_step = arr1(&[step.current_step as f32]);
        let total_step = arr1(&[step.total_steps as f32]);

        let mut session = self.0.lock()?;
        let inputs = inputs![
            "noisy_latent" => TensorRef::from_array_view(step.noisy_latent)?,
            "text_emb" => TensorRef::from_array_view(step.text_emb)?,
            "style_ttl" => TensorRef::from_array_view(step.style_ttl)?,
            "latent_mask" => TensorRef::from_array_view(step.latent_mask)?,
            "text_mask" => TensorRef::from_array_view(step.text_mask)?,
            "current_step" => TensorRef::from_array_view(current_step.view())?,
            "total_step" => TensorRef::from_array_view(total_step.view())?,
        ];
        let outputs = session.run(inputs)?;
        let (_, denoised) = outputs
            .iter()
            .find(|(name, _)| *name == "denoised_latent")
            .ok_or_else(|| self.0.missing("denoised_latent"))?;
        to_vec(&denoised)
    }
}

/// `vocoder.onnx`: latent -> wav_tts
pub struct OnnxVocoder(SharedSession);

impl Vocoder for OnnxVocoder {
    fn vocode(&self, latent: ArrayView3<'_, f32>) -> Result<Vec<f32>, SupertonicError> {
        let mut session = self.0.lock()?;
        let inputs = inputs![
            "latent" => TensorRef::from_array_view(latent)?,
        ];
        let outputs = session.run(inputs)?;
        let (_, wav) = outputs
            .iter()
            .find(|(name, _)| *name == "wav_tts")
            .ok_or_else(|| self.0.missing("wav_tts"))?;
        to_vec(&wav)
    }
}

async fn blocking<T, F>(f: F) -> Result<T, SupertonicError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SupertonicError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

impl ResourceBundle {
    /// Load the config, the index table and the four ONNX units from
    /// `model_dir`, all concurrently. Any failure fails the whole load.
    pub async fn load(
        model_dir: &Path,
        num_threads: Option<usize>,
    ) -> Result<Self, SupertonicError> {
        log::info!("Loading Supertonic models from {}", model_dir.display());
        let start = Instant::now();

        let unit = |name: &'static str| {
            let dir = model_dir.to_path_buf();
            blocking(move || SharedSession::open(&dir, name, num_threads))
        };
        let config_path = model_dir.join(CONFIG_FILE);
        let indexer_path = model_dir.join(INDEXER_FILE);

        let (config, indexer, dp, te, ve, voc) = tokio::try_join!(
            blocking(move || TtsConfig::load(&config_path)),
            blocking(move || UnicodeIndexer::load(&indexer_path)),
            unit("duration_predictor"),
            unit("text_encoder"),
            unit("vector_estimator"),
            unit("vocoder"),
        )?;

        log::info!(
            "Supertonic loaded in {:.2?} ({} Hz, {} latent channels, {} index entries)",
            start.elapsed(),
            config.ae.sample_rate,
            config.latent_channels(),
            indexer.len()
        );

        Ok(Self::new(
            config,
            indexer,
            OnnxDurationPredictor(dp),
            OnnxTextEncoder(te),
            OnnxVectorEstimator(ve),
            OnnxVocoder(voc),
        ))
    }
}

/// Loads resources from the directories named in an [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct OnnxLoader {
    model_dir: PathBuf,
    voice_file: PathBuf,
    num_threads: Option<usize>,
}

impl OnnxLoader {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            model_dir: config.model_dir.clone(),
            voice_file: config.voice_file.clone(),
            num_threads: config.num_threads,
        }
    }
}

impl ResourceLoader for OnnxLoader {
    async fn load_bundle(&self) -> Result<ResourceBundle, SupertonicError> {
        ResourceBundle::load(&self.model_dir, self.num_threads).await
    }

    async fn load_voice(&self) -> Result<VoiceStyle, SupertonicError> {
        let path = self.voice_file.clone();
        blocking(move || VoiceStyle::load(&path)).await
    }
}
