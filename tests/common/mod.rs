#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

use ndarray::{ArrayD, ArrayView2, ArrayView3, ArrayViewD, IxDyn};
use supertonic_rs::engines::supertonic::config::{AeConfig, TtlConfig};
use supertonic_rs::engines::supertonic::{
    DurationPredictor, EngineConfig, EngineConfigBuilder, EstimatorInputs, ResourceBundle,
    ResourceLoader, SupertonicEngine, SupertonicError, TextEncoder, TtsConfig, UnicodeIndexer,
    VectorEstimator, VoiceStyle, Vocoder,
};

pub const SAMPLE_RATE: u32 = 100;
/// base_chunk_size (5) × chunk_compress_factor (2)
pub const CHUNK_SIZE: usize = 10;
/// latent_dim (3) × chunk_compress_factor (2)
pub const LATENT_CHANNELS: usize = 6;
/// floor(0.2 × SAMPLE_RATE)
pub const SILENCE_SAMPLES: usize = 20;
pub const STUB_DURATION: f64 = 0.5;

pub fn stub_config() -> TtsConfig {
    TtsConfig {
        ae: AeConfig {
            sample_rate: SAMPLE_RATE,
            base_chunk_size: 5,
        },
        ttl: TtlConfig {
            chunk_compress_factor: 2,
            latent_dim: 3,
        },
    }
}

pub fn stub_voice() -> VoiceStyle {
    VoiceStyle::new(
        ArrayD::from_elem(IxDyn(&[1, 4, 2]), 0.1),
        ArrayD::from_elem(IxDyn(&[1, 2, 1]), -0.3),
    )
}

/// Always predicts the same duration; trailing values must be ignored.
pub struct FixedDuration(pub f32);

impl DurationPredictor for FixedDuration {
    fn predict(
        &self,
        _text_ids: ArrayView2<'_, i64>,
        _style_dp: ArrayViewD<'_, f32>,
        _text_mask: ArrayView3<'_, f32>,
    ) -> Result<Vec<f32>, SupertonicError> {
        Ok(vec![self.0, 99.0, 99.0])
    }
}

pub struct ZeroEncoder;

impl TextEncoder for ZeroEncoder {
    fn encode(
        &self,
        text_ids: ArrayView2<'_, i64>,
        _style_ttl: ArrayViewD<'_, f32>,
        _text_mask: ArrayView3<'_, f32>,
    ) -> Result<ArrayD<f32>, SupertonicError> {
        Ok(ArrayD::zeros(IxDyn(&[1, 8, text_ids.ncols()])))
    }
}

/// Halves the latent and records every step index it is called with.
#[derive(Clone, Default)]
pub struct HalvingEstimator {
    pub steps: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl VectorEstimator for HalvingEstimator {
    fn estimate(&self, inputs: EstimatorInputs<'_>) -> Result<Vec<f32>, SupertonicError> {
        self.steps
            .lock()
            .unwrap()
            .push((inputs.current_step, inputs.total_steps));
        Ok(inputs.noisy_latent.iter().map(|v| v * 0.5).collect())
    }
}

#[derive(Clone, Copy)]
pub enum StubVocoder {
    /// `CHUNK_SIZE` samples of a fixed value per latent frame.
    Constant(f32),
    /// `CHUNK_SIZE` samples of `tanh(sum over channels)` per latent frame.
    FrameSum,
}

impl Vocoder for StubVocoder {
    fn vocode(&self, latent: ArrayView3<'_, f32>) -> Result<Vec<f32>, SupertonicError> {
        let frames = latent.shape()[2];
        let mut wav = Vec::with_capacity(frames * CHUNK_SIZE);
        for f in 0..frames {
            let value = match self {
                Self::Constant(v) => *v,
                Self::FrameSum => (0..latent.shape()[1])
                    .map(|c| latent[[0, c, f]])
                    .sum::<f32>()
                    .tanh(),
            };
            wav.extend(std::iter::repeat(value).take(CHUNK_SIZE));
        }
        Ok(wav)
    }
}

/// In-memory loader that counts attempts and can fail a number of times.
pub struct StubLoader {
    pub loads: Arc<AtomicUsize>,
    pub failures_left: AtomicUsize,
    pub delay: Duration,
    /// When set, each attempt waits for one permit before finishing.
    pub gate: Option<Arc<Semaphore>>,
    pub estimator: HalvingEstimator,
    pub vocoder: StubVocoder,
}

impl StubLoader {
    pub fn new(vocoder: StubVocoder) -> Self {
        Self {
            loads: Arc::new(AtomicUsize::new(0)),
            failures_left: AtomicUsize::new(0),
            delay: Duration::ZERO,
            gate: None,
            estimator: HalvingEstimator::default(),
            vocoder,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Hold every load attempt until the returned semaphore hands out a permit.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn failing(self, times: usize) -> Self {
        self.failures_left.store(times, Ordering::SeqCst);
        self
    }
}

impl ResourceLoader for StubLoader {
    async fn load_bundle(&self) -> Result<ResourceBundle, SupertonicError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| SupertonicError::Config(e.to_string()))?
                .forget();
        }
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(SupertonicError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "vocoder.onnx missing",
            )));
        }
        Ok(ResourceBundle::new(
            stub_config(),
            UnicodeIndexer::new((0..256).collect()),
            FixedDuration(STUB_DURATION as f32),
            ZeroEncoder,
            self.estimator.clone(),
            self.vocoder,
        ))
    }

    async fn load_voice(&self) -> Result<VoiceStyle, SupertonicError> {
        Ok(stub_voice())
    }
}

pub fn seeded_config(seed: u64) -> EngineConfig {
    EngineConfigBuilder::default().seed(seed).build().unwrap()
}

pub fn engine(loader: StubLoader) -> SupertonicEngine<StubLoader> {
    SupertonicEngine::new(loader, seeded_config(42))
}
