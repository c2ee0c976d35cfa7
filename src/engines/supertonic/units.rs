//! Tensor-in/tensor-out contracts for the four inference units.
//!
//! Units are shared read-only across requests, so every implementation must
//! be `Send + Sync`. Batch size is always 1.

use ndarray::{ArrayD, ArrayView2, ArrayView3, ArrayViewD};

use super::model::SupertonicError;

/// Predicts the clip duration for a chunk.
pub trait DurationPredictor: Send + Sync {
    /// Returns the raw `duration` output. Only the first element is used.
    fn predict(
        &self,
        text_ids: ArrayView2<'_, i64>,
        style_dp: ArrayViewD<'_, f32>,
        text_mask: ArrayView3<'_, f32>,
    ) -> Result<Vec<f32>, SupertonicError>;
}

/// Embeds a chunk's token ids for the denoising loop.
pub trait TextEncoder: Send + Sync {
    fn encode(
        &self,
        text_ids: ArrayView2<'_, i64>,
        style_ttl: ArrayViewD<'_, f32>,
        text_mask: ArrayView3<'_, f32>,
    ) -> Result<ArrayD<f32>, SupertonicError>;
}

/// Inputs of one denoising step.
#[derive(Debug, Clone)]
pub struct EstimatorInputs<'a> {
    /// Shape `(1, channels, frames)`.
    pub noisy_latent: ArrayView3<'a, f32>,
    pub text_emb: ArrayViewD<'a, f32>,
    pub style_ttl: ArrayViewD<'a, f32>,
    /// Shape `(1, 1, frames)`.
    pub latent_mask: ArrayView3<'a, f32>,
    /// Shape `(1, 1, tokens)`.
    pub text_mask: ArrayView3<'a, f32>,
    pub current_step: usize,
    pub total_steps: usize,
}

/// Runs one denoising step.
pub trait VectorEstimator: Send + Sync {
    /// Returns the denoised latent flattened in `(batch, channel, frame)`
    /// order. It must hold exactly as many values as `noisy_latent`.
    fn estimate(&self, inputs: EstimatorInputs<'_>) -> Result<Vec<f32>, SupertonicError>;
}

/// Converts a final latent into waveform samples.
pub trait Vocoder: Send + Sync {
    fn vocode(&self, latent: ArrayView3<'_, f32>) -> Result<Vec<f32>, SupertonicError>;
}
