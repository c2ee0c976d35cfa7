use std::f64::consts::PI;

use ndarray::Array3;
use rand::Rng;

/// Lower bound on the first uniform so `ln(u1)` stays finite.
const MIN_UNIFORM: f64 = 1e-4;

/// Source of standard-normal samples for the initial latent.
pub trait NoiseSource: Send {
    fn standard_normal(&mut self) -> f32;
}

/// Box–Muller transform over a uniform random generator.
#[derive(Debug, Clone)]
pub struct BoxMuller<R> {
    rng: R,
}

impl<R: Rng + Send> BoxMuller<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> NoiseSource for BoxMuller<R> {
    fn standard_normal(&mut self) -> f32 {
        let u1: f64 = self.rng.random();
        let u2: f64 = self.rng.random();
        box_muller(u1, u2)
    }
}

/// `sqrt(-2 ln u1) * cos(2π u2)` with `u1` floored at 1e-4.
pub fn box_muller(u1: f64, u2: f64) -> f32 {
    let u1 = u1.max(MIN_UNIFORM);
    ((-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()) as f32
}

/// Fill a `(1, channels, frames)` latent with noise.
///
/// Samples are drawn in row-major order: all frames of channel 0, then
/// channel 1, and so on.
pub fn sample_latent(channels: usize, frames: usize, noise: &mut dyn NoiseSource) -> Array3<f32> {
    let mut latent = Array3::zeros((1, channels, frames));
    latent
        .iter_mut()
        .for_each(|v| *v = noise.standard_normal());
    latent
}
