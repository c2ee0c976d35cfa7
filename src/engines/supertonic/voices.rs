use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use serde::Deserialize;
use serde_json::Value;

use super::model::SupertonicError;

/// A voice's two conditioning tensors.
///
/// `ttl` conditions the text encoder and vector estimator, `dp` conditions
/// the duration predictor. Both are stored as contiguous row-major buffers
/// with the shape declared in the profile file.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceStyle {
    pub ttl: ArrayD<f32>,
    pub dp: ArrayD<f32>,
}

#[derive(Deserialize)]
struct RawVoice {
    style_ttl: RawTensor,
    style_dp: RawTensor,
}

#[derive(Deserialize)]
struct RawTensor {
    data: Value,
    dims: Vec<usize>,
}

impl VoiceStyle {
    pub fn new(ttl: ArrayD<f32>, dp: ArrayD<f32>) -> Self {
        Self { ttl, dp }
    }

    /// Load a voice profile JSON file.
    pub fn load(path: &Path) -> Result<Self, SupertonicError> {
        let content = std::fs::read_to_string(path)?;
        let voice = Self::from_json_str(&content).map_err(|e| match e {
            SupertonicError::VoiceParse(msg) => {
                SupertonicError::VoiceParse(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        log::info!(
            "Loaded voice {} (ttl {:?}, dp {:?})",
            path.display(),
            voice.ttl.shape(),
            voice.dp.shape()
        );
        Ok(voice)
    }

    /// Parse a voice profile from its JSON text.
    ///
    /// The file must have `style_ttl` and `style_dp` objects, each holding a
    /// nested numeric `data` array and its `dims`.
    pub fn from_json_str(json: &str) -> Result<Self, SupertonicError> {
        let raw: RawVoice = serde_json::from_str(json)
            .map_err(|e| SupertonicError::VoiceParse(e.to_string()))?;
        Ok(Self {
            ttl: raw.style_ttl.into_array("style_ttl")?,
            dp: raw.style_dp.into_array("style_dp")?,
        })
    }
}

impl RawTensor {
    fn into_array(self, name: &str) -> Result<ArrayD<f32>, SupertonicError> {
        let mut flat = Vec::new();
        flatten_into(&self.data, &mut flat)
            .map_err(|e| SupertonicError::VoiceParse(format!("{name}: {e}")))?;

        ArrayD::from_shape_vec(IxDyn(&self.dims), flat).map_err(|e| {
            SupertonicError::VoiceParse(format!("{name}: data does not fit dims {:?}: {e}", self.dims))
        })
    }
}

/// Depth-first flatten of nested JSON arrays into row-major order.
fn flatten_into(value: &Value, out: &mut Vec<f32>) -> Result<(), String> {
    match value {
        Value::Number(n) => {
            let v = n.as_f64().ok_or_else(|| format!("unrepresentable number {n}"))?;
            out.push(v as f32);
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|item| flatten_into(item, out)),
        other => Err(format!("expected number or array, found {other}")),
    }
}
