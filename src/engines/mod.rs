//! Speech synthesis engines.
//!
//! This module contains implementations of text-to-speech engines.
//!
//! # Available Engines
//!
//! - `supertonic` - Supertonic flow-matching TTS. The orchestration is always
//!   available; the ONNX Runtime backend is enabled with the `onnx` feature.

pub mod supertonic;
