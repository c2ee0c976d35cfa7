mod common;

use std::future::Future;
use std::io::Cursor;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use tokio::sync::Semaphore;
use supertonic_rs::engines::supertonic::{
    EngineConfigBuilder, EngineState, SpeechAudio, SupertonicEngine, SupertonicError,
    SupertonicInferenceParams,
};
use supertonic_rs::{quantize_sample, WAV_HEADER_LEN};

fn params(speed: f32, steps: usize) -> Option<SupertonicInferenceParams> {
    Some(SupertonicInferenceParams {
        speed: Some(speed),
        steps: Some(steps),
    })
}

fn decode(wav: &[u8]) -> (hound::WavSpec, Vec<i16>) {
    let mut reader = hound::WavReader::new(Cursor::new(wav.to_vec())).unwrap();
    let spec = reader.spec();
    let samples = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    (spec, samples)
}

#[tokio::test]
async fn hello_there_single_step() {
    let engine = engine(StubLoader::new(StubVocoder::Constant(0.5)));

    let speech = engine.synthesize("Hello there.", params(1.0, 1)).await.unwrap();

    assert_eq!(speech.duration_secs, STUB_DURATION);
    // 0.5s at 100 Hz = 50 samples = 5 frames of 10
    let sample_count = 50;
    assert_eq!(speech.wav.len(), WAV_HEADER_LEN + 2 * sample_count);

    let (spec, samples) = decode(&speech.wav);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(samples, vec![quantize_sample(0.5); sample_count]);
}

#[tokio::test]
async fn two_chunks_are_separated_by_silence() {
    let engine = engine(StubLoader::new(StubVocoder::Constant(-0.25)));

    let speech = engine.synthesize("Stop. Go!", params(1.0, 2)).await.unwrap();
    let (_, samples) = decode(&speech.wav);

    let chunk = 50;
    assert_eq!(samples.len(), 2 * chunk + SILENCE_SAMPLES);
    let voiced = quantize_sample(-0.25);
    assert!(samples[..chunk].iter().all(|&s| s == voiced));
    assert!(samples[chunk..chunk + SILENCE_SAMPLES].iter().all(|&s| s == 0));
    assert!(samples[chunk + SILENCE_SAMPLES..].iter().all(|&s| s == voiced));
    // no leading or trailing silence
    assert_eq!(samples[0], voiced);
    assert_eq!(*samples.last().unwrap(), voiced);

    // silence is not part of the reported duration
    assert_eq!(speech.duration_secs, 2.0 * STUB_DURATION);
}

#[tokio::test]
async fn denoising_runs_exactly_the_requested_steps() {
    let loader = StubLoader::new(StubVocoder::FrameSum);
    let steps = Arc::clone(&loader.estimator.steps);
    let engine = engine(loader);

    engine.synthesize("One. Two.", params(1.0, 3)).await.unwrap();

    assert_eq!(
        *steps.lock().unwrap(),
        vec![(0, 3), (1, 3), (2, 3), (0, 3), (1, 3), (2, 3)]
    );
}

#[tokio::test]
async fn defaults_come_from_engine_config() {
    let loader = StubLoader::new(StubVocoder::Constant(0.1));
    let steps = Arc::clone(&loader.estimator.steps);

    let engine = SupertonicEngine::new(loader, seeded_config(1));
    let speech = engine.synthesize("Default.", None).await.unwrap();
    assert_eq!(steps.lock().unwrap().len(), 10);
    assert_eq!(speech.duration_secs, STUB_DURATION);

    let loader = StubLoader::new(StubVocoder::Constant(0.1));
    let steps = Arc::clone(&loader.estimator.steps);
    let config = EngineConfigBuilder::default()
        .default_steps(4usize)
        .default_speed(2.0f32)
        .silence_secs(0.5f32)
        .build()
        .unwrap();
    let engine = SupertonicEngine::new(loader, config);
    let result = engine.synthesize_samples("A. B.", None).await.unwrap();
    assert_eq!(steps.lock().unwrap().len(), 2 * 4);
    // speed 2 halves each chunk: 0.25s -> 25 samples -> 3 frames -> 30 samples
    assert_eq!(result.duration, 2.0 * STUB_DURATION / 2.0);
    assert_eq!(result.samples.len(), 30 + 50 + 30);
}

#[tokio::test]
async fn speed_divides_predicted_duration() {
    let engine = engine(StubLoader::new(StubVocoder::Constant(0.2)));
    let fast = engine.synthesize("Quick.", params(2.0, 1)).await.unwrap();
    let slow = engine.synthesize("Quick.", params(0.5, 1)).await.unwrap();
    assert_eq!(fast.duration_secs, 0.25);
    assert_eq!(slow.duration_secs, 1.0);
    assert!(slow.wav.len() > fast.wav.len());
}

#[tokio::test]
async fn seeded_runs_are_identical() {
    let engine = engine(StubLoader::new(StubVocoder::FrameSum));
    let first = engine.synthesize("Same input. Same output.", params(1.0, 2)).await.unwrap();
    let second = engine.synthesize("Same input. Same output.", params(1.0, 2)).await.unwrap();
    assert_eq!(first, second);

    let other = SupertonicEngine::new(StubLoader::new(StubVocoder::FrameSum), seeded_config(7));
    let third = other.synthesize("Same input. Same output.", params(1.0, 2)).await.unwrap();
    assert_eq!(third.wav.len(), first.wav.len());
    assert_ne!(third.wav, first.wav);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_loading() {
    let loader = StubLoader::new(StubVocoder::Constant(0.5));
    let loads = Arc::clone(&loader.loads);
    let engine = engine(loader);

    for (text, p) in [
        ("", None),
        ("   \n\t", None),
        ("Hello.", params(0.0, 10)),
        ("Hello.", params(f32::NAN, 10)),
        ("Hello.", params(-1.0, 10)),
        ("Hello.", params(1.0, 0)),
    ] {
        let err = engine.synthesize(text, p).await.unwrap_err();
        assert!(err.is_invalid_input(), "{text:?}: {err}");
    }

    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert_eq!(engine.state(), EngineState::Unloaded);
}

#[tokio::test]
async fn load_is_idempotent() {
    let loader = StubLoader::new(StubVocoder::Constant(0.5));
    let loads = Arc::clone(&loader.loads);
    let engine = engine(loader);

    assert_eq!(engine.state(), EngineState::Unloaded);
    engine.load().await.unwrap();
    engine.load().await.unwrap();
    engine.synthesize("Hi.", params(1.0, 1)).await.unwrap();

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(engine.state(), EngineState::Ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_calls_share_one_load() {
    let loader =
        StubLoader::new(StubVocoder::Constant(0.5)).with_delay(Duration::from_millis(50));
    let loads = Arc::clone(&loader.loads);
    let engine = Arc::new(engine(loader));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .synthesize(&format!("Request number {i}."), params(1.0, 1))
                    .await
            })
        })
        .collect();

    for handle in handles {
        let speech = handle.await.unwrap().unwrap();
        assert_eq!(speech.duration_secs, STUB_DURATION);
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(engine.state(), EngineState::Ready);
}

/// Poll one request until it blocks, report that it has queued, then drive
/// it to completion.
async fn queued_request(
    engine: Arc<SupertonicEngine<StubLoader>>,
    queued: Arc<Semaphore>,
) -> Result<SpeechAudio, SupertonicError> {
    let mut request = Box::pin(engine.synthesize("Hello.", params(1.0, 1)));
    let mut reported = false;
    std::future::poll_fn(|cx| {
        let poll = request.as_mut().poll(cx);
        if !reported {
            reported = true;
            queued.add_permits(1);
        }
        poll
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_load_is_shared_by_waiters_and_retried_later() {
    let (loader, gate) = StubLoader::new(StubVocoder::Constant(0.5))
        .failing(1)
        .gated();
    let loads = Arc::clone(&loader.loads);
    let engine = Arc::new(engine(loader));
    let queued = Arc::new(Semaphore::new(0));

    let waiters = 8;
    let handles: Vec<_> = (0..waiters)
        .map(|_| tokio::spawn(queued_request(Arc::clone(&engine), Arc::clone(&queued))))
        .collect();

    // every request is either running the load or waiting on it
    queued.acquire_many(waiters).await.unwrap().forget();
    assert_eq!(engine.state(), EngineState::Loading);
    gate.add_permits(1);

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, SupertonicError::LoadFailed(_)), "{err}");
        assert!(!err.is_invalid_input());
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(engine.state(), EngineState::Failed);

    // a fresh request starts a new attempt
    gate.add_permits(1);
    engine.synthesize("Hello.", params(1.0, 1)).await.unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(engine.state(), EngineState::Ready);
}

#[tokio::test]
async fn tiny_speed_fails_the_request_not_the_engine() {
    let engine = engine(StubLoader::new(StubVocoder::Constant(0.5)));

    for speed in [1e-30, 1e-9, f32::MIN_POSITIVE] {
        let err = engine.synthesize("Hi.", params(speed, 1)).await.unwrap_err();
        assert!(
            matches!(err, SupertonicError::DurationOutOfRange(_)),
            "speed {speed}: {err}"
        );
    }

    assert_eq!(engine.state(), EngineState::Ready);
    let speech = engine.synthesize("Hi.", params(1.0, 1)).await.unwrap();
    assert_eq!(speech.duration_secs, STUB_DURATION);
}

#[test]
fn engine_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SupertonicEngine<StubLoader>>();
}
