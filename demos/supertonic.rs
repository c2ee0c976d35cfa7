use std::path::PathBuf;
use std::time::Instant;

use supertonic_rs::engines::supertonic::{
    EngineConfig, SupertonicEngine, SupertonicInferenceParams,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = EngineConfig::from_env()?;
    println!(
        "Models: {}, voice: {}",
        config.model_dir.display(),
        config.voice_file.display()
    );
    let engine = SupertonicEngine::from_config(config);

    let load_start = Instant::now();
    engine.load().await?;
    println!("Model loaded in {:.2?}", load_start.elapsed());

    let text = "Hello! This is Supertonic, a lightning fast text to speech model. \
                It runs four small networks and a handful of denoising steps per sentence.";

    let params = SupertonicInferenceParams {
        speed: Some(1.05),
        steps: Some(5),
    };

    let synth_start = Instant::now();
    let result = engine.synthesize_samples(text, Some(params)).await?;
    let synth_dur = synth_start.elapsed();

    let speedup = result.playback_secs() / synth_dur.as_secs_f64();
    println!(
        "Synthesized {:.2}s of speech ({:.2}s with pauses) in {:.2?} ({:.1}x real-time)",
        result.duration,
        result.playback_secs(),
        synth_dur,
        speedup
    );

    result.write_wav(&PathBuf::from("output.wav"))?;
    println!("Saved to output.wav");

    let speech = engine.synthesize("One more, with the defaults.", None).await?;
    std::fs::write("output-defaults.wav", &speech.wav)?;
    println!(
        "Saved {} bytes ({:.2}s) to output-defaults.wav",
        speech.wav.len(),
        speech.duration_secs
    );

    Ok(())
}
