//! Runs a WAV file through the harmonizer in host-sized blocks.
//!
//! ```text
//! cargo run --example harmonize -- input.wav [chord] [key] [scale]
//! ```
//! `chord`, `key` and `scale` are normalized `[0, 1]` values.

mod wav;

use voiche_harmonizer::{
    chords::{ChordArchetype, Key, Scale},
    power, Engine, HarmonizerEngine, ParamIndex, ParamMap,
};

const BLOCK_SIZE: usize = 512;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::init_with_level(log::Level::Debug)?;

    let mut args = std::env::args().skip(1);
    let file = args.next().unwrap_or("input.wav".to_string());
    let mut normalized = |default: f32| -> Result<f32, std::num::ParseFloatError> {
        args.next().map_or(Ok(default), |s| s.parse())
    };
    let chord = normalized(ChordArchetype::MajorTriad.to_normalized())?;
    let key = normalized(Key::C.to_normalized())?;
    let scale = normalized(Scale::Major.to_normalized())?;

    let (spec, input) = wav::load_mono(&file)?;
    log::info!(
        "{}: {} samples at {} Hz, rms {:.4}",
        file,
        input.len(),
        spec.sample_rate,
        power(&input)
    );

    let mut engine = HarmonizerEngine::new()?;
    let mut diagnostics = engine.take_diagnostics();
    engine.prepare(spec.sample_rate as f64, BLOCK_SIZE)?;

    let mut params = ParamMap::new();
    params.insert(ParamIndex::ChordType.index(), chord);
    params.insert(ParamIndex::RootKey.index(), key);
    params.insert(ParamIndex::Scale.index(), scale);
    params.insert(ParamIndex::MasterMix.index(), 0.7);
    engine.update_parameters(&params);
    log::info!("settings: {:?}", engine.controller().settings());

    // Flush the tail out with the reported latency worth of silence.
    let latency = engine.latency_samples();
    let mut padded = input;
    padded.resize(padded.len() + latency, 0.0);

    let start = std::time::Instant::now();
    let mut output = vec![0.0; padded.len()];
    for (x, y) in padded.chunks(BLOCK_SIZE).zip(output.chunks_mut(BLOCK_SIZE)) {
        engine.process_block(x, y);
        if let Some(drain) = diagnostics.as_mut() {
            drain.drain_to_log();
        }
    }
    log::info!(
        "processed in {:?}, rms {:.4}",
        start.elapsed(),
        power(&output)
    );

    let out_file = file.replace(".wav", "_hrm.wav");
    wav::save_mono(&out_file, spec, &output)?;
    log::info!("wrote {}", out_file);
    Ok(())
}
