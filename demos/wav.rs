use std::path::Path;

use hound::{SampleFormat, WavSpec};

/// Reads a 16-bit integer or 32-bit float file and folds it to mono.
pub fn load_mono(p: impl AsRef<Path>) -> Result<(WavSpec, Vec<f32>), hound::Error> {
    let mut reader = hound::WavReader::open(&p)?;
    let spec = reader.spec();
    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|x| x.map(|x| x as f32 / i16::MAX as f32))
            .collect::<Result<_, _>>()?,
        _ => return Err(hound::Error::Unsupported),
    };

    let channels = spec.channels.max(1) as usize;
    let mono = samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((spec, mono))
}

/// Writes `buf` as a mono file with the sample format of `spec`.
pub fn save_mono(p: impl AsRef<Path>, spec: WavSpec, buf: &[f32]) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 1,
        ..spec
    };
    let mut writer = hound::WavWriter::create(p, spec)?;
    match spec.sample_format {
        SampleFormat::Float => {
            for &x in buf {
                writer.write_sample(x)?;
            }
        }
        SampleFormat::Int => {
            for &x in buf {
                writer.write_sample(
                    (x * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16,
                )?;
            }
        }
    }
    writer.finalize()
}
