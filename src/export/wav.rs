//! WAV file export functionality

use std::path::Path;

use log::debug;

use crate::engine::Engine;
use crate::mixer::OutputFrame;
use crate::{FmError, Result};

/// Render frames from an engine into a 16-bit WAV file
///
/// One WAV channel is written per active output line, at the native rate
/// derived from `input_clock`.
///
/// # Examples
///
/// ```no_run
/// use ymfm::export::export_to_wav;
/// use ymfm::{Engine, EngineConfig, Family};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut engine = Engine::new(EngineConfig::new(Family::Opm))?;
/// engine.write(0x08, 0x78);
/// export_to_wav(&mut engine, 3_579_545, 55_930, "output.wav")?;
/// # Ok(())
/// # }
/// ```
pub fn export_to_wav<P: AsRef<Path>>(
    engine: &mut Engine,
    input_clock: u32,
    frame_count: usize,
    output_path: P,
) -> Result<()> {
    let sample_rate = engine.sample_rate(input_clock);
    if sample_rate == 0 {
        return Err(FmError::Export(format!(
            "input clock {} gives a zero sample rate",
            input_clock
        )));
    }

    debug!(
        "Rendering {} frames ({:.1}s) at {} Hz",
        frame_count,
        frame_count as f32 / sample_rate as f32,
        sample_rate
    );
    let frames = engine.generate(frame_count);
    write_wav_file(output_path.as_ref(), &frames, engine.outputs(), sample_rate)
}

/// Write frames to a WAV file, keeping the first `outputs` lines of each
pub fn write_wav_file(path: &Path, frames: &[OutputFrame], outputs: usize, sample_rate: u32) -> Result<()> {
    let channels = u16::try_from(outputs)
        .ok()
        .filter(|&count| count > 0 && count as usize <= crate::mixer::MAX_OUTPUTS)
        .ok_or_else(|| FmError::Export(format!("unsupported output count {}", outputs)))?;

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| FmError::Export(format!("Failed to create WAV file: {}", e)))?;

    for frame in frames {
        for &sample in &frame.data[..outputs] {
            writer
                .write_sample(to_i16(sample))
                .map_err(|e| FmError::Export(format!("Failed to write sample: {}", e)))?;
        }
    }

    writer
        .finalize()
        .map_err(|e| FmError::Export(format!("Failed to finalize WAV file: {}", e)))?;

    debug!("Wrote {} frames to {}", frames.len(), path.display());
    Ok(())
}

/// Saturate a mixed sample to 16 bits
fn to_i16(sample: i32) -> i16 {
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
