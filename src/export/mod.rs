//! Audio export
//!
//! Renders engine output to files at the chip's native sample rate.
//! No resampling or filtering is applied.

pub mod wav;

pub use wav::{export_to_wav, write_wav_file};
