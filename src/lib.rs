//! Yamaha FM Synthesis Emulator
//!
//! A sample-accurate emulation of the digital signal path shared by the
//! Yamaha FM sound chips: OPM (YM2151), OPN (YM2203), OPNA (YM2608),
//! OPN2 (YM2612/YM3438), OPL (YM3526), OPL2 (YM3812), OPL3 (YMF262) and
//! OPLL (YM2413). Output matches the chips down to table precision,
//! rounding and timing quirks rather than an idealized synthesizer.
//!
//! # Features
//! - Phase generator with detune, multiple and LFO pitch modulation
//! - Envelope generator with key scaling, SSG-EG and OPLL damping
//! - OPM, OPN, OPL and OPLL LFO variants plus the OPM noise generator
//! - All 2-op and 4-op algorithms, feedback and modulator delay
//! - Timers A/B, status register, IRQ line and CSM key-on pulses
//! - Adder and muxer output stages, including the YM2612 DAC ladder
//! - Address/data port interface with second-bank support
//!
//! # Crate feature flags
//! - `export-wav` (opt-in): Write generated frames to WAV files (enables `hound`)
//!
//! # Quick start
//! ```no_run
//! use ymfm::{Engine, EngineConfig, Family};
//!
//! let mut engine = Engine::new(EngineConfig::new(Family::Opm)).unwrap();
//! engine.write(0x20, 0xc7); // both outputs, algorithm 7
//! engine.write(0x28, 0x4a); // key code
//! engine.write(0x60, 0x00); // operator 1 total level
//! engine.write(0x80, 0x1f); // operator 1 attack rate
//! engine.write(0x08, 0x08); // key on operator 1 of channel 0
//! let frames = engine.generate(1024);
//! let left = frames[0].data[0];
//! ```
//!
//! ## Port-level access
//! ```no_run
//! use ymfm::{Chip, EngineConfig, Family};
//! let mut chip = Chip::new(EngineConfig::new(Family::Opl3)).unwrap();
//! chip.write_port(2, 0x05); // second bank address
//! chip.write_port(3, 0x01); // enable OPL3 mode
//! let status = chip.read_port(0);
//! ```

#![warn(missing_docs)]

pub mod tables; // Log-Sin/Exp Tables & Rate Helpers

pub mod envelope; // Envelope Generator
pub mod lfo; // LFO & Noise
pub mod phase; // Phase Generator

pub mod channel; // Algorithms & Feedback
pub mod mixer; // Output Combination
pub mod operator; // Operator (Phase + Envelope)

pub mod status; // Status Register & IRQ
pub mod timer; // Timers A/B

pub mod config; // Engine Configuration
pub mod family; // Per-Family Constants
pub mod registers; // Register Maps

pub mod chip; // Port Interface
pub mod engine; // Sample Engine

#[cfg(feature = "export-wav")]
pub mod export; // WAV Export

/// Error types for FM engine operations
#[derive(thiserror::Error, Debug)]
pub enum FmError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error writing an output file
    #[error("Export error: {0}")]
    Export(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for FmError {
    /// Converts a String into `FmError::Other`.
    ///
    /// Prefer the specific variants (`FmError::Config`, `FmError::Export`)
    /// where the failure has a known cause.
    fn from(msg: String) -> Self {
        FmError::Other(msg)
    }
}

impl From<&str> for FmError {
    /// Converts a string slice into `FmError::Other`.
    fn from(msg: &str) -> Self {
        FmError::Other(msg.to_string())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, FmError>;

// Public API exports
pub use chip::Chip;
pub use config::{BusyTiming, EngineConfig, TimerMode};
pub use engine::Engine;
pub use envelope::EnvelopeState;
pub use family::{Family, FamilyConfig, Features};
pub use mixer::{OutputFrame, OutputRouting};
pub use timer::TimerId;
