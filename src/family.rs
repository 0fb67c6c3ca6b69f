//! Chip Families and Construction-Time Constants
//!
//! Every supported chip is described by a [`FamilyConfig`]: operator and
//! channel layout, prescale, envelope clock divider, feature flags, output
//! format and status bit assignment. The engine reads these constants once
//! at construction and never branches on chip identity afterwards.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{FmError, Result};

/// Supported chip families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// YM2151 (OPM)
    Opm,
    /// YM2203 (OPN)
    Opn,
    /// YM2608 (OPNA)
    Opna,
    /// YM2612 (OPN2) with its 9-bit DAC discontinuity
    Opn2,
    /// YM3438 (OPN2C) without the DAC discontinuity
    Opn2c,
    /// YM3526 (OPL)
    Opl,
    /// YM3812 (OPL2)
    Opl2,
    /// YMF262 (OPL3)
    Opl3,
    /// YM2413 (OPLL)
    Opll,
}

impl Family {
    /// All families, in declaration order
    pub const ALL: [Family; 9] = [
        Family::Opm,
        Family::Opn,
        Family::Opna,
        Family::Opn2,
        Family::Opn2c,
        Family::Opl,
        Family::Opl2,
        Family::Opl3,
        Family::Opll,
    ];

    /// Constant set for this family
    pub fn config(self) -> FamilyConfig {
        match self {
            Family::Opm => OPM,
            Family::Opn => OPN,
            Family::Opna => OPNA,
            Family::Opn2 => OPN2,
            Family::Opn2c => OPN2C,
            Family::Opl => OPL,
            Family::Opl2 => OPL2,
            Family::Opl3 => OPL3,
            Family::Opll => OPLL,
        }
    }

    /// Whether this family uses the OPN register layout
    pub fn is_opn(self) -> bool {
        matches!(self, Family::Opn | Family::Opna | Family::Opn2 | Family::Opn2c)
    }

    /// Whether this family uses the OPL register layout
    pub fn is_opl(self) -> bool {
        matches!(self, Family::Opl | Family::Opl2 | Family::Opl3)
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.config().name)
    }
}

bitflags! {
    /// Optional hardware features
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Features: u16 {
        /// Low-frequency oscillator present
        const LFO = 0x0001;
        /// Noise generator present (OPM)
        const NOISE = 0x0002;
        /// SSG-style envelope modes (OPN family)
        const SSG_EG = 0x0004;
        /// Timer A driven key-on pulses
        const CSM = 0x0008;
        /// First modulator delayed by one sample
        const MOD_DELAY = 0x0010;
        /// Damp phase before attack on key-on
        const DAMP = 0x0020;
        /// Operators can be regrouped into 4-op channels at runtime
        const DYNAMIC_OPS = 0x0040;
        /// Per-operator frequencies on channel 2 (OPN family)
        const MULTI_FREQ = 0x0080;
        /// PCM DAC replacing the last channel (OPN2)
        const DAC = 0x0100;
        /// Writable prescaler (OPN/OPNA)
        const PRESCALE_WRITES = 0x0200;
    }
}

/// How the `block_freq` composite is decoded into a phase step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreqDecode {
    /// 3-bit block, 4-bit key code and 6-bit fraction (OPM)
    KeyCode,
    /// 3-bit block and an fnum of the given width
    FNum {
        /// Width of the frequency number in bits
        bits: u32,
    },
}

/// LFO variant present on the chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfoKind {
    /// Constant zero output
    None,
    /// OPM: 4.4 rate, four waveforms, global AM/PM depth
    Opm,
    /// OPNA+: 3-bit rate, per-channel sensitivity
    Opn,
    /// OPL: fixed rates with global depth bits
    Opl,
    /// OPLL: OPL variant with fixed depths
    Opll,
}

/// How channel outputs are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Summing {
    /// Arithmetic sum, clipped at the end
    Adder,
    /// Time-division multiplexed 9-bit slots
    Muxer,
}

/// Output sample format presented by the DAC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Linear 16-bit
    Linear16,
    /// 10.3 floating point (mantissa/exponent), expanded back to 16-bit
    Float10_3,
    /// 9-bit serial DAC; `ladder` models the YM2612 zero-crossing step
    Dac9 {
        /// Emulate the DAC discontinuity around zero
        ladder: bool,
    },
}

/// Status bit positions for one family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusBits {
    /// Timer A expiry
    pub timer_a: u8,
    /// Timer B expiry
    pub timer_b: u8,
    /// Busy flag
    pub busy: u8,
    /// IRQ summary bit (0 if the family has none)
    pub irq: u8,
}

/// Construction-time constants for one chip family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyConfig {
    /// Family tag
    pub family: Family,
    /// Display name of the chip
    pub name: &'static str,
    /// Number of channels
    pub channels: usize,
    /// Total number of operators
    pub operators: usize,
    /// Operators per channel in the default layout (2 or 4)
    pub operators_per_channel: usize,
    /// Output count per frame (1, 2 or 4)
    pub outputs: usize,
    /// Default clock prescale
    pub default_prescale: u32,
    /// All prescale values the chip can be switched to
    pub prescale_options: &'static [u32],
    /// Envelope generator clock divider
    pub eg_clock_divider: u32,
    /// Feature flags
    pub features: Features,
    /// `block_freq` decoding
    pub freq_decode: FreqDecode,
    /// LFO variant
    pub lfo: LfoKind,
    /// Number of selectable waveforms
    pub waveforms: usize,
    /// Channel combination strategy
    pub summing: Summing,
    /// DAC output format
    pub output_format: OutputFormat,
    /// Right shift applied to each channel's output
    pub output_rshift: u32,
    /// Per-channel clip value
    pub output_clip: i32,
    /// Status bit assignment
    pub status: StatusBits,
    /// Channels receiving a key-on pulse when timer A expires in CSM mode
    pub csm_trigger_mask: u32,
    /// Size of the register address space
    pub register_space: usize,
}

const OPM_STATUS: StatusBits = StatusBits { timer_a: 0x01, timer_b: 0x02, busy: 0x80, irq: 0 };
const OPL_STATUS: StatusBits = StatusBits { timer_a: 0x40, timer_b: 0x20, busy: 0, irq: 0x80 };

/// YM2151
pub const OPM: FamilyConfig = FamilyConfig {
    family: Family::Opm,
    name: "YM2151",
    channels: 8,
    operators: 32,
    operators_per_channel: 4,
    outputs: 2,
    default_prescale: 2,
    prescale_options: &[2],
    eg_clock_divider: 3,
    features: Features::LFO.union(Features::NOISE).union(Features::CSM),
    freq_decode: FreqDecode::KeyCode,
    lfo: LfoKind::Opm,
    waveforms: 1,
    summing: Summing::Adder,
    output_format: OutputFormat::Float10_3,
    output_rshift: 0,
    output_clip: 32767,
    status: OPM_STATUS,
    csm_trigger_mask: 0xff,
    register_space: 0x100,
};

/// YM2203
pub const OPN: FamilyConfig = FamilyConfig {
    family: Family::Opn,
    name: "YM2203",
    channels: 3,
    operators: 12,
    operators_per_channel: 4,
    outputs: 1,
    default_prescale: 6,
    prescale_options: &[2, 3, 6],
    eg_clock_divider: 3,
    features: Features::SSG_EG
        .union(Features::CSM)
        .union(Features::MULTI_FREQ)
        .union(Features::PRESCALE_WRITES),
    freq_decode: FreqDecode::FNum { bits: 11 },
    lfo: LfoKind::None,
    waveforms: 1,
    summing: Summing::Adder,
    output_format: OutputFormat::Float10_3,
    output_rshift: 0,
    output_clip: 32767,
    status: OPM_STATUS,
    csm_trigger_mask: 0x04,
    register_space: 0x100,
};

/// YM2608
pub const OPNA: FamilyConfig = FamilyConfig {
    family: Family::Opna,
    name: "YM2608",
    channels: 6,
    operators: 24,
    operators_per_channel: 4,
    outputs: 2,
    default_prescale: 6,
    prescale_options: &[2, 3, 6],
    eg_clock_divider: 3,
    features: Features::LFO
        .union(Features::SSG_EG)
        .union(Features::CSM)
        .union(Features::MULTI_FREQ)
        .union(Features::PRESCALE_WRITES),
    freq_decode: FreqDecode::FNum { bits: 11 },
    lfo: LfoKind::Opn,
    waveforms: 1,
    summing: Summing::Adder,
    output_format: OutputFormat::Linear16,
    output_rshift: 1,
    output_clip: 32767,
    status: OPM_STATUS,
    csm_trigger_mask: 0x04,
    register_space: 0x200,
};

/// YM2612
pub const OPN2: FamilyConfig = FamilyConfig {
    family: Family::Opn2,
    name: "YM2612",
    channels: 6,
    operators: 24,
    operators_per_channel: 4,
    outputs: 2,
    default_prescale: 6,
    prescale_options: &[6],
    eg_clock_divider: 3,
    features: Features::LFO
        .union(Features::SSG_EG)
        .union(Features::CSM)
        .union(Features::MULTI_FREQ)
        .union(Features::DAC),
    freq_decode: FreqDecode::FNum { bits: 11 },
    lfo: LfoKind::Opn,
    waveforms: 1,
    summing: Summing::Muxer,
    output_format: OutputFormat::Dac9 { ladder: true },
    output_rshift: 5,
    output_clip: 255,
    status: OPM_STATUS,
    csm_trigger_mask: 0x04,
    register_space: 0x200,
};

/// YM3438
pub const OPN2C: FamilyConfig = FamilyConfig {
    name: "YM3438",
    family: Family::Opn2c,
    output_format: OutputFormat::Dac9 { ladder: false },
    ..OPN2
};

/// YM3526
pub const OPL: FamilyConfig = FamilyConfig {
    family: Family::Opl,
    name: "YM3526",
    channels: 9,
    operators: 18,
    operators_per_channel: 2,
    outputs: 1,
    default_prescale: 4,
    prescale_options: &[4],
    eg_clock_divider: 1,
    features: Features::LFO.union(Features::CSM).union(Features::MOD_DELAY),
    freq_decode: FreqDecode::FNum { bits: 10 },
    lfo: LfoKind::Opl,
    waveforms: 1,
    summing: Summing::Adder,
    output_format: OutputFormat::Float10_3,
    output_rshift: 1,
    output_clip: 32767,
    status: OPL_STATUS,
    csm_trigger_mask: 0x1ff,
    register_space: 0x100,
};

/// YM3812
pub const OPL2: FamilyConfig = FamilyConfig {
    family: Family::Opl2,
    name: "YM3812",
    waveforms: 4,
    ..OPL
};

/// YMF262
pub const OPL3: FamilyConfig = FamilyConfig {
    family: Family::Opl3,
    name: "YMF262",
    channels: 18,
    operators: 36,
    operators_per_channel: 2,
    outputs: 4,
    default_prescale: 8,
    prescale_options: &[8],
    eg_clock_divider: 1,
    features: Features::LFO.union(Features::DYNAMIC_OPS),
    freq_decode: FreqDecode::FNum { bits: 10 },
    lfo: LfoKind::Opl,
    waveforms: 8,
    summing: Summing::Adder,
    output_format: OutputFormat::Linear16,
    output_rshift: 0,
    output_clip: 32767,
    status: OPL_STATUS,
    csm_trigger_mask: 0,
    register_space: 0x200,
};

/// YM2413
pub const OPLL: FamilyConfig = FamilyConfig {
    family: Family::Opll,
    name: "YM2413",
    channels: 9,
    operators: 18,
    operators_per_channel: 2,
    outputs: 1,
    default_prescale: 4,
    prescale_options: &[4],
    eg_clock_divider: 1,
    features: Features::LFO.union(Features::DAMP).union(Features::MOD_DELAY),
    freq_decode: FreqDecode::FNum { bits: 9 },
    lfo: LfoKind::Opll,
    waveforms: 2,
    summing: Summing::Muxer,
    output_format: OutputFormat::Dac9 { ladder: false },
    output_rshift: 5,
    output_clip: 255,
    status: StatusBits { timer_a: 0, timer_b: 0, busy: 0, irq: 0 },
    csm_trigger_mask: 0,
    register_space: 0x40,
};

impl FamilyConfig {
    /// Whether a feature is present
    #[inline]
    pub fn has(&self, feature: Features) -> bool {
        self.features.contains(feature)
    }

    /// Output sample rate for a given input clock and prescale
    pub fn sample_rate(&self, input_clock: u32, prescale: u32) -> u32 {
        let divisor = prescale as u64 * self.operators as u64;
        if divisor == 0 {
            return 0;
        }
        (input_clock as u64 / divisor) as u32
    }

    /// Reject inconsistent constant sets
    pub fn validate(&self) -> Result<()> {
        if self.operators_per_channel != 2 && self.operators_per_channel != 4 {
            return Err(FmError::Config(format!(
                "{}: operators per channel must be 2 or 4, got {}",
                self.name, self.operators_per_channel
            )));
        }
        if self.channels == 0 || self.channels > 32 {
            return Err(FmError::Config(format!(
                "{}: channel count {} out of range 1..=32",
                self.name, self.channels
            )));
        }
        if self.operators != self.channels * self.operators_per_channel {
            return Err(FmError::Config(format!(
                "{}: {} operators cannot fill {} channels of {}",
                self.name, self.operators, self.channels, self.operators_per_channel
            )));
        }
        if self.has(Features::DYNAMIC_OPS) && self.operators_per_channel != 2 {
            return Err(FmError::Config(format!(
                "{}: dynamic 4-op pairing requires a 2-op base layout",
                self.name
            )));
        }
        if !(1..=4).contains(&self.outputs) {
            return Err(FmError::Config(format!(
                "{}: output count {} out of range 1..=4",
                self.name, self.outputs
            )));
        }
        if !(1..=3).contains(&self.eg_clock_divider) {
            return Err(FmError::Config(format!(
                "{}: envelope clock divider {} out of range 1..=3",
                self.name, self.eg_clock_divider
            )));
        }
        if self.waveforms == 0 || self.waveforms > crate::tables::WAVEFORMS {
            return Err(FmError::Config(format!(
                "{}: waveform count {} out of range",
                self.name, self.waveforms
            )));
        }
        if !self.prescale_options.contains(&self.default_prescale) {
            return Err(FmError::Config(format!(
                "{}: default prescale {} not among {:?}",
                self.name, self.default_prescale, self.prescale_options
            )));
        }
        if self.csm_trigger_mask.checked_shr(self.channels as u32).unwrap_or(0) != 0 {
            return Err(FmError::Config(format!(
                "{}: CSM trigger mask {:#x} names missing channels",
                self.name, self.csm_trigger_mask
            )));
        }
        if self.has(Features::CSM) && self.csm_trigger_mask == 0 {
            return Err(FmError::Config(format!(
                "{}: CSM enabled without trigger channels",
                self.name
            )));
        }
        if self.has(Features::SSG_EG) && !matches!(self.freq_decode, FreqDecode::FNum { bits: 11 }) {
            return Err(FmError::Config(format!(
                "{}: SSG-EG is only defined for the OPN layout",
                self.name
            )));
        }
        if self.has(Features::MULTI_FREQ) && self.channels < 3 {
            return Err(FmError::Config(format!(
                "{}: multi-frequency mode requires channel 2",
                self.name
            )));
        }
        if self.output_clip <= 0 {
            return Err(FmError::Config(format!("{}: clip value must be positive", self.name)));
        }
        Ok(())
    }
}
