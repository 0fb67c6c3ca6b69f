//! Phase Generator
//!
//! Converts a channel's `block_freq` composite plus per-operator detune and
//! multiple into a phase step, and advances the 20-bit phase accumulator.
//!
//! The decode strategy is chosen once per engine from the family's
//! [`FreqDecode`]:
//! - `KeyCode` (OPM): block + key code + 1/64 semitone fraction, looked up in
//!   the OPM tone table, with detune-2 and PM expressed as fraction deltas
//! - `FNum` (OPN, OPL, OPLL): fnum left-aligned to 12 bits, PM applied to the
//!   top fnum bits, then shifted by the block
//!
//! The accumulator is a 10.10 fixed-point value; the upper 10 bits index the
//! waveform tables, so it wraps exactly once per waveform period.

use crate::family::{FreqDecode, LfoKind};
use crate::tables::{bitfield, opm_key_code_to_phase_step, opn_lfo_pm_phase_adjustment};

/// Width of the phase accumulator in bits
pub const PHASE_BITS: u32 = 20;

/// Mask applied after every phase advance
pub const PHASE_MASK: u32 = (1 << PHASE_BITS) - 1;

/// OPM detune-2 deltas in 1/64 semitone units
const DETUNE2_DELTA: [i32; 4] = [0, (600 * 64 + 50) / 100, (781 * 64 + 50) / 100, (950 * 64 + 50) / 100];

/// Normalized frequency parameters for one operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseParams {
    /// Block/frequency composite (layout depends on the family)
    pub block_freq: u32,
    /// Detune adjustment already resolved from the keycode
    pub detune: i32,
    /// OPM detune-2 selector (0-3)
    pub detune2: u32,
    /// Frequency multiple as an x.1 value (1 means 0.5)
    pub multiple: u32,
    /// PM sensitivity (OPM/OPN 3-bit, OPL/OPLL vibrato on/off)
    pub pm_sensitivity: u32,
}

/// How the LFO PM value bends the frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PmCurve {
    /// Fraction delta scaled by sensitivity (OPM)
    KeyCode,
    /// Shift table on the top 7 fnum bits (OPN)
    ShiftTable,
    /// Linear in the top 3 fnum bits (OPL/OPLL)
    Linear,
}

/// Family-parameterized phase step calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseGenerator {
    decode: FreqDecode,
    pm: PmCurve,
}

impl PhaseGenerator {
    /// Create a phase generator for a decode strategy and LFO variant
    pub fn new(decode: FreqDecode, lfo: LfoKind) -> Self {
        let pm = match (decode, lfo) {
            (FreqDecode::KeyCode, _) => PmCurve::KeyCode,
            (_, LfoKind::Opl | LfoKind::Opll) => PmCurve::Linear,
            _ => PmCurve::ShiftTable,
        };
        PhaseGenerator { decode, pm }
    }

    /// Decode strategy in use
    pub fn decode(&self) -> FreqDecode {
        self.decode
    }

    /// Phase step per sample for the given parameters and raw LFO PM value
    pub fn step(&self, params: &PhaseParams, lfo_raw_pm: i32) -> u32 {
        match self.decode {
            FreqDecode::KeyCode => self.keycode_step(params, lfo_raw_pm),
            FreqDecode::FNum { bits } => self.fnum_step(params, bits, lfo_raw_pm),
        }
    }

    fn keycode_step(&self, params: &PhaseParams, lfo_raw_pm: i32) -> u32 {
        let mut delta = DETUNE2_DELTA[(params.detune2 & 3) as usize];

        let sensitivity = params.pm_sensitivity;
        if sensitivity != 0 {
            if sensitivity < 6 {
                delta += lfo_raw_pm >> (6 - sensitivity);
            } else {
                delta += lfo_raw_pm << (sensitivity - 5);
            }
        }

        let step = opm_key_code_to_phase_step(params.block_freq, delta);
        let step = (step as i32).wrapping_add(params.detune) as u32;
        step.wrapping_mul(params.multiple) >> 1
    }

    fn fnum_step(&self, params: &PhaseParams, bits: u32, lfo_raw_pm: i32) -> u32 {
        let block_freq = params.block_freq;
        let mut fnum = bitfield(block_freq, 0, bits) << (12 - bits);

        if params.pm_sensitivity != 0 && lfo_raw_pm != 0 {
            let adjust = match self.pm {
                PmCurve::ShiftTable => opn_lfo_pm_phase_adjustment(
                    bitfield(fnum, 5, 7),
                    params.pm_sensitivity,
                    lfo_raw_pm,
                ),
                _ => (lfo_raw_pm * bitfield(fnum, 9, 3) as i32) >> 1,
            };
            fnum = (fnum as i32).wrapping_add(adjust) as u32 & 0xfff;
        }

        let block = bitfield(block_freq, bits, 3);
        let mut step = (fnum << block) >> 2;

        // only the OPN layout carries detune, which wraps at 17 bits
        if self.pm == PmCurve::ShiftTable {
            step = (step as i32).wrapping_add(params.detune) as u32 & 0x1ffff;
        }

        step.wrapping_mul(params.multiple) >> 1
    }
}

/// 20-bit phase accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseAccumulator {
    value: u32,
}

impl PhaseAccumulator {
    /// Create an accumulator at phase zero
    pub fn new() -> Self {
        PhaseAccumulator { value: 0 }
    }

    /// Advance by one sample's step, wrapping at the waveform period
    #[inline]
    pub fn advance(&mut self, step: u32) {
        self.value = self.value.wrapping_add(step) & PHASE_MASK;
    }

    /// Reset to phase zero (key-on and SSG-EG restarts)
    #[inline]
    pub fn reset(&mut self) {
        self.value = 0;
    }

    /// Raw 10.10 accumulator value
    #[inline]
    pub fn value(&self) -> u32 {
        self.value
    }

    /// 10-bit waveform index
    #[inline]
    pub fn index(&self) -> u32 {
        self.value >> 10
    }
}
