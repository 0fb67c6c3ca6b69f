//! FM Operator
//!
//! One phase accumulator plus one envelope generator, reading its
//! normalized parameters from an [`OperatorData`] snapshot that the engine
//! refreshes from the register map whenever registers change.
//!
//! Per sample the operator:
//! 1. Applies pending key-on/off changes (possibly resetting the phase)
//! 2. Steps the SSG-EG pattern
//! 3. Steps the envelope on envelope ticks
//! 4. Advances the phase, recomputing the step only when PM is active

use crate::envelope::{
    EnvelopeClock, EnvelopeGenerator, EnvelopeParams, EnvelopeState, KeyOnSource, EG_QUIET,
};
use crate::phase::{PhaseAccumulator, PhaseGenerator, PhaseParams};
use crate::tables::{attenuation_to_volume, waveform};

/// Normalized, family-independent parameters for one operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperatorData {
    /// Frequency parameters
    pub phase: PhaseParams,
    /// Envelope parameters
    pub envelope: EnvelopeParams,
    /// Waveform selector (0-7)
    pub waveform: usize,
    /// Apply the channel's LFO AM offset
    pub am_enable: bool,
    /// Cached phase step with no LFO PM applied
    pub phase_step: u32,
}

/// FM operator state
#[derive(Debug, Clone)]
pub struct Operator {
    phase: PhaseAccumulator,
    envelope: EnvelopeGenerator,
    data: OperatorData,
}

impl Operator {
    /// Create a silent operator
    pub fn new() -> Self {
        Operator {
            phase: PhaseAccumulator::new(),
            envelope: EnvelopeGenerator::new(),
            data: OperatorData::default(),
        }
    }

    /// Reset phase and envelope to the power-on state
    pub fn reset(&mut self) {
        self.phase.reset();
        self.envelope.reset();
    }

    /// Replace the cached parameters
    pub fn set_data(&mut self, data: OperatorData) {
        self.data = data;
    }

    /// Cached parameters
    pub fn data(&self) -> &OperatorData {
        &self.data
    }

    /// Assert or release a key-on source
    pub fn keyonoff(&mut self, on: bool, source: KeyOnSource) {
        self.envelope.keyonoff(on, source);
    }

    /// Advance the operator by one sample
    pub fn clock(&mut self, env_clock: &EnvelopeClock, generator: &PhaseGenerator, lfo_raw_pm: i32) {
        let params = &self.data.envelope;

        let mut reset_phase = self.envelope.clock_keystate(params);
        reset_phase |= self.envelope.clock_ssg_eg(params);
        if env_clock.is_tick() {
            reset_phase |= self.envelope.clock(env_clock.ticks(), params);
        }
        if reset_phase {
            self.phase.reset();
        }

        let step = if self.data.phase.pm_sensitivity != 0 && lfo_raw_pm != 0 {
            generator.step(&self.data.phase, lfo_raw_pm)
        } else {
            self.data.phase_step
        };
        self.phase.advance(step);
    }

    /// Signed 14-bit output for a modulation offset (in waveform index units)
    pub fn compute_volume(&self, modulation: i32, am_offset: u32) -> i32 {
        if self.envelope.raw_attenuation() > EG_QUIET {
            return 0;
        }

        let index = (self.phase.index() as i32).wrapping_add(modulation) as u32 & 0x3ff;
        let sin_attenuation = u32::from(waveform(self.data.waveform)[index as usize]);

        let env_attenuation = self.envelope_attenuation(am_offset) << 2;
        let volume = attenuation_to_volume((sin_attenuation & 0x7fff) + env_attenuation) as i32;

        if sin_attenuation & 0x8000 != 0 {
            -volume
        } else {
            volume
        }
    }

    /// Signed output driven by the noise generator instead of the waveform
    pub fn compute_noise_volume(&self, noise_state: bool, am_offset: u32) -> i32 {
        if self.envelope.raw_attenuation() > EG_QUIET {
            return 0;
        }

        let volume = ((self.envelope_attenuation(am_offset) ^ 0x3ff) << 1) as i32;
        if noise_state {
            -volume
        } else {
            volume
        }
    }

    /// Final envelope attenuation including total level and AM when enabled
    pub fn envelope_attenuation(&self, am_offset: u32) -> u32 {
        let am = if self.data.am_enable { am_offset } else { 0 };
        self.envelope.attenuation(&self.data.envelope, am)
    }

    /// Current envelope state
    pub fn envelope_state(&self) -> EnvelopeState {
        self.envelope.state()
    }

    /// Raw envelope attenuation before total level
    pub fn raw_attenuation(&self) -> u32 {
        self.envelope.raw_attenuation()
    }

    /// Raw 20-bit phase accumulator
    pub fn phase(&self) -> u32 {
        self.phase.value()
    }
}

impl Default for Operator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::{FreqDecode, LfoKind};

    fn keyed_operator(step: u32) -> (Operator, EnvelopeClock, PhaseGenerator) {
        let mut op = Operator::new();
        let mut envelope = EnvelopeParams::default();
        envelope.rates[EnvelopeState::Attack.index()] = 63;
        op.set_data(OperatorData {
            envelope,
            phase_step: step,
            ..Default::default()
        });
        let generator = PhaseGenerator::new(FreqDecode::FNum { bits: 11 }, LfoKind::Opn);
        // park the envelope clock between ticks
        let mut clock = EnvelopeClock::new(3);
        clock.clock();
        (op, clock, generator)
    }

    #[test]
    fn test_silent_when_off() {
        let op = Operator::new();
        assert_eq!(op.compute_volume(0, 0), 0);
        assert_eq!(op.compute_noise_volume(true, 0), 0);
    }

    #[test]
    fn test_phase_advances_by_cached_step() {
        let (mut op, clock, generator) = keyed_operator(1000);
        for _ in 0..10 {
            op.clock(&clock, &generator, 0);
        }
        assert_eq!(op.phase(), 10_000);
    }

    #[test]
    fn test_keyon_resets_phase() {
        let (mut op, clock, generator) = keyed_operator(1000);
        op.clock(&clock, &generator, 0);
        op.clock(&clock, &generator, 0);
        op.keyonoff(true, KeyOnSource::Normal);
        op.clock(&clock, &generator, 0);
        // reset happens before this sample's advance
        assert_eq!(op.phase(), 1000);
        assert_eq!(op.envelope_state(), EnvelopeState::Attack);
        assert_eq!(op.raw_attenuation(), 0);
    }

    #[test]
    fn test_full_volume_peak() {
        let (mut op, clock, generator) = keyed_operator(0);
        op.keyonoff(true, KeyOnSource::Normal);
        op.clock(&clock, &generator, 0);
        // quarter period is the sine peak
        let peak = op.compute_volume(0x100, 0);
        let trough = op.compute_volume(0x300, 0);
        assert!(peak > 8000);
        assert_eq!(trough, -peak);
    }

    #[test]
    fn test_am_only_when_enabled() {
        let (mut op, clock, generator) = keyed_operator(0);
        op.keyonoff(true, KeyOnSource::Normal);
        op.clock(&clock, &generator, 0);
        assert_eq!(op.envelope_attenuation(40), 0);

        let mut data = *op.data();
        data.am_enable = true;
        op.set_data(data);
        assert_eq!(op.envelope_attenuation(40), 40);
    }

    #[test]
    fn test_noise_volume_sign() {
        let (mut op, clock, generator) = keyed_operator(0);
        op.keyonoff(true, KeyOnSource::Normal);
        op.clock(&clock, &generator, 0);
        assert_eq!(op.compute_noise_volume(false, 0), 0x3ff << 1);
        assert_eq!(op.compute_noise_volume(true, 0), -(0x3ff << 1));
    }
}
