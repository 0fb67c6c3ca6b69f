//! Envelope Generator
//!
//! Per-operator state machine producing a 10-bit attenuation over time.
//!
//! States: `Damp` (OPLL only) → `Attack` → `Decay` → `Sustain` → `Release` → `Off`.
//!
//! Timing follows the hardware's quantization:
//! - A shared envelope clock counter advances once per sample; operators
//!   only step on envelope ticks (every 3 samples on OPM/OPN, every sample on OPL)
//! - Each 6-bit effective rate gates updates by `rate >> 2` against an
//!   11-bit fractional mask and picks one of 8 increments from the
//!   hardware increment table
//! - Attack follows the exponential `att += (!att * inc) >> 4` curve
//!
//! SSG-EG (OPN family) adds hold/alternate/invert patterns from 3 mode bits.

use std::fmt;

use crate::tables::{attenuation_increment, bitfield};

/// Maximum (silent) attenuation
pub const MAX_ATTENUATION: u32 = 0x3ff;

/// Attenuation above which an operator outputs nothing
pub const EG_QUIET: u32 = 0x380;

/// Envelope phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnvelopeState {
    /// OPLL pre-attack ramp down to silence
    Damp = 0,
    /// Volume rising towards attenuation 0
    Attack = 1,
    /// Falling towards the sustain level
    Decay = 2,
    /// Holding (or slowly falling) at the sustain level
    Sustain = 3,
    /// Key released, falling to silence
    Release = 4,
    /// Silent and idle
    Off = 5,
}

impl EnvelopeState {
    /// Number of states (size of per-state rate tables)
    pub const COUNT: usize = 6;

    /// Index into per-state rate tables
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EnvelopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeState::Damp => write!(f, "Damp"),
            EnvelopeState::Attack => write!(f, "Attack"),
            EnvelopeState::Decay => write!(f, "Decay"),
            EnvelopeState::Sustain => write!(f, "Sustain"),
            EnvelopeState::Release => write!(f, "Release"),
            EnvelopeState::Off => write!(f, "Off"),
        }
    }
}

/// Source of a key-on request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOnSource {
    /// Key-on register write
    Normal,
    /// Timer A expiry in CSM mode (one-sample pulse)
    Csm,
}

impl KeyOnSource {
    fn bit(self) -> u8 {
        match self {
            KeyOnSource::Normal => 0x01,
            KeyOnSource::Csm => 0x04,
        }
    }
}

/// Normalized envelope parameters for one operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvelopeParams {
    /// Effective 6-bit rate for each state
    pub rates: [u32; EnvelopeState::COUNT],
    /// Sustain level as a 10-bit attenuation
    pub sustain: u32,
    /// Total level plus key scale attenuation (10-bit)
    pub total_level: u32,
    /// SSG-EG: bit 3 enable, bits 0-2 mode
    pub ssg_eg: u32,
    /// Damp phase present before attack
    pub damp: bool,
}

impl EnvelopeParams {
    /// Rate for a given state
    #[inline]
    pub fn rate(&self, state: EnvelopeState) -> u32 {
        self.rates[state.index()]
    }

    /// SSG-EG enabled
    #[inline]
    pub fn ssg_enabled(&self) -> bool {
        bitfield(self.ssg_eg, 3, 1) != 0
    }

    /// SSG-EG mode bits
    #[inline]
    pub fn ssg_mode(&self) -> u32 {
        bitfield(self.ssg_eg, 0, 3)
    }
}

/// Convert a 4-bit sustain level to a 10-bit attenuation (15 means 31)
#[inline]
pub fn sustain_attenuation(level: u32) -> u32 {
    let level = level & 0xf;
    (level | ((level + 1) & 0x10)) << 5
}

/// Shared envelope clock counter
///
/// Counts in x.2 fixed point; the low two bits track the divider so that an
/// envelope tick happens whenever they read zero.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeClock {
    counter: u32,
    divider: u32,
}

impl EnvelopeClock {
    /// Create a clock with the family's divider (1 to 3)
    pub fn new(divider: u32) -> Self {
        EnvelopeClock { counter: 0, divider }
    }

    /// Advance by one sample
    #[inline]
    pub fn clock(&mut self) {
        if self.divider == 1 {
            self.counter = self.counter.wrapping_add(4);
        } else {
            self.counter = self.counter.wrapping_add(1);
            if bitfield(self.counter, 0, 2) == self.divider {
                self.counter = self.counter.wrapping_add(4 - self.divider);
            }
        }
    }

    /// Raw x.2 counter value
    #[inline]
    pub fn get_counter(&self) -> u32 {
        self.counter
    }

    /// Whether the current sample is an envelope tick
    #[inline]
    pub fn is_tick(&self) -> bool {
        bitfield(self.counter, 0, 2) == 0
    }

    /// Integer tick count
    #[inline]
    pub fn ticks(&self) -> u32 {
        self.counter >> 2
    }

    /// Reset the counter
    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

/// Envelope generator state for one operator
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeGenerator {
    state: EnvelopeState,
    attenuation: u32,
    key_state: bool,
    keyon_live: u8,
    ssg_inverted: bool,
}

impl EnvelopeGenerator {
    /// Create a silent, idle envelope
    pub fn new() -> Self {
        EnvelopeGenerator {
            state: EnvelopeState::Off,
            attenuation: MAX_ATTENUATION,
            key_state: false,
            keyon_live: 0,
            ssg_inverted: false,
        }
    }

    /// Reset to the power-on state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// Raw 10-bit attenuation (before SSG inversion, AM and total level)
    #[inline]
    pub fn raw_attenuation(&self) -> u32 {
        self.attenuation
    }

    /// Whether SSG-EG inversion is currently active
    #[inline]
    pub fn ssg_inverted(&self) -> bool {
        self.ssg_inverted
    }

    /// Whether any key-on source is currently asserted
    #[inline]
    pub fn is_keyed_on(&self) -> bool {
        self.keyon_live != 0
    }

    /// Set or clear a key-on source; takes effect on the next clock
    pub fn keyonoff(&mut self, on: bool, source: KeyOnSource) {
        if on {
            self.keyon_live |= source.bit();
        } else {
            self.keyon_live &= !source.bit();
        }
    }

    /// Apply any key state change; returns true if the phase must reset
    pub fn clock_keystate(&mut self, params: &EnvelopeParams) -> bool {
        let keystate = self.keyon_live != 0;
        self.keyon_live &= !KeyOnSource::Csm.bit();

        if keystate == self.key_state {
            return false;
        }
        self.key_state = keystate;

        if keystate {
            if params.damp {
                self.state = EnvelopeState::Damp;
                false
            } else {
                self.start_attack(params, false)
            }
        } else {
            self.start_release(params);
            false
        }
    }

    /// Enter attack; returns true if the phase must reset
    pub fn start_attack(&mut self, params: &EnvelopeParams, is_restart: bool) -> bool {
        if self.state == EnvelopeState::Attack {
            return false;
        }
        self.state = EnvelopeState::Attack;

        if !is_restart {
            self.ssg_inverted = params.ssg_enabled() && bitfield(params.ssg_mode(), 2, 1) != 0;
        }

        if params.rate(EnvelopeState::Attack) >= 62 {
            self.attenuation = 0;
        }

        !is_restart
    }

    /// Enter release
    pub fn start_release(&mut self, params: &EnvelopeParams) {
        if self.state >= EnvelopeState::Release {
            return;
        }
        self.state = EnvelopeState::Release;

        if params.ssg_enabled() && self.ssg_inverted {
            self.attenuation = (0x200 - self.attenuation) & 0x3ff;
            self.ssg_inverted = false;
        }
    }

    /// Advance the SSG-EG pattern; returns true if the phase must reset
    pub fn clock_ssg_eg(&mut self, params: &EnvelopeParams) -> bool {
        if !params.ssg_enabled() {
            self.ssg_inverted = false;
            return false;
        }

        // nothing happens until the attenuation crosses the midpoint
        if bitfield(self.attenuation, 9, 1) == 0 {
            return false;
        }

        let mode = params.ssg_mode();
        let mut reset_phase = false;

        if bitfield(mode, 0, 1) != 0 {
            // hold modes: settle on the end state
            self.ssg_inverted = (bitfield(mode, 2, 1) ^ bitfield(mode, 1, 1)) != 0;
            if self.state != EnvelopeState::Attack {
                self.attenuation = if self.ssg_inverted { 0x200 } else { 0x3ff };
            }
        } else {
            // repeating modes: optionally alternate, then restart
            self.ssg_inverted ^= bitfield(mode, 1, 1) != 0;
            if matches!(self.state, EnvelopeState::Decay | EnvelopeState::Sustain) {
                self.start_attack(params, true);
            }
            reset_phase = bitfield(mode, 1, 1) == 0;
        }

        if self.state == EnvelopeState::Release {
            self.attenuation = MAX_ATTENUATION;
        }

        reset_phase
    }

    /// Advance on an envelope tick; returns true if the phase must reset
    pub fn clock(&mut self, env_counter: u32, params: &EnvelopeParams) -> bool {
        if self.state == EnvelopeState::Attack && self.attenuation == 0 {
            self.state = EnvelopeState::Decay;
        }

        // a zero sustain level skips decay entirely
        if self.state == EnvelopeState::Decay && self.attenuation >= params.sustain {
            self.state = EnvelopeState::Sustain;
        }

        if self.state == EnvelopeState::Release && self.attenuation >= MAX_ATTENUATION {
            self.state = EnvelopeState::Off;
        }

        if self.state == EnvelopeState::Off {
            return false;
        }

        let rate = params.rate(self.state);
        let rate_shift = rate >> 2;
        let counter = env_counter << rate_shift;
        if bitfield(counter, 0, 11) != 0 {
            return false;
        }

        let relevant_bits = bitfield(counter, rate_shift.max(11), 3);
        let increment = attenuation_increment(rate, relevant_bits);

        if self.state == EnvelopeState::Attack {
            // rates 62/63 only jump to zero at key-on, never while running
            if rate < 62 {
                let delta = ((!(self.attenuation as i32)) * increment as i32) >> 4;
                self.attenuation = (self.attenuation as i32 + delta).max(0) as u32;
            }
            return false;
        }

        if !params.ssg_enabled() {
            self.attenuation += increment;
        } else if self.attenuation < 0x200 {
            self.attenuation += 4 * increment;
        }
        if self.attenuation > MAX_ATTENUATION {
            self.attenuation = MAX_ATTENUATION;
        }

        if self.state == EnvelopeState::Damp && self.attenuation >= 0x200 {
            return self.start_attack(params, false);
        }

        false
    }

    /// Final 10-bit attenuation including SSG inversion, AM and total level
    #[inline]
    pub fn attenuation(&self, params: &EnvelopeParams, am_offset: u32) -> u32 {
        let mut result = self.attenuation;
        if self.ssg_inverted {
            result = (0x200 - result) & 0x3ff;
        }
        result += am_offset + params.total_level;
        result.min(MAX_ATTENUATION)
    }
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self::new()
    }
}
