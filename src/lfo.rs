//! Low-Frequency Oscillator
//!
//! One chip-wide LFO evaluated exactly once per sample, before any operator
//! is clocked. Each variant produces a raw PM value (returned from
//! [`Lfo::clock`]) and a raw AM value that channels convert to an
//! attenuation offset through [`Lfo::am_offset`].
//!
//! Variants:
//! - OPM: 4.4 floating-point rate, saw/square/triangle/noise waveforms,
//!   7-bit AM and PM depth
//! - OPN (OPNA and later): 3-bit rate, fixed triangle shapes
//! - OPL: fixed-rate AM triangle and PM steps with global depth bits
//! - OPLL: the OPL variant with both depths fixed high
//! - None: constant zero output for chips without an LFO
//!
//! The OPM noise generator lives here as well, since it shares the LFO's
//! clock and feeds the noise waveform.

use std::sync::OnceLock;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::family::LfoKind;
use crate::tables::bitfield;

/// OPL AM triangle length in steps
const OPL_AM_PERIOD: u32 = 210 * 64;

/// OPN divider per 3-bit rate
const OPN_MAX_COUNT: [u32; 8] = [109, 78, 72, 68, 63, 45, 9, 6];

/// OPL PM scale per 1024-step segment, as a 1.3 value
const OPL_PM_SCALE: [i32; 8] = [8, 4, 0, -4, -8, -4, 0, 4];

static OPM_WAVEFORMS: OnceLock<[[i16; 3]; 256]> = OnceLock::new();

/// OPM LFO waveform select
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum LfoWaveform {
    /// Sawtooth
    Saw = 0,
    /// Square
    Square = 1,
    /// Triangle
    Triangle = 2,
    /// Sampled noise
    Noise = 3,
}

/// Normalized LFO and noise controls decoded from the registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LfoParams {
    /// LFO running (OPN only; others are always on)
    pub enable: bool,
    /// Rate field (OPM 8-bit, OPN 3-bit)
    pub rate: u32,
    /// OPM waveform select
    pub waveform: u32,
    /// AM depth (OPM 7-bit, OPL 1-bit)
    pub am_depth: u32,
    /// PM depth (OPM 7-bit, OPL 1-bit)
    pub pm_depth: u32,
    /// Hold the counter at zero (OPM test register)
    pub reset: bool,
    /// Noise frequency (OPM, already inverted so larger is slower)
    pub noise_frequency: u32,
}

/// AM in the low byte, PM (signed) in the high byte
fn opm_waveforms() -> &'static [[i16; 3]; 256] {
    OPM_WAVEFORMS.get_or_init(|| {
        let mut table = [[0i16; 3]; 256];
        for (index, entry) in table.iter_mut().enumerate() {
            let index = index as u32;

            let am = index ^ 0xff;
            let pm = index;
            entry[0] = pack_ampm(am, pm);

            let am = if bitfield(index, 7, 1) != 0 { 0 } else { 0xff };
            let pm = am ^ 0x80;
            entry[1] = pack_ampm(am, pm);

            // the triangle AM keeps its 9th bit, which leaks into the PM byte
            let am = if bitfield(index, 7, 1) != 0 { index << 1 } else { (index ^ 0xff) << 1 };
            let pm = if bitfield(index, 6, 1) != 0 { am } else { !am };
            entry[2] = pack_ampm(am, pm);
        }
        table
    })
}

#[inline]
fn pack_ampm(am: u32, pm: u32) -> i16 {
    ((am | (pm << 8)) & 0xffff) as u16 as i16
}

/// OPM 17-bit noise LFSR
#[derive(Debug, Clone, Copy)]
pub struct NoiseGenerator {
    lfsr: u32,
    counter: u32,
    state: u32,
}

impl NoiseGenerator {
    /// Create a generator in its power-on state
    pub fn new() -> Self {
        NoiseGenerator {
            lfsr: 1,
            counter: 0,
            state: 0,
        }
    }

    /// Reset to the power-on state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advance one sample (two LFSR steps)
    pub fn clock(&mut self, frequency: u32) {
        for _ in 0..2 {
            self.lfsr <<= 1;
            self.lfsr |= bitfield(self.lfsr, 17, 1) ^ bitfield(self.lfsr, 14, 1) ^ 1;

            let count = self.counter;
            self.counter += 1;
            if count >= frequency {
                self.counter = 0;
                self.state = bitfield(self.lfsr, 17, 1);
            }
        }
    }

    /// Latched output bit
    #[inline]
    pub fn state(&self) -> bool {
        self.state != 0
    }

    /// Eight most recent LFSR bits, used by the noise LFO waveform
    #[inline]
    fn byte(&self) -> u32 {
        bitfield(self.lfsr, 17, 8)
    }
}

impl Default for NoiseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Chip-wide LFO
#[derive(Debug, Clone)]
pub struct Lfo {
    kind: LfoKind,
    counter: u32,
    pm_counter: u32,
    am: u32,
    pm: i32,
    noise: NoiseGenerator,
    noise_column: [u16; 256],
}

impl Lfo {
    /// Create an LFO of the given variant
    pub fn new(kind: LfoKind) -> Self {
        Lfo {
            kind,
            counter: 0,
            pm_counter: 0,
            am: 0,
            pm: 0,
            noise: NoiseGenerator::new(),
            noise_column: [0; 256],
        }
    }

    /// Reset all counters
    pub fn reset(&mut self) {
        *self = Self::new(self.kind);
    }

    /// Variant in use
    pub fn kind(&self) -> LfoKind {
        self.kind
    }

    /// Advance one sample; returns the raw PM value for this sample
    pub fn clock(&mut self, params: &LfoParams) -> i32 {
        self.pm = match self.kind {
            LfoKind::None => 0,
            LfoKind::Opm => self.clock_opm(params),
            LfoKind::Opn => self.clock_opn(params),
            LfoKind::Opl => self.clock_opl(params.am_depth, params.pm_depth),
            LfoKind::Opll => self.clock_opl(1, 1),
        };
        self.pm
    }

    fn clock_opm(&mut self, params: &LfoParams) -> i32 {
        self.noise.clock(params.noise_frequency);

        let rate = params.rate;
        self.counter = self
            .counter
            .wrapping_add((0x10 | bitfield(rate, 0, 4)) << bitfield(rate, 4, 4));
        if params.reset {
            self.counter = 0;
        }

        let lfo = bitfield(self.counter, 22, 8) as usize;

        // latch the noise one entry ahead so the current value stays stable
        let noise = self.noise.byte();
        self.noise_column[(lfo + 1) & 255] = (noise | (noise << 8)) as u16;

        let waveform = LfoWaveform::from_u32(params.waveform & 3).unwrap_or(LfoWaveform::Saw);
        let ampm = match waveform {
            LfoWaveform::Noise => self.noise_column[lfo] as i16,
            other => opm_waveforms()[lfo][other as usize],
        };

        self.am = ((ampm as i32 & 0xff) as u32 * params.am_depth) >> 7;
        ((ampm as i32) >> 8) * params.pm_depth as i32 >> 7
    }

    fn clock_opn(&mut self, params: &LfoParams) -> i32 {
        if !params.enable {
            // a stopped counter sits at position 0, which reads as full AM
            self.counter = 0;
            self.am = 0x3f;
            return 0;
        }

        let subcount = self.counter & 0xff;
        self.counter += 1;
        if subcount >= OPN_MAX_COUNT[(params.rate & 7) as usize] {
            self.counter += 0x101 - subcount;
        }

        self.am = bitfield(self.counter, 8, 6);
        if bitfield(self.counter, 14, 1) == 0 {
            self.am ^= 0x3f;
        }

        let mut pm = bitfield(self.counter, 10, 3) as i32;
        if bitfield(self.counter, 13, 1) != 0 {
            pm ^= 7;
        }
        if bitfield(self.counter, 14, 1) != 0 {
            -pm
        } else {
            pm
        }
    }

    fn clock_opl(&mut self, am_depth: u32, pm_depth: u32) -> i32 {
        let am_counter = self.counter;
        self.counter += 1;
        if am_counter >= OPL_AM_PERIOD - 1 {
            self.counter = 0;
        }

        let shift = 9 - 2 * (am_depth & 1);
        let triangle = if am_counter < OPL_AM_PERIOD / 2 {
            am_counter
        } else {
            OPL_AM_PERIOD + 63 - am_counter
        };
        self.am = triangle >> shift;

        let pm_counter = self.pm_counter;
        self.pm_counter = self.pm_counter.wrapping_add(1);
        OPL_PM_SCALE[bitfield(pm_counter, 10, 3) as usize] >> ((pm_depth & 1) ^ 1)
    }

    /// Raw AM value from the last clock
    #[inline]
    pub fn am(&self) -> u32 {
        self.am
    }

    /// Raw PM value from the last clock
    #[inline]
    pub fn pm(&self) -> i32 {
        self.pm
    }

    /// AM attenuation offset for a channel's AM sensitivity
    pub fn am_offset(&self, am_sensitivity: u32) -> u32 {
        match self.kind {
            LfoKind::None => 0,
            LfoKind::Opm => {
                if am_sensitivity == 0 {
                    0
                } else {
                    self.am << (am_sensitivity - 1)
                }
            }
            LfoKind::Opn => (self.am << 1) >> ((1 << (am_sensitivity ^ 3)) - 1),
            LfoKind::Opl | LfoKind::Opll => self.am,
        }
    }

    /// Current OPM noise output bit
    #[inline]
    pub fn noise_state(&self) -> bool {
        self.noise.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_stub() {
        let mut lfo = Lfo::new(LfoKind::None);
        let params = LfoParams {
            enable: true,
            rate: 7,
            ..Default::default()
        };
        for _ in 0..1000 {
            assert_eq!(lfo.clock(&params), 0);
            assert_eq!(lfo.am_offset(3), 0);
        }
    }

    #[test]
    fn test_opn_disabled_reads_full_am() {
        let mut lfo = Lfo::new(LfoKind::Opn);
        assert_eq!(lfo.clock(&LfoParams::default()), 0);
        assert_eq!(lfo.am(), 0x3f);
        assert_eq!(lfo.am_offset(3), 0x7e);
        assert_eq!(lfo.am_offset(0), 0);
    }

    #[test]
    fn test_opn_pm_symmetry() {
        let mut lfo = Lfo::new(LfoKind::Opn);
        let params = LfoParams {
            enable: true,
            rate: 7,
            ..Default::default()
        };
        let mut positive = 0;
        let mut negative = 0;
        let mut max_am = 0;
        // rate 7 steps every 7 samples; one PM period is 128 steps
        for _ in 0..(7 * 128) {
            let pm = lfo.clock(&params);
            assert!((-7..=7).contains(&pm));
            positive += (pm > 0) as u32;
            negative += (pm < 0) as u32;
            max_am = max_am.max(lfo.am());
        }
        assert!(positive > 0 && negative > 0);
        assert_eq!(max_am, 0x3f);
    }

    #[test]
    fn test_opl_am_triangle_range() {
        let mut lfo = Lfo::new(LfoKind::Opl);
        let deep = LfoParams {
            am_depth: 1,
            ..Default::default()
        };
        let mut max = 0;
        for _ in 0..OPL_AM_PERIOD {
            lfo.clock(&deep);
            max = max.max(lfo.am());
        }
        assert_eq!(max, (OPL_AM_PERIOD / 2 + 63) >> 7);
        assert_eq!(lfo.am_offset(0), lfo.am());
    }

    #[test]
    fn test_opl_am_period() {
        let mut lfo = Lfo::new(LfoKind::Opl);
        let deep = LfoParams {
            am_depth: 1,
            ..Default::default()
        };
        let first: Vec<u32> = (0..OPL_AM_PERIOD)
            .map(|_| {
                lfo.clock(&deep);
                lfo.am()
            })
            .collect();
        assert_eq!(lfo.counter, 0);
        assert_eq!(first[0], 0);
        assert_eq!(first[(OPL_AM_PERIOD / 2 - 1) as usize], (OPL_AM_PERIOD / 2 - 1) >> 7);
        assert_eq!(first[(OPL_AM_PERIOD / 2) as usize], (OPL_AM_PERIOD / 2 + 63) >> 7);
        assert_eq!(first[(OPL_AM_PERIOD - 1) as usize], 64 >> 7);

        let second: Vec<u32> = (0..OPL_AM_PERIOD)
            .map(|_| {
                lfo.clock(&deep);
                lfo.am()
            })
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_opl_pm_depth() {
        let mut shallow = Lfo::new(LfoKind::Opl);
        let mut deep = Lfo::new(LfoKind::Opl);
        let deep_params = LfoParams {
            pm_depth: 1,
            ..Default::default()
        };
        let mut max_shallow = 0;
        let mut max_deep = 0;
        for _ in 0..8192 {
            max_shallow = max_shallow.max(shallow.clock(&LfoParams::default()));
            max_deep = max_deep.max(deep.clock(&deep_params));
        }
        assert_eq!(max_shallow, 4);
        assert_eq!(max_deep, 8);
    }

    #[test]
    fn test_opm_reset_holds_counter() {
        let mut lfo = Lfo::new(LfoKind::Opm);
        let params = LfoParams {
            rate: 0xff,
            am_depth: 0x7f,
            reset: true,
            ..Default::default()
        };
        for _ in 0..100 {
            lfo.clock(&params);
        }
        // sawtooth at position 0 is full AM
        assert_eq!(lfo.am(), (0xff * 0x7f) >> 7);
    }

    #[test]
    fn test_opm_am_offset_sensitivity() {
        let mut lfo = Lfo::new(LfoKind::Opm);
        let params = LfoParams {
            am_depth: 0x7f,
            reset: true,
            ..Default::default()
        };
        lfo.clock(&params);
        let am = lfo.am();
        assert_eq!(lfo.am_offset(0), 0);
        assert_eq!(lfo.am_offset(1), am);
        assert_eq!(lfo.am_offset(3), am << 2);
    }

    #[test]
    fn test_opm_square_pm_sign() {
        let mut lfo = Lfo::new(LfoKind::Opm);
        let params = LfoParams {
            rate: 0xff,
            waveform: LfoWaveform::Square as u32,
            pm_depth: 0x7f,
            ..Default::default()
        };
        let mut seen_positive = false;
        let mut seen_negative = false;
        for _ in 0..4096 {
            let pm = lfo.clock(&params);
            seen_positive |= pm > 0;
            seen_negative |= pm < 0;
        }
        assert!(seen_positive && seen_negative);
    }

    #[test]
    fn test_opm_noise_waveform_follows_lfsr() {
        let mut lfo = Lfo::new(LfoKind::Opm);
        let mut shadow = NoiseGenerator::new();
        // rate 0xf0 advances the waveform index once every 8 samples
        let params = LfoParams {
            rate: 0xf0,
            waveform: LfoWaveform::Noise as u32,
            am_depth: 0x7f,
            pm_depth: 0x7f,
            ..Default::default()
        };

        let mut history = Vec::new();
        let mut distinct = std::collections::HashSet::new();
        for clock in 1..2048usize {
            let pm = lfo.clock(&params);
            shadow.clock(params.noise_frequency);
            history.push(shadow.byte());

            let index = clock >> 3;
            if index == 0 {
                assert_eq!(lfo.am(), 0);
                continue;
            }
            // the entry was latched on the last sample of the previous index
            let latched = history[8 * index - 2];
            assert_eq!(lfo.am(), (latched * 0x7f) >> 7, "am at sample {clock}");
            assert_eq!(pm, (i32::from(latched as u8 as i8) * 0x7f) >> 7, "pm at sample {clock}");
            distinct.insert(latched);
        }
        assert!(distinct.len() > 16);
    }

    #[test]
    fn test_noise_generator_toggles() {
        let mut noise = NoiseGenerator::new();
        let mut ones = 0;
        for _ in 0..1000 {
            noise.clock(0);
            ones += noise.state() as u32;
        }
        assert!(ones > 100 && ones < 900);
    }
}
