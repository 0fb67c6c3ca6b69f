//! OPM Registers (YM2151)
//!
//! Register layout:
//! - 0x01: test register (bit 1 holds the LFO in reset)
//! - 0x08: key on/off
//! - 0x0F: noise enable (bit 7) and frequency (bits 0-4)
//! - 0x10/0x11: timer A value, 0x12: timer B value
//! - 0x14: CSM (bit 7) and timer control (bits 0-5)
//! - 0x18: LFO rate
//! - 0x19: AM depth, or PM depth when bit 7 is set
//! - 0x1B: LFO waveform (bits 0-1)
//! - 0x20-0x3F: per-channel routing/algorithm, key code, key fraction, sensitivity
//! - 0x40-0xFF: per-operator registers

use crate::channel::ChannelData;
use crate::envelope::{sustain_attenuation, EnvelopeParams};
use crate::lfo::LfoParams;
use crate::mixer::OutputRouting;
use crate::operator::OperatorData;
use crate::phase::PhaseParams;
use crate::tables::{bitfield, detune_adjustment};
use crate::timer::TimerParams;

use super::{envelope_rates, RegisterMap, WriteEffect};

const REGISTER_COUNT: usize = 0x100;
const CHANNELS: usize = 8;

/// Channel whose last operator can be replaced by noise
const NOISE_CHANNEL: usize = 7;

/// Raw register storage plus the separately latched PM depth
#[derive(Debug, Clone)]
pub struct OpmRegisters {
    regs: Vec<u8>,
    /// PM depth shares address 0x19 with the AM depth
    pm_depth: u8,
}

impl OpmRegisters {
    /// Create a cleared register file
    pub fn new() -> Self {
        OpmRegisters {
            regs: vec![0; REGISTER_COUNT],
            pm_depth: 0,
        }
    }

    #[inline]
    fn byte(&self, index: usize) -> u32 {
        u32::from(self.regs[index])
    }

    fn block_freq(&self, channel: usize) -> u32 {
        (bitfield(self.byte(0x28 + channel), 0, 7) << 6) | bitfield(self.byte(0x30 + channel), 2, 6)
    }
}

impl Default for OpmRegisters {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterMap for OpmRegisters {
    fn reset(&mut self) {
        self.regs.fill(0);
        self.pm_depth = 0;
        // both outputs enabled on every channel
        for channel in 0..CHANNELS {
            self.regs[0x20 + channel] = 0xc0;
        }
    }

    fn write(&mut self, index: u16, data: u8) -> WriteEffect {
        let index = index as usize;
        if index >= REGISTER_COUNT {
            return WriteEffect::None;
        }

        if index == 0x19 && bitfield(u32::from(data), 7, 1) != 0 {
            self.pm_depth = data & 0x7f;
            return WriteEffect::None;
        }

        self.regs[index] = data;
        match index {
            0x08 => WriteEffect::KeyOn {
                channel: bitfield(u32::from(data), 0, 3) as usize,
                opmask: (data >> 3) & 0xf,
            },
            0x14 => WriteEffect::TimerControl,
            _ => WriteEffect::None,
        }
    }

    fn read(&self, index: u16) -> u8 {
        self.regs.get(index as usize).copied().unwrap_or(0)
    }

    fn channel_data(&self, channel: usize) -> ChannelData {
        let control = self.byte(0x20 + channel);
        let mut routing = OutputRouting::empty();
        routing.set(OutputRouting::OUT0, bitfield(control, 6, 1) != 0);
        routing.set(OutputRouting::OUT1, bitfield(control, 7, 1) != 0);

        ChannelData {
            algorithm: bitfield(control, 0, 3),
            feedback: bitfield(control, 3, 3),
            routing,
            am_sensitivity: bitfield(self.byte(0x38 + channel), 0, 2),
        }
    }

    fn operator_data(&self, channel: usize, operator: usize) -> OperatorData {
        let block_freq = self.block_freq(channel);
        let keycode = bitfield(block_freq, 8, 5);

        let dt1_mul = self.byte(0x40 + operator);
        let ks_ar = self.byte(0x80 + operator);
        let amen_d1r = self.byte(0xa0 + operator);
        let dt2_d2r = self.byte(0xc0 + operator);
        let d1l_rr = self.byte(0xe0 + operator);

        let multiple = bitfield(dt1_mul, 0, 4);
        let phase = PhaseParams {
            block_freq,
            detune: detune_adjustment(bitfield(dt1_mul, 4, 3), keycode),
            detune2: bitfield(dt2_d2r, 6, 2),
            multiple: if multiple == 0 { 1 } else { multiple * 2 },
            pm_sensitivity: bitfield(self.byte(0x38 + channel), 4, 3),
        };

        let ksrval = keycode >> (bitfield(ks_ar, 6, 2) ^ 3);
        let envelope = EnvelopeParams {
            rates: envelope_rates(
                bitfield(ks_ar, 0, 5) * 2,
                bitfield(amen_d1r, 0, 5) * 2,
                bitfield(dt2_d2r, 0, 5) * 2,
                bitfield(d1l_rr, 0, 4) * 4 + 2,
                0,
                ksrval,
            ),
            sustain: sustain_attenuation(bitfield(d1l_rr, 4, 4)),
            total_level: bitfield(self.byte(0x60 + operator), 0, 7) << 3,
            ssg_eg: 0,
            damp: false,
        };

        OperatorData {
            phase,
            envelope,
            waveform: 0,
            am_enable: bitfield(amen_d1r, 7, 1) != 0,
            phase_step: 0,
        }
    }

    fn lfo_params(&self) -> LfoParams {
        LfoParams {
            enable: true,
            rate: self.byte(0x18),
            waveform: bitfield(self.byte(0x1b), 0, 2),
            am_depth: bitfield(self.byte(0x19), 0, 7),
            pm_depth: u32::from(self.pm_depth),
            reset: bitfield(self.byte(0x01), 1, 1) != 0,
            noise_frequency: bitfield(self.byte(0x0f), 0, 5) ^ 0x1f,
        }
    }

    fn timer_params(&self) -> TimerParams {
        let control = self.byte(0x14);
        TimerParams {
            a_value: (self.byte(0x10) << 2) | bitfield(self.byte(0x11), 0, 2),
            b_value: self.byte(0x12),
            load_a: bitfield(control, 0, 1) != 0,
            load_b: bitfield(control, 1, 1) != 0,
            enable_a: bitfield(control, 2, 1) != 0,
            enable_b: bitfield(control, 3, 1) != 0,
            reset_a: bitfield(control, 4, 1) != 0,
            reset_b: bitfield(control, 5, 1) != 0,
            csm: bitfield(control, 7, 1) != 0,
        }
    }

    fn channel_operators(&self, channel: usize) -> Vec<usize> {
        if channel >= CHANNELS {
            return Vec::new();
        }
        vec![channel, channel + 16, channel + 8, channel + 24]
    }

    fn noise_channel(&self) -> Option<usize> {
        if bitfield(self.byte(0x0f), 7, 1) != 0 {
            Some(NOISE_CHANNEL)
        } else {
            None
        }
    }
}
