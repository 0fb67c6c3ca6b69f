//! OPL Family Registers (YM3526, YM3812, YMF262)
//!
//! Register layout (bank 0; the YMF262 mirrors the operator and channel
//! registers at +0x100):
//! - 0x01: waveform select enable (bit 5, YM3812)
//! - 0x02: timer A value (4-sample units), 0x03: timer B value
//! - 0x04: IRQ reset (bit 7), timer masks (bits 5-6), timer loads (bits 0-1)
//! - 0x08: CSM (bit 7) and note select (bit 6)
//! - 0x20-0x95: per-operator registers
//! - 0xA0-0xB8: frequency and key-on
//! - 0xBD: AM/PM depth
//! - 0xC0-0xC8: outputs, feedback and connection
//! - 0xE0-0xF5: waveform select
//! - 0x104: 4-operator pairing (YMF262)
//! - 0x105: OPL3 mode enable (YMF262)

use crate::channel::ChannelData;
use crate::envelope::{sustain_attenuation, EnvelopeParams};
use crate::family::{Family, Features};
use crate::lfo::LfoParams;
use crate::mixer::OutputRouting;
use crate::operator::OperatorData;
use crate::phase::PhaseParams;
use crate::tables::{bitfield, opl_key_scale_atten};
use crate::timer::TimerParams;

use super::{envelope_rates, RegisterMap, WriteEffect, OPL_MULTIPLE};

const REGISTER_COUNT: usize = 0x200;

/// Status bits cleared by the IRQ reset bit
const IRQ_RESET_MASK: u8 = 0x78;

/// 4-operator primary channels, one per bit of register 0x104
const FOUR_OP_PRIMARY: [usize; 6] = [0, 1, 2, 9, 10, 11];

/// Raw register storage
#[derive(Debug, Clone)]
pub struct OplRegisters {
    family: Family,
    channels: usize,
    waveforms: usize,
    regs: Vec<u8>,
}

impl OplRegisters {
    /// Create a cleared register file
    pub fn new(family: Family) -> Self {
        let config = family.config();
        OplRegisters {
            family,
            channels: config.channels,
            waveforms: config.waveforms,
            regs: vec![0; REGISTER_COUNT],
        }
    }

    #[inline]
    fn byte(&self, index: usize) -> u32 {
        u32::from(self.regs[index])
    }

    fn is_opl3(&self) -> bool {
        self.family == Family::Opl3
    }

    /// OPL3 mode enabled (register 0x105 bit 0)
    pub fn new_mode(&self) -> bool {
        self.is_opl3() && bitfield(self.byte(0x105), 0, 1) != 0
    }

    /// Register offset of an operator
    fn operator_offset(operator: usize) -> usize {
        let op = operator % 18;
        op + 2 * (op / 6) + 0x100 * (operator / 18)
    }

    /// Register offset of a channel
    fn channel_offset(channel: usize) -> usize {
        channel % 9 + 0x100 * (channel / 9)
    }

    /// First operator of a 2-op channel
    fn first_operator(channel: usize) -> usize {
        let local = channel % 9;
        local % 3 + 6 * (local / 3) + 18 * (channel / 9)
    }

    /// Whether a primary channel is paired with channel + 3
    fn four_op_primary(&self, channel: usize) -> bool {
        self.new_mode()
            && FOUR_OP_PRIMARY
                .iter()
                .position(|&primary| primary == channel)
                .is_some_and(|bit| bitfield(self.byte(0x104), bit as u32, 1) != 0)
    }

    /// Whether a channel is the inactive half of a 4-op pair
    fn four_op_secondary(&self, channel: usize) -> bool {
        channel >= 3 && self.four_op_primary(channel - 3)
    }

    fn block_freq(&self, channel: usize) -> u32 {
        let choffs = Self::channel_offset(channel);
        (bitfield(self.byte(0xb0 + choffs), 0, 5) << 8) | self.byte(0xa0 + choffs)
    }

    fn waveform(&self, opoffs: usize) -> usize {
        let select = self.byte(0xe0 + opoffs);
        let select = if self.is_opl3() {
            if self.new_mode() {
                bitfield(select, 0, 3)
            } else {
                bitfield(select, 0, 2)
            }
        } else if self.waveforms > 1 && bitfield(self.byte(0x01), 5, 1) != 0 {
            bitfield(select, 0, 2)
        } else {
            0
        };
        (select as usize).min(self.waveforms - 1)
    }
}

/// Reverse the 2-bit KSL field into a shift amount (0 disables)
#[inline]
pub(crate) fn ksl_shift(ksl: u32) -> u32 {
    bitfield(ksl, 1, 1) | (bitfield(ksl, 0, 1) << 1)
}

impl RegisterMap for OplRegisters {
    fn reset(&mut self) {
        self.regs.fill(0);
        // left and right outputs on for OPL3 compatibility mode
        for channel in 0..self.channels {
            self.regs[0xc0 + Self::channel_offset(channel)] = 0x30;
        }
    }

    fn write(&mut self, index: u16, data: u8) -> WriteEffect {
        let index = index as usize;
        if index >= REGISTER_COUNT {
            return WriteEffect::None;
        }
        let bank = index >> 8;
        let local = index & 0xff;

        if bank == 0 && local == 0x04 && bitfield(u32::from(data), 7, 1) != 0 {
            return WriteEffect::StatusReset(IRQ_RESET_MASK);
        }

        self.regs[index] = data;

        if bank == 1 && self.is_opl3() && (local == 0x04 || local == 0x05) {
            return WriteEffect::Layout;
        }

        if (0xb0..=0xb8).contains(&local) {
            let channel = (local - 0xb0) + 9 * bank;
            if channel >= self.channels {
                return WriteEffect::None;
            }
            let opmask = if bitfield(u32::from(data), 5, 1) != 0 { 0xf } else { 0 };
            return WriteEffect::KeyOn { channel, opmask };
        }

        if bank == 0 && local == 0x04 {
            return WriteEffect::TimerControl;
        }
        WriteEffect::None
    }

    fn read(&self, index: u16) -> u8 {
        self.regs.get(index as usize).copied().unwrap_or(0)
    }

    fn channel_data(&self, channel: usize) -> ChannelData {
        let choffs = Self::channel_offset(channel);
        let c0 = self.byte(0xc0 + choffs);

        let routing = if self.is_opl3() {
            if self.new_mode() {
                OutputRouting::from_bits_truncate(bitfield(c0, 4, 4) as u8)
            } else {
                OutputRouting::OUT0 | OutputRouting::OUT1
            }
        } else {
            OutputRouting::OUT0
        };

        let algorithm = if self.four_op_primary(channel) {
            let secondary = self.byte(0xc0 + Self::channel_offset(channel + 3));
            8 | (bitfield(secondary, 0, 1) << 1) | bitfield(c0, 0, 1)
        } else {
            bitfield(c0, 0, 1)
        };

        ChannelData {
            algorithm,
            feedback: bitfield(c0, 1, 3),
            routing,
            am_sensitivity: 0,
        }
    }

    fn operator_data(&self, channel: usize, operator: usize) -> OperatorData {
        let opoffs = Self::operator_offset(operator);
        let block_freq = self.block_freq(channel);

        let nts = bitfield(self.byte(0x08), 6, 1);
        let keycode = (bitfield(block_freq, 10, 3) << 1) | bitfield(block_freq, 9 - nts, 1);

        let flags = self.byte(0x20 + opoffs);
        let ksl_tl = self.byte(0x40 + opoffs);
        let ar_dr = self.byte(0x60 + opoffs);
        let sl_rr = self.byte(0x80 + opoffs);

        let phase = PhaseParams {
            block_freq,
            detune: 0,
            detune2: 0,
            multiple: OPL_MULTIPLE[bitfield(flags, 0, 4) as usize],
            pm_sensitivity: bitfield(flags, 6, 1),
        };

        let ksrval = keycode >> (2 * (bitfield(flags, 4, 1) ^ 1));
        let release = bitfield(sl_rr, 0, 4) * 4;
        let sustained = bitfield(flags, 5, 1) != 0;

        let mut total_level = bitfield(ksl_tl, 0, 6) << 3;
        let ksl = ksl_shift(bitfield(ksl_tl, 6, 2));
        if ksl != 0 {
            total_level += opl_key_scale_atten(bitfield(block_freq, 10, 3), bitfield(block_freq, 6, 4)) << ksl;
        }

        let envelope = EnvelopeParams {
            rates: envelope_rates(
                bitfield(ar_dr, 4, 4) * 4,
                bitfield(ar_dr, 0, 4) * 4,
                if sustained { 0 } else { release },
                release,
                0,
                ksrval,
            ),
            sustain: sustain_attenuation(bitfield(sl_rr, 4, 4)),
            total_level,
            ssg_eg: 0,
            damp: false,
        };

        OperatorData {
            phase,
            envelope,
            waveform: self.waveform(opoffs),
            am_enable: bitfield(flags, 7, 1) != 0,
            phase_step: 0,
        }
    }

    fn lfo_params(&self) -> LfoParams {
        let depth = self.byte(0xbd);
        LfoParams {
            enable: true,
            am_depth: bitfield(depth, 7, 1),
            pm_depth: bitfield(depth, 6, 1),
            ..Default::default()
        }
    }

    fn timer_params(&self) -> TimerParams {
        let control = self.byte(0x04);
        TimerParams {
            a_value: self.byte(0x02) * 4,
            b_value: self.byte(0x03),
            load_a: bitfield(control, 0, 1) != 0,
            load_b: bitfield(control, 1, 1) != 0,
            enable_a: bitfield(control, 6, 1) == 0,
            enable_b: bitfield(control, 5, 1) == 0,
            reset_a: false,
            reset_b: false,
            csm: self.family.config().has(Features::CSM) && bitfield(self.byte(0x08), 7, 1) != 0,
        }
    }

    fn channel_operators(&self, channel: usize) -> Vec<usize> {
        if channel >= self.channels || self.four_op_secondary(channel) {
            return Vec::new();
        }
        let first = Self::first_operator(channel);
        if self.four_op_primary(channel) {
            let paired = Self::first_operator(channel + 3);
            vec![first, first + 3, paired, paired + 3]
        } else {
            vec![first, first + 3]
        }
    }
}
