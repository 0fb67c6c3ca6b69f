//! OPN Family Registers (YM2203, YM2608, YM2612, YM3438)
//!
//! Register layout (bank 0; bank 1 mirrors the channel registers at +0x100):
//! - 0x22: LFO enable (bit 3) and rate (bits 0-2)
//! - 0x24/0x25: timer A value (10-bit), 0x26: timer B value
//! - 0x27: channel 2 mode (bits 6-7) and timer control (bits 0-5)
//! - 0x28: key on/off
//! - 0x2A/0x2B: DAC data and enable (YM2612/YM3438)
//! - 0x2D-0x2F: prescaler select (YM2203/YM2608)
//! - 0x30-0x9F: per-operator registers
//! - 0xA0-0xAE: frequencies (high byte latched until the low byte is written)
//! - 0xB0-0xB6: algorithm/feedback and output/sensitivity

use crate::channel::ChannelData;
use crate::envelope::{sustain_attenuation, EnvelopeParams};
use crate::family::{Family, FamilyConfig, Features};
use crate::lfo::LfoParams;
use crate::mixer::OutputRouting;
use crate::operator::OperatorData;
use crate::phase::PhaseParams;
use crate::tables::{bitfield, detune_adjustment};
use crate::timer::TimerParams;

use super::{envelope_rates, RegisterMap, WriteEffect};

const REGISTER_COUNT: usize = 0x200;

/// Raw register storage plus the frequency latches
#[derive(Debug, Clone)]
pub struct OpnRegisters {
    config: FamilyConfig,
    regs: Vec<u8>,
    /// Frequency high-byte latches per bank: [channel group, multi-frequency group]
    fnum_latch: [[u8; 2]; 2],
    prescale: u32,
    default_prescale: u32,
}

impl OpnRegisters {
    /// Create a register file for an OPN-family chip
    pub fn new(config: FamilyConfig, prescale: u32) -> Self {
        OpnRegisters {
            config,
            regs: vec![0; REGISTER_COUNT],
            fnum_latch: [[0; 2]; 2],
            prescale,
            default_prescale: prescale,
        }
    }

    #[inline]
    fn byte(&self, index: usize) -> u32 {
        u32::from(self.regs[index])
    }

    /// Register offset of an operator
    fn operator_offset(operator: usize) -> usize {
        let op = operator % 12;
        op + op / 3 + 0x100 * (operator / 12)
    }

    /// Register offset of a channel
    fn channel_offset(channel: usize) -> usize {
        channel % 3 + 0x100 * (channel / 3)
    }

    /// Channel 2 per-operator frequency mode enabled
    pub fn multi_freq(&self) -> bool {
        self.config.features.contains(Features::MULTI_FREQ) && bitfield(self.byte(0x27), 6, 2) != 0
    }

    /// Current prescale as selected by 0x2D-0x2F writes
    pub fn prescale(&self) -> u32 {
        self.prescale
    }

    fn has_lfo(&self) -> bool {
        self.config.features.contains(Features::LFO)
    }

    fn block_freq(&self, channel: usize, operator: usize) -> u32 {
        let choffs = Self::channel_offset(channel);

        if channel == 2 && self.multi_freq() {
            // OP1-OP3 each take a frequency from the 0xA8-0xAE group; OP4 uses the channel's
            let slot = self
                .channel_operators(channel)
                .iter()
                .position(|&op| op == operator)
                .unwrap_or(3);
            let multi = match slot {
                0 => Some(1),
                1 => Some(2),
                2 => Some(0),
                _ => None,
            };
            if let Some(multi) = multi {
                return (bitfield(self.byte(0xac + multi), 0, 6) << 8) | self.byte(0xa8 + multi);
            }
        }

        (bitfield(self.byte(0xa4 + choffs), 0, 6) << 8) | self.byte(0xa0 + choffs)
    }
}

/// OPN key code: block plus a rounded version of the top fnum bits
#[inline]
fn opn_keycode(block_freq: u32) -> u32 {
    (bitfield(block_freq, 10, 4) << 1) | bitfield(0xfe80, bitfield(block_freq, 7, 4), 1)
}

impl RegisterMap for OpnRegisters {
    fn reset(&mut self) {
        self.regs.fill(0);
        self.fnum_latch = [[0; 2]; 2];
        self.prescale = self.default_prescale;
        // outputs default to both sides on
        for bank in 0..2 {
            for channel in 0..3 {
                self.regs[0xb4 + channel + 0x100 * bank] = 0xc0;
            }
        }
    }

    fn write(&mut self, index: u16, data: u8) -> WriteEffect {
        let index = index as usize;
        if index >= REGISTER_COUNT {
            return WriteEffect::None;
        }
        let bank = index >> 8;
        let local = index & 0xff;

        // frequency high bytes only take effect when the low byte is written
        if (0xa4..=0xae).contains(&local) && (local & 3) != 3 && local & 4 != 0 {
            self.fnum_latch[bank][bitfield(local as u32, 3, 1) as usize] = data;
            return WriteEffect::None;
        }
        if (0xa0..=0xaa).contains(&local) && (local & 3) != 3 && local & 4 == 0 {
            self.regs[index] = data;
            self.regs[index + 4] = self.fnum_latch[bank][bitfield(local as u32, 3, 1) as usize];
            return WriteEffect::None;
        }

        self.regs[index] = data;
        if bank != 0 {
            return WriteEffect::None;
        }

        match local {
            0x27 => WriteEffect::TimerControl,
            0x28 => {
                let mut channel = bitfield(u32::from(data), 0, 2) as usize;
                if channel == 3 {
                    return WriteEffect::None;
                }
                if self.config.channels > 3 && bitfield(u32::from(data), 2, 1) != 0 {
                    channel += 3;
                }
                if channel >= self.config.channels {
                    return WriteEffect::None;
                }
                WriteEffect::KeyOn {
                    channel,
                    opmask: (data >> 4) & 0xf,
                }
            }
            0x2d..=0x2f if self.config.features.contains(Features::PRESCALE_WRITES) => {
                let next = match local {
                    0x2d => Some(6),
                    0x2e if self.prescale == 6 => Some(3),
                    0x2f => Some(2),
                    _ => None,
                };
                match next {
                    Some(prescale) => {
                        self.prescale = prescale;
                        WriteEffect::Prescale(prescale)
                    }
                    None => WriteEffect::None,
                }
            }
            _ => WriteEffect::None,
        }
    }

    fn read(&self, index: u16) -> u8 {
        self.regs.get(index as usize).copied().unwrap_or(0)
    }

    fn channel_data(&self, channel: usize) -> ChannelData {
        let choffs = Self::channel_offset(channel);
        let b0 = self.byte(0xb0 + choffs);
        let b4 = self.byte(0xb4 + choffs);

        let routing = if self.config.outputs == 1 {
            OutputRouting::OUT0
        } else {
            let mut routing = OutputRouting::empty();
            routing.set(OutputRouting::OUT0, bitfield(b4, 7, 1) != 0);
            routing.set(OutputRouting::OUT1, bitfield(b4, 6, 1) != 0);
            routing
        };

        ChannelData {
            algorithm: bitfield(b0, 0, 3),
            feedback: bitfield(b0, 3, 3),
            routing,
            am_sensitivity: if self.has_lfo() { bitfield(b4, 4, 2) } else { 0 },
        }
    }

    fn operator_data(&self, channel: usize, operator: usize) -> OperatorData {
        let opoffs = Self::operator_offset(operator);
        let choffs = Self::channel_offset(channel);

        let block_freq = self.block_freq(channel, operator);
        let keycode = opn_keycode(block_freq);

        let dt_mul = self.byte(0x30 + opoffs);
        let multiple = bitfield(dt_mul, 0, 4);
        let phase = PhaseParams {
            block_freq,
            detune: detune_adjustment(bitfield(dt_mul, 4, 3), keycode),
            detune2: 0,
            multiple: if multiple == 0 { 1 } else { multiple * 2 },
            pm_sensitivity: if self.has_lfo() { bitfield(self.byte(0xb4 + choffs), 0, 3) } else { 0 },
        };

        let ks_ar = self.byte(0x50 + opoffs);
        let am_dr = self.byte(0x60 + opoffs);
        let sl_rr = self.byte(0x80 + opoffs);
        let ksrval = keycode >> (bitfield(ks_ar, 6, 2) ^ 3);

        let envelope = EnvelopeParams {
            rates: envelope_rates(
                bitfield(ks_ar, 0, 5) * 2,
                bitfield(am_dr, 0, 5) * 2,
                bitfield(self.byte(0x70 + opoffs), 0, 5) * 2,
                bitfield(sl_rr, 0, 4) * 4 + 2,
                0,
                ksrval,
            ),
            sustain: sustain_attenuation(bitfield(sl_rr, 4, 4)),
            total_level: bitfield(self.byte(0x40 + opoffs), 0, 7) << 3,
            ssg_eg: if self.config.features.contains(Features::SSG_EG) {
                bitfield(self.byte(0x90 + opoffs), 0, 4)
            } else {
                0
            },
            damp: false,
        };

        OperatorData {
            phase,
            envelope,
            waveform: 0,
            am_enable: self.has_lfo() && bitfield(am_dr, 7, 1) != 0,
            phase_step: 0,
        }
    }

    fn lfo_params(&self) -> LfoParams {
        let lfo = self.byte(0x22);
        LfoParams {
            enable: self.has_lfo() && bitfield(lfo, 3, 1) != 0,
            rate: bitfield(lfo, 0, 3),
            ..Default::default()
        }
    }

    fn timer_params(&self) -> TimerParams {
        let mode = self.byte(0x27);
        TimerParams {
            a_value: (self.byte(0x24) << 2) | bitfield(self.byte(0x25), 0, 2),
            b_value: self.byte(0x26),
            load_a: bitfield(mode, 0, 1) != 0,
            load_b: bitfield(mode, 1, 1) != 0,
            enable_a: bitfield(mode, 2, 1) != 0,
            enable_b: bitfield(mode, 3, 1) != 0,
            reset_a: bitfield(mode, 4, 1) != 0,
            reset_b: bitfield(mode, 5, 1) != 0,
            csm: self.config.features.contains(Features::CSM) && bitfield(mode, 6, 2) == 2,
        }
    }

    fn channel_operators(&self, channel: usize) -> Vec<usize> {
        if channel >= self.config.channels {
            return Vec::new();
        }
        let base = channel % 3 + 12 * (channel / 3);
        vec![base, base + 6, base + 3, base + 9]
    }

    fn dac(&self) -> Option<i32> {
        if self.config.family != Family::Opn2 && self.config.family != Family::Opn2c {
            return None;
        }
        if bitfield(self.byte(0x2b), 7, 1) == 0 {
            return None;
        }
        Some((self.byte(0x2a) as i32 - 0x80) << 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::{OPN, OPN2, OPNA};

    fn opn2() -> OpnRegisters {
        let mut regs = OpnRegisters::new(OPN2, 6);
        regs.reset();
        regs
    }

    #[test]
    fn test_operator_offsets() {
        let offsets: Vec<usize> = (0..12).map(OpnRegisters::operator_offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, 4, 5, 6, 8, 9, 10, 12, 13, 14]);
        assert_eq!(OpnRegisters::operator_offset(12), 0x100);
    }

    #[test]
    fn test_channel_operator_order() {
        let regs = opn2();
        // OP1..OP4 live at register offsets +0, +8, +4, +12
        let offsets: Vec<usize> = regs
            .channel_operators(0)
            .into_iter()
            .map(OpnRegisters::operator_offset)
            .collect();
        assert_eq!(offsets, vec![0, 8, 4, 12]);
        assert_eq!(regs.channel_operators(4), vec![13, 19, 16, 22]);
    }

    #[test]
    fn test_fnum_high_byte_latched() {
        let mut regs = opn2();
        regs.write(0xa4, 0x22);
        assert_eq!(regs.operator_data(0, 0).phase.block_freq, 0);
        regs.write(0xa0, 0x69);
        assert_eq!(regs.operator_data(0, 0).phase.block_freq, 0x2269);
    }

    #[test]
    fn test_latch_per_bank() {
        let mut regs = opn2();
        regs.write(0x1a5, 0x11);
        regs.write(0xa5, 0x22);
        regs.write(0x1a1, 0x01);
        assert_eq!(regs.read(0x1a5), 0x11);
        assert_eq!(regs.read(0xa5), 0);
    }

    #[test]
    fn test_keyon_channel_decode() {
        let mut regs = opn2();
        assert_eq!(
            regs.write(0x28, 0xf5),
            WriteEffect::KeyOn { channel: 4, opmask: 0xf }
        );
        assert_eq!(regs.write(0x28, 0x13), WriteEffect::None);

        // the YM2203 has no upper channel bank
        let mut opn = OpnRegisters::new(OPN, 6);
        assert_eq!(opn.write(0x28, 0x16), WriteEffect::KeyOn { channel: 2, opmask: 1 });
    }

    #[test]
    fn test_multi_frequency_mode() {
        let mut regs = opn2();
        regs.write(0xa6, 0x10);
        regs.write(0xa2, 0x40);
        regs.write(0xad, 0x20);
        regs.write(0xa9, 0x80);
        let ops = regs.channel_operators(2);

        assert_eq!(regs.operator_data(2, ops[0]).phase.block_freq, 0x1040);
        regs.write(0x27, 0x40);
        assert_eq!(regs.operator_data(2, ops[0]).phase.block_freq, 0x2080);
        assert_eq!(regs.operator_data(2, ops[3]).phase.block_freq, 0x1040);
    }

    #[test]
    fn test_rates_and_levels() {
        let mut regs = opn2();
        regs.write(0x40, 0x10);
        regs.write(0x50, 0x1f);
        regs.write(0x80, 0x3a);
        let data = regs.operator_data(0, 0);
        assert_eq!(data.envelope.total_level, 0x80);
        // KS 0 still adds keycode >> 3, which is 0 at zero frequency
        assert_eq!(data.envelope.rates[crate::envelope::EnvelopeState::Attack.index()], 62);
        assert_eq!(data.envelope.rates[crate::envelope::EnvelopeState::Release.index()], 42);
        assert_eq!(data.envelope.sustain, 3 << 5);
        assert_eq!(data.phase.multiple, 1);
    }

    #[test]
    fn test_output_routing() {
        let mut regs = opn2();
        assert_eq!(regs.channel_data(0).routing, OutputRouting::OUT0 | OutputRouting::OUT1);
        regs.write(0xb4, 0x80);
        assert_eq!(regs.channel_data(0).routing, OutputRouting::OUT0);
        let opn = OpnRegisters::new(OPN, 6);
        assert_eq!(opn.channel_data(0).routing, OutputRouting::OUT0);
    }

    #[test]
    fn test_prescale_writes() {
        let mut regs = OpnRegisters::new(OPNA, 6);
        assert_eq!(regs.write(0x2e, 0), WriteEffect::Prescale(3));
        // 0x2E only applies straight after 0x2D
        assert_eq!(regs.write(0x2e, 0), WriteEffect::None);
        assert_eq!(regs.write(0x2f, 0), WriteEffect::Prescale(2));
        assert_eq!(regs.write(0x2d, 0), WriteEffect::Prescale(6));
        assert_eq!(opn2().write(0x2f, 0), WriteEffect::None);
    }

    #[test]
    fn test_dac() {
        let mut regs = opn2();
        regs.write(0x2a, 0xc0);
        assert_eq!(regs.dac(), None);
        regs.write(0x2b, 0x80);
        assert_eq!(regs.dac(), Some(0x80));
        let opna = OpnRegisters::new(OPNA, 6);
        assert_eq!(opna.dac(), None);
    }

    #[test]
    fn test_csm_mode() {
        let mut regs = opn2();
        regs.write(0x27, 0x80);
        assert!(regs.timer_params().csm);
        regs.write(0x27, 0x40);
        assert!(!regs.timer_params().csm);
        assert!(regs.multi_freq());
    }
}
