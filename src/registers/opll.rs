//! OPLL Registers (YM2413)
//!
//! Register layout:
//! - 0x00-0x07: user instrument definition
//! - 0x0E: rhythm control (stored, not emulated)
//! - 0x10-0x18: fnum low byte
//! - 0x20-0x28: sustain (bit 5), key (bit 4), block (bits 1-3), fnum high (bit 0)
//! - 0x30-0x38: instrument (bits 4-7) and volume (bits 0-3)
//!
//! Instrument bytes (modulator/carrier pairs where doubled):
//! - 0/1: AM, vibrato, sustained EG, KSR, multiple
//! - 2: modulator KSL and total level
//! - 3: carrier KSL, carrier/modulator half-sine, feedback
//! - 4/5: attack and decay rates
//! - 6/7: sustain level and release rate

use crate::channel::ChannelData;
use crate::config::{OPLL_INSTRUMENT_BYTES, OPLL_PRESETS};
use crate::envelope::{sustain_attenuation, EnvelopeParams};
use crate::lfo::LfoParams;
use crate::mixer::OutputRouting;
use crate::operator::OperatorData;
use crate::phase::PhaseParams;
use crate::tables::{bitfield, opl_key_scale_atten};
use crate::timer::TimerParams;

use super::opl::ksl_shift;
use super::{envelope_rates, RegisterMap, WriteEffect, OPL_MULTIPLE};

const REGISTER_COUNT: usize = 0x40;
const CHANNELS: usize = 9;

/// Release rate used while the channel's sustain bit is set
const SUSTAIN_RELEASE_RATE: u32 = 5 * 4;

/// Release rate for percussive tones without the sustain bit
const PERCUSSIVE_RELEASE_RATE: u32 = 7 * 4;

/// Damp rate applied before each attack
const DAMP_RATE: u32 = 12 * 4;

type Instrument = [u8; OPLL_INSTRUMENT_BYTES];

/// Raw register storage plus the host-supplied preset table
#[derive(Debug, Clone)]
pub struct OpllRegisters {
    regs: Vec<u8>,
    presets: Vec<Instrument>,
}

impl OpllRegisters {
    /// Create a register file; missing presets read as silent zeros
    pub fn new(presets: Option<Vec<Instrument>>) -> Self {
        let mut presets = presets.unwrap_or_default();
        presets.resize(OPLL_PRESETS, [0; OPLL_INSTRUMENT_BYTES]);
        OpllRegisters {
            regs: vec![0; REGISTER_COUNT],
            presets,
        }
    }

    #[inline]
    fn byte(&self, index: usize) -> u32 {
        u32::from(self.regs[index])
    }

    fn block_freq(&self, channel: usize) -> u32 {
        (bitfield(self.byte(0x20 + channel), 0, 4) << 8) | self.byte(0x10 + channel)
    }

    /// Instrument bytes currently selected by a channel
    pub fn instrument(&self, channel: usize) -> Instrument {
        let select = bitfield(self.byte(0x30 + channel), 4, 4) as usize;
        if select == 0 {
            let mut user = [0; OPLL_INSTRUMENT_BYTES];
            user.copy_from_slice(&self.regs[..OPLL_INSTRUMENT_BYTES]);
            user
        } else {
            self.presets[select - 1]
        }
    }
}

impl RegisterMap for OpllRegisters {
    fn reset(&mut self) {
        self.regs.fill(0);
    }

    fn write(&mut self, index: u16, data: u8) -> WriteEffect {
        let index = index as usize;
        if index >= REGISTER_COUNT {
            return WriteEffect::None;
        }
        self.regs[index] = data;

        if (0x20..0x20 + CHANNELS).contains(&index) {
            let opmask = if bitfield(u32::from(data), 4, 1) != 0 { 0x3 } else { 0 };
            return WriteEffect::KeyOn {
                channel: index - 0x20,
                opmask,
            };
        }
        WriteEffect::None
    }

    fn read(&self, index: u16) -> u8 {
        self.regs.get(index as usize).copied().unwrap_or(0)
    }

    fn channel_data(&self, channel: usize) -> ChannelData {
        let instrument = self.instrument(channel);
        ChannelData {
            algorithm: 0,
            feedback: bitfield(u32::from(instrument[3]), 0, 3),
            routing: OutputRouting::OUT0,
            am_sensitivity: 0,
        }
    }

    fn operator_data(&self, channel: usize, operator: usize) -> OperatorData {
        let instrument = self.instrument(channel);
        let slot = operator % 2;
        let carrier = slot == 1;
        let byte = |index: usize| u32::from(instrument[index]);

        let block_freq = self.block_freq(channel);
        let keycode = bitfield(block_freq, 8, 4);
        let flags = byte(slot);

        let phase = PhaseParams {
            block_freq,
            detune: 0,
            detune2: 0,
            multiple: OPL_MULTIPLE[bitfield(flags, 0, 4) as usize],
            pm_sensitivity: bitfield(flags, 6, 1),
        };

        let (level, ksl) = if carrier {
            (bitfield(self.byte(0x30 + channel), 0, 4) * 4, bitfield(byte(3), 6, 2))
        } else {
            (bitfield(byte(2), 0, 6), bitfield(byte(2), 6, 2))
        };
        let mut total_level = level << 3;
        let ksl = ksl_shift(ksl);
        if ksl != 0 {
            total_level += opl_key_scale_atten(bitfield(block_freq, 9, 3), bitfield(block_freq, 5, 4)) << ksl;
        }

        let ksrval = keycode >> (2 * (bitfield(flags, 4, 1) ^ 1));
        let ar_dr = byte(4 + slot);
        let sl_rr = byte(6 + slot);
        let release = bitfield(sl_rr, 0, 4) * 4;
        let sustain_on = bitfield(self.byte(0x20 + channel), 5, 1) != 0;
        let sustained = bitfield(flags, 5, 1) != 0;

        let (sustain_rate, release_rate) = match (sustained, sustain_on) {
            (true, true) => (0, SUSTAIN_RELEASE_RATE),
            (true, false) => (0, release),
            (false, true) => (release, SUSTAIN_RELEASE_RATE),
            (false, false) => (release, PERCUSSIVE_RELEASE_RATE),
        };

        let envelope = EnvelopeParams {
            rates: envelope_rates(
                bitfield(ar_dr, 4, 4) * 4,
                bitfield(ar_dr, 0, 4) * 4,
                sustain_rate,
                release_rate,
                DAMP_RATE,
                ksrval,
            ),
            sustain: sustain_attenuation(bitfield(sl_rr, 4, 4)),
            total_level,
            ssg_eg: 0,
            damp: true,
        };

        let half_sine = if carrier { bitfield(byte(3), 4, 1) } else { bitfield(byte(3), 3, 1) };

        OperatorData {
            phase,
            envelope,
            waveform: half_sine as usize,
            am_enable: bitfield(flags, 7, 1) != 0,
            phase_step: 0,
        }
    }

    fn lfo_params(&self) -> LfoParams {
        LfoParams {
            enable: true,
            ..Default::default()
        }
    }

    fn timer_params(&self) -> TimerParams {
        TimerParams::default()
    }

    fn channel_operators(&self, channel: usize) -> Vec<usize> {
        if channel >= CHANNELS {
            return Vec::new();
        }
        vec![2 * channel, 2 * channel + 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeState;

    fn opll() -> OpllRegisters {
        let mut regs = OpllRegisters::new(None);
        regs.reset();
        regs
    }

    #[test]
    fn test_keyon_decode() {
        let mut regs = opll();
        assert_eq!(regs.write(0x24, 0x10), WriteEffect::KeyOn { channel: 4, opmask: 3 });
        assert_eq!(regs.write(0x24, 0x00), WriteEffect::KeyOn { channel: 4, opmask: 0 });
        assert_eq!(regs.write(0x29, 0x10), WriteEffect::None);
    }

    #[test]
    fn test_user_instrument() {
        let mut regs = opll();
        regs.write(0x00, 0x21);
        regs.write(0x01, 0x01);
        regs.write(0x02, 0x15);
        regs.write(0x03, 0x1d);
        regs.write(0x30, 0x05);

        let modulator = regs.operator_data(0, 0);
        let carrier = regs.operator_data(0, 1);
        assert_eq!(modulator.phase.multiple, 2);
        assert_eq!(modulator.envelope.total_level, 0x15 << 3);
        assert_eq!(carrier.envelope.total_level, (5 * 4) << 3);
        assert_eq!(carrier.waveform, 1);
        assert_eq!(modulator.waveform, 1);
        assert_eq!(regs.channel_data(0).feedback, 5);
        assert!(modulator.envelope.damp);
    }

    #[test]
    fn test_preset_table() {
        let mut table = vec![[0u8; 8]; OPLL_PRESETS];
        table[2][2] = 0x3f;
        let mut regs = OpllRegisters::new(Some(table));
        regs.write(0x31, 0x30);
        assert_eq!(regs.operator_data(1, 2).envelope.total_level, 0x3f << 3);
        // a missing table reads as zeros
        assert_eq!(opll().instrument(3), [0; 8]);
    }

    #[test]
    fn test_sustain_bit_release() {
        let mut regs = opll();
        regs.write(0x07, 0x0f);
        regs.write(0x20, 0x10);
        let percussive = regs.operator_data(0, 1).envelope;
        assert_eq!(percussive.rates[EnvelopeState::Sustain.index()], 60);
        assert_eq!(percussive.rates[EnvelopeState::Release.index()], 28);

        regs.write(0x20, 0x30);
        let sustained = regs.operator_data(0, 1).envelope;
        assert_eq!(sustained.rates[EnvelopeState::Release.index()], 20);
        assert_eq!(sustained.rates[EnvelopeState::Damp.index()], 48);
    }

    #[test]
    fn test_block_freq_layout() {
        let mut regs = opll();
        regs.write(0x10, 0xab);
        regs.write(0x20, 0x0b);
        assert_eq!(regs.operator_data(0, 0).phase.block_freq, 0xbab);
    }
}
