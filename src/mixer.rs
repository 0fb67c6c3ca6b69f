//! Output Mixer
//!
//! Combines channel outputs into up to four output lines, gated by each
//! channel's routing flags.
//!
//! Two summing strategies exist:
//! - Adder: channels are summed, then the total is converted to the DAC's
//!   format (10.3 floating point or clamped 16-bit linear)
//! - Muxer: the 9-bit DAC is time-multiplexed between channels, so each
//!   channel owns one slot per output and the slots are averaged. With the
//!   ladder effect enabled, slots are offset away from zero, which is what
//!   gives the discrete YM2612 its crossover distortion.

use bitflags::bitflags;

use crate::family::{OutputFormat, Summing};
use crate::tables::roundtrip_fp;

/// Maximum number of output lines any family drives
pub const MAX_OUTPUTS: usize = 4;

bitflags! {
    /// Output routing for one channel
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OutputRouting: u8 {
        /// Output 0 (left, or mono)
        const OUT0 = 0x01;
        /// Output 1 (right)
        const OUT1 = 0x02;
        /// Output 2 (OPL3 C)
        const OUT2 = 0x04;
        /// Output 3 (OPL3 D)
        const OUT3 = 0x08;
    }
}

impl OutputRouting {
    /// Routing with the lowest `count` outputs enabled
    pub fn first(count: usize) -> Self {
        OutputRouting::from_bits_truncate(((1u32 << count.min(MAX_OUTPUTS)) - 1) as u8)
    }

    /// Whether output `index` is enabled
    #[inline]
    pub fn routes(self, index: usize) -> bool {
        self.bits() & (1 << index) != 0
    }
}

/// One sample for every output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputFrame {
    /// Signed samples, only the first `outputs` entries are meaningful
    pub data: [i32; MAX_OUTPUTS],
}

impl OutputFrame {
    /// Convert to normalized floats in the -1.0..1.0 range
    pub fn to_f32(&self) -> [f32; MAX_OUTPUTS] {
        self.data.map(|sample| sample as f32 / 32768.0)
    }
}

/// Apply the DAC ladder offset to a routed 9-bit value
#[inline]
fn ladder_routed(value: i32) -> i32 {
    if value >= 0 {
        value + 4
    } else {
        value - 3
    }
}

/// Apply the DAC ladder offset to a muted slot whose channel holds `value`
#[inline]
fn ladder_muted(value: i32) -> i32 {
    if value >= 0 {
        4
    } else {
        -4
    }
}

/// Per-sample output accumulator
#[derive(Debug, Clone)]
pub struct Mixer {
    summing: Summing,
    format: OutputFormat,
    outputs: usize,
    accum: [i32; MAX_OUTPUTS],
    slots: Vec<[i32; MAX_OUTPUTS]>,
}

impl Mixer {
    /// Create a mixer for a channel count and output layout
    pub fn new(summing: Summing, format: OutputFormat, outputs: usize, channels: usize) -> Self {
        Mixer {
            summing,
            format,
            outputs: outputs.min(MAX_OUTPUTS),
            accum: [0; MAX_OUTPUTS],
            slots: vec![[0; MAX_OUTPUTS]; channels],
        }
    }

    /// Number of active output lines
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// Clear accumulators for a new sample
    pub fn begin(&mut self) {
        self.accum = [0; MAX_OUTPUTS];
        let idle = self.muted_slot(0);
        let outputs = self.outputs;
        for slot in self.slots.iter_mut() {
            *slot = [0; MAX_OUTPUTS];
            slot[..outputs].fill(idle);
        }
    }

    fn muted_slot(&self, value: i32) -> i32 {
        match self.format {
            OutputFormat::Dac9 { ladder: true } => ladder_muted(value),
            _ => 0,
        }
    }

    fn routed_slot(&self, value: i32) -> i32 {
        match self.format {
            OutputFormat::Dac9 { ladder: true } => ladder_routed(value),
            _ => value,
        }
    }

    /// Contribute one channel's output
    pub fn add_channel(&mut self, channel: usize, value: i32, routing: OutputRouting) {
        match self.summing {
            Summing::Adder => {
                for (index, accum) in self.accum.iter_mut().enumerate().take(self.outputs) {
                    if routing.routes(index) {
                        *accum += value;
                    }
                }
            }
            Summing::Muxer => {
                let routed = self.routed_slot(value);
                let muted = self.muted_slot(value);
                let outputs = self.outputs;
                if let Some(slot) = self.slots.get_mut(channel) {
                    for (index, entry) in slot.iter_mut().enumerate().take(outputs) {
                        *entry = if routing.routes(index) { routed } else { muted };
                    }
                }
            }
        }
    }

    /// Produce the final frame for this sample
    pub fn finish(&mut self) -> OutputFrame {
        let mut frame = OutputFrame::default();
        match self.summing {
            Summing::Adder => {
                for index in 0..self.outputs {
                    let value = self.accum[index];
                    frame.data[index] = match self.format {
                        OutputFormat::Float10_3 => roundtrip_fp(value),
                        _ => value.clamp(i16::MIN as i32, i16::MAX as i32),
                    };
                }
            }
            Summing::Muxer => {
                let count = self.slots.len().max(1) as i32;
                for index in 0..self.outputs {
                    let sum: i32 = self.slots.iter().map(|slot| slot[index]).sum();
                    frame.data[index] = sum * 128 / count;
                }
            }
        }
        frame
    }

    /// Per-channel slot values from the last muxed sample
    pub fn last_slots(&self) -> &[[i32; MAX_OUTPUTS]] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opn2(ladder: bool) -> Mixer {
        Mixer::new(Summing::Muxer, OutputFormat::Dac9 { ladder }, 2, 6)
    }

    #[test]
    fn test_routing_first() {
        assert_eq!(OutputRouting::first(1), OutputRouting::OUT0);
        assert_eq!(OutputRouting::first(2), OutputRouting::OUT0 | OutputRouting::OUT1);
        assert_eq!(OutputRouting::first(4), OutputRouting::all());
        assert!(OutputRouting::first(2).routes(1));
        assert!(!OutputRouting::first(2).routes(2));
    }

    #[test]
    fn test_adder_sums_routed_channels() {
        let mut mixer = Mixer::new(Summing::Adder, OutputFormat::Linear16, 2, 6);
        mixer.begin();
        mixer.add_channel(0, 1000, OutputRouting::OUT0);
        mixer.add_channel(1, 500, OutputRouting::OUT0 | OutputRouting::OUT1);
        let frame = mixer.finish();
        assert_eq!(frame.data[0], 1500);
        assert_eq!(frame.data[1], 500);
        assert_eq!(frame.data[2], 0);
    }

    #[test]
    fn test_adder_linear_clamps() {
        let mut mixer = Mixer::new(Summing::Adder, OutputFormat::Linear16, 1, 6);
        mixer.begin();
        for channel in 0..6 {
            mixer.add_channel(channel, 8000, OutputRouting::OUT0);
        }
        assert_eq!(mixer.finish().data[0], 32767);
    }

    #[test]
    fn test_adder_float_truncates_low_bits() {
        let mut mixer = Mixer::new(Summing::Adder, OutputFormat::Float10_3, 1, 3);
        mixer.begin();
        mixer.add_channel(0, 5000, OutputRouting::OUT0);
        assert_eq!(mixer.finish().data[0], roundtrip_fp(5000));
    }

    #[test]
    fn test_adder_float_saturates_on_overflow() {
        let mut mixer = Mixer::new(Summing::Adder, OutputFormat::Float10_3, 1, 6);
        mixer.begin();
        for channel in 0..6 {
            mixer.add_channel(channel, 8000, OutputRouting::OUT0);
        }
        assert_eq!(mixer.finish().data[0], 32767);

        mixer.begin();
        for channel in 0..4 {
            mixer.add_channel(channel, 8001, OutputRouting::OUT0);
        }
        // 32004 is in range and keeps only its top mantissa bits
        assert_eq!(mixer.finish().data[0], 32000);
    }

    #[test]
    fn test_muxer_without_ladder_averages() {
        let mut mixer = opn2(false);
        mixer.begin();
        mixer.add_channel(0, 255, OutputRouting::OUT0);
        let frame = mixer.finish();
        assert_eq!(frame.data[0], 255 * 128 / 6);
        assert_eq!(frame.data[1], 0);
    }

    #[test]
    fn test_ladder_slot_values() {
        let mut mixer = opn2(true);
        mixer.begin();
        mixer.add_channel(0, 10, OutputRouting::OUT0);
        mixer.add_channel(1, -10, OutputRouting::OUT1);
        let slots = mixer.last_slots();
        assert_eq!(slots[0][0], 14);
        assert_eq!(slots[0][1], 4);
        assert_eq!(slots[1][0], -4);
        assert_eq!(slots[1][1], -13);
        // untouched channels idle at the positive offset
        assert_eq!(slots[5], [4, 4, 0, 0]);
    }

    #[test]
    fn test_ladder_silence_has_offset() {
        let mut mixer = opn2(true);
        mixer.begin();
        let frame = mixer.finish();
        assert_eq!(frame.data[0], 4 * 128);
        assert_eq!(frame.data[1], 4 * 128);
    }

    #[test]
    fn test_frame_to_f32() {
        let frame = OutputFrame {
            data: [16384, -32768, 0, 0],
        };
        let floats = frame.to_f32();
        assert!(approx::abs_diff_eq!(floats[0], 0.5));
        assert!(approx::abs_diff_eq!(floats[1], -1.0));
    }
}
