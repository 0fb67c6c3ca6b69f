//! FM Channel
//!
//! Groups 2 or 4 operators (by index into the engine's operator arena),
//! routes modulation between them according to the algorithm, and keeps the
//! two-sample feedback history of operator 1.
//!
//! 4-operator algorithms are described by a packed word:
//! - bit 0: OP2 modulation input (0 = none, 1 = OP1)
//! - bits 1-3: OP3 modulation input (index into the output table)
//! - bits 4-6: OP4 modulation input
//! - bits 7-9: OP1, OP2, OP3 also sum into the output
//!
//! The output table holds `[0, OP1, OP2, OP3, -, OP1+OP2, OP1+OP3, OP2+OP3]`.

use crate::mixer::OutputRouting;
use crate::operator::Operator;
use crate::tables::bitfield;

const fn algorithm(op2in: u16, op3in: u16, op4in: u16, op1out: u16, op2out: u16, op3out: u16) -> u16 {
    op2in | (op3in << 1) | (op4in << 4) | (op1out << 7) | (op2out << 8) | (op3out << 9)
}

/// Packed 4-operator algorithms; 8-11 are the OPL3 4-op modes
const ALGORITHM_OPS: [u16; 12] = [
    algorithm(1, 2, 3, 0, 0, 0), // 0: 1 -> 2 -> 3 -> 4
    algorithm(0, 5, 3, 0, 0, 0), // 1: (1 + 2) -> 3 -> 4
    algorithm(0, 2, 6, 0, 0, 0), // 2: (1 + (2 -> 3)) -> 4
    algorithm(1, 0, 7, 0, 0, 0), // 3: ((1 -> 2) + 3) -> 4
    algorithm(1, 0, 3, 0, 1, 0), // 4: (1 -> 2) + (3 -> 4)
    algorithm(1, 1, 1, 0, 1, 1), // 5: (1 -> 2) + (1 -> 3) + (1 -> 4)
    algorithm(1, 0, 0, 0, 1, 1), // 6: (1 -> 2) + 3 + 4
    algorithm(0, 0, 0, 1, 1, 1), // 7: 1 + 2 + 3 + 4
    algorithm(1, 2, 3, 0, 0, 0), // 8: 1 -> 2 -> 3 -> 4
    algorithm(0, 2, 3, 1, 0, 0), // 9: 1 + (2 -> 3 -> 4)
    algorithm(1, 0, 3, 0, 1, 0), // 10: (1 -> 2) + (3 -> 4)
    algorithm(0, 2, 0, 1, 0, 1), // 11: 1 + (2 -> 3) + 4
];

/// Normalized per-channel parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelData {
    /// Algorithm number (0-7 for 4-op, bit 0 selects FM/AM for 2-op, 8-11 for OPL3 4-op)
    pub algorithm: u32,
    /// Operator 1 feedback level (0 disables)
    pub feedback: u32,
    /// Output routing
    pub routing: OutputRouting,
    /// LFO AM sensitivity
    pub am_sensitivity: u32,
}

/// Per-sample inputs the engine hands to a channel
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelContext {
    /// LFO AM offset for this channel's sensitivity
    pub am_offset: u32,
    /// Noise output replacing operator 4, if enabled for this channel
    pub noise: Option<bool>,
    /// Right shift applied to the final output
    pub rshift: u32,
    /// Clip value for additive algorithms
    pub clip: i32,
    /// Modulate the second 2-op operator with the previous OP1 sample
    pub mod_delay: bool,
}

/// FM channel state
#[derive(Debug, Clone)]
pub struct Channel {
    ops: Vec<usize>,
    feedback: [i32; 2],
    feedback_in: i32,
    data: ChannelData,
}

impl Channel {
    /// Create an idle channel with no operators assigned
    pub fn new() -> Self {
        Channel {
            ops: Vec::new(),
            feedback: [0; 2],
            feedback_in: 0,
            data: ChannelData::default(),
        }
    }

    /// Clear feedback history
    pub fn reset(&mut self) {
        self.feedback = [0; 2];
        self.feedback_in = 0;
    }

    /// Assign operator arena indices (2 or 4, or none to disable)
    pub fn assign(&mut self, ops: Vec<usize>) {
        self.ops = ops;
    }

    /// Operator arena indices in OP1..OPn order
    pub fn operators(&self) -> &[usize] {
        &self.ops
    }

    /// Replace the cached parameters
    pub fn set_data(&mut self, data: ChannelData) {
        self.data = data;
    }

    /// Cached parameters
    pub fn data(&self) -> &ChannelData {
        &self.data
    }

    /// Shift the feedback history; called once per sample before the operators clock
    pub fn clock(&mut self) {
        self.feedback[0] = self.feedback[1];
        self.feedback[1] = self.feedback_in;
    }

    fn feedback_modulation(&self) -> i32 {
        if self.data.feedback == 0 {
            0
        } else {
            (self.feedback[0] + self.feedback[1]) >> (10 - self.data.feedback)
        }
    }

    /// Compute this channel's output; `None` when the channel is unrouted or unassigned
    pub fn output(&mut self, operators: &[Operator], ctx: &ChannelContext) -> Option<i32> {
        match self.ops.len() {
            2 => self.output_2op(operators, ctx),
            4 => self.output_4op(operators, ctx),
            _ => None,
        }
    }

    fn output_2op(&mut self, operators: &[Operator], ctx: &ChannelContext) -> Option<i32> {
        let op1 = &operators[self.ops[0]];
        let op2 = &operators[self.ops[1]];

        let op1_out = op1.compute_volume(self.feedback_modulation(), ctx.am_offset);
        self.feedback_in = op1_out;

        if self.data.routing.is_empty() {
            return None;
        }

        if bitfield(self.data.algorithm, 0, 1) == 0 {
            let modulator = if ctx.mod_delay { self.feedback[1] } else { op1_out };
            Some(op2.compute_volume(modulator >> 1, ctx.am_offset) >> ctx.rshift)
        } else {
            let clip_min = -ctx.clip - 1;
            let result = (op1_out >> ctx.rshift) + (op2.compute_volume(0, ctx.am_offset) >> ctx.rshift);
            Some(result.clamp(clip_min, ctx.clip))
        }
    }

    fn output_4op(&mut self, operators: &[Operator], ctx: &ChannelContext) -> Option<i32> {
        let mut opout = [0i32; 8];

        opout[1] = operators[self.ops[0]].compute_volume(self.feedback_modulation(), ctx.am_offset);
        self.feedback_in = opout[1];

        if self.data.routing.is_empty() {
            return None;
        }

        let algorithm_ops = u32::from(ALGORITHM_OPS[(self.data.algorithm as usize).min(ALGORITHM_OPS.len() - 1)]);

        let modulation = opout[bitfield(algorithm_ops, 0, 1) as usize] >> 1;
        opout[2] = operators[self.ops[1]].compute_volume(modulation, ctx.am_offset);
        opout[5] = opout[1] + opout[2];

        let modulation = opout[bitfield(algorithm_ops, 1, 3) as usize] >> 1;
        opout[3] = operators[self.ops[2]].compute_volume(modulation, ctx.am_offset);
        opout[6] = opout[1] + opout[3];
        opout[7] = opout[2] + opout[3];

        let op4 = &operators[self.ops[3]];
        let mut result = match ctx.noise {
            Some(state) => op4.compute_noise_volume(state, ctx.am_offset),
            None => {
                let modulation = opout[bitfield(algorithm_ops, 4, 3) as usize] >> 1;
                op4.compute_volume(modulation, ctx.am_offset)
            }
        };
        result >>= ctx.rshift;

        let clip_min = -ctx.clip - 1;
        for (bit, index) in [(7, 1), (8, 2), (9, 3)] {
            if bitfield(algorithm_ops, bit, 1) != 0 {
                result = (result + (opout[index] >> ctx.rshift)).clamp(clip_min, ctx.clip);
            }
        }
        Some(result)
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}
