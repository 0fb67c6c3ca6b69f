//! Register Abstraction
//!
//! Each family stores its raw register file and decodes it into normalized,
//! family-agnostic parameters. The engine only ever sees these normalized
//! views, never raw register bits.
//!
//! Responsibilities of a register map:
//! - Store writes and report their side effects ([`WriteEffect`])
//! - Decode per-channel and per-operator parameters
//! - Decode LFO, noise, timer and DAC controls
//! - Describe which operators belong to which channel
//!
//! The concrete maps are grouped in the [`Registers`] enum so the engine can
//! hold any family without dynamic dispatch.

pub mod opl;
pub mod opll;
pub mod opm;
pub mod opn;

use crate::channel::ChannelData;
use crate::config::EngineConfig;
use crate::envelope::EnvelopeState;
use crate::family::Family;
use crate::lfo::LfoParams;
use crate::operator::OperatorData;
use crate::tables::effective_rate;
use crate::timer::TimerParams;

pub use opl::OplRegisters;
pub use opll::OpllRegisters;
pub use opm::OpmRegisters;
pub use opn::OpnRegisters;

/// OPL/OPLL frequency multiples as x.1 values
pub(crate) const OPL_MULTIPLE: [u32; 16] = [1, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 20, 24, 24, 30, 30];

/// Side effect of a register write that the engine must act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEffect {
    /// Nothing beyond storing the value
    None,
    /// Key on/off: bit n of `opmask` keys the channel's n-th operator
    KeyOn {
        /// Channel index
        channel: usize,
        /// Operator key bits
        opmask: u8,
    },
    /// Timer load/enable/reset bits changed
    TimerControl,
    /// Clear the given status bits
    StatusReset(u8),
    /// Prescale changed to the given value
    Prescale(u32),
    /// Channel/operator grouping changed
    Layout,
}

/// Contract between the engine and a family's register file
pub trait RegisterMap {
    /// Restore power-on register values
    fn reset(&mut self);

    /// Store a write and report its side effect
    fn write(&mut self, index: u16, data: u8) -> WriteEffect;

    /// Raw register value
    fn read(&self, index: u16) -> u8;

    /// Normalized parameters for a channel
    fn channel_data(&self, channel: usize) -> ChannelData;

    /// Normalized parameters for an operator owned by `channel`
    ///
    /// The returned phase step is left at zero; the engine computes it.
    fn operator_data(&self, channel: usize, operator: usize) -> OperatorData;

    /// LFO and noise controls
    fn lfo_params(&self) -> LfoParams;

    /// Timer controls
    fn timer_params(&self) -> TimerParams;

    /// Operator indices for a channel in OP1..OPn order (empty when inactive)
    fn channel_operators(&self, channel: usize) -> Vec<usize>;

    /// Channel whose last operator is replaced by noise, if any
    fn noise_channel(&self) -> Option<usize> {
        None
    }

    /// DAC value replacing the last channel, if enabled
    fn dac(&self) -> Option<i32> {
        None
    }
}

/// Per-state rates with key scaling applied
pub(crate) fn envelope_rates(
    attack: u32,
    decay: u32,
    sustain: u32,
    release: u32,
    damp: u32,
    ksrval: u32,
) -> [u32; EnvelopeState::COUNT] {
    let mut rates = [0; EnvelopeState::COUNT];
    rates[EnvelopeState::Damp.index()] = effective_rate(damp, ksrval);
    rates[EnvelopeState::Attack.index()] = effective_rate(attack, ksrval);
    rates[EnvelopeState::Decay.index()] = effective_rate(decay, ksrval);
    rates[EnvelopeState::Sustain.index()] = effective_rate(sustain, ksrval);
    rates[EnvelopeState::Release.index()] = effective_rate(release, ksrval);
    rates
}

/// Register file of any supported family
#[derive(Debug, Clone)]
pub enum Registers {
    /// YM2151
    Opm(OpmRegisters),
    /// YM2203, YM2608, YM2612, YM3438
    Opn(OpnRegisters),
    /// YM3526, YM3812, YMF262
    Opl(OplRegisters),
    /// YM2413
    Opll(OpllRegisters),
}

impl Registers {
    /// Build the register file for a configuration
    pub fn new(config: &EngineConfig) -> Self {
        match config.family {
            Family::Opm => Registers::Opm(OpmRegisters::new()),
            Family::Opn | Family::Opna | Family::Opn2 | Family::Opn2c => {
                Registers::Opn(OpnRegisters::new(config.family_config(), config.effective_prescale()))
            }
            Family::Opl | Family::Opl2 | Family::Opl3 => Registers::Opl(OplRegisters::new(config.family)),
            Family::Opll => Registers::Opll(OpllRegisters::new(config.instruments.clone())),
        }
    }
}

/// Forward a call to whichever family map the enum holds
macro_rules! dispatch {
    ($self:expr, $regs:ident => $call:expr) => {
        match $self {
            Registers::Opm($regs) => $call,
            Registers::Opn($regs) => $call,
            Registers::Opl($regs) => $call,
            Registers::Opll($regs) => $call,
        }
    };
}

impl RegisterMap for Registers {
    fn reset(&mut self) {
        dispatch!(self, regs => regs.reset())
    }

    fn write(&mut self, index: u16, data: u8) -> WriteEffect {
        dispatch!(self, regs => regs.write(index, data))
    }

    fn read(&self, index: u16) -> u8 {
        dispatch!(self, regs => regs.read(index))
    }

    fn channel_data(&self, channel: usize) -> ChannelData {
        dispatch!(self, regs => regs.channel_data(channel))
    }

    fn operator_data(&self, channel: usize, operator: usize) -> OperatorData {
        dispatch!(self, regs => regs.operator_data(channel, operator))
    }

    fn lfo_params(&self) -> LfoParams {
        dispatch!(self, regs => regs.lfo_params())
    }

    fn timer_params(&self) -> TimerParams {
        dispatch!(self, regs => regs.timer_params())
    }

    fn channel_operators(&self, channel: usize) -> Vec<usize> {
        dispatch!(self, regs => regs.channel_operators(channel))
    }

    fn noise_channel(&self) -> Option<usize> {
        dispatch!(self, regs => regs.noise_channel())
    }

    fn dac(&self) -> Option<i32> {
        dispatch!(self, regs => regs.dac())
    }
}
