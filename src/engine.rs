//! FM Engine
//!
//! Owns the operator arena, the channels, the LFO, the timers and the status
//! register of one chip, and advances them one output sample at a time.
//!
//! Per-sample order:
//! 1. Refresh cached channel/operator parameters if any register changed
//! 2. Clock timers A and B (status bits, IRQ, CSM key-on pulse)
//! 3. Advance the envelope clock and the LFO
//! 4. Shift channel feedback history, then clock every operator
//! 5. Compute channel outputs and combine them in the mixer
//! 6. Count down the busy window
//!
//! The engine never looks at raw register bits; everything it needs comes
//! through [`RegisterMap`] and the family's [`FamilyConfig`].

use log::{debug, trace, warn};

use crate::channel::{Channel, ChannelContext};
use crate::config::EngineConfig;
use crate::envelope::{EnvelopeClock, EnvelopeState, KeyOnSource};
use crate::family::{FamilyConfig, Features};
use crate::lfo::{Lfo, LfoParams};
use crate::mixer::{Mixer, OutputFrame, MAX_OUTPUTS};
use crate::operator::Operator;
use crate::phase::PhaseGenerator;
use crate::registers::{RegisterMap, Registers, WriteEffect};
use crate::status::Status;
use crate::timer::{Timer, TimerId, TimerParams};
use crate::Result;

/// Sample-stepped FM synthesis engine for one chip instance
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    family: FamilyConfig,
    registers: Registers,
    generator: PhaseGenerator,
    operators: Vec<Operator>,
    channels: Vec<Channel>,
    lfo: Lfo,
    mixer: Mixer,
    timers: [Timer; 2],
    status: Status,
    env_clock: EnvelopeClock,
    prescale: u32,
    total_samples: u64,

    // Parameters decoded from registers, refreshed after writes
    cache_dirty: bool,
    lfo_params: LfoParams,
    timer_params: TimerParams,
    noise_channel: Option<usize>,
    dac: Option<i32>,
}

impl Engine {
    /// Create an engine in its power-on state
    ///
    /// Fails if the configuration is inconsistent with the family constants.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let family = config.family_config();

        let mut engine = Engine {
            registers: Registers::new(&config),
            generator: PhaseGenerator::new(family.freq_decode, family.lfo),
            operators: vec![Operator::new(); family.operators],
            channels: vec![Channel::new(); family.channels],
            lfo: Lfo::new(family.lfo),
            mixer: Mixer::new(family.summing, family.output_format, family.outputs, family.channels),
            timers: [
                Timer::new(TimerId::A, config.timer_mode),
                Timer::new(TimerId::B, config.timer_mode),
            ],
            status: Status::new(family.status, config.effective_busy()),
            env_clock: EnvelopeClock::new(family.eg_clock_divider),
            prescale: config.effective_prescale(),
            total_samples: 0,
            cache_dirty: true,
            lfo_params: LfoParams::default(),
            timer_params: TimerParams::default(),
            noise_channel: None,
            dac: None,
            family,
            config,
        };
        engine.reset();
        Ok(engine)
    }

    /// Restore the power-on state: registers, envelopes, LFO, timers and status
    pub fn reset(&mut self) {
        self.registers.reset();
        for op in self.operators.iter_mut() {
            op.reset();
        }
        for channel in self.channels.iter_mut() {
            channel.reset();
        }
        self.lfo.reset();
        for timer in self.timers.iter_mut() {
            timer.reset();
        }
        self.status.reset();
        self.env_clock.reset();
        self.prescale = self.config.effective_prescale();
        self.total_samples = 0;
        self.assign_operators();
        self.cache_dirty = true;

        debug!(
            "{} reset: {} channels x {} operators, {} outputs, prescale {}",
            self.family.name,
            self.family.channels,
            self.family.operators_per_channel,
            self.family.outputs,
            self.prescale
        );
    }

    fn assign_operators(&mut self) {
        for (index, channel) in self.channels.iter_mut().enumerate() {
            channel.assign(self.registers.channel_operators(index));
        }
    }

    /// Write a register
    ///
    /// Addresses include the bank offset (0x100 for the second bank). The
    /// write is visible to the very next generated sample.
    pub fn write(&mut self, address: u16, data: u8) {
        if address as usize >= self.family.register_space {
            warn!(
                "{}: write {:#04x} to {:#05x} outside register space",
                self.family.name, data, address
            );
            return;
        }

        self.status.mark_busy();
        match self.registers.write(address, data) {
            WriteEffect::None => {}
            WriteEffect::KeyOn { channel, opmask } => self.key_on(channel, opmask),
            WriteEffect::TimerControl => self.update_timers(),
            WriteEffect::StatusReset(mask) => {
                self.status.set_reset(0, mask);
            }
            WriteEffect::Prescale(prescale) => {
                debug!("{}: prescale now {}", self.family.name, prescale);
                self.prescale = prescale;
            }
            WriteEffect::Layout => self.assign_operators(),
        }
        self.cache_dirty = true;
    }

    fn key_on(&mut self, channel: usize, opmask: u8) {
        let Some(ch) = self.channels.get(channel) else {
            return;
        };
        trace!("{}: channel {} key mask {:#x}", self.family.name, channel, opmask);
        for (slot, &op) in ch.operators().iter().enumerate() {
            let on = (opmask >> slot) & 1 != 0;
            self.operators[op].keyonoff(on, KeyOnSource::Normal);
        }
    }

    fn update_timers(&mut self) {
        let params = self.registers.timer_params();
        let bits = self.status.bits();

        let mut reset = 0;
        if params.reset_a {
            reset |= bits.timer_a;
        }
        if params.reset_b {
            reset |= bits.timer_b;
        }
        if reset != 0 {
            self.status.set_reset(0, reset);
        }

        for timer in self.timers.iter_mut() {
            let id = timer.id();
            if params.load(id) {
                if !timer.is_running() {
                    timer.start(params.value(id), self.total_samples);
                    trace!("{}: timer {:?} loaded, {} samples", self.family.name, id, timer.remaining());
                }
            } else if timer.is_running() {
                timer.stop();
                trace!("{}: timer {:?} stopped", self.family.name, id);
            }
        }
        self.timer_params = params;
    }

    /// Read the status byte, busy flag included
    pub fn read_status(&self) -> u8 {
        self.status.read()
    }

    /// Read back a raw register value
    pub fn read_register(&self, address: u16) -> u8 {
        self.registers.read(address)
    }

    /// Set and clear status bits; the IRQ line is recomputed
    pub fn set_reset_status(&mut self, set: u8, reset: u8) {
        if self.status.set_reset(set, reset) {
            trace!("{}: irq {}", self.family.name, self.status.irq());
        }
    }

    /// Mask status bits out of the IRQ computation
    pub fn set_irq_mask(&mut self, mask: u8) {
        if self.status.set_irq_mask(mask) {
            trace!("{}: irq {}", self.family.name, self.status.irq());
        }
    }

    /// Current IRQ line level
    pub fn irq(&self) -> bool {
        self.status.irq()
    }

    fn refresh_caches(&mut self) {
        for (index, channel) in self.channels.iter_mut().enumerate() {
            channel.set_data(self.registers.channel_data(index));
            for &op in channel.operators() {
                let mut data = self.registers.operator_data(index, op);
                data.phase_step = self.generator.step(&data.phase, 0);
                self.operators[op].set_data(data);
            }
        }

        self.lfo_params = self.registers.lfo_params();
        self.timer_params = self.registers.timer_params();
        self.noise_channel = if self.family.has(Features::NOISE) {
            self.registers.noise_channel()
        } else {
            None
        };
        self.dac = if self.family.has(Features::DAC) { self.registers.dac() } else { None };
        self.cache_dirty = false;
    }

    fn clock_timers(&mut self) {
        for index in 0..self.timers.len() {
            let id = self.timers[index].id();
            let value = self.timer_params.value(id);
            if self.timers[index].clock(value, self.total_samples) {
                self.timer_expired(id);
            }
        }
    }

    fn timer_expired(&mut self, id: TimerId) {
        trace!("{}: timer {:?} expired at sample {}", self.family.name, id, self.total_samples);

        if self.timer_params.enable(id) {
            let bits = self.status.bits();
            let bit = match id {
                TimerId::A => bits.timer_a,
                TimerId::B => bits.timer_b,
            };
            self.set_reset_status(bit, 0);
        }

        if id == TimerId::A && self.timer_params.csm && self.family.has(Features::CSM) {
            trace!("{}: CSM key-on pulse", self.family.name);
            for (index, channel) in self.channels.iter().enumerate() {
                if (self.family.csm_trigger_mask >> index) & 1 == 0 {
                    continue;
                }
                for &op in channel.operators() {
                    self.operators[op].keyonoff(true, KeyOnSource::Csm);
                }
            }
        }
    }

    /// Advance one sample and return the output frame
    pub fn clock(&mut self) -> OutputFrame {
        if self.cache_dirty {
            self.refresh_caches();
        }

        self.clock_timers();
        self.env_clock.clock();
        let lfo_raw_pm = self.lfo.clock(&self.lfo_params);

        for channel in self.channels.iter_mut() {
            channel.clock();
            for &op in channel.operators() {
                self.operators[op].clock(&self.env_clock, &self.generator, lfo_raw_pm);
            }
        }

        let frame = self.mix();
        self.status.clock();
        self.total_samples += 1;
        frame
    }

    fn mix(&mut self) -> OutputFrame {
        let base = ChannelContext {
            am_offset: 0,
            noise: None,
            rshift: self.family.output_rshift,
            clip: self.family.output_clip,
            mod_delay: self.family.has(Features::MOD_DELAY),
        };
        let dac_channel = self.family.channels - 1;

        self.mixer.begin();
        for (index, channel) in self.channels.iter_mut().enumerate() {
            let ctx = ChannelContext {
                am_offset: self.lfo.am_offset(channel.data().am_sensitivity),
                noise: match self.noise_channel {
                    Some(noise) if noise == index => Some(self.lfo.noise_state()),
                    _ => None,
                },
                ..base
            };

            let output = channel.output(&self.operators, &ctx);
            let routing = channel.data().routing;
            let value = match self.dac {
                Some(sample) if index == dac_channel && !routing.is_empty() => Some(sample),
                _ => output,
            };
            if let Some(value) = value {
                self.mixer.add_channel(index, value, routing);
            }
        }
        self.mixer.finish()
    }

    /// Generate `count` consecutive frames
    pub fn generate(&mut self, count: usize) -> Vec<OutputFrame> {
        let mut frames = vec![OutputFrame::default(); count];
        self.generate_into(&mut frames);
        frames
    }

    /// Fill a buffer with consecutive frames
    pub fn generate_into(&mut self, frames: &mut [OutputFrame]) {
        for frame in frames.iter_mut() {
            *frame = self.clock();
        }
    }

    /// Output sample rate for a given input clock
    pub fn sample_rate(&self, input_clock: u32) -> u32 {
        self.family.sample_rate(input_clock, self.prescale)
    }

    /// Current prescale
    pub fn prescale(&self) -> u32 {
        self.prescale
    }

    /// Construction-time configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Family constants in use
    pub fn family(&self) -> &FamilyConfig {
        &self.family
    }

    /// Number of active output lines in each frame
    pub fn outputs(&self) -> usize {
        self.mixer.outputs().min(MAX_OUTPUTS)
    }

    /// Samples generated since the last reset
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Operator by arena index
    pub fn operator(&self, index: usize) -> Option<&Operator> {
        self.operators.get(index)
    }

    /// Raw phase accumulator of an operator
    pub fn operator_phase(&self, index: usize) -> Option<u32> {
        self.operators.get(index).map(Operator::phase)
    }

    /// Raw envelope attenuation of an operator (0 loudest, 0x3ff silent)
    pub fn operator_attenuation(&self, index: usize) -> Option<u32> {
        self.operators.get(index).map(Operator::raw_attenuation)
    }

    /// Envelope state of an operator
    pub fn envelope_state(&self, index: usize) -> Option<EnvelopeState> {
        self.operators.get(index).map(Operator::envelope_state)
    }

    /// Operator arena indices of a channel
    pub fn channel_operators(&self, channel: usize) -> &[usize] {
        self.channels.get(channel).map(Channel::operators).unwrap_or(&[])
    }

    /// Per-channel slot values from the last sample on muxing chips
    pub fn last_mux_slots(&self) -> &[[i32; MAX_OUTPUTS]] {
        self.mixer.last_slots()
    }

    /// Whether a timer is counting
    pub fn timer_running(&self, id: TimerId) -> bool {
        self.timers[id.index()].is_running()
    }

    /// Samples until a timer next expires (0 when stopped)
    pub fn timer_remaining(&self, id: TimerId) -> u32 {
        self.timers[id.index()].remaining()
    }

    /// LFO state
    pub fn lfo(&self) -> &Lfo {
        &self.lfo
    }
}
