//! Timer A/B Implementation
//!
//! Two countdown timers clocked once per output sample. Timer A has a
//! 10-bit period, timer B an 8-bit period in units of 16 samples. On expiry
//! a timer raises its status bit (when enabled) and either reloads or stops
//! depending on the configured [`TimerMode`].

use crate::config::TimerMode;

/// Which of the two timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerId {
    /// Timer A (10-bit)
    A,
    /// Timer B (8-bit, 16x prescaled)
    B,
}

impl TimerId {
    /// Index into per-timer arrays
    #[inline]
    pub fn index(self) -> usize {
        match self {
            TimerId::A => 0,
            TimerId::B => 1,
        }
    }
}

/// Normalized timer controls decoded from the registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerParams {
    /// Timer A period value (10-bit)
    pub a_value: u32,
    /// Timer B period value (8-bit)
    pub b_value: u32,
    /// Run timer A
    pub load_a: bool,
    /// Run timer B
    pub load_b: bool,
    /// Raise the status bit when timer A expires
    pub enable_a: bool,
    /// Raise the status bit when timer B expires
    pub enable_b: bool,
    /// Clear timer A's status bit
    pub reset_a: bool,
    /// Clear timer B's status bit
    pub reset_b: bool,
    /// Composite sine modeling: timer A expiry pulses key-on
    pub csm: bool,
}

impl TimerParams {
    /// Period value for one timer
    pub fn value(&self, id: TimerId) -> u32 {
        match id {
            TimerId::A => self.a_value,
            TimerId::B => self.b_value,
        }
    }

    /// Load (run) bit for one timer
    pub fn load(&self, id: TimerId) -> bool {
        match id {
            TimerId::A => self.load_a,
            TimerId::B => self.load_b,
        }
    }

    /// Status enable bit for one timer
    pub fn enable(&self, id: TimerId) -> bool {
        match id {
            TimerId::A => self.enable_a,
            TimerId::B => self.enable_b,
        }
    }

    /// Status reset bit for one timer
    pub fn reset(&self, id: TimerId) -> bool {
        match id {
            TimerId::A => self.reset_a,
            TimerId::B => self.reset_b,
        }
    }
}

/// Period in samples for a timer value
///
/// Timer B counts in blocks of 16 samples aligned to the global sample
/// counter, so its first period is shortened by the current offset.
pub fn period(id: TimerId, value: u32, total_samples: u64) -> u32 {
    match id {
        TimerId::A => 1024 - (value & 0x3ff),
        TimerId::B => 16 * (256 - (value & 0xff)) - (total_samples & 15) as u32,
    }
}

/// Countdown timer
#[derive(Debug, Clone)]
pub struct Timer {
    id: TimerId,
    mode: TimerMode,
    /// Samples left until expiry
    counter: u32,
    running: bool,
}

impl Timer {
    /// Create a stopped timer
    pub fn new(id: TimerId, mode: TimerMode) -> Self {
        Timer {
            id,
            mode,
            counter: 0,
            running: false,
        }
    }

    /// Stop the timer
    pub fn reset(&mut self) {
        self.counter = 0;
        self.running = false;
    }

    /// Which timer this is
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Start counting a fresh period
    pub fn start(&mut self, value: u32, total_samples: u64) {
        self.counter = period(self.id, value, total_samples).max(1);
        self.running = true;
    }

    /// Stop counting without touching status
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Advance one sample; returns true on expiry
    pub fn clock(&mut self, value: u32, total_samples: u64) -> bool {
        if !self.running {
            return false;
        }

        self.counter = self.counter.saturating_sub(1);
        if self.counter > 0 {
            return false;
        }

        match self.mode {
            TimerMode::Repeat => {
                // the next period starts on the following sample
                self.counter = period(self.id, value, total_samples + 1).max(1);
            }
            TimerMode::OneShot => self.running = false,
        }
        true
    }

    /// Is the timer counting?
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Samples left until the next expiry (0 when stopped)
    pub fn remaining(&self) -> u32 {
        if self.running {
            self.counter
        } else {
            0
        }
    }
}
