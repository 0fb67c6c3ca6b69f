//! Status Register and IRQ Line
//!
//! Tracks timer flags, the busy flag and the derived IRQ line. The IRQ is
//! asserted whenever any status bit not covered by the combined mask is set;
//! the busy and IRQ-summary bits never contribute.

use crate::config::BusyTiming;
use crate::family::StatusBits;

/// Status register state
#[derive(Debug, Clone)]
pub struct Status {
    bits: StatusBits,
    busy_timing: BusyTiming,
    value: u8,
    host_mask: u8,
    busy_remaining: u32,
    irq: bool,
}

impl Status {
    /// Create a cleared status register
    pub fn new(bits: StatusBits, busy_timing: BusyTiming) -> Self {
        Status {
            bits,
            busy_timing,
            value: 0,
            host_mask: 0,
            busy_remaining: 0,
            irq: false,
        }
    }

    /// Clear status, masks and busy
    pub fn reset(&mut self) {
        self.value = 0;
        self.host_mask = 0;
        self.busy_remaining = 0;
        self.irq = false;
    }

    /// Bit assignment in use
    pub fn bits(&self) -> StatusBits {
        self.bits
    }

    /// Set and clear status bits; returns true if the IRQ line changed
    pub fn set_reset(&mut self, set: u8, reset: u8) -> bool {
        self.value = (self.value | set) & !(reset | self.bits.busy);
        self.update_irq()
    }

    /// Replace the host IRQ mask; returns true if the IRQ line changed
    pub fn set_irq_mask(&mut self, mask: u8) -> bool {
        self.host_mask = mask;
        self.update_irq()
    }

    fn update_irq(&mut self) -> bool {
        let ignored = self.host_mask | self.bits.busy | self.bits.irq;
        let irq = self.value & !ignored != 0;

        if self.bits.irq != 0 {
            if irq {
                self.value |= self.bits.irq;
            } else {
                self.value &= !self.bits.irq;
            }
        }

        let changed = irq != self.irq;
        self.irq = irq;
        changed
    }

    /// Current IRQ line state
    pub fn irq(&self) -> bool {
        self.irq
    }

    /// Status byte as the host reads it
    pub fn read(&self) -> u8 {
        let mut value = self.value;
        if self.busy_remaining > 0 {
            value |= self.bits.busy;
        }
        value
    }

    /// Start the busy period after a data write
    pub fn mark_busy(&mut self) {
        if let BusyTiming::Samples(samples) = self.busy_timing {
            if self.bits.busy != 0 {
                self.busy_remaining = samples;
            }
        }
    }

    /// Advance one sample
    pub fn clock(&mut self) {
        self.busy_remaining = self.busy_remaining.saturating_sub(1);
    }
}
