//! Chip Port Interface
//!
//! Hosts talk to the real chips through an address/data port pair. Even
//! ports latch a register address, odd ports write data to the latched
//! address. Chips with a second register bank (YM2608, YM2612, YM3438,
//! YMF262) expose it on ports 2/3, which add 0x100 to the address.
//!
//! # Example
//!
//! ```no_run
//! use ymfm::{Chip, EngineConfig, Family};
//!
//! let mut chip = Chip::new(EngineConfig::new(Family::Opn2))?;
//! chip.write_port(0, 0x28);
//! chip.write_port(1, 0xf0);
//! let frames = chip.generate(1024);
//! # Ok::<(), ymfm::FmError>(())
//! ```

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::mixer::OutputFrame;
use crate::Result;

/// Offset applied to addresses latched through the second-bank ports
pub const BANK_OFFSET: u16 = 0x100;

/// Engine plus address latch, driven through the chip's I/O ports
#[derive(Debug, Clone)]
pub struct Chip {
    engine: Engine,
    address: u16,
}

impl Chip {
    /// Create a chip in its power-on state
    pub fn new(config: EngineConfig) -> Result<Self> {
        Ok(Chip {
            engine: Engine::new(config)?,
            address: 0,
        })
    }

    fn has_second_bank(&self) -> bool {
        self.engine.family().register_space > BANK_OFFSET as usize
    }

    /// Write to an I/O port
    pub fn write_port(&mut self, port: u8, value: u8) {
        let high_bank = port & 2 != 0 && self.has_second_bank();

        if port & 1 == 0 {
            let bank = if high_bank { BANK_OFFSET } else { 0 };
            self.address = bank | u16::from(value);
            return;
        }

        // data goes nowhere when the port's bank differs from the latched one
        let latched_high = self.address & BANK_OFFSET != 0;
        if latched_high != high_bank {
            return;
        }
        self.engine.write(self.address, value);
    }

    /// Read from an I/O port: status on even ports, latched register on odd ports
    pub fn read_port(&self, port: u8) -> u8 {
        if port & 1 == 0 {
            self.engine.read_status()
        } else {
            self.engine.read_register(self.address)
        }
    }

    /// Currently latched address, bank offset included
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Reset the engine and clear the address latch
    pub fn reset(&mut self) {
        self.engine.reset();
        self.address = 0;
    }

    /// Generate `count` frames
    pub fn generate(&mut self, count: usize) -> Vec<OutputFrame> {
        self.engine.generate(count)
    }

    /// Current IRQ line level
    pub fn irq(&self) -> bool {
        self.engine.irq()
    }

    /// Underlying engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Underlying engine, mutable
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::Family;

    #[test]
    fn test_address_data_pair() {
        let mut chip = Chip::new(EngineConfig::new(Family::Opm)).unwrap();
        chip.write_port(0, 0x20);
        chip.write_port(1, 0xc7);
        assert_eq!(chip.address(), 0x20);
        assert_eq!(chip.read_port(1), 0xc7);
    }

    #[test]
    fn test_second_bank_offset() {
        let mut chip = Chip::new(EngineConfig::new(Family::Opl3)).unwrap();
        chip.write_port(2, 0x05);
        assert_eq!(chip.address(), 0x105);
        chip.write_port(3, 0x01);
        assert_eq!(chip.engine().read_register(0x105), 0x01);
    }

    #[test]
    fn test_bank_mismatch_dropped() {
        let mut chip = Chip::new(EngineConfig::new(Family::Opn2)).unwrap();
        chip.write_port(2, 0x30);
        chip.write_port(1, 0x71);
        assert_eq!(chip.engine().read_register(0x130), 0);
        assert_eq!(chip.engine().read_register(0x30), 0);
    }

    #[test]
    fn test_single_bank_ignores_port_two() {
        let mut chip = Chip::new(EngineConfig::new(Family::Opn)).unwrap();
        chip.write_port(2, 0x30);
        assert_eq!(chip.address(), 0x30);
        chip.write_port(3, 0x71);
        assert_eq!(chip.engine().read_register(0x30), 0x71);
    }

    #[test]
    fn test_status_on_even_port() {
        let mut chip = Chip::new(EngineConfig::new(Family::Opn)).unwrap();
        chip.engine_mut().set_reset_status(0x02, 0);
        assert_eq!(chip.read_port(0), 0x02);
    }
}
