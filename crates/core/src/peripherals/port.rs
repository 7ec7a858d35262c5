// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::SimResult;

pub const PIN: u16 = 0;
pub const DDR: u16 = 1;
pub const PORT: u16 = 2;

/// AVR digital I/O port (PINx / DDRx / PORTx).
#[derive(Debug, Default, serde::Serialize)]
pub struct IoPort {
    ddr: u8,  // 1 = output
    port: u8, // output latch, or pull-up enable for inputs
    input: u8, // externally driven levels
}

impl IoPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Physical pin levels: the latch for outputs, the external level for inputs.
    pub fn levels(&self) -> u8 {
        (self.port & self.ddr) | (self.input & !self.ddr)
    }

    /// Set the levels external circuitry drives onto the pins.
    pub fn drive_inputs(&mut self, levels: u8) {
        self.input = levels;
    }

    pub fn direction(&self) -> u8 {
        self.ddr
    }

    pub fn latch(&self) -> u8 {
        self.port
    }
}

impl crate::Peripheral for IoPort {
    fn read(&self, offset: u16) -> SimResult<u8> {
        Ok(match offset {
            PIN => self.levels(),
            DDR => self.ddr,
            PORT => self.port,
            _ => 0,
        })
    }

    fn write(&mut self, offset: u16, value: u8) -> SimResult<()> {
        match offset {
            // Writing ones to PINx toggles the matching PORTx bits.
            PIN => self.port ^= value,
            DDR => self.ddr = value,
            PORT => self.port = value,
            _ => {}
        }
        Ok(())
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
