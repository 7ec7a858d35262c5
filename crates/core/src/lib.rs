// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod board;
pub mod bus;
pub mod critical;
pub mod firmware;
pub mod mmio;
pub mod peripherals;
pub mod registers;
pub mod signals;
pub mod snapshot;


pub use board::Board;
pub use registers::{Mcu, Port, PortPin, Register, RegisterAccess};

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("No register mapped at data address {0:#04x}")]
    UnmappedAddress(u16),
    #[error("Timer0 has no clock source selected")]
    TimerStopped,
    #[error("Overflow interrupt cannot fire: {0}")]
    InterruptsMasked(&'static str),
    #[error("Invalid pin {port}{bit}: AVR ports are 8 bits wide")]
    InvalidPin { port: char, bit: u8 },
    #[error("Board clock must be above 0 Hz")]
    InvalidClock,
}

pub type SimResult<T> = Result<T, SimulationError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeripheralTickResult {
    /// Interrupt request line level after the advance.
    pub irq: bool,
    /// Events (e.g. counter wraps) that happened during the advance.
    pub events: u64,
}

/// Trait for observing simulation events in a modular way.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_simulation_start(&self, _clock_hz: u64) {}
    fn on_simulation_stop(&self, _cycle: u64) {}
    fn on_overflow(&self, _cycle: u64, _serviced: u64) {}
    fn on_pin_change(&self, _pin: PortPin, _level: signals::DigitalLevel, _cycle: u64) {}
    fn on_interrupt_enable(&self, _enabled: bool, _cycle: u64) {}
}

/// Trait representing a memory-mapped peripheral
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u16) -> SimResult<u8>;
    fn write(&mut self, offset: u16, value: u8) -> SimResult<()>;
    /// Let `cycles` CPU clock cycles elapse.
    fn advance(&mut self, _cycles: u64) -> PeripheralTickResult {
        PeripheralTickResult::default()
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}
