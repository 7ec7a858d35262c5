// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::peripherals::port::IoPort;
use crate::peripherals::timer0::{self, Timer0};
use crate::{Peripheral, PeripheralTickResult, SimResult, SimulationError};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    PortB,
    PortD,
    Timer0,
}

/// One address window of a peripheral.
#[derive(Debug, Clone, Copy)]
struct Mapping {
    base: u16,
    size: u16,
    offset: u16,
    target: Target,
}

const MEMORY_MAP: [Mapping; 5] = [
    Mapping {
        base: 0x23,
        size: 3,
        offset: 0,
        target: Target::PortB,
    },
    Mapping {
        base: 0x29,
        size: 3,
        offset: 0,
        target: Target::PortD,
    },
    Mapping {
        base: 0x35,
        size: 1,
        offset: timer0::TIFR0,
        target: Target::Timer0,
    },
    Mapping {
        base: 0x44,
        size: 5,
        offset: timer0::TCCR0A,
        target: Target::Timer0,
    },
    Mapping {
        base: 0x6E,
        size: 1,
        offset: timer0::TIMSK0,
        target: Target::Timer0,
    },
];

/// I/O data space of the simulated ATmega328P (everything but SREG).
#[derive(Debug, Default)]
pub struct SystemBus {
    pub portb: IoPort,
    pub portd: IoPort,
    pub timer0: Timer0,
}

impl SystemBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(addr: u16) -> SimResult<(Target, u16)> {
        MEMORY_MAP
            .iter()
            .find(|m| (m.base..m.base + m.size).contains(&addr))
            .map(|m| (m.target, m.offset + (addr - m.base)))
            .ok_or(SimulationError::UnmappedAddress(addr))
    }

    fn device(&self, target: Target) -> &dyn Peripheral {
        match target {
            Target::PortB => &self.portb,
            Target::PortD => &self.portd,
            Target::Timer0 => &self.timer0,
        }
    }

    fn device_mut(&mut self, target: Target) -> &mut dyn Peripheral {
        match target {
            Target::PortB => &mut self.portb,
            Target::PortD => &mut self.portd,
            Target::Timer0 => &mut self.timer0,
        }
    }

    pub fn read_u8(&self, addr: u16) -> SimResult<u8> {
        let (target, offset) = Self::resolve(addr)?;
        self.device(target).read(offset)
    }

    pub fn write_u8(&mut self, addr: u16, value: u8) -> SimResult<()> {
        let (target, offset) = Self::resolve(addr)?;
        tracing::trace!("write {:#04x} <- {:#04x}", addr, value);
        self.device_mut(target).write(offset, value)
    }

    /// Advance every clocked peripheral. Only Timer0 is clocked.
    pub fn advance(&mut self, cycles: u64) -> PeripheralTickResult {
        self.timer0.advance(cycles)
    }

    pub fn snapshot(&self) -> BTreeMap<String, serde_json::Value> {
        [
            ("portb", Target::PortB),
            ("portd", Target::PortD),
            ("timer0", Target::Timer0),
        ]
        .into_iter()
        .map(|(name, target)| (name.to_string(), self.device(target).snapshot()))
        .collect()
    }
}
