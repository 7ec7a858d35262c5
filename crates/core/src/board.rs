// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Simulated ATmega328P: register file, Timer0, ports B/D and the overflow
//! interrupt vector.
//!
//! Time only moves when the board is told to run (`run_*`) or when the core
//! sleeps ([`Mcu::wait_for_interrupt`]). Interrupt handlers execute in zero
//! simulated cycles.

use crate::bus::SystemBus;
use crate::firmware::overflow::{timer0_overflow, BlinkState};
use crate::registers::{Mcu, Port, PortPin, Register, RegisterAccess, Sreg};
use crate::signals::DigitalLevel;
use crate::snapshot::BoardSnapshot;
use crate::{SimResult, SimulationError, SimulationObserver};
use std::sync::Arc;
use std::time::Duration;
use timerblink_config::{BoardConfig, PortName, StopReason};

/// The TIMER0_OVF vector.
pub type OverflowIsr = Box<dyn FnMut(&mut Board) + Send>;

const PORTS: [Port; 2] = [Port::B, Port::D];

/// Stop conditions for [`Board::run_limited`]. The first one reached wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLimits {
    pub max_overflows: Option<u64>,
    pub max_cycles: Option<u64>,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub stop_reason: StopReason,
    pub cycles: u64,
    pub overflows: u64,
}

pub struct Board {
    pub bus: SystemBus,
    name: String,
    sreg: u8,
    clock_hz: u64,
    cycles: u64,
    serviced: u64,
    in_isr: bool,
    isr: Option<OverflowIsr>,
    indicator: PortPin,
    indicator_active_high: bool,
    pin_levels: [u8; 2],
    observers: Vec<Arc<dyn SimulationObserver>>,
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("name", &self.name)
            .field("clock_hz", &self.clock_hz)
            .field("cycles", &self.cycles)
            .field("sreg", &self.sreg)
            .field("serviced", &self.serviced)
            .field("isr_attached", &self.isr.is_some())
            .finish()
    }
}

impl Board {
    /// A board in its reset state: every register zero, interrupts off.
    pub fn new(clock_hz: u64) -> SimResult<Self> {
        if clock_hz == 0 {
            return Err(SimulationError::InvalidClock);
        }
        Ok(Self {
            bus: SystemBus::new(),
            name: "atmega328p".to_string(),
            sreg: 0,
            clock_hz,
            cycles: 0,
            serviced: 0,
            in_isr: false,
            isr: None,
            indicator: crate::firmware::INDICATOR,
            indicator_active_high: true,
            pin_levels: [0; 2],
            observers: Vec::new(),
        })
    }

    pub fn from_config(config: &BoardConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let mut board = Self::new(config.clock_hz()?)?;
        board.name = config.name.clone();
        board.indicator = pin_from_binding(config.indicator.port, config.indicator.pin)?;
        board.indicator_active_high = config.indicator.active_high;
        if board.indicator != crate::firmware::INDICATOR {
            tracing::warn!(
                "Board '{}' wires its indicator to {}, but the firmware drives {}",
                board.name,
                board.indicator,
                crate::firmware::INDICATOR
            );
        }
        Ok(board)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clock_hz(&self) -> u64 {
        self.clock_hz
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.cycles_to_secs(self.cycles))
    }

    pub fn cycles_to_secs(&self, cycles: u64) -> f64 {
        cycles as f64 / self.clock_hz as f64
    }

    pub fn duration_to_cycles(&self, duration: Duration) -> u64 {
        let cycles = duration.as_nanos().saturating_mul(self.clock_hz as u128) / 1_000_000_000;
        u64::try_from(cycles).unwrap_or(u64::MAX)
    }

    /// Overflow vectors executed so far.
    pub fn serviced_overflows(&self) -> u64 {
        self.serviced
    }

    pub fn indicator(&self) -> PortPin {
        self.indicator
    }

    /// Whether the indicator LED is lit, honouring its polarity.
    pub fn indicator_lit(&self) -> bool {
        bool::from(self.pin_level(self.indicator)) == self.indicator_active_high
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SimulationObserver>) {
        observer.on_simulation_start(self.clock_hz);
        self.observers.push(observer);
    }

    /// Notify observers that the caller is done with this board.
    pub fn finish(&self) {
        for observer in &self.observers {
            observer.on_simulation_stop(self.cycles);
        }
    }

    pub fn attach_overflow_isr<F>(&mut self, isr: F)
    where
        F: FnMut(&mut Board) + Send + 'static,
    {
        self.isr = Some(Box::new(isr));
    }

    /// Install the blinker's overflow handler as the TIMER0_OVF vector.
    pub fn attach_blinker(&mut self, state: Arc<BlinkState>) {
        self.attach_overflow_isr(move |board| {
            // SAFETY: vectors only run from `service_pending`, which clears SREG.I first.
            unsafe {
                timer0_overflow(&state, board);
            }
        });
    }

    pub fn read_data(&self, addr: u16) -> SimResult<u8> {
        if addr == Register::Sreg.address() {
            return Ok(self.sreg);
        }
        self.bus.read_u8(addr)
    }

    pub fn write_data(&mut self, addr: u16, value: u8) -> SimResult<()> {
        if addr == Register::Sreg.address() {
            self.set_sreg(value);
            return Ok(());
        }
        self.bus.write_u8(addr, value)?;
        self.refresh_pins();
        Ok(())
    }

    pub fn pin_level(&self, pin: PortPin) -> DigitalLevel {
        let levels = self.port(pin.port).levels();
        DigitalLevel::from(levels & pin.mask() != 0)
    }

    /// Drive the input side of a port from outside the chip.
    pub fn drive_inputs(&mut self, port: Port, levels: u8) {
        match port {
            Port::B => self.bus.portb.drive_inputs(levels),
            Port::D => self.bus.portd.drive_inputs(levels),
        }
        self.refresh_pins();
    }

    fn port(&self, port: Port) -> &crate::peripherals::port::IoPort {
        match port {
            Port::B => &self.bus.portb,
            Port::D => &self.bus.portd,
        }
    }

    fn set_sreg(&mut self, value: u8) {
        let was = self.sreg & Sreg::I.bits() != 0;
        self.sreg = value;
        let now = self.sreg & Sreg::I.bits() != 0;
        if was != now && !self.in_isr {
            tracing::debug!(enabled = now, cycle = self.cycles, "global interrupts");
            for observer in &self.observers {
                observer.on_interrupt_enable(now, self.cycles);
            }
        }
    }

    fn refresh_pins(&mut self) {
        for (idx, port) in PORTS.into_iter().enumerate() {
            let levels = self.port(port).levels();
            let changed = levels ^ self.pin_levels[idx];
            if changed == 0 {
                continue;
            }
            self.pin_levels[idx] = levels;
            for bit in (0..8).filter(|b| changed & (1 << b) != 0) {
                let pin = PortPin::new(port, bit);
                let level = DigitalLevel::from(levels & (1 << bit) != 0);
                if pin == self.indicator {
                    tracing::info!(
                        "{} {:?} at {:.6}s",
                        pin,
                        level,
                        self.cycles_to_secs(self.cycles)
                    );
                } else {
                    tracing::debug!("{} {:?} at cycle {}", pin, level, self.cycles);
                }
                for observer in &self.observers {
                    observer.on_pin_change(pin, level, self.cycles);
                }
            }
        }
    }

    /// Take the overflow vector if it is pending and unmasked. Mirrors the AVR
    /// sequence: TOV0 and SREG.I cleared on entry, SREG.I set again by RETI.
    pub fn service_pending(&mut self) -> bool {
        if self.in_isr || !self.interrupts_enabled() || !self.bus.timer0.overflow_pending() {
            return false;
        }

        self.bus.timer0.acknowledge_overflow();
        self.in_isr = true;
        self.sreg &= !Sreg::I.bits();

        match self.isr.take() {
            Some(mut isr) => {
                isr(self);
                self.isr = Some(isr);
            }
            None => tracing::warn!("TIMER0_OVF taken with no handler attached"),
        }

        self.sreg |= Sreg::I.bits();
        self.in_isr = false;
        self.serviced += 1;

        tracing::trace!(cycle = self.cycles, serviced = self.serviced, "TIMER0_OVF");
        for observer in &self.observers {
            observer.on_overflow(self.cycles, self.serviced);
        }
        true
    }

    /// Synthetic overflow: latch TOV0 as if the counter wrapped, then take the
    /// vector if allowed. Simulated time does not move.
    pub fn inject_overflow(&mut self) -> bool {
        self.bus.timer0.force_overflow();
        self.service_pending()
    }

    /// Inject `count` overflows; returns how many vectors ran.
    pub fn inject_overflows(&mut self, count: u64) -> u64 {
        (0..count).filter(|_| self.inject_overflow()).count() as u64
    }

    fn step(&mut self, cycles: u64) {
        self.bus.advance(cycles);
        self.cycles += cycles;
    }

    /// Let `cycles` elapse, servicing each overflow at the cycle it happens.
    /// Returns the number of vectors taken.
    pub fn run_cycles(&mut self, cycles: u64) -> u64 {
        let end = self.cycles + cycles;
        let mut serviced = 0;
        if self.service_pending() {
            serviced += 1;
        }
        while self.cycles < end {
            let remaining = end - self.cycles;
            let step = self
                .bus
                .timer0
                .cycles_until_overflow()
                .map_or(remaining, |n| n.min(remaining));
            self.step(step);
            if self.service_pending() {
                serviced += 1;
            }
        }
        serviced
    }

    pub fn run_for(&mut self, duration: Duration) -> u64 {
        let cycles = self.duration_to_cycles(duration);
        self.run_cycles(cycles)
    }

    fn ensure_overflows_can_fire(&self) -> SimResult<()> {
        if self.bus.timer0.prescaler().is_none() {
            return Err(SimulationError::TimerStopped);
        }
        if !self.bus.timer0.overflow_interrupt_enabled() {
            return Err(SimulationError::InterruptsMasked("TOIE0 is clear"));
        }
        if !self.interrupts_enabled() {
            return Err(SimulationError::InterruptsMasked("SREG.I is clear"));
        }
        Ok(())
    }

    /// Run until `count` overflow vectors have executed. Returns elapsed cycles.
    pub fn run_overflows(&mut self, count: u64) -> SimResult<u64> {
        let start = self.cycles;
        let mut done = 0;
        while done < count {
            if self.service_pending() {
                done += 1;
                continue;
            }
            self.ensure_overflows_can_fire()?;
            let step = self
                .bus
                .timer0
                .cycles_until_overflow()
                .ok_or(SimulationError::TimerStopped)?;
            self.step(step);
        }
        Ok(self.cycles - start)
    }

    /// Run until the first of `limits` is reached.
    pub fn run_limited(&mut self, limits: &RunLimits) -> SimResult<RunOutcome> {
        let start_cycles = self.cycles;
        let start_overflows = self.serviced;

        if *limits == RunLimits::default() {
            tracing::warn!("run_limited called without limits; not running");
            return Ok(RunOutcome {
                stop_reason: StopReason::MaxCycles,
                cycles: 0,
                overflows: 0,
            });
        }

        let duration_cycles = limits.duration.map(|d| self.duration_to_cycles(d));
        let (cycle_budget, cycle_reason) = match (limits.max_cycles, duration_cycles) {
            (Some(c), Some(d)) if d < c => (Some(d), StopReason::Duration),
            (Some(c), _) => (Some(c), StopReason::MaxCycles),
            (None, Some(d)) => (Some(d), StopReason::Duration),
            (None, None) => (None, StopReason::MaxCycles),
        };

        let stop_reason = loop {
            let overflows = self.serviced - start_overflows;
            let elapsed = self.cycles - start_cycles;
            if limits.max_overflows.is_some_and(|m| overflows >= m) {
                break StopReason::MaxOverflows;
            }
            // An overflow landing on the last budgeted cycle still counts.
            if self.service_pending() {
                continue;
            }
            if cycle_budget.is_some_and(|b| elapsed >= b) {
                break cycle_reason;
            }

            let next = self.bus.timer0.cycles_until_overflow();
            let step = match (next, cycle_budget) {
                (Some(n), Some(b)) => n.min(b - elapsed),
                (Some(n), None) => {
                    self.ensure_overflows_can_fire()?;
                    n
                }
                (None, Some(b)) => b - elapsed,
                (None, None) => return Err(SimulationError::TimerStopped),
            };
            self.step(step);
        };

        let outcome = RunOutcome {
            stop_reason,
            cycles: self.cycles - start_cycles,
            overflows: self.serviced - start_overflows,
        };
        tracing::info!(
            "run stopped ({:?}) after {} cycles, {} overflows",
            outcome.stop_reason,
            outcome.cycles,
            outcome.overflows
        );
        Ok(outcome)
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            name: self.name.clone(),
            clock_hz: self.clock_hz,
            cycles: self.cycles,
            elapsed_secs: self.cycles_to_secs(self.cycles),
            sreg: self.sreg,
            interrupts_enabled: self.interrupts_enabled(),
            serviced_overflows: self.serviced,
            peripherals: self.bus.snapshot(),
        }
    }
}

pub fn pin_from_binding(port: PortName, pin: u8) -> SimResult<PortPin> {
    let (port, letter) = match port {
        PortName::B => (Port::B, 'B'),
        PortName::D => (Port::D, 'D'),
    };
    if pin > 7 {
        return Err(SimulationError::InvalidPin {
            port: letter,
            bit: pin,
        });
    }
    Ok(PortPin::new(port, pin))
}

impl RegisterAccess for Board {
    fn read(&self, reg: Register) -> u8 {
        self.read_data(reg.address()).unwrap_or_else(|e| {
            tracing::error!("read of {} failed: {}", reg, e);
            0
        })
    }

    fn write(&mut self, reg: Register, value: u8) {
        if let Err(e) = self.write_data(reg.address(), value) {
            tracing::error!("write of {} failed: {}", reg, e);
        }
    }
}

impl Mcu for Board {
    /// Sleep: skip straight to the next overflow and take it.
    fn wait_for_interrupt(&mut self) {
        if self.service_pending() {
            return;
        }
        match self.bus.timer0.cycles_until_overflow() {
            Some(step) => {
                self.step(step);
                self.service_pending();
            }
            None => tracing::warn!("sleeping with Timer0 stopped; nothing can wake the core"),
        }
    }
}
