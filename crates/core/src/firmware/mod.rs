// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The blinker itself: Timer0 overflows drive the indicator LED.
//!
//! After [`setup`] the foreground does nothing; every toggle happens in
//! [`overflow::timer0_overflow`].

pub mod io;
pub mod overflow;
pub mod prescaler;
pub mod timer;

pub use io::configure_io;
pub use overflow::{timer0_overflow, BlinkState};
pub use prescaler::{configure_prescaler, Prescaler};
pub use timer::configure_timer;

use crate::registers::{Mcu, Port, PortPin};
use serde::Serialize;

/// Arduino Uno "L" LED.
pub const INDICATOR: PortPin = PortPin::new(Port::B, 5);

/// Overflows per indicator toggle.
pub const OVERFLOW_THRESHOLD: u32 = 40;

/// Selector used while the timer is first brought up (divide by 1024).
pub const BOOT_PRESCALER_SELECTOR: u8 = 5;

/// Selector the blinker runs with (divide by 256).
pub const RUN_PRESCALER_SELECTOR: u8 = 4;

pub const CPU_FREQ_HZ: u64 = 16_000_000;

/// Timer0 is 8 bits wide.
pub const COUNTER_STEPS: u64 = 256;

/// One-time bring-up. Interrupts are enabled last so no overflow can hit a
/// half-configured pin.
pub fn setup<M: Mcu>(mcu: &mut M) -> Prescaler {
    configure_io(mcu, INDICATOR);
    configure_timer(mcu, BOOT_PRESCALER_SELECTOR);
    let prescaler = configure_prescaler(mcu, RUN_PRESCALER_SELECTOR);
    mcu.enable_interrupts();
    tracing::info!(
        pin = %INDICATOR,
        divisor = prescaler.divisor(),
        threshold = OVERFLOW_THRESHOLD,
        "blinker running"
    );
    prescaler
}

/// Firmware entry: set up, then sleep between interrupts forever.
pub fn main_loop<M: Mcu>(mcu: &mut M) -> ! {
    setup(mcu);
    loop {
        mcu.wait_for_interrupt();
    }
}

/// Periods derived from clock, prescaler and overflow threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlinkTiming {
    pub clock_hz: u64,
    pub prescaler: Prescaler,
    pub threshold: u32,
}

impl BlinkTiming {
    pub const fn new(clock_hz: u64, prescaler: Prescaler, threshold: u32) -> Self {
        Self {
            clock_hz,
            prescaler,
            threshold,
        }
    }

    /// The compiled-in configuration at `clock_hz`.
    pub const fn firmware(clock_hz: u64) -> Self {
        Self::new(
            clock_hz,
            Prescaler::from_selector(RUN_PRESCALER_SELECTOR),
            OVERFLOW_THRESHOLD,
        )
    }

    pub const fn cycles_per_overflow(&self) -> u64 {
        COUNTER_STEPS * self.prescaler.divisor() as u64
    }

    pub const fn cycles_per_toggle(&self) -> u64 {
        self.cycles_per_overflow() * self.threshold as u64
    }

    pub fn overflow_hz(&self) -> f64 {
        self.clock_hz as f64 / self.cycles_per_overflow() as f64
    }

    /// Time the indicator spends in one state.
    pub fn toggle_period_secs(&self) -> f64 {
        self.cycles_per_toggle() as f64 / self.clock_hz as f64
    }

    /// One full on/off cycle.
    pub fn blink_period_secs(&self) -> f64 {
        2.0 * self.toggle_period_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{Register, RegisterAccess};
    use std::cell::Cell;

    struct CountingMcu {
        regs: [u8; 0x100],
        waits: Cell<u32>,
    }

    impl RegisterAccess for CountingMcu {
        fn read(&self, reg: Register) -> u8 {
            self.regs[reg.address() as usize]
        }

        fn write(&mut self, reg: Register, value: u8) {
            self.regs[reg.address() as usize] = value;
        }
    }

    impl Mcu for CountingMcu {
        fn wait_for_interrupt(&mut self) {
            self.waits.set(self.waits.get() + 1);
            if self.waits.get() == 3 {
                panic!("third sleep");
            }
        }
    }

    #[test]
    fn test_reference_timing() {
        let timing = BlinkTiming::firmware(CPU_FREQ_HZ);
        assert_eq!(timing.cycles_per_overflow(), 65_536);
        assert_eq!(timing.cycles_per_toggle(), 2_621_440);
        assert!((timing.toggle_period_secs() - 0.16384).abs() < 1e-9);
        assert!((timing.blink_period_secs() - 0.32768).abs() < 1e-9);
        assert!((timing.overflow_hz() - 244.140625).abs() < 1e-9);
    }

    #[test]
    fn test_main_loop_sets_up_then_only_sleeps() {
        let mut mcu = CountingMcu {
            regs: [0xFF; 0x100],
            waits: Cell::new(0),
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            main_loop(&mut mcu);
        }));
        assert!(result.is_err());
        assert_eq!(mcu.waits.get(), 3);
        assert_eq!(mcu.read(Register::Ddrb), 0x20);
        assert_eq!(mcu.read(Register::Tccr0b), 0x04);
        assert_eq!(mcu.read(Register::Timsk0), 0x01);
        assert!(mcu.interrupts_enabled());
    }
}
