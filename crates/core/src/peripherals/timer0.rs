// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::firmware::prescaler::Prescaler;
use crate::firmware::COUNTER_STEPS;
use crate::registers::{Tccr0b, Tifr0, Timsk0};
use crate::{PeripheralTickResult, SimResult};

// Register offsets inside the peripheral. The bus maps the three disjoint
// address windows (TIFR0, TCCR0A..OCR0B, TIMSK0) onto these.
pub const TIFR0: u16 = 0;
pub const TCCR0A: u16 = 1;
pub const TCCR0B: u16 = 2;
pub const TCNT0: u16 = 3;
pub const OCR0A: u16 = 4;
pub const OCR0B: u16 = 5;
pub const TIMSK0: u16 = 6;

/// ATmega328P 8-bit Timer/Counter0, normal mode.
#[derive(Debug, Default, serde::Serialize)]
pub struct Timer0 {
    tccr0a: u8,
    tccr0b: u8,
    tcnt0: u8,
    ocr0a: u8,
    ocr0b: u8,
    timsk0: u8,
    tifr0: u8,

    // Internal state
    prescale_count: u32,
    overflows: u64,
}

impl Timer0 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selected clock divider, `None` when stopped or clocked from T0.
    pub fn prescaler(&self) -> Option<Prescaler> {
        Prescaler::from_clock_select(self.tccr0b)
    }

    pub fn counter(&self) -> u8 {
        self.tcnt0
    }

    /// Total counter wraps, including injected ones.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// TOV0 latched and TOIE0 set.
    pub fn overflow_pending(&self) -> bool {
        Tifr0::from_bits_retain(self.tifr0).contains(Tifr0::TOV0)
            && self.overflow_interrupt_enabled()
    }

    pub fn overflow_interrupt_enabled(&self) -> bool {
        Timsk0::from_bits_retain(self.timsk0).contains(Timsk0::TOIE0)
    }

    /// Hardware clears TOV0 when the overflow vector is taken.
    pub fn acknowledge_overflow(&mut self) {
        self.tifr0 &= !Tifr0::TOV0.bits();
    }

    /// Latch an overflow without the counter wrapping.
    pub fn force_overflow(&mut self) {
        self.tifr0 |= Tifr0::TOV0.bits();
        self.overflows += 1;
    }

    /// CPU cycles until the counter next wraps.
    pub fn cycles_until_overflow(&self) -> Option<u64> {
        let divisor = self.prescaler()?.divisor() as u64;
        let ticks_left = COUNTER_STEPS - self.tcnt0 as u64;
        Some(ticks_left * divisor - self.prescale_count as u64)
    }

    fn read_reg(&self, offset: u16) -> u8 {
        match offset {
            TIFR0 => self.tifr0,
            TCCR0A => self.tccr0a,
            TCCR0B => self.tccr0b,
            TCNT0 => self.tcnt0,
            OCR0A => self.ocr0a,
            OCR0B => self.ocr0b,
            TIMSK0 => self.timsk0,
            _ => 0,
        }
    }

    fn write_reg(&mut self, offset: u16, value: u8) {
        match offset {
            // Flags are cleared by writing a logic one.
            TIFR0 => self.tifr0 &= !(value & 0x07),
            TCCR0A => self.tccr0a = value & 0xF3,
            TCCR0B => {
                // FOC0A/FOC0B are strobes and always read back as zero.
                let value = value & (Tccr0b::WGM02 | Tccr0b::CLOCK_SELECT).bits();
                let cs = Tccr0b::CLOCK_SELECT.bits();
                if (value & cs) != (self.tccr0b & cs) {
                    self.prescale_count = 0;
                    if matches!(value & cs, 0b110 | 0b111) {
                        tracing::warn!("Timer0 external clock source selected; counter will not advance");
                    }
                }
                self.tccr0b = value;
            }
            TCNT0 => self.tcnt0 = value,
            OCR0A => self.ocr0a = value,
            OCR0B => self.ocr0b = value,
            TIMSK0 => self.timsk0 = value & 0x07,
            _ => {}
        }
    }
}

impl crate::Peripheral for Timer0 {
    fn read(&self, offset: u16) -> SimResult<u8> {
        Ok(self.read_reg(offset))
    }

    fn write(&mut self, offset: u16, value: u8) -> SimResult<()> {
        self.write_reg(offset, value);
        Ok(())
    }

    fn advance(&mut self, cycles: u64) -> PeripheralTickResult {
        let Some(prescaler) = self.prescaler() else {
            return PeripheralTickResult::default();
        };
        let divisor = prescaler.divisor() as u64;

        let total = self.prescale_count as u64 + cycles;
        let ticks = total / divisor;
        self.prescale_count = (total % divisor) as u32;

        let count = self.tcnt0 as u64 + ticks;
        let wraps = count / COUNTER_STEPS;
        self.tcnt0 = (count % COUNTER_STEPS) as u8;

        if wraps > 0 {
            self.tifr0 |= Tifr0::TOV0.bits();
            self.overflows += wraps;
        }

        PeripheralTickResult {
            irq: self.overflow_pending(),
            events: wraps,
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Peripheral;

    fn running(selector: u8) -> Timer0 {
        let mut tim = Timer0::new();
        let cs = Prescaler::from_selector(selector).clock_select().bits();
        tim.write(TCCR0B, cs).unwrap();
        tim
    }

    #[test]
    fn test_stopped_timer_does_not_count() {
        let mut tim = Timer0::new();
        let res = tim.advance(1_000_000);
        assert_eq!(res.events, 0);
        assert_eq!(tim.counter(), 0);
        assert_eq!(tim.cycles_until_overflow(), None);
    }

    #[test]
    fn test_overflow_every_256_prescaled_ticks() {
        let mut tim = running(4);
        assert_eq!(tim.cycles_until_overflow(), Some(65_536));

        let res = tim.advance(65_535);
        assert_eq!(res.events, 0);
        assert_eq!(tim.counter(), 255);
        assert_eq!(tim.cycles_until_overflow(), Some(1));

        let res = tim.advance(1);
        assert_eq!(res.events, 1);
        assert_eq!(tim.counter(), 0);
        assert_eq!(tim.read(TIFR0).unwrap() & 0x01, 0x01);
    }

    #[test]
    fn test_prescaler_remainder_carries_over() {
        let mut tim = running(2); // /8
        tim.advance(7);
        assert_eq!(tim.counter(), 0);
        tim.advance(1);
        assert_eq!(tim.counter(), 1);
        assert_eq!(tim.cycles_until_overflow(), Some(255 * 8));
    }

    #[test]
    fn test_irq_needs_toie0() {
        let mut tim = running(1);
        assert!(!tim.advance(256).irq);
        tim.write(TIMSK0, Timsk0::TOIE0.bits()).unwrap();
        assert!(tim.overflow_pending());
    }

    #[test]
    fn test_tifr0_write_one_clears() {
        let mut tim = running(1);
        tim.write(TIMSK0, 0x01).unwrap();
        tim.advance(256);
        assert!(tim.overflow_pending());

        tim.write(TIFR0, 0x00).unwrap();
        assert!(tim.overflow_pending());
        tim.write(TIFR0, 0x01).unwrap();
        assert!(!tim.overflow_pending());
    }

    #[test]
    fn test_foc_bits_read_as_zero() {
        let mut tim = Timer0::new();
        tim.write(TCCR0B, 0b1100_1100).unwrap();
        assert_eq!(tim.read(TCCR0B).unwrap(), 0b0000_1100);
    }

    #[test]
    fn test_external_clock_counts_as_stopped() {
        let mut tim = Timer0::new();
        tim.write(TCCR0B, 0b111).unwrap();
        assert_eq!(tim.prescaler(), None);
        assert_eq!(tim.advance(10_000).events, 0);
    }
}
