// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::registers::{Register, RegisterAccess, Tccr0b};
use serde::Serialize;

/// Timer0 clock divider, selected by the `CS02:CS00` bits of TCCR0B.
///
/// | selector | CS02 | CS01 | CS00 | divisor |
/// |----------|------|------|------|---------|
/// | other    |  0   |  0   |  1   |    1    |
/// | 2        |  0   |  1   |  0   |    8    |
/// | 3        |  0   |  1   |  1   |   64    |
/// | 4        |  1   |  0   |  0   |  256    |
/// | 5        |  1   |  0   |  1   | 1024    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Prescaler {
    Div1,
    Div8,
    Div64,
    Div256,
    Div1024,
}

impl Prescaler {
    pub const ALL: [Prescaler; 5] = [
        Prescaler::Div1,
        Prescaler::Div8,
        Prescaler::Div64,
        Prescaler::Div256,
        Prescaler::Div1024,
    ];

    /// Unrecognized selectors fall back to [`Prescaler::Div1`] without complaint.
    pub const fn from_selector(selector: u8) -> Self {
        match Self::try_from_selector(selector) {
            Some(prescaler) => prescaler,
            None => Prescaler::Div1,
        }
    }

    /// Strict variant of [`Prescaler::from_selector`]. Selector 1 is the
    /// canonical code for divide-by-one.
    pub const fn try_from_selector(selector: u8) -> Option<Self> {
        match selector {
            1 => Some(Prescaler::Div1),
            2 => Some(Prescaler::Div8),
            3 => Some(Prescaler::Div64),
            4 => Some(Prescaler::Div256),
            5 => Some(Prescaler::Div1024),
            _ => None,
        }
    }

    pub const fn selector(self) -> u8 {
        match self {
            Prescaler::Div1 => 1,
            Prescaler::Div8 => 2,
            Prescaler::Div64 => 3,
            Prescaler::Div256 => 4,
            Prescaler::Div1024 => 5,
        }
    }

    pub const fn divisor(self) -> u32 {
        match self {
            Prescaler::Div1 => 1,
            Prescaler::Div8 => 8,
            Prescaler::Div64 => 64,
            Prescaler::Div256 => 256,
            Prescaler::Div1024 => 1024,
        }
    }

    pub const fn clock_select(self) -> Tccr0b {
        match self {
            Prescaler::Div1 => Tccr0b::CS00,
            Prescaler::Div8 => Tccr0b::CS01,
            Prescaler::Div64 => Tccr0b::CS01.union(Tccr0b::CS00),
            Prescaler::Div256 => Tccr0b::CS02,
            Prescaler::Div1024 => Tccr0b::CS02.union(Tccr0b::CS00),
        }
    }

    /// Decode the clock-select field. `None` for "no clock" and the external
    /// T0 pin sources.
    pub fn from_clock_select(tccr0b: u8) -> Option<Self> {
        let cs = Tccr0b::from_bits_retain(tccr0b) & Tccr0b::CLOCK_SELECT;
        Self::ALL.into_iter().find(|p| p.clock_select() == cs)
    }
}

/// Program TCCR0B's clock-select bits for `selector`. All three bits are
/// rewritten; every other bit of the register is preserved.
pub fn configure_prescaler<R: RegisterAccess>(regs: &mut R, selector: u8) -> Prescaler {
    let prescaler = Prescaler::from_selector(selector);
    let cs = prescaler.clock_select().bits();
    regs.modify(Register::Tccr0b, |v| (v & !Tccr0b::CLOCK_SELECT.bits()) | cs);
    tracing::debug!(
        selector,
        divisor = prescaler.divisor(),
        "Timer0 prescaler selected"
    );
    prescaler
}
