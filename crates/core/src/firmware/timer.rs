// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::prescaler::{configure_prescaler, Prescaler};
use crate::registers::{Register, RegisterAccess, Timsk0};

/// Put Timer0 in free-running normal mode with the overflow interrupt as its
/// only enabled source. The counter starts as soon as the prescaler is set.
pub fn configure_timer<R: RegisterAccess>(regs: &mut R, selector: u8) -> Prescaler {
    // Stopped, normal waveform mode, outputs disconnected.
    regs.write(Register::Tccr0a, 0x00);
    regs.write(Register::Tccr0b, 0x00);

    let prescaler = configure_prescaler(regs, selector);

    regs.write(Register::Timsk0, 0x00);
    regs.set_bits(Register::Timsk0, Timsk0::TOIE0.bits());

    tracing::debug!(
        divisor = prescaler.divisor(),
        "Timer0 configured for overflow interrupts"
    );
    prescaler
}
