// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::registers::{PortPin, Register, RegisterAccess};

/// Every pin on ports B and D becomes an input, then `output` alone is
/// switched to output and its port is driven low.
pub fn configure_io<R: RegisterAccess>(regs: &mut R, output: PortPin) {
    regs.write(Register::Ddrd, 0x00);
    regs.write(Register::Ddrb, 0x00);

    regs.write(output.port.direction_register(), output.mask());
    regs.write(output.port.data_register(), 0x00);

    tracing::debug!(pin = %output, "indicator configured as output, driven low");
}
