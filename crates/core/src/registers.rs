// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Typed access to the ATmega328P registers the blinker touches.
//!
//! Firmware logic only ever talks to [`RegisterAccess`] / [`Mcu`], so the same
//! code drives the real chip ([`crate::mmio::VolatileMcu`]) and the simulated
//! one ([`crate::board::Board`]).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Memory-mapped registers, addressed in the AVR data space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Register {
    Pinb,
    Ddrb,
    Portb,
    Pind,
    Ddrd,
    Portd,
    Tifr0,
    Tccr0a,
    Tccr0b,
    Tcnt0,
    Ocr0a,
    Ocr0b,
    Sreg,
    Timsk0,
}

impl Register {
    pub const ALL: [Register; 14] = [
        Register::Pinb,
        Register::Ddrb,
        Register::Portb,
        Register::Pind,
        Register::Ddrd,
        Register::Portd,
        Register::Tifr0,
        Register::Tccr0a,
        Register::Tccr0b,
        Register::Tcnt0,
        Register::Ocr0a,
        Register::Ocr0b,
        Register::Sreg,
        Register::Timsk0,
    ];

    /// Data-space address (I/O address + 0x20 for the low I/O range).
    pub const fn address(self) -> u16 {
        match self {
            Register::Pinb => 0x23,
            Register::Ddrb => 0x24,
            Register::Portb => 0x25,
            Register::Pind => 0x29,
            Register::Ddrd => 0x2A,
            Register::Portd => 0x2B,
            Register::Tifr0 => 0x35,
            Register::Tccr0a => 0x44,
            Register::Tccr0b => 0x45,
            Register::Tcnt0 => 0x46,
            Register::Ocr0a => 0x47,
            Register::Ocr0b => 0x48,
            Register::Sreg => 0x5F,
            Register::Timsk0 => 0x6E,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Register::Pinb => "PINB",
            Register::Ddrb => "DDRB",
            Register::Portb => "PORTB",
            Register::Pind => "PIND",
            Register::Ddrd => "DDRD",
            Register::Portd => "PORTD",
            Register::Tifr0 => "TIFR0",
            Register::Tccr0a => "TCCR0A",
            Register::Tccr0b => "TCCR0B",
            Register::Tcnt0 => "TCNT0",
            Register::Ocr0a => "OCR0A",
            Register::Ocr0b => "OCR0B",
            Register::Sreg => "SREG",
            Register::Timsk0 => "TIMSK0",
        }
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Timer/Counter0 control register A.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Tccr0a: u8 {
        const COM0A1 = 1 << 7;
        const COM0A0 = 1 << 6;
        const COM0B1 = 1 << 5;
        const COM0B0 = 1 << 4;
        const WGM01 = 1 << 1;
        const WGM00 = 1 << 0;
    }
}

bitflags! {
    /// Timer/Counter0 control register B.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Tccr0b: u8 {
        const FOC0A = 1 << 7;
        const FOC0B = 1 << 6;
        const WGM02 = 1 << 3;
        const CS02 = 1 << 2;
        const CS01 = 1 << 1;
        const CS00 = 1 << 0;

        const CLOCK_SELECT = Self::CS02.bits() | Self::CS01.bits() | Self::CS00.bits();
    }
}

bitflags! {
    /// Timer/Counter0 interrupt mask register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Timsk0: u8 {
        const OCIE0B = 1 << 2;
        const OCIE0A = 1 << 1;
        const TOIE0 = 1 << 0;
    }
}

bitflags! {
    /// Timer/Counter0 interrupt flag register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Tifr0: u8 {
        const OCF0B = 1 << 2;
        const OCF0A = 1 << 1;
        const TOV0 = 1 << 0;
    }
}

bitflags! {
    /// Status register. Only the global interrupt enable matters here.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sreg: u8 {
        const I = 1 << 7;
        const T = 1 << 6;
        const H = 1 << 5;
        const S = 1 << 4;
        const V = 1 << 3;
        const N = 1 << 2;
        const Z = 1 << 1;
        const C = 1 << 0;
    }
}

/// One of the two port groups the blinker configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Port {
    B,
    D,
}

impl Port {
    pub const fn pin_register(self) -> Register {
        match self {
            Port::B => Register::Pinb,
            Port::D => Register::Pind,
        }
    }

    pub const fn direction_register(self) -> Register {
        match self {
            Port::B => Register::Ddrb,
            Port::D => Register::Ddrd,
        }
    }

    pub const fn data_register(self) -> Register {
        match self {
            Port::B => Register::Portb,
            Port::D => Register::Portd,
        }
    }
}

/// A single I/O pin, e.g. PB5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortPin {
    pub port: Port,
    pub bit: u8,
}

impl PortPin {
    /// Panics at compile time (in const context) if `bit` is not 0..=7.
    pub const fn new(port: Port, bit: u8) -> Self {
        assert!(bit < 8, "AVR ports are 8 bits wide");
        Self { port, bit }
    }

    pub const fn mask(self) -> u8 {
        1 << self.bit
    }
}

impl std::fmt::Display for PortPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let port = match self.port {
            Port::B => 'B',
            Port::D => 'D',
        };
        write!(f, "P{}{}", port, self.bit)
    }
}

/// Byte-wide register access with read-modify-write helpers.
pub trait RegisterAccess {
    fn read(&self, reg: Register) -> u8;
    fn write(&mut self, reg: Register, value: u8);

    fn modify<F>(&mut self, reg: Register, f: F)
    where
        F: FnOnce(u8) -> u8,
        Self: Sized,
    {
        let value = self.read(reg);
        self.write(reg, f(value));
    }

    fn set_bits(&mut self, reg: Register, mask: u8)
    where
        Self: Sized,
    {
        self.modify(reg, |v| v | mask);
    }

    fn clear_bits(&mut self, reg: Register, mask: u8)
    where
        Self: Sized,
    {
        self.modify(reg, |v| v & !mask);
    }

    fn toggle_bits(&mut self, reg: Register, mask: u8)
    where
        Self: Sized,
    {
        self.modify(reg, |v| v ^ mask);
    }
}

/// A microcontroller: registers plus the global interrupt flag and a sleep
/// primitive.
pub trait Mcu: RegisterAccess {
    /// `sei`
    fn enable_interrupts(&mut self) {
        let sreg = self.read(Register::Sreg);
        self.write(Register::Sreg, sreg | Sreg::I.bits());
    }

    /// `cli`
    fn disable_interrupts(&mut self) {
        let sreg = self.read(Register::Sreg);
        self.write(Register::Sreg, sreg & !Sreg::I.bits());
    }

    fn interrupts_enabled(&self) -> bool {
        Sreg::from_bits_retain(self.read(Register::Sreg)).contains(Sreg::I)
    }

    /// Idle until the next interrupt has been serviced.
    fn wait_for_interrupt(&mut self) {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Regs([u8; 0x100]);

    impl RegisterAccess for Regs {
        fn read(&self, reg: Register) -> u8 {
            self.0[reg.address() as usize]
        }

        fn write(&mut self, reg: Register, value: u8) {
            self.0[reg.address() as usize] = value;
        }
    }

    impl Default for Regs {
        fn default() -> Self {
            Regs([0; 0x100])
        }
    }

    impl Mcu for Regs {}

    #[test]
    fn test_addresses_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for reg in Register::ALL {
            assert!(seen.insert(reg.address()), "{} shares an address", reg);
        }
    }

    #[test]
    fn test_bit_helpers_only_touch_masked_bits() {
        let mut regs = Regs::default();
        regs.write(Register::Portb, 0b1010_0000);

        regs.set_bits(Register::Portb, 0b0000_0001);
        assert_eq!(regs.read(Register::Portb), 0b1010_0001);

        regs.clear_bits(Register::Portb, 0b1000_0000);
        assert_eq!(regs.read(Register::Portb), 0b0010_0001);

        regs.toggle_bits(Register::Portb, 0b0010_0010);
        assert_eq!(regs.read(Register::Portb), 0b0000_0011);
    }

    #[test]
    fn test_interrupt_flag_lives_in_sreg_bit7() {
        let mut regs = Regs::default();
        regs.write(Register::Sreg, Sreg::C.bits());
        assert!(!regs.interrupts_enabled());

        regs.enable_interrupts();
        assert_eq!(regs.read(Register::Sreg), 0x81);
        assert!(regs.interrupts_enabled());

        regs.disable_interrupts();
        assert_eq!(regs.read(Register::Sreg), 0x01);
    }

    #[test]
    fn test_port_pin_display_and_mask() {
        let led = PortPin::new(Port::B, 5);
        assert_eq!(led.to_string(), "PB5");
        assert_eq!(led.mask(), 0x20);
        assert_eq!(led.port.data_register(), Register::Portb);
    }
}
