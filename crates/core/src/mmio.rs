// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::registers::{Mcu, Register, RegisterAccess};
use core::ptr::{read_volatile, write_volatile};

/// Hardware-backed register access through volatile loads and stores.
///
/// Every register lives at `base + Register::address()`. On the real chip the
/// data space starts at address zero, see [`VolatileMcu::atmega328p`].
#[derive(Debug)]
pub struct VolatileMcu {
    base: *mut u8,
}

impl VolatileMcu {
    /// # Safety
    ///
    /// `base..base + 0x100` must be valid for volatile reads and writes for the
    /// lifetime of the returned value, and nothing else may hold a `&mut` to it.
    pub const unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }

    /// # Safety
    ///
    /// Only sound on an ATmega328P, and only once: the caller takes ownership of
    /// every register the blinker touches.
    pub unsafe fn atmega328p() -> Self {
        Self::new(core::ptr::null_mut())
    }

    fn ptr(&self, reg: Register) -> *mut u8 {
        self.base.wrapping_add(reg.address() as usize)
    }
}

impl RegisterAccess for VolatileMcu {
    fn read(&self, reg: Register) -> u8 {
        // SAFETY: validity of the register window is the constructor's contract.
        unsafe { read_volatile(self.ptr(reg)) }
    }

    fn write(&mut self, reg: Register, value: u8) {
        // SAFETY: as above.
        unsafe { write_volatile(self.ptr(reg), value) }
    }
}

impl Mcu for VolatileMcu {}
