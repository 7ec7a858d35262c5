// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{INDICATOR, OVERFLOW_THRESHOLD};
use crate::critical;
use crate::registers::{Mcu, RegisterAccess};
use core::cell::Cell;
use critical_section::{CriticalSection, Mutex};

/// State shared between the foreground flow and the Timer0 overflow handler.
pub struct BlinkState {
    overflows: Mutex<Cell<u32>>,
}

impl core::fmt::Debug for BlinkState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlinkState").finish_non_exhaustive()
    }
}

impl Default for BlinkState {
    fn default() -> Self {
        Self::new()
    }
}

impl BlinkState {
    pub const fn new() -> Self {
        Self {
            overflows: Mutex::new(Cell::new(0)),
        }
    }

    /// One overflow event. Returns `true` when the indicator was toggled.
    pub fn on_overflow<R: RegisterAccess>(&self, regs: &mut R, cs: CriticalSection<'_>) -> bool {
        let count = self.overflows.borrow(cs);
        let next = count.get() + 1;
        if next >= OVERFLOW_THRESHOLD {
            regs.toggle_bits(INDICATOR.port.data_register(), INDICATOR.mask());
            count.set(0);
            true
        } else {
            count.set(next);
            false
        }
    }

    pub fn overflows(&self, cs: CriticalSection<'_>) -> u32 {
        self.overflows.borrow(cs).get()
    }

    /// Foreground read of the overflow counter.
    pub fn read_overflows<M: Mcu>(&self, mcu: &mut M) -> u32 {
        critical::free(mcu, |_, cs| self.overflows(cs))
    }
}

/// TIMER0_OVF vector body.
///
/// # Safety
///
/// Must run with interrupts disabled, i.e. from the overflow vector itself
/// (which never re-enables them) or inside a critical section.
pub unsafe fn timer0_overflow<M: Mcu>(state: &BlinkState, mcu: &mut M) -> bool {
    // SAFETY: upheld by the caller.
    let cs = CriticalSection::new();
    let toggled = state.on_overflow(mcu, cs);
    if toggled {
        tracing::trace!("indicator toggled");
    }
    toggled
}
