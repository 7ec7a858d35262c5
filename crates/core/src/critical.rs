// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Scoped critical sections over the global interrupt flag.

use crate::registers::Mcu;
use critical_section::CriticalSection;

/// Restores the previous interrupt flag when dropped, including on unwind.
struct InterruptGuard<'a, M: Mcu> {
    mcu: &'a mut M,
    was_enabled: bool,
}

impl<'a, M: Mcu> InterruptGuard<'a, M> {
    fn new(mcu: &'a mut M) -> Self {
        let was_enabled = mcu.interrupts_enabled();
        mcu.disable_interrupts();
        Self { mcu, was_enabled }
    }
}

impl<M: Mcu> Drop for InterruptGuard<'_, M> {
    fn drop(&mut self) {
        if self.was_enabled {
            self.mcu.enable_interrupts();
        }
    }
}

/// Run `f` with interrupts masked. Nested calls leave the flag disabled until
/// the outermost section ends.
pub fn free<M, F, R>(mcu: &mut M, f: F) -> R
where
    M: Mcu,
    F: FnOnce(&mut M, CriticalSection<'_>) -> R,
{
    let mut guard = InterruptGuard::new(mcu);
    // SAFETY: the guard keeps interrupts masked until after `f` returns.
    let cs = unsafe { CriticalSection::new() };
    f(&mut *guard.mcu, cs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{Register, RegisterAccess};
    use critical_section::Mutex;
    use std::cell::Cell;

    struct FlagOnly {
        sreg: u8,
    }

    impl RegisterAccess for FlagOnly {
        fn read(&self, reg: Register) -> u8 {
            match reg {
                Register::Sreg => self.sreg,
                _ => 0,
            }
        }

        fn write(&mut self, reg: Register, value: u8) {
            if reg == Register::Sreg {
                self.sreg = value;
            }
        }
    }

    impl Mcu for FlagOnly {}

    #[test]
    fn test_free_masks_then_restores() {
        let mut mcu = FlagOnly { sreg: 0x80 };
        let inside = free(&mut mcu, |mcu, _cs| mcu.interrupts_enabled());
        assert!(!inside);
        assert!(mcu.interrupts_enabled());
    }

    #[test]
    fn test_free_keeps_disabled_flag_disabled() {
        let mut mcu = FlagOnly { sreg: 0x00 };
        free(&mut mcu, |_, _| ());
        assert!(!mcu.interrupts_enabled());
    }

    #[test]
    fn test_nested_sections_restore_only_at_outermost() {
        let mut mcu = FlagOnly { sreg: 0x80 };
        free(&mut mcu, |mcu, _| {
            free(mcu, |_, _| ());
            assert!(!mcu.interrupts_enabled());
        });
        assert!(mcu.interrupts_enabled());
    }

    #[test]
    fn test_flag_restored_on_unwind() {
        let mut mcu = FlagOnly { sreg: 0x80 };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            free(&mut mcu, |_, _| panic!("boom"));
        }));
        assert!(result.is_err());
        assert!(mcu.interrupts_enabled());
    }

    #[test]
    fn test_token_unlocks_shared_cell() {
        let mut mcu = FlagOnly { sreg: 0x80 };
        let shared = Mutex::new(Cell::new(7u32));
        free(&mut mcu, |mcu, cs| {
            assert!(!mcu.interrupts_enabled());
            shared.borrow(cs).set(8);
        });
        assert_eq!(shared.into_inner().get(), 8);
        assert!(mcu.interrupts_enabled());
    }
}
