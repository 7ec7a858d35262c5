// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::registers::PortPin;
use crate::SimulationObserver;
use std::sync::Mutex;

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

impl std::ops::Not for DigitalLevel {
    type Output = DigitalLevel;

    fn not(self) -> Self::Output {
        match self {
            DigitalLevel::High => DigitalLevel::Low,
            DigitalLevel::Low => DigitalLevel::High,
        }
    }
}

/// A pin level change at a given CPU cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PinEvent {
    pub pin: PortPin,
    pub level: DigitalLevel,
    pub cycle: u64,
}

/// Records every pin change the board reports.
#[derive(Debug, Default)]
pub struct PinRecorder {
    events: Mutex<Vec<PinEvent>>,
}

impl PinRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PinEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn events_for(&self, pin: PortPin) -> Vec<PinEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.pin == pin)
            .collect()
    }

    /// Cycles between consecutive changes of `pin`.
    pub fn intervals(&self, pin: PortPin) -> Vec<u64> {
        self.events_for(pin)
            .windows(2)
            .map(|w| w[1].cycle - w[0].cycle)
            .collect()
    }
}

impl SimulationObserver for PinRecorder {
    fn on_pin_change(&self, pin: PortPin, level: DigitalLevel, cycle: u64) {
        if let Ok(mut events) = self.events.lock() {
            events.push(PinEvent { pin, level, cycle });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::Port;

    #[test]
    fn test_digital_level_conversions() {
        assert_eq!(DigitalLevel::from(true), DigitalLevel::High);
        assert!(!bool::from(DigitalLevel::Low));
        assert_eq!(!DigitalLevel::Low, DigitalLevel::High);
    }

    #[test]
    fn test_recorder_intervals() {
        let rec = PinRecorder::new();
        let led = PortPin::new(Port::B, 5);
        let other = PortPin::new(Port::D, 0);
        rec.on_pin_change(led, DigitalLevel::High, 100);
        rec.on_pin_change(other, DigitalLevel::High, 150);
        rec.on_pin_change(led, DigitalLevel::Low, 400);
        rec.on_pin_change(led, DigitalLevel::High, 700);

        assert_eq!(rec.events().len(), 4);
        assert_eq!(rec.intervals(led), vec![300, 300]);
    }
}
