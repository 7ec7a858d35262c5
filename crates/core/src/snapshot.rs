// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BoardSnapshot {
    pub name: String,
    pub clock_hz: u64,
    pub cycles: u64,
    pub elapsed_secs: f64,
    pub sreg: u8,
    pub interrupts_enabled: bool,
    pub serviced_overflows: u64,
    pub peripherals: BTreeMap<String, serde_json::Value>,
}
