// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_clock() -> String {
    "16MHz".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortName {
    #[serde(alias = "B", alias = "portb")]
    B,
    #[serde(alias = "D", alias = "portd")]
    D,
}

/// Where the board's indicator LED is wired.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PinBinding {
    pub id: String,
    pub port: PortName,
    pub pin: u8,
    #[serde(default = "default_true")]
    pub active_high: bool,
}

impl Default for PinBinding {
    fn default() -> Self {
        Self {
            id: "led_l".to_string(),
            port: PortName::B,
            pin: 5,
            active_high: true,
        }
    }
}

/// Simulated board: clock and indicator wiring. Firmware constants are not
/// configurable here.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BoardConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    #[serde(default = "default_clock")]
    pub clock: String,
    #[serde(default)]
    pub indicator: PinBinding,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            name: "arduino-uno".to_string(),
            clock: default_clock(),
            indicator: PinBinding::default(),
        }
    }
}

impl BoardConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read board config at {:?}", path))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).context("Failed to parse Board Config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }
        if self.name.trim().is_empty() {
            anyhow::bail!("Board 'name' cannot be empty");
        }
        self.clock_hz()?;
        if self.indicator.pin > 7 {
            anyhow::bail!(
                "Indicator '{}' uses pin {}; ports have pins 0..=7",
                self.indicator.id,
                self.indicator.pin
            );
        }
        if !self.indicator.active_high {
            tracing::debug!(
                "Indicator '{}' is active-low; LED is lit while the pin is low",
                self.indicator.id
            );
        }
        Ok(())
    }

    pub fn clock_hz(&self) -> Result<u64> {
        parse_frequency(&self.clock)
            .with_context(|| format!("Invalid clock for board '{}'", self.name))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrequencyError {
    #[error("empty frequency")]
    Empty,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unknown unit '{0}' (expected Hz, kHz or MHz)")]
    UnknownUnit(String),
    #[error("frequency must be greater than zero")]
    Zero,
}

/// Parse "16MHz", "8 MHz", "32.768kHz" or a bare number of hertz.
pub fn parse_frequency(s: &str) -> std::result::Result<u64, FrequencyError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(FrequencyError::Empty);
    }

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "hz" => 1.0,
        "khz" => 1e3,
        "mhz" => 1e6,
        other => return Err(FrequencyError::UnknownUnit(other.to_string())),
    };
    let value: f64 = number
        .parse()
        .map_err(|_| FrequencyError::InvalidNumber(number.to_string()))?;

    let hz = (value * multiplier).round() as u64;
    if hz == 0 {
        return Err(FrequencyError::Zero);
    }
    Ok(hz)
}

/// Parse a byte size such as "64KB" or "1 MiB".
pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let trimmed = size_str.trim();
    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let (value, unit) = trimmed.split_at(split);
    let normalized = format!("{} {}", value.trim(), unit.trim());
    let s: Size = normalized
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct TestInputs {
    #[serde(default)]
    pub board: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct TestLimits {
    #[serde(default)]
    pub max_overflows: Option<u64>,
    #[serde(default)]
    pub max_cycles: Option<u64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Cap on the VCD trace, e.g. "64KB".
    #[serde(default)]
    pub max_vcd_size: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Runner failed before simulation started (e.g. script parse/validation error).
    ConfigError,
    /// Simulation failed after it started, e.g. the timer clock was stopped.
    RuntimeError,
    MaxOverflows,
    MaxCycles,
    Duration,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    Low,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ToggleCountAssertion {
    pub toggle_count: u64,
}

/// Level of the LED as seen by a human, honouring `active_high`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct IndicatorLevelAssertion {
    pub indicator_level: Level,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct OverflowCounterAssertion {
    pub overflow_counter: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TogglePeriodDetails {
    pub expected: f64,
    #[serde(default)]
    pub tolerance: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TogglePeriodAssertion {
    pub toggle_period_ms: TogglePeriodDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StopReasonAssertion {
    pub expected_stop_reason: StopReason,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TestAssertion {
    ToggleCount(ToggleCountAssertion),
    IndicatorLevel(IndicatorLevelAssertion),
    OverflowCounter(OverflowCounterAssertion),
    TogglePeriod(TogglePeriodAssertion),
    ExpectedStopReason(StopReasonAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestScript {
    pub schema_version: String,
    #[serde(default)]
    pub inputs: TestInputs,
    pub limits: TestLimits,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

impl TestScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open test script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Test Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        let limits = &self.limits;
        if limits.max_overflows.is_none()
            && limits.max_cycles.is_none()
            && limits.duration_ms.is_none()
        {
            anyhow::bail!(
                "At least one of 'max_overflows', 'max_cycles' or 'duration_ms' must be set"
            );
        }
        for (name, value) in [
            ("max_overflows", limits.max_overflows),
            ("max_cycles", limits.max_cycles),
            ("duration_ms", limits.duration_ms),
        ] {
            if value == Some(0) {
                anyhow::bail!("Limit '{}' must be greater than zero", name);
            }
        }
        if let Some(size) = &limits.max_vcd_size {
            parse_size(size).with_context(|| format!("Invalid 'max_vcd_size' '{}'", size))?;
        }

        for assertion in &self.assertions {
            if let TestAssertion::TogglePeriod(a) = assertion {
                let d = &a.toggle_period_ms;
                if !(d.expected > 0.0) || d.tolerance < 0.0 {
                    anyhow::bail!(
                        "toggle_period_ms needs expected > 0 and tolerance >= 0 (got {} ± {})",
                        d.expected,
                        d.tolerance
                    );
                }
            }
        }

        Ok(())
    }
}
