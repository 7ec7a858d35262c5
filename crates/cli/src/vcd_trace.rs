// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::size_limited_writer::{SizeLimitedWriter, WriteBudget};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use timerblink_core::signals::DigitalLevel;
use timerblink_core::{PortPin, SimulationObserver};
use vcd::{IdCode, TimescaleUnit, Value, Writer};

// Wide enough for the board's `u64` overflow count.
const COUNT_WIDTH: u32 = u64::BITS;

type VcdSink = SizeLimitedWriter<BufWriter<File>>;

/// Dumps the indicator pin, `SREG.I` and the serviced overflow count as a
/// VCD waveform with nanosecond resolution.
pub struct VcdObserver<W: Write + Send = VcdSink> {
    pin: PortPin,
    clock_hz: u64,
    ids: VcdIds,
    state: Mutex<Option<VcdState<W>>>,
}

struct VcdIds {
    indicator: IdCode,
    interrupts: IdCode,
    overflows: IdCode,
}

struct VcdState<W: Write> {
    writer: Writer<W>,
    last_time: u64,
}

impl VcdObserver<VcdSink> {
    /// Create `path`, writing at most `max_bytes` of trace into it.
    pub fn create(
        path: &Path,
        pin: PortPin,
        clock_hz: u64,
        max_bytes: u64,
    ) -> anyhow::Result<(Self, WriteBudget)> {
        let file = File::create(path)?;
        let sink = SizeLimitedWriter::new(BufWriter::new(file), max_bytes);
        let budget = sink.budget();
        Ok((Self::new(sink, pin, clock_hz)?, budget))
    }
}

impl<W: Write + Send> VcdObserver<W> {
    pub fn new(out: W, pin: PortPin, clock_hz: u64) -> anyhow::Result<Self> {
        let mut writer = Writer::new(out);

        writer.timescale(1, TimescaleUnit::NS)?;
        writer.add_module("board")?;
        let indicator = writer.add_wire(1, &pin.to_string())?;
        let interrupts = writer.add_wire(1, "sreg_i")?;
        let overflows = writer.add_wire(COUNT_WIDTH, "overflows")?;
        writer.upscope()?;
        writer.enddefinitions()?;

        writer.timestamp(0)?;
        writer.change_scalar(indicator, Value::V0)?;
        writer.change_scalar(interrupts, Value::V0)?;
        writer.change_vector(overflows, count_bits(0))?;

        Ok(Self {
            pin,
            clock_hz,
            ids: VcdIds {
                indicator,
                interrupts,
                overflows,
            },
            state: Mutex::new(Some(VcdState {
                writer,
                last_time: 0,
            })),
        })
    }

    /// Flush and close the trace. Later events are ignored.
    pub fn finish(&self) {
        if let Ok(mut state) = self.state.lock() {
            // Dropping the writer flushes the buffered file.
            state.take();
        }
    }

    fn cycle_to_ns(&self, cycle: u64) -> u64 {
        (cycle as u128 * 1_000_000_000 / self.clock_hz.max(1) as u128) as u64
    }

    fn record<F>(&self, cycle: u64, change: F)
    where
        F: FnOnce(&mut Writer<W>, &VcdIds) -> std::io::Result<()>,
    {
        let time = self.cycle_to_ns(cycle);
        let Ok(mut guard) = self.state.lock() else {
            return;
        };
        let Some(state) = guard.as_mut() else {
            return;
        };
        if time > state.last_time {
            if state.writer.timestamp(time).is_err() {
                return;
            }
            state.last_time = time;
        }
        if let Err(e) = change(&mut state.writer, &self.ids) {
            tracing::warn!("VCD write failed: {}", e);
        }
    }
}

fn count_bits(val: u64) -> Vec<Value> {
    (0..COUNT_WIDTH)
        .rev()
        .map(|i| if (val >> i) & 1 == 1 { Value::V1 } else { Value::V0 })
        .collect()
}

fn scalar(level: bool) -> Value {
    if level {
        Value::V1
    } else {
        Value::V0
    }
}

impl<W: Write + Send> std::fmt::Debug for VcdObserver<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VcdObserver({})", self.pin)
    }
}

impl<W: Write + Send> SimulationObserver for VcdObserver<W> {
    fn on_pin_change(&self, pin: PortPin, level: DigitalLevel, cycle: u64) {
        if pin != self.pin {
            return;
        }
        self.record(cycle, |w, ids| {
            w.change_scalar(ids.indicator, scalar(level.into()))
        });
    }

    fn on_interrupt_enable(&self, enabled: bool, cycle: u64) {
        self.record(cycle, |w, ids| w.change_scalar(ids.interrupts, scalar(enabled)));
    }

    fn on_overflow(&self, cycle: u64, serviced: u64) {
        self.record(cycle, |w, ids| {
            w.change_vector(ids.overflows, count_bits(serviced))
        });
    }

    fn on_simulation_stop(&self, cycle: u64) {
        let time = self.cycle_to_ns(cycle);
        if let Ok(mut guard) = self.state.lock() {
            if let Some(state) = guard.as_mut() {
                if time > state.last_time {
                    let _ = state.writer.timestamp(time);
                    state.last_time = time;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use timerblink_core::firmware::{self, BlinkState};
    use timerblink_core::Board;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_trace_records_toggle_times() {
        let buf = SharedBuf::default();
        let mut board = Board::new(firmware::CPU_FREQ_HZ).unwrap();
        let vcd = Arc::new(VcdObserver::new(buf.clone(), firmware::INDICATOR, 16_000_000).unwrap());
        board.add_observer(vcd.clone());
        board.attach_blinker(Arc::new(BlinkState::new()));
        firmware::setup(&mut board);
        board.run_overflows(80).unwrap();
        board.finish();
        vcd.finish();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("$timescale"));
        assert!(text.contains("PB5"));
        // First toggle: 40 * 65536 cycles at 62.5 ns.
        assert!(text.contains("#163840000"), "{}", text);
        assert!(text.contains("#327680000"));
    }

    #[test]
    fn test_overflow_count_past_16_bits() {
        let buf = SharedBuf::default();
        let vcd = VcdObserver::new(buf.clone(), firmware::INDICATOR, 16_000_000).unwrap();
        vcd.on_overflow(65_536 * 65_536, 65_536);
        vcd.on_overflow(65_537 * 65_536, u64::MAX);
        vcd.finish();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains(&format!("b{:064b}", 65_536u64)), "{}", text);
        assert!(text.contains(&format!("b{:064b}", u64::MAX)));
    }
}
