// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared view of how much a [`SizeLimitedWriter`] has written.
#[derive(Debug, Clone, Default)]
pub struct WriteBudget {
    written: Arc<AtomicU64>,
    truncated: Arc<AtomicBool>,
}

impl WriteBudget {
    pub fn bytes_written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// True once any byte was dropped because of the cap.
    pub fn truncated(&self) -> bool {
        self.truncated.load(Ordering::Relaxed)
    }
}

/// Passes writes through until `max_bytes` have gone out, then silently
/// swallows the rest. Callers see every write succeed.
pub struct SizeLimitedWriter<W: Write> {
    inner: W,
    max_bytes: u64,
    budget: WriteBudget,
}

impl<W: Write> SizeLimitedWriter<W> {
    pub fn new(inner: W, max_bytes: u64) -> Self {
        Self {
            inner,
            max_bytes,
            budget: WriteBudget::default(),
        }
    }

    pub fn budget(&self) -> WriteBudget {
        self.budget.clone()
    }
}

impl<W: Write> Write for SizeLimitedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.budget.bytes_written();
        let remaining = self.max_bytes.saturating_sub(written);
        if (buf.len() as u64) > remaining {
            self.budget.truncated.store(true, Ordering::Relaxed);
        }
        if remaining == 0 {
            return Ok(buf.len());
        }

        let to_write = buf.len().min(remaining as usize);
        let n = self.inner.write(&buf[..to_write])?;
        self.budget.written.fetch_add(n as u64, Ordering::Relaxed);

        // Report the dropped tail as written so `write_all` does not retry it.
        if n == to_write {
            Ok(buf.len())
        } else {
            Ok(n)
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_limit() {
        let mut buf = Vec::new();
        let mut writer = SizeLimitedWriter::new(&mut buf, 100);
        let budget = writer.budget();

        writer.write_all(b"$timescale").unwrap();
        assert_eq!(budget.bytes_written(), 10);
        assert!(!budget.truncated());
        assert_eq!(buf, b"$timescale");
    }

    #[test]
    fn test_exact_limit_is_not_truncation() {
        let mut buf = Vec::new();
        let mut writer = SizeLimitedWriter::new(&mut buf, 5);
        let budget = writer.budget();

        writer.write_all(b"#1000").unwrap();
        assert_eq!(budget.bytes_written(), 5);
        assert!(!budget.truncated());

        writer.write_all(b"1!").unwrap();
        assert_eq!(budget.bytes_written(), 5);
        assert!(budget.truncated());
        assert_eq!(buf, b"#1000");
    }

    #[test]
    fn test_over_limit_keeps_prefix() {
        let mut buf = Vec::new();
        let mut writer = SizeLimitedWriter::new(&mut buf, 4);
        let budget = writer.budget();

        writer.write_all(b"0!\n#65536").unwrap();
        assert_eq!(budget.bytes_written(), 4);
        assert!(budget.truncated());
        assert_eq!(buf, b"0!\n#");
    }
}
