//! In-app console: the last lines of application and tracing output

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

/// Lines kept for the Console tab
pub const MAX_LINES: usize = 500;

/// Get current local time as HH:MM:SS
pub fn timestamp_now() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

#[derive(Clone, Default)]
pub struct ConsoleLog {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock();
        lines.push_back(line.into());
        // Keep last 500 lines
        while lines.len() > MAX_LINES {
            lines.pop_front();
        }
    }

    /// Timestamped application message
    pub fn log(&self, message: &str) {
        self.push(format!("[{}] {}", timestamp_now(), message));
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

/// Buffers one formatted event and appends it to the console on drop
pub struct ConsoleWriter {
    log: ConsoleLog,
    buf: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buf);
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            self.log.push(format!("[{}] {}", timestamp_now(), line.trim_start()));
        }
    }
}

impl<'a> MakeWriter<'a> for ConsoleLog {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter { log: self.clone(), buf: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_keeps_last_lines() {
        let console = ConsoleLog::new();
        for i in 0..(MAX_LINES + 20) {
            console.push(format!("line {}", i));
        }
        let lines = console.snapshot();
        assert_eq!(lines.len(), MAX_LINES);
        assert_eq!(lines[0], "line 20");
    }

    #[test]
    fn test_writer_appends_on_drop() {
        let console = ConsoleLog::new();
        {
            let mut writer = console.make_writer();
            write!(writer, " INFO tvdeck::store: Seeded 6 channels\n").unwrap();
            assert!(console.snapshot().is_empty());
        }
        let lines = console.snapshot();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] INFO tvdeck::store: Seeded 6 channels"));
    }

    #[test]
    fn test_log_is_timestamped() {
        let console = ConsoleLog::new();
        console.log("[INFO] started");
        let line = &console.snapshot()[0];
        assert!(line.starts_with('['));
        assert!(line.ends_with("] [INFO] started"));
    }
}
