//! Synchronized line output
//!
//! The core never prints directly. Diagnostics for the GUI (topology dump,
//! `info string ...` notices) go through a `SyncOutput` handed in by the
//! caller; each call writes one whole line without interleaving.

use std::io::{self, Write};

use parking_lot::Mutex;

pub trait SyncOutput: Send + Sync {
    /// Writes one line (without the trailing newline)
    fn line(&self, text: &str);

    /// `info string ...` line
    fn info_string(&self, text: &str) {
        self.line(&format!("info string {text}"));
    }
}

/// Writes to stdout and flushes after every line
pub struct StdoutOutput {
    out: Mutex<io::Stdout>,
}

impl StdoutOutput {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(io::stdout()),
        }
    }
}

impl Default for StdoutOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncOutput for StdoutOutput {
    fn line(&self, text: &str) {
        let out = self.out.lock();
        let mut handle = out.lock();
        // A closed stdout leaves nobody to report to
        let _ = writeln!(handle, "{text}");
        let _ = handle.flush();
    }
}

/// Forwards lines to the `log` facade at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOutput;

impl SyncOutput for LogOutput {
    fn line(&self, text: &str) {
        log::info!("{text}");
    }
}

/// Collects lines in memory
#[derive(Debug, Default)]
pub struct MemoryOutput {
    lines: Mutex<Vec<String>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes and clears the captured lines
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }
}

impl SyncOutput for MemoryOutput {
    fn line(&self, text: &str) {
        self.lines.lock().push(text.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_output_collects_lines() {
        let out = MemoryOutput::new();
        out.line("first");
        out.info_string("LargePages 16 Mb");
        assert_eq!(out.take(), vec!["first", "info string LargePages 16 Mb"]);
        assert!(out.take().is_empty());
    }

    #[test]
    fn test_memory_output_lines_stay_whole() {
        let out = MemoryOutput::new();
        std::thread::scope(|scope| {
            for t in 0..4 {
                let out = &out;
                scope.spawn(move || {
                    for i in 0..100 {
                        out.line(&format!("thread {t} line {i}"));
                    }
                });
            }
        });
        let lines = out.take();
        assert_eq!(lines.len(), 400);
        assert!(lines.iter().all(|l| l.starts_with("thread ")));
    }
}
