use super::Reporter;
use crate::message::ProbeRecord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::{
    io::{self, Write},
    sync::Mutex,
};

/// Reporter that prints one progress line per probe to stdout.
///
/// A closed stdout (e.g. piped into `head`) surfaces as an error from
/// [`Reporter::report`] rather than a panic.
pub struct StdoutReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl StdoutReporter {
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn format(record: &ProbeRecord) -> String {
        format!(
            "{} - {} - {} ({}ms)",
            record.timestamp.format("%H:%M:%S"),
            record.worker,
            record.outcome,
            record.duration.as_millis()
        )
    }
}

impl Default for StdoutReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reporter for StdoutReporter {
    async fn report(&self, record: &ProbeRecord) -> Result<()> {
        let line = Self::format(record);
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(out, "{}", line).context("Failed to write to stdout")?;
        out.flush().context("Failed to flush stdout")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// Writer whose every write fails like a stdout whose reader went away.
#[cfg(test)]
pub(crate) struct BrokenPipe;

#[cfg(test)]
impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "Broken pipe"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "Broken pipe"))
    }
}
