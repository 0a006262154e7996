mod file;
mod stdout;

use crate::{config::Config, message::ProbeRecord};
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

pub use file::FileReporter;
pub use stdout::StdoutReporter;
#[cfg(test)]
pub(crate) use stdout::BrokenPipe;

/// Sink for per-probe log entries.
///
/// Every probe outcome is handed to each enabled reporter. A reporter error
/// is logged by the worker and never affects the run or the other reporters.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, record: &ProbeRecord) -> Result<()>;

    /// Returns the name of this reporter for logging purposes.
    fn name(&self) -> &'static str;
}

pub fn create_enabled_reporters(conf: &Config) -> Vec<Box<dyn Reporter>> {
    let mut reporters: Vec<Box<dyn Reporter>> = Vec::new();

    if conf.reporter.enable_stdout {
        reporters.push(Box::new(StdoutReporter::new()));
    }

    if let Some(ref file_path) = conf.reporter.file_path {
        reporters.push(Box::new(FileReporter::new(PathBuf::from(file_path))));
    }

    reporters
}
