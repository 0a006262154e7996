use super::Reporter;
use crate::message::{ProbeOutcome, ProbeRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

/// Reporter that appends one JSON object per probe to a file.
pub struct FileReporter {
    file_path: PathBuf,
}

impl FileReporter {
    /// Creates a new FileReporter instance.
    ///
    /// # Arguments
    /// * `file_path` - Path to the log file where records will be appended
    pub fn new(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    fn entry(record: &ProbeRecord) -> serde_json::Value {
        let (status_code, error) = match &record.outcome {
            ProbeOutcome::Success(status) => (Some(status.as_u16()), None),
            ProbeOutcome::TransientFailure(e) => (None, Some(e.as_str())),
        };

        serde_json::json!({
            "timestamp": record.timestamp.to_rfc3339(),
            "worker": record.worker,
            "target": record.target,
            "status_code": status_code,
            "error": error,
            "duration_ms": record.duration.as_millis(),
            "failure": record.outcome.is_failure()
        })
    }
}

#[async_trait]
impl Reporter for FileReporter {
    async fn report(&self, record: &ProbeRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .await
            .with_context(|| format!("Failed to open log file: {}", self.file_path.display()))?;

        let log_line = format!("{}\n", Self::entry(record));
        file.write_all(log_line.as_bytes())
            .await
            .with_context(|| "Failed to write to log file")?;

        file.flush()
            .await
            .with_context(|| "Failed to flush log file")?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
