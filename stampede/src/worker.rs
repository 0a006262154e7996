/// Worker module for the stampede load runner
///
/// A worker repeatedly probes the target until the shared stop signal is
/// raised. The first failure it sees (transport error or 5xx status) raises
/// the signal for the whole run and ends its own loop.
use crate::{
    message::{EndReason, ProbeOutcome, ProbeRecord, WorkerTally},
    reporters::Reporter,
    signal::StopSignal,
    transport::ProbeTransport,
};
use std::{sync::Arc, time::Duration};

/// Prefix for worker instance names
const WORKER_NAME_PREFIX: &str = "Worker";

pub struct Worker {
    name: String,
    target: Arc<str>,
    probe_timeout: Duration,
    transport: Arc<dyn ProbeTransport>,
    reporters: Arc<Vec<Box<dyn Reporter>>>,
    signal: StopSignal,
}

impl Worker {
    pub fn new(
        id: usize,
        target: Arc<str>,
        probe_timeout: Duration,
        transport: Arc<dyn ProbeTransport>,
        reporters: Arc<Vec<Box<dyn Reporter>>>,
        signal: StopSignal,
    ) -> Self {
        Self {
            name: format!("{}-{}", WORKER_NAME_PREFIX, id),
            target,
            probe_timeout,
            transport,
            reporters,
            signal,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Probe loop. Returns the counts once the stop signal is observed or
    /// this worker raised it.
    pub async fn run(self) -> WorkerTally {
        tracing::debug!("{} started", self.name);
        let mut tally = WorkerTally::default();

        while !self.signal.is_raised() {
            let record = self.probe().await;
            tally.record(&record.outcome);

            // Stop the run before any reporter I/O so other workers see it at once.
            let failed = record.outcome.is_failure();
            if failed && self.signal.raise(EndReason::FailureDetected) {
                tracing::warn!(
                    "{}: target {} in distress ({}), stopping run",
                    self.name,
                    self.target,
                    record.outcome
                );
            }

            self.call_reporters(&record).await;
            if failed {
                break;
            }

            // Keep the loop cooperative when the transport answers without suspending.
            tokio::task::yield_now().await;
        }

        tracing::debug!("{} stopped after {} probes", self.name, tally.probes);
        tally
    }

    async fn probe(&self) -> ProbeRecord {
        let timestamp = chrono::Utc::now();
        let start_time = tokio::time::Instant::now();

        let outcome = match self
            .transport
            .issue_probe(&self.target, self.probe_timeout)
            .await
        {
            Ok(status) => ProbeOutcome::Success(status),
            Err(e) => ProbeOutcome::TransientFailure(e.to_string()),
        };
        tracing::trace!("{}: {}", self.name, outcome);

        ProbeRecord {
            worker: self.name.clone(),
            target: self.target.to_string(),
            outcome,
            timestamp,
            duration: start_time.elapsed(),
        }
    }

    /// Calls all configured reporters with the probe record.
    ///
    /// Failures in one reporter don't affect others.
    async fn call_reporters(&self, record: &ProbeRecord) {
        let reporter_futures: Vec<_> = self
            .reporters
            .iter()
            .map(|reporter| async move {
                if let Err(e) = reporter.report(record).await {
                    tracing::warn!("Reporter '{}' failed: {:#}", reporter.name(), e);
                }
            })
            .collect();

        futures::future::join_all(reporter_futures).await;
    }
}
