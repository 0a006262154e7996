/// Message module for the stampede load runner
///
/// This module defines the values exchanged between the workers, the
/// reporters and the supervisor: per-probe outcomes and the final summary.
use reqwest::StatusCode;
use std::{fmt, time::Duration};

/// Result of one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The target answered; the status may still be a failure signal.
    Success(StatusCode),
    /// The request never produced a response (timeout, refused, DNS...).
    TransientFailure(String),
}

impl ProbeOutcome {
    /// Whether this outcome means the target is in distress.
    ///
    /// Transport failures and any status >= 500 end the run.
    pub fn is_failure(&self) -> bool {
        match self {
            ProbeOutcome::Success(status) => status.is_server_error(),
            ProbeOutcome::TransientFailure(_) => true,
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Success(status) => write!(f, "Status: {}", status.as_u16()),
            ProbeOutcome::TransientFailure(e) => write!(f, "Request failed: {}", e),
        }
    }
}

/// A probe outcome together with where and when it happened
///
/// # Fields
/// * `worker` - Name of the worker that issued the probe (e.g., "Worker-0")
/// * `target` - The probed target
/// * `outcome` - What came back
/// * `timestamp` - When the probe was issued
/// * `duration` - Time from sending the request to getting the outcome
#[derive(Debug, Clone)]
pub struct ProbeRecord {
    pub worker: String,
    pub target: String,
    pub outcome: ProbeOutcome,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub duration: Duration,
}

/// Why a run ended. Whichever cause raised the stop signal first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    DurationElapsed,
    FailureDetected,
    Interrupted,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndReason::DurationElapsed => "duration elapsed",
            EndReason::FailureDetected => "failure detected",
            EndReason::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// Per-worker counters, handed back when the worker is joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerTally {
    pub probes: u64,
    pub successes: u64,
    pub failures: u64,
}

impl WorkerTally {
    pub fn record(&mut self, outcome: &ProbeOutcome) {
        self.probes += 1;
        if outcome.is_failure() {
            self.failures += 1;
        } else {
            self.successes += 1;
        }
    }
}

/// Aggregate result of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total_probes: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub reason: EndReason,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new(reason: EndReason, elapsed: Duration) -> Self {
        Self {
            total_probes: 0,
            total_successes: 0,
            total_failures: 0,
            reason,
            elapsed,
        }
    }

    pub fn absorb(&mut self, tally: WorkerTally) {
        self.total_probes += tally.probes;
        self.total_successes += tally.successes;
        self.total_failures += tally.failures;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} probes ({} ok, {} failed) in {:.1}s, ended: {}",
            self.total_probes,
            self.total_successes,
            self.total_failures,
            self.elapsed.as_secs_f64(),
            self.reason
        )
    }
}
