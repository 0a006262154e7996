use crate::message::EndReason;
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

const CLEAR: u8 = 0;
const DURATION_ELAPSED: u8 = 1;
const FAILURE_DETECTED: u8 = 2;
const INTERRUPTED: u8 = 3;

/// Write-once stop flag shared by the supervisor and every worker of a run.
///
/// The flag goes from clear to raised exactly once and remembers the cause
/// that raised it. Later raises are no-ops, so any number of workers may
/// report a failure at the same time.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    state: Arc<AtomicU8>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal. Returns `true` only for the call that flipped it.
    pub fn raise(&self, reason: EndReason) -> bool {
        self.state
            .compare_exchange(CLEAR, encode(reason), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_raised(&self) -> bool {
        self.state.load(Ordering::SeqCst) != CLEAR
    }

    /// The cause recorded by the first successful [`StopSignal::raise`].
    pub fn reason(&self) -> Option<EndReason> {
        match self.state.load(Ordering::SeqCst) {
            DURATION_ELAPSED => Some(EndReason::DurationElapsed),
            FAILURE_DETECTED => Some(EndReason::FailureDetected),
            INTERRUPTED => Some(EndReason::Interrupted),
            _ => None,
        }
    }
}

fn encode(reason: EndReason) -> u8 {
    match reason {
        EndReason::DurationElapsed => DURATION_ELAPSED,
        EndReason::FailureDetected => FAILURE_DETECTED,
        EndReason::Interrupted => INTERRUPTED,
    }
}

/// Handle given to the host so it can cancel a run from a signal handler,
/// a UI button or anything else.
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: StopSignal,
}

impl StopHandle {
    pub(crate) fn new(signal: StopSignal) -> Self {
        Self { signal }
    }

    /// Asks the run to stop. Safe to call repeatedly and from any thread.
    pub fn request_stop(&self) {
        if self.signal.raise(EndReason::Interrupted) {
            tracing::info!("stop requested");
        } else {
            tracing::debug!("stop requested, run already stopping");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.signal.is_raised()
    }
}
