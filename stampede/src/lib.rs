//! Bounded concurrent probe runner.
//!
//! Launches a fixed number of workers that hammer one target until a
//! wall-clock budget runs out, the host asks to stop, or any worker sees the
//! target in distress. The binary in `main.rs` is a thin host around
//! [`ProbeRunner::start_run`].
pub mod clock;
pub mod config;
pub mod error;
pub mod message;
pub mod reporters;
pub mod runner;
pub mod signal;
pub mod transport;
mod worker;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{Config, RunConfig};
pub use error::{RunError, TransportError};
pub use message::{EndReason, ProbeOutcome, ProbeRecord, RunSummary};
pub use runner::ProbeRunner;
pub use signal::StopHandle;
pub use transport::{HttpTransport, ProbeTransport};
