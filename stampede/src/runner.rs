/// Runner module for the stampede load runner
///
/// The [`ProbeRunner`] is the run supervisor: it spawns the workers, enforces
/// the wall-clock budget, reacts to stop requests and joins every worker
/// before reporting the [`RunSummary`].
use crate::{
    clock::{Clock, SystemClock},
    config::RunConfig,
    error::RunError,
    message::{EndReason, RunSummary, WorkerTally},
    reporters::Reporter,
    signal::{StopHandle, StopSignal},
    transport::ProbeTransport,
    worker::Worker,
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::task::JoinHandle;

/// One spawned worker, owned by the supervisor until joined.
struct WorkerHandle {
    name: String,
    handle: JoinHandle<WorkerTally>,
}

/// Drives a single bounded run against one target.
///
/// The stop signal belongs to the runner, so a runner is good for exactly
/// one run. Take a [`StopHandle`] before starting if the host needs to
/// cancel the run.
pub struct ProbeRunner {
    transport: Arc<dyn ProbeTransport>,
    clock: Arc<dyn Clock>,
    reporters: Arc<Vec<Box<dyn Reporter>>>,
    signal: StopSignal,
    started: AtomicBool,
}

impl ProbeRunner {
    pub fn new(transport: Arc<dyn ProbeTransport>) -> Self {
        Self {
            transport,
            clock: Arc::new(SystemClock),
            reporters: Arc::new(Vec::new()),
            signal: StopSignal::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reporters(mut self, reporters: Vec<Box<dyn Reporter>>) -> Self {
        self.reporters = Arc::new(reporters);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.signal.clone())
    }

    /// Runs the workers until the duration elapses, a worker detects a
    /// failure or a stop is requested, then joins them all.
    pub async fn start_run(&self, config: RunConfig) -> Result<RunSummary, RunError> {
        config.validate()?;
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RunError::AlreadyStarted);
        }

        tracing::info!(
            "Starting run against {} with {} workers for {:?}",
            config.target,
            config.worker_count,
            config.max_duration
        );

        let target: Arc<str> = Arc::from(config.target.as_str());
        let workers: Vec<WorkerHandle> = (0..config.worker_count)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    target.clone(),
                    config.probe_timeout,
                    self.transport.clone(),
                    self.reporters.clone(),
                    self.signal.clone(),
                );
                let name = worker.name().to_string();
                WorkerHandle {
                    name,
                    handle: tokio::spawn(worker.run()),
                }
            })
            .collect();

        let start = self.clock.now();
        self.supervise(&config, start).await;

        let reason = self
            .signal
            .reason()
            .unwrap_or(EndReason::DurationElapsed);
        tracing::info!("Run stopping ({}), joining {} workers", reason, workers.len());

        let tallies = Self::join_all(workers).await;
        let mut summary = RunSummary::new(reason, self.clock.now() - start);
        for tally in tallies {
            summary.absorb(tally);
        }

        tracing::info!("Run finished: {}", summary);
        Ok(summary)
    }

    /// Polls until the stop signal is raised or the budget is spent.
    async fn supervise(&self, config: &RunConfig, start: tokio::time::Instant) {
        loop {
            if self.signal.is_raised() {
                break;
            }
            if self.clock.now() - start >= config.max_duration {
                if self.signal.raise(EndReason::DurationElapsed) {
                    tracing::debug!("Run duration of {:?} elapsed", config.max_duration);
                }
                break;
            }
            self.clock.sleep(config.poll_interval).await;
        }
    }

    /// Waits for every worker. A worker that panicked is logged and skipped;
    /// none is aborted or left running.
    async fn join_all(workers: Vec<WorkerHandle>) -> Vec<WorkerTally> {
        let mut tallies = Vec::with_capacity(workers.len());
        for worker in workers {
            match worker.handle.await {
                Ok(tally) => {
                    tracing::debug!("{} joined after {} probes", worker.name, tally.probes);
                    tallies.push(tally);
                }
                Err(e) => {
                    tracing::error!("{} terminated abnormally: {}", worker.name, e);
                }
            }
        }
        tallies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FakeClock, error::TransportError, message::ProbeRecord,
        transport::MockProbeTransport,
    };
    use async_trait::async_trait;
    use httptest::{
        Expectation, Server,
        matchers::*,
        responders::{self},
    };
    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;
    use std::{
        sync::{
            OnceLock,
            atomic::{AtomicU64, AtomicUsize},
        },
        time::Duration,
    };

    const POLL: Duration = Duration::from_millis(100);

    /// Scripted transport: answers `fail_with` on call number `fail_at`
    /// (1-based) and 200 otherwise. Counts calls made after the stop signal
    /// was raised and how many calls are in flight.
    struct FakeTransport {
        fail_at: Option<u64>,
        fail_with: Result<StatusCode, TransportError>,
        calls: AtomicU64,
        calls_after_stop: AtomicU64,
        in_flight: AtomicUsize,
        stop: OnceLock<StopHandle>,
        clock: OnceLock<FakeClock>,
        failed_at: OnceLock<Duration>,
    }

    impl FakeTransport {
        fn always_ok() -> Self {
            Self {
                fail_at: None,
                fail_with: Ok(StatusCode::OK),
                calls: AtomicU64::new(0),
                calls_after_stop: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                stop: OnceLock::new(),
                clock: OnceLock::new(),
                failed_at: OnceLock::new(),
            }
        }

        fn failing_at(call: u64, result: Result<StatusCode, TransportError>) -> Self {
            Self {
                fail_at: Some(call),
                fail_with: result,
                ..Self::always_ok()
            }
        }

        /// Lets the transport see the run's stop signal and virtual time.
        fn watch(&self, runner: &ProbeRunner, clock: &FakeClock) {
            let _ = self.stop.set(runner.stop_handle());
            let _ = self.clock.set(clock.clone());
        }
    }

    #[async_trait]
    impl ProbeTransport for FakeTransport {
        async fn issue_probe(
            &self,
            _target: &str,
            _timeout: Duration,
        ) -> Result<StatusCode, TransportError> {
            if self.stop.get().is_some_and(|s| s.is_stopped()) {
                self.calls_after_stop.fetch_add(1, Ordering::SeqCst);
            }
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

            self.in_flight.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if Some(call) == self.fail_at {
                if let Some(clock) = self.clock.get() {
                    let _ = self.failed_at.set(clock.elapsed());
                }
                self.fail_with.clone()
            } else {
                Ok(StatusCode::OK)
            }
        }
    }

    fn runner(transport: Arc<dyn ProbeTransport>, clock: &FakeClock) -> ProbeRunner {
        ProbeRunner::new(transport).with_clock(Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn test_always_ok_runs_for_full_duration() {
        let clock = FakeClock::new();
        let transport = Arc::new(FakeTransport::always_ok());
        let runner = runner(transport.clone(), &clock);

        let summary = runner
            .start_run(RunConfig::new("fake://ok", 3, Duration::from_secs(1)))
            .await
            .unwrap();

        assert_eq!(summary.reason, EndReason::DurationElapsed);
        assert_eq!(summary.total_failures, 0);
        assert!(summary.total_probes > 0);
        assert_eq!(summary.total_probes, summary.total_successes);
        assert_eq!(summary.total_probes, transport.calls.load(Ordering::SeqCst));
        assert!(clock.elapsed() >= Duration::from_secs(1));
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_always_ok_for_several_worker_counts() {
        for workers in [1, 2, 5, 16] {
            let clock = FakeClock::new();
            let transport = Arc::new(FakeTransport::always_ok());
            let summary = runner(transport, &clock)
                .start_run(RunConfig::new("fake://ok", workers, Duration::from_millis(500)))
                .await
                .unwrap();

            assert_eq!(summary.reason, EndReason::DurationElapsed, "workers={}", workers);
            assert_eq!(summary.total_failures, 0);
            assert!(clock.elapsed() >= Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn test_first_transport_error_stops_everyone() {
        for workers in [1, 4, 10] {
            let clock = FakeClock::new();
            let transport = Arc::new(FakeTransport::failing_at(
                1,
                Err(TransportError::Connect("refused".into())),
            ));
            let runner = runner(transport.clone(), &clock);
            transport.watch(&runner, &clock);

            let summary = runner
                .start_run(RunConfig::new("fake://down", workers, Duration::from_secs(60)))
                .await
                .unwrap();

            assert_eq!(summary.reason, EndReason::FailureDetected);
            assert!(summary.total_failures >= 1);
            assert_eq!(transport.calls_after_stop.load(Ordering::SeqCst), 0);
            assert_eq!(summary.total_probes, transport.calls.load(Ordering::SeqCst));
            assert!(clock.elapsed() < Duration::from_secs(60));
        }
    }

    #[tokio::test]
    async fn test_server_error_at_known_call_stops_within_one_poll() {
        for workers in [1, 3, 8] {
            let clock = FakeClock::new();
            let transport = Arc::new(FakeTransport::failing_at(
                25,
                Ok(StatusCode::SERVICE_UNAVAILABLE),
            ));
            let runner = runner(transport.clone(), &clock);
            let stop = runner.stop_handle();

            let summary = runner
                .start_run(RunConfig::new("fake://flaky", workers, Duration::from_secs(60)))
                .await
                .unwrap();

            assert_eq!(summary.reason, EndReason::FailureDetected);
            assert_eq!(summary.total_failures, 1);
            assert!(stop.is_stopped());
            // Only probes already in flight when the 503 arrived may follow it.
            let calls = transport.calls.load(Ordering::SeqCst);
            assert!(calls >= 25 && calls < 25 + workers as u64, "calls={}", calls);
            assert!(clock.elapsed() < Duration::from_secs(60));
        }
    }

    #[tokio::test]
    async fn test_server_error_detected_within_one_poll() {
        for workers in [1, 2, 6] {
            let clock = FakeClock::new();
            let transport = Arc::new(FakeTransport::failing_at(
                10,
                Ok(StatusCode::INTERNAL_SERVER_ERROR),
            ));
            let runner = runner(transport.clone(), &clock);
            transport.watch(&runner, &clock);

            let summary = runner
                .start_run(
                    RunConfig::new("fake://down", workers, Duration::from_secs(60))
                        .with_poll_interval(POLL),
                )
                .await
                .unwrap();

            assert_eq!(summary.reason, EndReason::FailureDetected);
            let failed_at = *transport.failed_at.get().unwrap();
            assert!(
                clock.elapsed() - failed_at <= POLL,
                "failed at {:?}, stopped at {:?}",
                failed_at,
                clock.elapsed()
            );
            assert_eq!(transport.calls_after_stop.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_request_stop_right_after_start_interrupts() {
        let clock = FakeClock::new();
        let transport = Arc::new(FakeTransport::always_ok());
        let runner = Arc::new(runner(transport.clone(), &clock));
        let stop = runner.stop_handle();

        let run = {
            let runner = runner.clone();
            tokio::spawn(async move {
                runner
                    .start_run(RunConfig::new("fake://ok", 4, Duration::from_secs(3600)))
                    .await
            })
        };
        tokio::task::yield_now().await;
        stop.request_stop();

        let summary = run.await.unwrap().unwrap();

        assert_eq!(summary.reason, EndReason::Interrupted);
        assert_eq!(summary.total_failures, 0);
        assert_eq!(summary.total_probes, transport.calls.load(Ordering::SeqCst));
        // Every worker was joined: nothing is still inside the transport.
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
        assert!(clock.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_request_stop_before_start_issues_no_probe() {
        let clock = FakeClock::new();
        let mut transport = MockProbeTransport::new();
        transport.expect_issue_probe().never();
        let runner = runner(Arc::new(transport), &clock);

        runner.stop_handle().request_stop();
        let summary = runner
            .start_run(RunConfig::new("fake://ok", 3, Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(summary.reason, EndReason::Interrupted);
        assert_eq!(summary.total_probes, 0);
    }

    #[tokio::test]
    async fn test_zero_duration_ends_at_first_check() {
        let clock = FakeClock::new();
        let transport = Arc::new(FakeTransport::always_ok());
        let summary = runner(transport, &clock)
            .start_run(RunConfig::new("fake://ok", 2, Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(summary.reason, EndReason::DurationElapsed);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_invalid_config_spawns_nothing() {
        let mut transport = MockProbeTransport::new();
        transport.expect_issue_probe().never();
        let runner = ProbeRunner::new(Arc::new(transport));

        let result = runner
            .start_run(RunConfig::new("fake://ok", 0, Duration::from_secs(1)))
            .await;

        assert!(matches!(result, Err(RunError::InvalidConfig(_))));
        assert!(!runner.stop_handle().is_stopped());
    }

    #[tokio::test]
    async fn test_runner_is_single_use() {
        let clock = FakeClock::new();
        let runner = runner(Arc::new(FakeTransport::always_ok()), &clock);
        let config = RunConfig::new("fake://ok", 1, Duration::from_millis(200));

        runner.start_run(config.clone()).await.unwrap();
        let second = runner.start_run(config).await;

        assert_eq!(second, Err(RunError::AlreadyStarted));
    }

    #[tokio::test]
    async fn test_concurrent_stop_requests_are_idempotent() {
        let clock = FakeClock::new();
        let transport = Arc::new(FakeTransport::always_ok());
        let runner = Arc::new(runner(transport, &clock));

        let stoppers: Vec<_> = (0..8)
            .map(|_| {
                let stop = runner.stop_handle();
                tokio::spawn(async move {
                    stop.request_stop();
                    stop.request_stop();
                })
            })
            .collect();
        for stopper in stoppers {
            stopper.await.unwrap();
        }

        let summary = runner
            .start_run(RunConfig::new("fake://ok", 2, Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(summary.reason, EndReason::Interrupted);
        assert_eq!(summary.total_failures, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_real_clock_duration_bound() {
        let transport = Arc::new(FakeTransport::always_ok());
        let runner = ProbeRunner::new(transport);

        let started = std::time::Instant::now();
        let summary = runner
            .start_run(
                RunConfig::new("fake://ok", 4, Duration::from_millis(300))
                    .with_poll_interval(Duration::from_millis(20)),
            )
            .await
            .unwrap();

        assert_eq!(summary.reason, EndReason::DurationElapsed);
        assert!(summary.elapsed >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_http_target_returning_503_ends_run() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/"))
                .times(1..)
                .respond_with(responders::status_code(503)),
        );

        let transport = Arc::new(
            crate::transport::HttpTransport::new(crate::transport::DEFAULT_USER_AGENT).unwrap(),
        );
        let runner = ProbeRunner::new(transport);

        let summary = runner
            .start_run(RunConfig::new(server.url_str("/"), 3, Duration::from_secs(30)))
            .await
            .unwrap();

        assert_eq!(summary.reason, EndReason::FailureDetected);
        assert!(summary.total_failures >= 1);
        assert!(summary.elapsed < Duration::from_secs(30));
    }

    /// Reporter that takes a long time to write failure records.
    struct SlowOnFailure(Duration);

    #[async_trait]
    impl Reporter for SlowOnFailure {
        async fn report(&self, record: &ProbeRecord) -> anyhow::Result<()> {
            if record.outcome.is_failure() {
                tokio::time::sleep(self.0).await;
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_slow_reporter_does_not_delay_stop() {
        let clock = FakeClock::new();
        let transport = Arc::new(FakeTransport::failing_at(
            1,
            Err(TransportError::Connect("refused".into())),
        ));
        let runner = runner(transport.clone(), &clock)
            .with_reporters(vec![Box::new(SlowOnFailure(Duration::from_millis(300)))]);
        transport.watch(&runner, &clock);

        let summary = runner
            .start_run(
                RunConfig::new("fake://down", 2, Duration::from_secs(60)).with_poll_interval(POLL),
            )
            .await
            .unwrap();

        assert_eq!(summary.reason, EndReason::FailureDetected);
        assert_eq!(summary.total_failures, 1);
        // The other worker may finish the call it had in flight, nothing more.
        assert!(summary.total_probes <= 2, "probes={}", summary.total_probes);
        assert_eq!(transport.calls_after_stop.load(Ordering::SeqCst), 0);

        let failed_at = *transport.failed_at.get().unwrap();
        assert!(
            clock.elapsed() - failed_at <= POLL,
            "failed at {:?}, stopped at {:?}",
            failed_at,
            clock.elapsed()
        );
    }
}
