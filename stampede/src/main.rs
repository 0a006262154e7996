/// Entry point for the stampede load runner
///
/// Builds a run config from flags, the config file and prompts, wires
/// SIGINT/SIGTERM to the runner's stop handle and prints the summary.
mod cli;
mod logger;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use stampede::{
    HttpTransport, ProbeRunner, RunSummary, StopHandle, reporters::create_enabled_reporters,
};
use std::{io::Write, sync::Arc};
use tokio::signal::unix::{SignalKind, signal};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let _logger = logger::init();

    let cli = Cli::parse();
    tracing::debug!("Config path: {:?}", cli.config);
    let conf = cli.load_config()?;

    let run_config = {
        let stdin = std::io::stdin();
        cli.resolve(&conf, &mut stdin.lock(), &mut std::io::stdout())?
    };

    let transport = HttpTransport::new(&conf.probe.user_agent)?;
    let runner = ProbeRunner::new(Arc::new(transport))
        .with_reporters(create_enabled_reporters(&conf));

    let interrupt = tokio::spawn(forward_signals(runner.stop_handle()));

    let summary = runner
        .start_run(run_config)
        .await
        .context("Load test could not start")?;
    interrupt.abort();

    if let Err(e) = print_summary(&mut std::io::stdout().lock(), &summary) {
        tracing::warn!("Failed to print summary ({}): {}", summary, e);
    }
    Ok(())
}

fn print_summary<W: Write>(out: &mut W, summary: &RunSummary) -> std::io::Result<()> {
    writeln!(out, "{}", summary)?;
    writeln!(out, "Test finished.")?;
    out.flush()
}

#[derive(Debug, PartialEq, Eq)]
enum SignalAction {
    Stop,
    Exit,
}

/// First signal stops the run; once it is already stopping (earlier signal,
/// failure or elapsed duration) another signal means quit now.
fn on_signal(stop: &StopHandle) -> SignalAction {
    if stop.is_stopped() {
        SignalAction::Exit
    } else {
        stop.request_stop();
        SignalAction::Stop
    }
}

/// Forwards SIGINT/SIGTERM to the runner until the process ends.
async fn forward_signals(stop: StopHandle) {
    let (mut sigint_stream, mut sigterm_stream) =
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Failed to watch for termination signals: {}", e);
                return;
            }
        };

    loop {
        tokio::select! {
            _ = sigint_stream.recv() => {
                tracing::info!("SIGINT received, stopping test...");
            }
            _ = sigterm_stream.recv() => {
                tracing::info!("SIGTERM received, stopping test...");
            }
        }

        if on_signal(&stop) == SignalAction::Exit {
            tracing::warn!("Run already stopping, exiting without waiting for workers");
            std::process::exit(130);
        }
    }
}
