use anyhow::{Context, Result, bail};
use clap::Parser;
use stampede::{Config, RunConfig};
use std::{
    io::{BufRead, Write},
    path::PathBuf,
    time::Duration,
};

/// Flood an HTTP target with concurrent requests until it shows distress,
/// the duration elapses, or you press Ctrl+C.
#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", env = "STAMPEDE_CONFIG")]
    pub config: Option<PathBuf>,

    /// URL to probe
    #[arg(short, long)]
    pub target: Option<String>,

    /// Number of concurrent workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// How long to run, e.g. "30s" or "2m"
    #[arg(short, long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Per-probe timeout, e.g. "5s"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::new(path),
            None => Ok(Config::default()),
        }
    }

    /// Builds the run config: flags first, then the config file, then
    /// whatever is still missing is asked on `input`.
    pub fn resolve<R: BufRead, W: Write>(
        &self,
        conf: &Config,
        input: &mut R,
        output: &mut W,
    ) -> Result<RunConfig> {
        let target = match self.target.clone().or_else(|| conf.target.clone()) {
            Some(target) => target,
            None => prompt(input, output, "Enter the URL to test: ")?,
        };

        let workers = match self.workers.or(conf.workers) {
            Some(workers) => workers,
            None => prompt(input, output, "Enter number of concurrent workers: ")?
                .parse::<usize>()
                .context("Worker count must be a whole number")?,
        };

        let duration = match self.duration.or(conf.duration) {
            Some(duration) => duration,
            None => prompt(input, output, "Enter duration of test in seconds: ")?
                .parse::<u64>()
                .map(Duration::from_secs)
                .context("Duration must be a whole number of seconds")?,
        };

        Ok(RunConfig::new(target, workers, duration)
            .with_probe_timeout(self.timeout.unwrap_or(conf.probe.timeout))
            .with_poll_interval(conf.supervisor.poll_interval))
    }
}

fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<String> {
    output.write_all(question.as_bytes())?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line).context("Failed to read answer")? == 0 {
        bail!("No answer given to: {}", question.trim_end());
    }
    Ok(line.trim().to_string())
}
