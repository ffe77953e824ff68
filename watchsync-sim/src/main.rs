//! Watch Together - Sync Simulator
//!
//! Runs a host and several followers against an in-process hub with network
//! latency and jitter, and reports how far the followers drift.
//!
//! Usage:
//!   cargo run -p watchsync-sim --release
//!   cargo run -p watchsync-sim -- --followers 5 --latency-ms 120 --jitter-ms 200
//!   cargo run -p watchsync-sim -- --no-echo --duration 30 --skew 0.05

mod metrics;
mod scenario;

use std::sync::Arc;

use parking_lot::RwLock;
use tracing_subscriber::EnvFilter;

/// Simulator options from the command line
#[derive(Debug, Clone)]
pub struct Options {
    pub followers: usize,
    pub latency_ms: u64,
    pub jitter_ms: u64,
    pub echo: bool,
    pub duration_secs: u64,
    /// Followers play up to this much fast or slow (0.03 = 3%)
    pub skew: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            followers: 3,
            latency_ms: 80,
            jitter_ms: 120,
            echo: true,
            duration_secs: 20,
            skew: 0.03,
        }
    }
}

impl Options {
    fn from_args(args: &[String]) -> Result<Self, String> {
        let mut options = Self::default();
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--no-echo" => options.echo = false,
                "--followers" => options.followers = parse_value(arg, iter.next())?,
                "--latency-ms" => options.latency_ms = parse_value(arg, iter.next())?,
                "--jitter-ms" => options.jitter_ms = parse_value(arg, iter.next())?,
                "--duration" => options.duration_secs = parse_value(arg, iter.next())?,
                "--skew" => options.skew = parse_value(arg, iter.next())?,
                other => return Err(format!("unknown argument {}", other)),
            }
        }
        Ok(options)
    }
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, String> {
    value
        .ok_or_else(|| format!("{} needs a value", flag))?
        .parse()
        .map_err(|_| format!("invalid value for {}", flag))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("watchsync_sim=info,watchsync_core=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let options = Options::from_args(&args)?;

    let metrics = Arc::new(RwLock::new(metrics::Metrics::new(options.followers)));
    scenario::run(&options, Arc::clone(&metrics)).await?;

    println!("{}", metrics.read().summary());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("watchsync-sim")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_flags() {
        let options =
            Options::from_args(&args(&["--followers", "5", "--no-echo", "--skew", "0"])).unwrap();
        assert_eq!(options.followers, 5);
        assert!(!options.echo);
        assert_eq!(options.skew, 0.0);
        assert_eq!(options.latency_ms, 80);
    }

    #[test]
    fn test_bad_flags_rejected() {
        assert!(Options::from_args(&args(&["--followers"])).is_err());
        assert!(Options::from_args(&args(&["--followers", "many"])).is_err());
        assert!(Options::from_args(&args(&["--fast"])).is_err());
    }
}
