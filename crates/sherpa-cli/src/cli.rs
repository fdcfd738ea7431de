use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use sherpa_core::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "sherpa", version, about = "Retrying background task runner")]
pub struct Cli {
    /// Number of workers (overrides SHERPA_WORKERS)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Log output format: pretty or json (overrides SHERPA_LOG_FORMAT)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the health endpoint and the worker pool until interrupted
    Serve {
        /// Listen address (overrides SHERPA_BIND)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Submit the example tasks and print their results
    Demo {
        #[arg(long, default_value = "Hello from Sherpa!")]
        message: String,

        /// How many demo tasks to submit
        #[arg(long, default_value_t = 3)]
        count: usize,

        /// Failure probability on early attempts
        #[arg(long, default_value_t = 0.3)]
        fail_rate: f64,
    },

    /// Submit one task by name and wait for its result
    Submit {
        /// Registered task name, e.g. tasks.example.demo_task
        name: String,

        /// JSON payload
        #[arg(long, default_value = "{}")]
        payload: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_overrides() {
        let cli = Cli::try_parse_from([
            "sherpa",
            "--workers",
            "4",
            "--log-format",
            "json",
            "serve",
            "--bind",
            "0.0.0.0:9000",
        ])
        .unwrap();
        assert_eq!(cli.workers, Some(4));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert!(matches!(cli.command, Commands::Serve { bind: Some(addr) } if addr.port() == 9000));
    }

    #[test]
    fn submit_defaults_to_empty_payload() {
        let cli = Cli::try_parse_from(["sherpa", "submit", "tasks.example.demo_task"]).unwrap();
        match cli.command {
            Commands::Submit { name, payload } => {
                assert_eq!(name, "tasks.example.demo_task");
                assert_eq!(payload, "{}");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["sherpa", "--log-format", "xml", "demo"]).is_err());
    }
}
