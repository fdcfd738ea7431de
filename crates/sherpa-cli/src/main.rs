//! `sherpa` binary: health endpoint, worker pool and example task runner.

mod cli;
mod health;
mod runtime;
mod telemetry;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sherpa_core::tasks::{
    self, DemoTask, DemoTaskHandler, FailureInjector, ProcessDataHandler, ProcessDataTask,
};
use sherpa_core::{AppConfig, TaskRegistry};

use cli::{Cli, Commands};
use runtime::Runtime;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env().context("reading SHERPA_* environment")?;
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    telemetry::init(config.log_format, config.debug);

    tracing::info!(
        app = %config.app_name,
        environment = %config.environment,
        workers = config.workers,
        "starting"
    );

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            serve(&config).await
        }
        Commands::Demo {
            message,
            count,
            fail_rate,
        } => demo(&config, message, count, fail_rate).await,
        Commands::Submit { name, payload } => submit(&config, &name, &payload).await,
    }
}

/// Health endpoint plus an idle worker pool.
///
/// The queue is in-process and the router exposes no submission route, so
/// these workers only receive tasks once a shared broker backs `TaskQueue`.
async fn serve(config: &AppConfig) -> Result<()> {
    let mut registry = TaskRegistry::new();
    tasks::register_examples(&mut registry)?;
    let runtime = Runtime::start(config.workers, registry);
    tracing::info!(
        workers = config.workers,
        "workers attached to the in-process queue; no remote submission yet"
    );

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!(addr = %config.bind, "listening");

    axum::serve(listener, health::router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    runtime.shutdown().await;
    Ok(())
}

async fn demo(config: &AppConfig, message: String, count: usize, fail_rate: f64) -> Result<()> {
    let mut registry = TaskRegistry::new();
    registry.register::<DemoTask, _>(DemoTaskHandler::new(
        FailureInjector::new(fail_rate, 2),
        Duration::from_millis(100),
    ))?;
    registry.register::<ProcessDataTask, _>(ProcessDataHandler::new(
        FailureInjector::new(fail_rate, 4),
        Duration::from_millis(200),
    ))?;
    let runtime = Runtime::start(config.workers, registry);

    let mut handles = Vec::with_capacity(count + 1);
    for i in 0..count {
        let task = DemoTask {
            message: format!("{message} #{}", i + 1),
        };
        handles.push(runtime.client.submit(&task).await?);
    }
    let data = ProcessDataTask {
        data: serde_json::json!({"key": "value", "number": 42}),
    };
    handles.push(runtime.client.submit(&data).await?);

    for handle in &handles {
        let result = handle.wait().await?;
        println!(
            "{} {}",
            handle.task_id(),
            serde_json::to_string(&result).context("encoding result")?
        );
    }

    runtime.shutdown().await;
    Ok(())
}

async fn submit(config: &AppConfig, name: &str, payload: &str) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("payload must be valid JSON")?;

    let mut registry = TaskRegistry::new();
    tasks::register_examples(&mut registry)?;
    let runtime = Runtime::start(config.workers, registry);

    let handle = runtime.client.submit_json(name, payload).await?;
    let result = handle.wait().await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    runtime.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl-c handler failed");
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;

    tracing::info!("shutdown signal received");
}
