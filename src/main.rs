use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use cortex::cli::{Cli, Command, run_repl};
use cortex::config::{ControllerConfig, ExecutorConfig, QueueConfig};
use cortex::controller::Controller;
use cortex::executor::{Desktop, DryRunDesktop, Executor, SystemDesktop};
use cortex::llm::{LlmConfig, create_provider};
use cortex::memory::{LibSqlStore, PlanMemory};
use cortex::plan::Plan;
use cortex::planner::Planner;
use cortex::queue::{QueueClient, TaskQueue, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind } => run_server(bind).await,
        Command::Agent { queue_url, dry_run } => run_agent(queue_url, dry_run).await,
        Command::Controller {
            queue_url,
            ephemeral_memory,
        } => run_controller(queue_url, ephemeral_memory).await,
        Command::Submit { plan, queue_url } => submit(plan, queue_url).await,
    }
}

/// Logs go to stderr; with `CORTEX_LOG_DIR` set they are also written to a
/// daily-rolling file there.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match std::env::var("CORTEX_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "cortex.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter())
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(filter())
                .with(stderr_layer)
                .init();
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn run_server(bind: Option<std::net::SocketAddr>) -> anyhow::Result<()> {
    let mut config = QueueConfig::from_env();
    if let Some(bind) = bind {
        config.bind = bind;
    }

    eprintln!("📬 Cortex queue v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Listening: http://{}", config.bind);
    eprintln!("   Routes: GET /, GET /health, POST /add_task, GET /get_task\n");

    server::serve(&config, TaskQueue::new(), shutdown_signal())
        .await
        .context("queue server failed")
}

async fn run_agent(queue_url: Option<String>, dry_run: bool) -> anyhow::Result<()> {
    let mut config = ExecutorConfig::from_env();
    if let Some(url) = queue_url {
        config.queue_url = url;
    }
    config.dry_run |= dry_run;

    eprintln!("🖐️  Cortex desktop agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Queue: {}", config.queue_url);
    eprintln!(
        "   Poll every {}s (offline backoff {}s)",
        config.poll_interval.as_secs(),
        config.offline_backoff.as_secs()
    );
    eprintln!("   Mode: {}\n", if config.dry_run { "dry run" } else { "live" });

    let desktop: Arc<dyn Desktop> = if config.dry_run {
        Arc::new(DryRunDesktop)
    } else {
        Arc::new(SystemDesktop::new())
    };
    let source = Arc::new(QueueClient::new(config.queue_url.clone()));
    let executor = Executor::new(source, desktop, &config);

    let handle = executor.shutdown_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        handle.shutdown();
    });

    executor.run().await;
    Ok(())
}

async fn run_controller(queue_url: Option<String>, ephemeral_memory: bool) -> anyhow::Result<()> {
    let mut config = ControllerConfig::from_env();
    if let Some(url) = queue_url {
        config.queue_url = url;
    }

    let llm_config = LlmConfig::from_env()?;
    let llm = create_provider(&llm_config)?;

    let memory = if ephemeral_memory {
        PlanMemory::in_memory()
    } else {
        let store = LibSqlStore::new_local(&config.memory_db_path)
            .await
            .with_context(|| {
                format!("opening memory at {}", config.memory_db_path.display())
            })?;
        PlanMemory::new(Arc::new(store))
    };

    eprintln!("🤖 Cortex controller v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {:?} / {}", llm_config.backend, llm_config.model);
    eprintln!("   Queue: {}", config.queue_url);
    if ephemeral_memory {
        eprintln!("   Memory: in-process");
    } else {
        eprintln!("   Memory: {}", config.memory_db_path.display());
    }
    eprintln!("   Type a command and press Enter. 'exit' to quit.");

    let planner = Planner::new(llm).with_retry(llm_config.retry);
    let sink = Arc::new(QueueClient::new(config.queue_url.clone()));
    let controller =
        Controller::new(memory, planner, sink).with_memory_results(config.memory_results);

    run_repl(
        &controller,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;
    Ok(())
}

async fn submit(plan: String, queue_url: Option<String>) -> anyhow::Result<()> {
    let url = queue_url
        .or_else(|| std::env::var("CORTEX_QUEUE_URL").ok())
        .unwrap_or_else(|| cortex::config::DEFAULT_QUEUE_URL.to_string());

    if let Err(e) = Plan::parse(&plan) {
        eprintln!("⚠️  Plan does not validate locally ({e}); sending anyway");
    }

    let client = QueueClient::new(url);
    match client.add_task(&plan).await {
        Ok(()) => {
            println!("Task submitted.");
            if let Ok(status) = client.status().await {
                println!("Server response: {status}");
            }
            Ok(())
        }
        Err(e) if e.is_transport() => {
            anyhow::bail!("Could not connect to queue server at {}. Is it running?", client.base_url())
        }
        Err(e) => Err(e.into()),
    }
}
