//! Command-line surface and the interactive controller REPL.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::controller::Controller;

#[derive(Debug, Parser)]
#[command(name = "cortex", version, about = "Natural-language desktop automation pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the task queue server.
    Serve {
        /// Address to bind (default 0.0.0.0:5000, or CORTEX_BIND).
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Run the desktop agent that polls for and executes plans.
    Agent {
        /// Queue server URL (default http://127.0.0.1:5000, or CORTEX_QUEUE_URL).
        #[arg(long)]
        queue_url: Option<String>,
        /// Log actions instead of performing them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the interactive controller.
    Controller {
        /// Queue server URL (default http://127.0.0.1:5000, or CORTEX_QUEUE_URL).
        #[arg(long)]
        queue_url: Option<String>,
        /// Keep memory in process only instead of the libSQL file.
        #[arg(long)]
        ephemeral_memory: bool,
    },
    /// Send one raw plan to the queue.
    Submit {
        /// Plan JSON, e.g. '[{"tool":"open_application","parameters":{"app_name":"notepad.exe"}}]'
        plan: String,
        /// Queue server URL (default http://127.0.0.1:5000, or CORTEX_QUEUE_URL).
        #[arg(long)]
        queue_url: Option<String>,
    },
}

fn is_exit(line: &str) -> bool {
    matches!(line.to_ascii_lowercase().as_str(), "exit" | "quit" | "/quit")
}

/// Read utterances line by line until EOF or `exit`/`quit`, reporting every
/// turn's outcome. No outcome stops the loop.
pub async fn run_repl<R, W>(controller: &Controller, input: R, mut out: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    loop {
        out.write_all(b"\n> ").await?;
        out.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit(line) {
            break;
        }

        let outcome = controller.handle(line).await;
        out.write_all(format!("{outcome}\n").as_bytes()).await?;
    }

    out.flush().await
}
