#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context as _;
use args::Args;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use waypoint_config::Config;
use waypoint_core::UserFacingError;
use waypoint_mcp::ConnectionPool;
use waypoint_router::{Conversation, Runtime, TurnReply};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    let _telemetry_guard = waypoint_telemetry::init(config.telemetry.as_ref(), &args.log_filter)?;

    tracing::info!(config_path = %args.config.display(), "starting waypoint");

    let embedder = waypoint_embeddings::build_embedder(&config.embeddings)?;
    let pool = Arc::new(ConnectionPool::new(&config.registry, &config.mcp));
    let executor = waypoint_agent::build_executor(&config, pool);

    let Config { router, registry, .. } = config;

    eprintln!("Caching registry embeddings...");
    let runtime = Runtime::initialize(router, registry, embedder, executor)
        .await
        .context("cannot route without registry embeddings")?;
    eprintln!("Cached embeddings for {} tool(s).", runtime.registry().len());

    if !runtime.preloaded().is_empty() {
        eprintln!(
            "Preloaded {} tool(s) from usage history: {}",
            runtime.preloaded().len(),
            runtime.preloaded().join(", ")
        );
    }

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    repl(runtime.conversation(), &shutdown).await?;

    tracing::info!("waypoint stopped");
    Ok(())
}

/// Read lines until EOF, `quit`/`exit`, or a shutdown signal
async fn repl(mut conversation: Conversation, shutdown: &CancellationToken) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "quit" | "exit") {
            break;
        }

        // dropping the turn before it returns leaves the conversation untouched
        let reply = tokio::select! {
            () = shutdown.cancelled() => {
                eprintln!("\nTurn cancelled.");
                break;
            }
            reply = conversation.handle_turn(input) => reply,
        };

        report(&reply);
    }

    eprintln!("Goodbye.");
    Ok(())
}

fn report(reply: &TurnReply) {
    if !reply.discovered.is_empty() {
        eprintln!("  [Discovered {} new tool(s): {}]", reply.discovered.len(), reply.discovered.join(", "));
    }
    if !reply.evicted.is_empty() {
        eprintln!("  [Cache evicted: {}]", reply.evicted.join(", "));
    }
    for diagnostic in &reply.diagnostics {
        eprintln!("  [{}] {}", diagnostic.error_type(), diagnostic.client_message());
    }

    match &reply.failure {
        Some(error) => eprintln!("error: {}", error.client_message()),
        None => println!("{}", reply.text),
    }
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
