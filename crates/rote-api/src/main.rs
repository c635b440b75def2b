//! Rote CLI and REST API entry point.
//!
//! Binary name: `rote`
//!
//! Parses CLI arguments, sets up tracing and application state, then
//! dispatches to a command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use std::process::ExitCode;

use clap::Parser;
use clap_complete::generate;
use tracing::Instrument;

use rote_observe::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};

use cli::run::{ResumeArgs, RunArgs};
use cli::{Cli, Commands};
use state::{AppState, ExecOptions};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let options = TracingOptions {
        verbosity: cli.verbose,
        quiet: cli.quiet,
        format: if cli.json { LogFormat::Json } else { LogFormat::Pretty },
        otel: cli.otel,
    };
    if let Err(e) = init_tracing(&options) {
        eprintln!("warning: tracing setup failed: {e}");
    }

    let command = cli.command.name();
    let span = tracing::info_span!("rote.command", command);
    let outcome = dispatch(cli).instrument(span).await;
    shutdown_tracing();

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {e:#}", console::style("error:").red().bold());
            ExitCode::from(2)
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<u8> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "rote", &mut std::io::stdout());
        return Ok(0);
    }

    let state = AppState::init().await?;
    let json = cli.json;

    match cli.command {
        Commands::Compile { trace, output, llm } => {
            cli::compile::compile_trace(&state, &trace, &output, llm, json).await
        }

        Commands::Run {
            package,
            input,
            replay,
            auto_fix,
            non_interactive,
            out,
        } => {
            let args = RunArgs {
                package,
                input,
                exec: ExecOptions { replay, auto_fix },
                non_interactive,
                out,
            };
            cli::run::run_routine(&state, args, json).await
        }

        Commands::Resume {
            run_id,
            answers,
            replay,
            auto_fix,
        } => {
            let args = ResumeArgs {
                run_id,
                answers,
                exec: ExecOptions { replay, auto_fix },
            };
            cli::run::resume_run(&state, args, json).await
        }

        Commands::Cancel { run_id } => cli::run::cancel_run(&state, &run_id, json).await,

        Commands::Runs => cli::runs::list_runs(&state, json).await,

        Commands::Validate { package } => cli::validate::validate_package(&package, json).await,

        Commands::Serve { port, host } => {
            let host = host.unwrap_or_else(|| state.config.server.host.clone());
            let port = port.unwrap_or(state.config.server.port);
            serve(state, &host, port, cli.quiet).await?;
            Ok(0)
        }

        Commands::Completions { .. } => Ok(0),
    }
}

async fn serve(state: AppState, host: &str, port: u16, quiet: bool) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    if !quiet {
        println!(
            "  {} Rote API listening on {}",
            console::style("⚡").bold(),
            console::style(format!("http://{addr}/api/v1")).cyan()
        );
        println!("  {}", console::style("Press Ctrl+C to stop").dim());
    }
    tracing::info!(%addr, data_dir = %state.data_dir.display(), "server started");

    let router = http::router::build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
