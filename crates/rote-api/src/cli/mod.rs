//! CLI command definitions for the `rote` binary.
//!
//! Uses clap derive macros. Each subcommand has a handler module that
//! returns the process exit code.

pub mod compile;
pub mod input;
pub mod prompt;
pub mod run;
pub mod runs;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Compile agent traces into routines and run them.
#[derive(Parser)]
#[command(name = "rote", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed logs (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout via OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a trace JSON file into a routine package.
    Compile {
        /// Path to the trace file.
        trace: PathBuf,

        /// Output directory for the package.
        #[arg(short, long, default_value = "./routine_out")]
        output: PathBuf,

        /// Ask an LLM to extract the happy path, falling back on failure.
        #[arg(long)]
        llm: bool,
    },

    /// Run a routine package.
    Run {
        /// Package directory.
        package: PathBuf,

        /// Input as a JSON file or inline JSON. Defaults to the package's input.json.
        #[arg(short, long)]
        input: Option<String>,

        /// Answer tools and UDFs from recorded fixtures.
        #[arg(long)]
        replay: bool,

        /// Let an LLM propose fixes when a step fails.
        #[arg(long)]
        auto_fix: bool,

        /// Stop at the first prompt instead of asking interactively.
        #[arg(long)]
        non_interactive: bool,

        /// Also write the run result to this file.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Resume a suspended run.
    Resume {
        /// Run id printed when the run paused.
        run_id: String,

        /// Answers as a JSON file or inline JSON object. Prompts interactively when omitted.
        #[arg(short, long)]
        answers: Option<String>,

        /// The run was started with --replay.
        #[arg(long)]
        replay: bool,

        /// Let an LLM propose fixes when a step fails.
        #[arg(long)]
        auto_fix: bool,
    },

    /// Cancel a suspended run.
    Cancel {
        run_id: String,
    },

    /// List suspended runs.
    Runs,

    /// Check a routine package without running it.
    Validate {
        /// Package directory.
        package: PathBuf,
    },

    /// Start the REST API server.
    Serve {
        /// Port to listen on. Defaults to `[server] port`.
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to. Defaults to `[server] host`.
        #[arg(long)]
        host: Option<String>,
    },

    /// Generate shell completions.
    Completions {
        shell: Shell,
    },
}

impl Commands {
    /// Name used in the command span.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Compile { .. } => "compile",
            Commands::Run { .. } => "run",
            Commands::Resume { .. } => "resume",
            Commands::Cancel { .. } => "cancel",
            Commands::Runs => "runs",
            Commands::Validate { .. } => "validate",
            Commands::Serve { .. } => "serve",
            Commands::Completions { .. } => "completions",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "rote", "run", "pkg", "--replay", "--non-interactive", "-i", "{}", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run {
                package,
                input,
                replay,
                auto_fix,
                non_interactive,
                ..
            } => {
                assert_eq!(package, PathBuf::from("pkg"));
                assert_eq!(input.as_deref(), Some("{}"));
                assert!(replay && non_interactive && !auto_fix);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["rote", "-vv", "runs"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.command.name(), "runs");
    }
}
