//! CLI for inspecting vmio routing policy, negotiation, job codes and
//! package captures.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod capture;
mod inspect;

use anyhow::Result;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "vmio", version, about = "Routing, job-code and capture inspector for vmio channels")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the route of one or more commands.
    Route(inspect::RouteArgs),

    /// Print a built-in routing table.
    Table(inspect::TableArgs),

    /// Negotiate a client table against a server table.
    Negotiate(inspect::NegotiateArgs),

    /// Map commands to job codes, or job codes back to commands.
    JobCode(inspect::JobCodeArgs),

    /// Load, validate and summarise a channel config file.
    Config(inspect::ConfigArgs),

    /// Decode a capture file of framed packages.
    Frames(capture::FramesArgs),

    /// Append one framed package to a capture file.
    Pack(capture::PackArgs),

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

/// Output format for table and lookup commands.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable table.
    #[default]
    Table,
    /// Machine-readable JSON.
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = cli.dispatch() {
        eprintln!("vmio: {e:#}");
        std::process::exit(1);
    }
}

/// Logs to stderr. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

impl Cli {
    fn dispatch(self) -> Result<()> {
        match self.command {
            Command::Route(args) => inspect::route(&args),
            Command::Table(args) => inspect::table(&args),
            Command::Negotiate(args) => inspect::negotiate(&args),
            Command::JobCode(args) => inspect::job_code(&args),
            Command::Config(args) => inspect::config(&args),
            Command::Frames(args) => capture::frames(&args),
            Command::Pack(args) => capture::pack(&args),
            Command::Completion { shell } => {
                clap_complete::generate(shell, &mut Self::command(), "vmio", &mut std::io::stdout());
                Ok(())
            }
        }
    }
}
