//! [Command-line interface](Cli) (CLI) of the main binary.

pub mod coverage;
pub mod deconvolve;
pub mod signatures;
#[cfg(test)]
mod tests;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

// ----------------------------------------------------------------------------
// CLI Entry Point
// ----------------------------------------------------------------------------

/// The command-line interface (CLI).
/// ---
/// The CLI parses user input from [`std::env::args`](https://doc.rust-lang.org/std/env/fn.args.html) in the main function.
/// ```no_run
/// use clap::Parser;
/// let args = vasco::cli::Cli::parse();
/// ```
/// Here is a manual example of setting the command-line input:
/// ```rust
/// use clap::Parser;
/// use vasco::cli::{Cli, Command};
///
/// let input = ["vasco", "signatures", "list", "--definitions", "voc"];
/// let args = Cli::parse_from(input);
/// assert!(matches!(args.command, Command::Signatures(_)));
/// ```
#[derive(Debug, Parser)]
#[clap(name = "vasco", author, version)]
#[clap(about = "vasco estimates lineage proportions in wastewater from mutation counts.")]
pub struct Cli {
    #[clap(subcommand)]
    #[clap(help = "Set the command.")]
    pub command: Command,

    /// Set the output [Verbosity] level.
    #[clap(short = 'v', long)]
    #[clap(value_enum, default_value_t = Verbosity::default())]
    #[clap(hide_possible_values = false)]
    #[clap(global = true)]
    #[clap(help = "Set the output verbosity level.")]
    pub verbosity: Verbosity,
}

/// CLI [commands](#variants).
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List lineage definitions or build a signature matrix.
    #[clap(about = "List lineage definitions or build a signature matrix.")]
    Signatures(signatures::Args),

    /// Aggregate mutation counts and coverage from a LAPIS instance.
    #[clap(about = "Aggregate mutation counts and coverage.")]
    Coverage(coverage::Args),

    /// List the sampling locations of a LAPIS instance.
    #[clap(about = "List sampling locations.")]
    Locations(coverage::LocationsArgs),

    /// Estimate lineage proportions over time.
    #[clap(about = "Estimate lineage proportions over time.")]
    Deconvolve(deconvolve::Args),
}

// -----------------------------------------------------------------------------
// Verbosity
// -----------------------------------------------------------------------------

/// The output verbosity level.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, ValueEnum)]
pub enum Verbosity {
    #[default]
    Info,
    Warn,
    Debug,
    Error,
}

impl Display for Verbosity {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        // lowercase for RUST_LOG
        let lowercase = format!("{:?}", self).to_lowercase();
        write!(f, "{lowercase}")
    }
}
