use clap::Parser;
use color_eyre::eyre::{Report, Result};
use vasco::cli::{coverage, deconvolve, signatures, Cli, Command};

#[tokio::main]
async fn main() -> Result<(), Report> {
    // ------------------------------------------------------------------------
    // CLI Setup

    // Parse CLI parameters
    let args = Cli::parse();

    // initialize color_eyre crate for colorized logs
    color_eyre::install()?;

    // Set logging/verbosity level via RUST_LOG
    std::env::set_var("RUST_LOG", args.verbosity.to_string());

    // initialize env_logger crate for logging/verbosity level
    env_logger::init();

    // check which CLI command we're running
    match args.command {
        Command::Signatures(args) => match args.command {
            signatures::Command::List(args) => _ = signatures::list(&args).await?,
            signatures::Command::Matrix(args) => _ = signatures::matrix(&args).await?,
        },
        Command::Coverage(args) => _ = coverage::coverage(&args).await?,
        Command::Locations(args) => _ = coverage::locations(&args).await?,
        Command::Deconvolve(args) => _ = deconvolve::deconvolve(&args).await?,
    }

    Ok(())
}
