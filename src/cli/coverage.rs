//! Aggregate mutation coverage for the rows of a signature matrix.

use crate::coverage::{self, CoverageAggregator, CoverageRecord, CoverageRequest, LapisClient};
use crate::mutation::MutationType;
use crate::signature::Matrix;
use crate::utils::create_parent_dir;

use chrono::NaiveDate;
use clap::Parser;
use color_eyre::eyre::{Report, Result};
use color_eyre::Help;
use log::{info, warn};
use std::path::PathBuf;

/// CLI arguments of the coverage command.
#[derive(Clone, Debug, Parser)]
pub struct Args {
    /// Signature matrix (.csv or .tsv) whose rows are aggregated.
    #[clap(short = 'm', long, required = true)]
    pub matrix: PathBuf,

    /// First sampling date (YYYY-MM-DD).
    #[clap(long, required = true)]
    pub start: NaiveDate,

    /// Last sampling date (YYYY-MM-DD).
    #[clap(long, required = true)]
    pub end: NaiveDate,

    /// Restrict counts to one sampling location.
    #[clap(short = 'l', long)]
    pub location: Option<String>,

    /// Mutation type of the matrix rows.
    #[clap(long, value_enum, default_value_t = MutationType::default())]
    pub kind: MutationType,

    /// Base url of the LAPIS instance.
    #[clap(long, env = "VASCO_LAPIS_URL", required = true)]
    pub lapis_url: String,

    /// Output table of stratified counts (.csv or .tsv).
    #[clap(short = 'o', long, required = true)]
    pub output: PathBuf,
}

/// Query coverage for every matrix row and write the stratified records.
pub async fn coverage(args: &Args) -> Result<Vec<CoverageRecord>, Report> {
    let matrix = Matrix::read(&args.matrix)?;
    let mutations = matrix.codes(args.kind)?;
    let request = CoverageRequest {
        mutations,
        kind: args.kind,
        start: args.start,
        end: args.end,
        location: args.location.clone(),
    };

    let aggregator = CoverageAggregator::new(LapisClient::new(&args.lapis_url));
    let aggregated = aggregator.aggregate(&request).await?;

    for failed in aggregated.iter().filter(|c| !c.errors.is_empty()) {
        warn!("{}: {} of its count queries failed.", failed.mutation, failed.errors.len());
    }
    let records = coverage::records(&aggregated);
    if records.is_empty() {
        warn!("No counts were found for the requested dates and location.");
    }

    create_parent_dir(&args.output)?;
    coverage::write(&records, &args.output).suggestion("The output extension must be .csv or .tsv")?;
    info!("Wrote {} coverage records: {:?}", records.len(), args.output);
    Ok(records)
}

// ----------------------------------------------------------------------------
// Locations
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Parser)]
pub struct LocationsArgs {
    /// Base url of the LAPIS instance.
    #[clap(long, env = "VASCO_LAPIS_URL", required = true)]
    pub lapis_url: String,
}

/// Print the sampling locations of a LAPIS instance, one per line.
pub async fn locations(args: &LocationsArgs) -> Result<Vec<String>, Report> {
    let locations = LapisClient::new(&args.lapis_url).locations().await?;
    locations.iter().for_each(|location| println!("{location}"));
    Ok(locations)
}
