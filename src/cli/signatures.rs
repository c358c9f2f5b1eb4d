//! List lineage definitions and build signature matrices.

use crate::mutation::MutationType;
use crate::signature::definition::{
    DerivedQuery, GithubSource, DEFAULT_COVSPECTRUM_URL, DEFAULT_DEFINITIONS_BRANCH, DEFAULT_DEFINITIONS_PATH,
    DEFAULT_DEFINITIONS_REPO, DEFAULT_MIN_PROPORTION,
};
use crate::signature::{LineageDefinition, Matrix, SignatureMatrixBuilder, SignatureVariant};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::info;
use std::path::PathBuf;

/// CLI arguments of the signatures commands.
#[derive(Debug, Parser)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[clap(about = "List lineage definitions.")]
    List(ListArgs),
    #[clap(about = "Build and write a signature matrix.")]
    Matrix(MatrixArgs),
}

// ----------------------------------------------------------------------------
// Definition Source
// ----------------------------------------------------------------------------

/// Where lineage definitions are read from.
#[derive(Clone, Debug, Parser)]
pub struct DefinitionArgs {
    /// Local directory of lineage definition YAML files.
    #[clap(short = 'd', long)]
    pub definitions: Option<PathBuf>,

    /// GitHub directory of lineage definitions, used without --definitions.
    #[clap(long, default_value_t = DefinitionArgs::default().github)]
    pub github: String,
}

impl Default for DefinitionArgs {
    fn default() -> Self {
        DefinitionArgs {
            definitions: None,
            github: format!(
                "https://github.com/{DEFAULT_DEFINITIONS_REPO}/tree/{DEFAULT_DEFINITIONS_BRANCH}/{DEFAULT_DEFINITIONS_PATH}"
            ),
        }
    }
}

impl DefinitionArgs {
    pub async fn load(&self) -> Result<Vec<LineageDefinition>, Report> {
        match &self.definitions {
            Some(dir) => LineageDefinition::read_dir(dir),
            None => {
                let source = GithubSource::from_url(&self.github)?;
                info!("Downloading lineage definitions: {}", self.github);
                source.fetch_all().await
            }
        }
    }
}

// ----------------------------------------------------------------------------
// List
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Parser)]
pub struct ListArgs {
    #[clap(flatten)]
    pub source: DefinitionArgs,
}

/// Print a table of lineage names and signature sizes.
pub async fn list(args: &ListArgs) -> Result<tabled::Table, Report> {
    let definitions = args.source.load().await?;

    let mut builder = tabled::builder::Builder::default();
    builder.push_record(["Name", "Short", "Nextstrain", "Mutations"]);
    for definition in &definitions {
        let variant = definition.to_variant()?;
        builder.push_record([
            variant.name.clone(),
            variant.short.clone().unwrap_or_default(),
            variant.nextstrain.clone().unwrap_or_default(),
            variant.len().to_string(),
        ]);
    }
    let table = builder.build();
    println!("{table}");
    Ok(table)
}

// ----------------------------------------------------------------------------
// Matrix
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Parser)]
pub struct MatrixArgs {
    #[clap(flatten)]
    pub source: DefinitionArgs,

    /// Restrict the matrix to these variants, all registered variants by default.
    #[clap(long = "variant")]
    pub variants: Vec<String>,

    /// Register a variant from hand-entered mutations, as NAME=M1,M2,...
    #[clap(long)]
    pub manual: Vec<String>,

    /// Register a variant derived from a CovSpectrum lineage query, as NAME=QUERY.
    #[clap(long)]
    pub derived: Vec<String>,

    /// Minimal proportion of sequences carrying a derived mutation.
    #[clap(long, default_value_t = MatrixArgs::default().min_proportion)]
    pub min_proportion: f64,

    #[clap(long, env = "VASCO_COVSPECTRUM_URL", default_value_t = MatrixArgs::default().covspectrum_url)]
    pub covspectrum_url: String,

    /// Mutation type of manual and derived variants.
    #[clap(long, value_enum, default_value_t = MatrixArgs::default().kind)]
    pub kind: MutationType,

    /// Output matrix (.csv or .tsv).
    #[clap(short = 'o', long, required = true)]
    pub output: PathBuf,
}

impl Default for MatrixArgs {
    fn default() -> Self {
        MatrixArgs {
            source: DefinitionArgs::default(),
            variants: Vec::new(),
            manual: Vec::new(),
            derived: Vec::new(),
            min_proportion: DEFAULT_MIN_PROPORTION,
            covspectrum_url: DEFAULT_COVSPECTRUM_URL.to_string(),
            kind: MutationType::Nucleotide,
            output: PathBuf::new(),
        }
    }
}

/// Split a `NAME=VALUE` argument.
pub fn split_assignment(arg: &str) -> Result<(&str, &str), Report> {
    match arg.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value.trim())),
        _ => Err(eyre!("Invalid assignment: {arg:?}").suggestion("Expected NAME=VALUE")),
    }
}

/// Register curated, manual and derived variants, then build the matrix.
///
/// Curated definitions are only loaded when variants are requested by name or
/// when no manual or derived variant is given.
pub async fn matrix(args: &MatrixArgs) -> Result<Matrix, Report> {
    let mut builder = SignatureMatrixBuilder::new();

    for arg in &args.manual {
        let (name, mutations) = split_assignment(arg)?;
        let variant = SignatureVariant::manual(name, mutations.split(','), args.kind)?;
        builder.add(variant)?;
    }

    for arg in &args.derived {
        let (name, variant_query) = split_assignment(arg)?;
        let query = DerivedQuery { variant_query: variant_query.to_string(), kind: args.kind, min_proportion: args.min_proportion };
        let results = query.fetch(&args.covspectrum_url).await?;
        builder.add(query.to_variant(name, &results))?;
    }

    let custom = builder.names().into_iter().map(String::from).collect_vec();
    let needs_curated = builder.is_empty() || args.variants.iter().any(|v| !custom.contains(v));
    if needs_curated {
        for definition in args.source.load().await? {
            let variant = definition.to_variant()?;
            // curated definitions never shadow a custom variant
            if builder.get(&variant.name).is_none() {
                builder.add(variant)?;
            }
        }
    }

    let matrix = builder.build_matrix(&args.variants)?;
    info!("Built a {} x {} signature matrix.", matrix.rows().len(), matrix.variants().len());
    matrix.write(&args.output).wrap_err(format!("Failed to write signature matrix: {:?}", args.output))?;
    Ok(matrix)
}
