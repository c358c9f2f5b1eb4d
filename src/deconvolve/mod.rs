//! Estimate variant proportions over time from coverage records and a signature matrix.
//!
//! The pipeline runs four typed stages, each callable on its own:
//!
//! 1. [`tallymut`]: join coverage records with the matrix.
//! 2. [`configure`]: build the engine's variant and deconvolution declarations.
//! 3. [`Engine::run`]: invoke the deconvolution engine.
//! 4. [`parse_output`]: read the engine's JSON summary into a [`DeconvolutionResult`].

mod config;
mod engine;
mod params;
mod result;
mod tallymut;
#[cfg(test)]
mod tests;

pub use config::{configure, to_yaml, write_yaml, DeconvConfig, KernelParams, VariantsConfig};
pub use engine::{Engine, EngineInput, Lollipop, DEFAULT_ENGINE};
pub use params::{DeconvolutionParams, Regressor};
pub use result::{parse_output, DeconvolutionResult, TimeseriesPoint, VariantTimeseries};
pub use tallymut::{tallymut, TALLYMUT_COLUMNS};

use crate::coverage::CoverageRecord;
use crate::signature::Matrix;

use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use log::{debug, info};
use std::sync::Arc;
use strum::EnumIter;

/// Column of the tallymut table that names each mutation.
pub const NAMEFIELD: &str = "mutation";

/// Stages of a pipeline run, reported as they start.
#[derive(Clone, Copy, Debug, EnumIter, Eq, PartialEq)]
pub enum Stage {
    Join,
    Configure,
    Invoke,
    Parse,
}

/// Runs the deconvolution stages with one [`Engine`].
#[derive(Clone, Debug)]
pub struct DeconvolutionPipeline {
    engine: Arc<dyn Engine>,
}

impl Default for DeconvolutionPipeline {
    fn default() -> Self {
        DeconvolutionPipeline::new(Lollipop::default())
    }
}

impl DeconvolutionPipeline {
    pub fn new<E: Engine + 'static>(engine: E) -> Self {
        DeconvolutionPipeline { engine: Arc::new(engine) }
    }

    pub fn from_arc(engine: Arc<dyn Engine>) -> Self {
        DeconvolutionPipeline { engine }
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Run every stage. Any failure aborts the run, there is no partial result.
    pub fn run(
        &self,
        records: &[CoverageRecord],
        matrix: &Matrix,
        params: &DeconvolutionParams,
    ) -> Result<DeconvolutionResult, Report> {
        self.run_with(records, matrix, params, |_| {})
    }

    /// Run every stage, calling `on_stage` as each one starts.
    pub fn run_with<F>(
        &self,
        records: &[CoverageRecord],
        matrix: &Matrix,
        params: &DeconvolutionParams,
        mut on_stage: F,
    ) -> Result<DeconvolutionResult, Report>
    where
        F: FnMut(Stage),
    {
        params.validate()?;
        if matrix.is_empty() {
            return Err(eyre!("Signature matrix is empty.")
                .suggestion("Select at least one variant with signature mutations."));
        }

        // --------------------------------------------------------------------
        // Join

        on_stage(Stage::Join);
        let table = tallymut(records, matrix)?;
        if table.rows.is_empty() {
            return Err(eyre!("No coverage records match the signature matrix.")
                .suggestion("Check that coverage was fetched for the matrix mutations."));
        }

        // --------------------------------------------------------------------
        // Configure

        on_stage(Stage::Configure);
        let (variants_config, deconv_config) = configure(matrix, params);

        let dir = tempfile::tempdir().wrap_err("Failed to create a working directory.")?;
        let input = EngineInput {
            tallymut: dir.path().join("tallymut.tsv"),
            variants_config: dir.path().join("variants_config.yaml"),
            deconv_config: dir.path().join("deconv_config.yaml"),
            namefield: NAMEFIELD.to_string(),
            output_csv: dir.path().join("deconvolved.csv"),
            output_json: dir.path().join("deconvolved.json"),
        };
        table.write(&input.tallymut, Some('\t'))?;
        write_yaml(&variants_config, &input.variants_config)?;
        write_yaml(&deconv_config, &input.deconv_config)?;
        debug!("Engine input: {input:?}");

        // --------------------------------------------------------------------
        // Invoke

        on_stage(Stage::Invoke);
        info!(
            "Deconvolving {} tallymut rows over {} variants (bootstrap={}).",
            table.rows.len(),
            matrix.variants().len(),
            params.bootstrap
        );
        self.engine.run(&input)?;

        // --------------------------------------------------------------------
        // Parse

        on_stage(Stage::Parse);
        let text = std::fs::read_to_string(&input.output_json)
            .map_err(|e| crate::Error::Engine(format!("Missing engine output {:?}: {e}", input.output_json)))?;
        let result = parse_output(&text, params.bootstrap)?;
        Ok(result)
    }
}
