use crate::utils::create_parent_dir;

#[cfg(feature = "cli")]
use clap::ValueEnum;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;

// ----------------------------------------------------------------------------
// Regressor
// ----------------------------------------------------------------------------

/// Regression used by the deconvolution engine.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Regressor {
    /// Non-negative least squares.
    Nnls,
    /// Robust (soft L1) least squares.
    #[default]
    Robust,
}

impl Display for Regressor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let lowercase = format!("{:?}", self).to_lowercase();
        write!(f, "{lowercase}")
    }
}

// ----------------------------------------------------------------------------
// Deconvolution Params
// ----------------------------------------------------------------------------

/// Numeric parameters of a deconvolution run.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DeconvolutionParams {
    /// Number of bootstrap iterations, 0 disables confidence intervals.
    pub bootstrap: usize,

    /// Kernel smoothing bandwidth (days).
    pub bandwidth: f64,

    /// Regression method.
    pub regressor: Regressor,

    pub regressor_params: BTreeMap<String, Value>,

    pub deconv_params: BTreeMap<String, Value>,
}

impl Default for DeconvolutionParams {
    fn default() -> Self {
        DeconvolutionParams {
            bootstrap: 0,
            bandwidth: 30.0,
            regressor: Regressor::Robust,
            regressor_params: BTreeMap::from([("f_scale".to_string(), json!(0.01))]),
            deconv_params: BTreeMap::from([("min_tol".to_string(), json!(1e-3))]),
        }
    }
}

impl DeconvolutionParams {
    pub fn new() -> Self {
        DeconvolutionParams::default()
    }

    /// Check that the parameters are in range.
    ///
    /// ```rust
    /// use vasco::deconvolve::DeconvolutionParams;
    ///
    /// let mut params = DeconvolutionParams::default();
    /// assert!(params.validate().is_ok());
    /// params.bandwidth = 0.0;
    /// assert!(params.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), Report> {
        if !(self.bandwidth.is_finite() && self.bandwidth > 0.0) {
            return Err(eyre!("Invalid bandwidth: {}", self.bandwidth)
                .suggestion("The kernel bandwidth must be a positive number."));
        }
        Ok(())
    }

    /// Reads [`DeconvolutionParams`] from a JSON file, missing fields keep their defaults.
    pub fn read<P>(path: &P) -> Result<DeconvolutionParams, Report>
    where
        P: AsRef<Path> + Debug,
    {
        let input = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read deconvolution parameters: {path:?}."))?;
        let params = serde_json::from_str(&input)
            .wrap_err_with(|| format!("Failed to deserialize deconvolution parameters: {input}"))?;
        Ok(params)
    }

    /// Write [`DeconvolutionParams`] to a JSON file.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use vasco::deconvolve::DeconvolutionParams;
    ///
    /// let dir = tempfile::tempdir()?;
    /// let path = dir.path().join("params.json");
    /// DeconvolutionParams::default().write(&path)?;
    /// assert_eq!(DeconvolutionParams::read(&path)?, DeconvolutionParams::default());
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn write<P>(&self, path: &P) -> Result<(), Report>
    where
        P: AsRef<Path> + Debug,
    {
        create_parent_dir(path)?;
        let output = serde_json::to_string_pretty(self)
            .wrap_err(format!("Failed to serialize deconvolution parameters: {self:?}"))?;
        std::fs::write(path, output).wrap_err(format!("Failed to write deconvolution parameters: {path:?}"))?;
        Ok(())
    }
}
