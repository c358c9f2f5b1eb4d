use crate::deconvolve::{DeconvolutionParams, Regressor};
use crate::signature::Matrix;

use color_eyre::eyre::{Report, Result, WrapErr};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;

/// Variant name mapping of the engine, each variant maps to itself.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct VariantsConfig {
    pub variants_pangolin: BTreeMap<String, String>,
}

impl VariantsConfig {
    pub fn new(matrix: &Matrix) -> Self {
        let variants_pangolin = matrix.variants().iter().map(|v| (v.clone(), v.clone())).collect();
        VariantsConfig { variants_pangolin }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct KernelParams {
    pub bandwidth: f64,
}

/// Numeric configuration of the engine.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DeconvConfig {
    pub bootstrap: usize,
    pub kernel_params: KernelParams,
    pub regressor: Regressor,
    pub regressor_params: BTreeMap<String, Value>,
    pub deconv_params: BTreeMap<String, Value>,
}

impl From<&DeconvolutionParams> for DeconvConfig {
    fn from(params: &DeconvolutionParams) -> Self {
        DeconvConfig {
            bootstrap: params.bootstrap,
            kernel_params: KernelParams { bandwidth: params.bandwidth },
            regressor: params.regressor,
            regressor_params: params.regressor_params.clone(),
            deconv_params: params.deconv_params.clone(),
        }
    }
}

/// Build both engine declarations for a matrix and parameter set.
///
/// ```rust
/// use vasco::deconvolve::{configure, DeconvolutionParams};
/// use vasco::signature::Matrix;
///
/// let (variants, deconv) = configure(&Matrix::default(), &DeconvolutionParams::default());
/// let yaml = vasco::deconvolve::to_yaml(&deconv)?;
/// assert!(yaml.contains("regressor: robust"));
/// assert!(yaml.contains("bandwidth: 30.0"));
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn configure(matrix: &Matrix, params: &DeconvolutionParams) -> (VariantsConfig, DeconvConfig) {
    (VariantsConfig::new(matrix), DeconvConfig::from(params))
}

pub fn to_yaml<T>(config: &T) -> Result<String, Report>
where
    T: Serialize + Debug,
{
    serde_yaml::to_string(config).wrap_err(format!("Failed to serialize engine configuration: {config:?}"))
}

/// Write an engine declaration as YAML.
pub fn write_yaml<T, P>(config: &T, path: &P) -> Result<(), Report>
where
    T: Serialize + Debug,
    P: AsRef<Path> + Debug,
{
    std::fs::write(path, to_yaml(config)?).wrap_err(format!("Failed to write engine configuration: {path:?}"))
}
