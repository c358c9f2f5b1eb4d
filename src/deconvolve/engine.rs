use crate::Error;

use color_eyre::eyre::{Report, Result};
use log::{debug, info};
use std::ffi::OsString;
use std::fmt::Debug;
use std::path::PathBuf;
use std::process::Command;

/// Default executable of the LolliPop engine.
pub const DEFAULT_ENGINE: &str = "lollipop";

/// Files consumed and produced by one engine call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineInput {
    pub tallymut: PathBuf,
    pub variants_config: PathBuf,
    pub deconv_config: PathBuf,
    /// Column of the tallymut table holding mutation names.
    pub namefield: String,
    pub output_csv: PathBuf,
    pub output_json: PathBuf,
}

/// A statistical deconvolution engine, invoked once per pipeline run.
///
/// The call blocks until the engine exits. A successful call must leave the
/// JSON summary at [`EngineInput::output_json`].
pub trait Engine: Debug + Send + Sync {
    fn run(&self, input: &EngineInput) -> Result<(), Report>;
}

/// The `lollipop deconvolute` command line tool.
#[derive(Clone, Debug, PartialEq)]
pub struct Lollipop {
    pub program: PathBuf,
}

impl Default for Lollipop {
    fn default() -> Self {
        Lollipop::new(DEFAULT_ENGINE)
    }
}

impl Lollipop {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Lollipop { program: program.into() }
    }

    /// Command line arguments for one call.
    ///
    /// ```rust
    /// use vasco::deconvolve::{EngineInput, Lollipop};
    ///
    /// let input = EngineInput { namefield: "mutation".to_string(), ..Default::default() };
    /// let args = Lollipop::default().args(&input);
    /// assert_eq!(args[0], "deconvolute");
    /// assert!(args.windows(2).any(|w| w[0] == "--namefield" && w[1] == "mutation"));
    /// ```
    pub fn args(&self, input: &EngineInput) -> Vec<OsString> {
        vec![
            "deconvolute".into(),
            "--output".into(),
            input.output_csv.clone().into(),
            "--out-json".into(),
            input.output_json.clone().into(),
            "-c".into(),
            input.variants_config.clone().into(),
            "--deconv-config".into(),
            input.deconv_config.clone().into(),
            "--namefield".into(),
            input.namefield.clone().into(),
            input.tallymut.clone().into(),
        ]
    }
}

impl Engine for Lollipop {
    fn run(&self, input: &EngineInput) -> Result<(), Report> {
        info!("Running deconvolution engine: {:?}", self.program);
        let output = Command::new(&self.program)
            .args(self.args(input))
            .output()
            .map_err(|e| Error::Engine(format!("Failed to start {:?}: {e}", self.program)))?;

        debug!("Engine stdout: {}", String::from_utf8_lossy(&output.stdout));
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::Engine(format!("{:?} exited with {}: {}", self.program, output.status, stderr.trim())))?;
        }
        Ok(())
    }
}
