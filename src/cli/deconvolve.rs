//! Submit a deconvolution job and wait for its result.

use crate::coverage;
use crate::deconvolve::{DeconvolutionParams, DeconvolutionPipeline, DeconvolutionResult, Lollipop, Regressor, DEFAULT_ENGINE};
use crate::signature::Matrix;
use crate::task::{InMemoryProgressStore, JobSpec, OrchestratorConfig, Poller, ProgressStore, TaskOrchestrator};
use crate::utils::write_json;

use clap::Parser;
use color_eyre::eyre::{Report, Result, WrapErr};
use color_eyre::Help;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// CLI arguments of the deconvolve command.
///
/// Parameters given on the command line override those of `--params`.
#[derive(Clone, Debug, Parser)]
pub struct Args {
    /// Stratified coverage table written by `vasco coverage`.
    #[clap(short = 'c', long, required = true)]
    pub counts: PathBuf,

    /// Signature matrix (.csv or .tsv).
    #[clap(short = 'm', long, required = true)]
    pub matrix: PathBuf,

    /// Deconvolution parameters (JSON).
    #[clap(short = 'p', long)]
    pub params: Option<PathBuf>,

    /// Number of bootstrap iterations, 0 disables confidence intervals.
    #[clap(short = 'b', long)]
    pub bootstrap: Option<usize>,

    /// Kernel smoothing bandwidth (days).
    #[clap(long)]
    pub bandwidth: Option<f64>,

    #[clap(long, value_enum)]
    pub regressor: Option<Regressor>,

    /// Number of deconvolution workers.
    #[clap(short = 'w', long, default_value_t = Args::default().workers)]
    pub workers: usize,

    /// Deconvolution engine executable.
    #[clap(long, env = "VASCO_LOLLIPOP", default_value_t = Args::default().engine)]
    pub engine: String,

    /// Redis server for job progress, kept in memory when unset.
    #[cfg(feature = "redis")]
    #[clap(long, env = "VASCO_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Seconds between progress polls.
    #[clap(long, default_value_t = Args::default().poll_interval)]
    pub poll_interval: f64,

    /// Output result (JSON).
    #[clap(short = 'o', long, required = true)]
    pub output: PathBuf,
}

impl Default for Args {
    fn default() -> Self {
        Args {
            counts: PathBuf::new(),
            matrix: PathBuf::new(),
            params: None,
            bootstrap: None,
            bandwidth: None,
            regressor: None,
            workers: 1,
            engine: DEFAULT_ENGINE.to_string(),
            #[cfg(feature = "redis")]
            redis_url: None,
            poll_interval: Poller::default().interval.as_secs_f64(),
            output: PathBuf::new(),
        }
    }
}

impl Args {
    /// Parameters from `--params`, overridden by command line flags.
    pub fn params(&self) -> Result<DeconvolutionParams, Report> {
        let mut params = match &self.params {
            Some(path) => DeconvolutionParams::read(path)?,
            None => DeconvolutionParams::default(),
        };
        if let Some(bootstrap) = self.bootstrap {
            params.bootstrap = bootstrap;
        }
        if let Some(bandwidth) = self.bandwidth {
            params.bandwidth = bandwidth;
        }
        if let Some(regressor) = self.regressor {
            params.regressor = regressor;
        }
        params.validate()?;
        Ok(params)
    }

    /// Time between progress polls, which must be a finite number of seconds.
    pub fn poll_interval(&self) -> Result<Duration, Report> {
        Duration::try_from_secs_f64(self.poll_interval)
            .wrap_err(format!("Invalid poll interval: {}", self.poll_interval))
            .suggestion("Use a non-negative number of seconds, ex. --poll-interval 2")
    }

    async fn store(&self) -> Result<Arc<dyn ProgressStore>, Report> {
        #[cfg(feature = "redis")]
        if let Some(url) = &self.redis_url {
            info!("Storing job progress in Redis: {url}");
            return Ok(Arc::new(crate::task::RedisProgressStore::new(url).await?));
        }
        Ok(Arc::new(InMemoryProgressStore::new()))
    }
}

/// Run one deconvolution job through the worker pool and write its result.
pub async fn deconvolve(args: &Args) -> Result<DeconvolutionResult, Report> {
    let poller = Poller { interval: args.poll_interval()?, ..Default::default() };
    let spec = JobSpec::new(coverage::read(&args.counts)?, Matrix::read(&args.matrix)?, args.params()?);

    let pipeline = DeconvolutionPipeline::new(Lollipop::new(&args.engine));
    let config = OrchestratorConfig { workers: args.workers, ..Default::default() };
    let orchestrator = TaskOrchestrator::new(pipeline, args.store().await?, config);

    let id = orchestrator.submit(&spec).await?;
    let result = poller
        .wait(&orchestrator, &id, |progress| {
            info!("[{}/{}] {}", progress.current, progress.total, progress.status);
        })
        .await?;
    orchestrator.shutdown().await?;

    write_json(&result, &args.output)?;
    info!("Wrote deconvolution result: {:?}", args.output);
    Ok(result)
}
