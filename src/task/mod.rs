//! Asynchronous deconvolution jobs: submission, progress and results.

mod orchestrator;
mod poller;
mod progress;
#[cfg(test)]
mod tests;

pub use orchestrator::{OrchestratorConfig, TaskOrchestrator, DECONVOLVE_TASK};
pub use poller::Poller;
#[cfg(feature = "redis")]
pub use progress::RedisProgressStore;
pub use progress::{progress_key, InMemoryProgressStore, Progress, ProgressStore, PROGRESS_TTL, TOTAL_STAGES};

use crate::coverage::CoverageRecord;
use crate::deconvolve::DeconvolutionParams;
use crate::signature::Matrix;

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Everything a worker needs to run one deconvolution.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct JobSpec {
    pub records: Vec<CoverageRecord>,
    pub matrix: Matrix,
    pub params: DeconvolutionParams,
}

impl JobSpec {
    pub fn new(records: Vec<CoverageRecord>, matrix: Matrix, params: DeconvolutionParams) -> Self {
        JobSpec { records, matrix, params }
    }
}

/// Opaque, time-sortable job handle.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct JobId(String);

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl JobId {
    pub fn new() -> Self {
        JobId(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        JobId(id)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Jobs only move forward: pending, running, then one terminal state.
    ///
    /// ```rust
    /// use vasco::task::JobStatus;
    ///
    /// assert!(JobStatus::Pending.can_become(JobStatus::Running));
    /// assert!(!JobStatus::Failed.can_become(JobStatus::Running));
    /// assert!(!JobStatus::Running.can_become(JobStatus::Pending));
    /// ```
    pub fn can_become(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let status = format!("{self:?}").to_uppercase();
        write!(f, "{status}")
    }
}
