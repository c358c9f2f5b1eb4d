use crate::deconvolve::{DeconvolutionPipeline, DeconvolutionResult};
use crate::task::{progress_key, JobId, JobSpec, JobStatus, Progress, ProgressStore, PROGRESS_TTL};
use crate::Error;

use color_eyre::eyre::{eyre, Report, Result};
use color_eyre::Help;
use log::{debug, error, info, warn};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Name of the only task the broker executes.
pub const DECONVOLVE_TASK: &str = "deconvolve";

/// Worker pool and progress retention of a [`TaskOrchestrator`].
#[derive(Clone, Debug, PartialEq)]
pub struct OrchestratorConfig {
    pub workers: usize,
    pub ttl: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig { workers: 1, ttl: PROGRESS_TTL }
    }
}

/// Result backend entry of one job.
#[derive(Clone, Debug, Default)]
struct JobRecord {
    status: JobStatus,
    result: Option<DeconvolutionResult>,
    error: Option<String>,
    /// Set once the job is finished, never for pending or running jobs.
    expires_at: Option<Instant>,
}

impl JobRecord {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Instant::now() >= expires_at)
    }
}

type Jobs = Arc<RwLock<HashMap<JobId, JobRecord>>>;

/// Worker state shared by every worker of the pool.
#[derive(Clone)]
struct Worker {
    pipeline: DeconvolutionPipeline,
    store: Arc<dyn ProgressStore>,
    jobs: Jobs,
    ttl: Duration,
}

/// Queues deconvolution jobs onto a fixed pool of workers.
///
/// Submission returns a [`JobId`] at once. Workers report progress to a
/// [`ProgressStore`] under [`progress_key`], and keep the final result or
/// error text until it is collected with [`TaskOrchestrator::get_result`].
pub struct TaskOrchestrator {
    sender: mpsc::UnboundedSender<(JobId, String)>,
    worker: Worker,
    handles: Vec<JoinHandle<()>>,
}

impl TaskOrchestrator {
    /// Start the worker pool, must be called from within a tokio runtime.
    pub fn new(pipeline: DeconvolutionPipeline, store: Arc<dyn ProgressStore>, config: OrchestratorConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<(JobId, String)>();
        let receiver = Arc::new(Mutex::new(receiver));
        let worker = Worker { pipeline, store, jobs: Jobs::default(), ttl: config.ttl };

        let workers = config.workers.max(1);
        debug!("Starting {workers} deconvolution worker(s).");
        let handles = (0..workers)
            .map(|i| {
                let worker = worker.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some((id, payload)) = next else { break };
                        debug!("Worker {i} picked up job {id}.");
                        worker.execute(id, payload).await;
                    }
                })
            })
            .collect();

        TaskOrchestrator { sender, worker, handles }
    }

    /// Serialize a job and place it on the queue.
    pub async fn submit(&self, spec: &JobSpec) -> Result<JobId, Report> {
        let payload = serde_json::to_string(spec).map_err(|e| Error::Serialization(e.to_string()))?;
        self.submit_task(DECONVOLVE_TASK, payload).await
    }

    /// Place an already serialized task on the queue.
    pub async fn submit_task(&self, task_name: &str, kwargs: String) -> Result<JobId, Report> {
        if task_name != DECONVOLVE_TASK {
            return Err(eyre!("Unknown task: {task_name}").suggestion(format!("Available tasks: {DECONVOLVE_TASK}")));
        }
        let id = JobId::new();

        // workers wait on the lock, so the queued record precedes stage 0
        let mut jobs = self.worker.jobs.write().await;
        jobs.retain(|_, job| !job.is_expired());
        self.sender.send((id.clone(), kwargs)).map_err(|_| eyre!("Worker pool has shut down."))?;
        jobs.insert(id.clone(), JobRecord::default());
        self.worker.report(&id, Progress::default()).await;
        drop(jobs);

        info!("Submitted job {id}.");
        Ok(id)
    }

    /// Latest progress record of a job.
    pub async fn poll(&self, id: &JobId) -> Result<Progress, Report> {
        let value = self.worker.store.get(&progress_key(id.as_str())).await?;
        let Some(value) = value else {
            return Err(Error::UnknownJob(id.to_string()).into());
        };
        let progress = serde_json::from_str(&value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(progress)
    }

    pub async fn status(&self, id: &JobId) -> Result<JobStatus, Error> {
        self.with_job(id, |job| Ok(job.status)).await
    }

    /// True once a job has succeeded or failed.
    pub async fn ready(&self, id: &JobId) -> Result<bool, Error> {
        Ok(self.status(id).await?.is_finished())
    }

    /// Result of a succeeded job, kept for the configured ttl after it finished.
    pub async fn get_result(&self, id: &JobId) -> Result<DeconvolutionResult, Error> {
        self.with_job(id, |job| match (job.status, &job.result) {
            (JobStatus::Succeeded, Some(result)) => Ok(result.clone()),
            (JobStatus::Failed, _) => Err(Error::JobFailed {
                id: id.to_string(),
                message: job.error.clone().unwrap_or_default(),
            }),
            _ => Err(Error::NotReady(id.to_string())),
        })
        .await
    }

    /// Look up a job record, dropping it first if it has expired.
    async fn with_job<T, F>(&self, id: &JobId, f: F) -> Result<T, Error>
    where
        F: FnOnce(&JobRecord) -> Result<T, Error>,
    {
        let mut jobs = self.worker.jobs.write().await;
        if jobs.get(id).is_some_and(|job| job.is_expired()) {
            debug!("Job {id} has expired.");
            jobs.remove(id);
        }
        jobs.get(id).ok_or_else(|| Error::UnknownJob(id.to_string())).and_then(f)
    }

    /// Stop accepting jobs and wait for queued ones to finish.
    pub async fn shutdown(self) -> Result<(), Report> {
        let TaskOrchestrator { sender, handles, .. } = self;
        drop(sender);
        for handle in handles {
            handle.await?;
        }
        Ok(())
    }
}

impl Worker {
    /// Write a progress record. Store failures are logged, the job carries on.
    async fn report(&self, id: &JobId, progress: Progress) {
        debug!("Job {id} progress: {progress:?}");
        let value = match serde_json::to_string(&progress) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to serialize progress of job {id}: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(&progress_key(id.as_str()), value, self.ttl).await {
            warn!("Failed to store progress of job {id}: {e}");
        }
    }

    /// Move a job forward, terminal states are never left.
    async fn transition(&self, id: &JobId, status: JobStatus) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(id) {
            Some(job) if job.status.can_become(status) => {
                job.status = status;
                true
            }
            _ => false,
        }
    }

    async fn execute(&self, id: JobId, payload: String) {
        if !self.transition(&id, JobStatus::Running).await {
            warn!("Job {id} is not pending, skipping.");
            return;
        }

        let mut current = 0;
        let outcome = self.stages(&id, payload, &mut current).await;

        // final progress precedes the terminal state
        let mut record = JobRecord::default();
        match outcome {
            Ok(result) => {
                let summary = json!({"summary": "Deconvolution completed successfully"});
                self.report(&id, Progress::new(5, "Completed").with_results(summary)).await;
                info!("Job {id} completed.");
                record.result = Some(result);
                record.status = JobStatus::Succeeded;
            }
            Err(e) => {
                let message = format!("{e:#}");
                error!("Job {id} failed: {message}");
                self.report(&id, Progress::new(current, &format!("Error: {message}"))).await;
                record.error = Some(message);
                record.status = JobStatus::Failed;
            }
        }
        record.expires_at = Instant::now().checked_add(self.ttl);
        if let Some(job) = self.jobs.write().await.get_mut(&id) {
            *job = record;
        }
    }

    async fn stages(&self, id: &JobId, payload: String, current: &mut u8) -> Result<DeconvolutionResult, Report> {
        *current = 0;
        self.report(id, Progress::new(0, "Preparing input data")).await;

        // --------------------------------------------------------------------
        // Prepare

        *current = 1;
        let bootstrap = serde_json::from_str::<serde_json::Value>(&payload)
            .ok()
            .and_then(|v| v["params"]["bootstrap"].as_u64())
            .map(|n| n.to_string())
            .unwrap_or_else(|| "default".to_string());
        self.report(id, Progress::new(1, &format!("Preparing deconvolution (bootstraps={bootstrap})"))).await;

        // --------------------------------------------------------------------
        // Deserialize

        *current = 2;
        let spec: JobSpec = serde_json::from_str(&payload).map_err(|e| Error::Serialization(e.to_string()))?;
        let message = format!(
            "Loaded {} coverage records and {} signature mutations",
            spec.records.len(),
            spec.matrix.rows().len()
        );
        self.report(id, Progress::new(2, &message)).await;

        // --------------------------------------------------------------------
        // Run

        *current = 3;
        self.report(id, Progress::new(3, "Running deconvolution algorithm")).await;
        let pipeline = self.pipeline.clone();
        let result = tokio::task::spawn_blocking(move || pipeline.run(&spec.records, &spec.matrix, &spec.params))
            .await
            .map_err(|e| Error::Engine(format!("Deconvolution worker panicked: {e}")))??;

        // --------------------------------------------------------------------
        // Post-process

        *current = 4;
        let variants = result.values().flat_map(|v| v.keys()).collect::<std::collections::BTreeSet<_>>();
        debug!("Job {id} estimated {} variant(s) over {} location(s).", variants.len(), result.len());
        self.report(id, Progress::new(4, "Processing results")).await;

        Ok(result)
    }
}
