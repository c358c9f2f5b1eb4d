use crate::coverage::CoverageRecord;
use crate::deconvolve::{DeconvolutionParams, DeconvolutionPipeline, Engine, EngineInput, VariantsConfig};
use crate::mutation::MutationCode;
use crate::signature::{Matrix, SignatureMatrixBuilder, SignatureVariant, VariantSource};
use crate::task::*;
use crate::Error;

use chrono::NaiveDate;
use color_eyre::eyre::{eyre, Report, Result};
use pretty_assertions::assert_eq;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

/// Engine reporting an even split across variants, optionally held until the
/// test releases it.
#[derive(Debug, Default)]
struct GatedEngine {
    gate: Option<Mutex<mpsc::Receiver<()>>>,
}

impl GatedEngine {
    fn gated() -> (Self, mpsc::Sender<()>) {
        let (sender, receiver) = mpsc::channel();
        (GatedEngine { gate: Some(Mutex::new(receiver)) }, sender)
    }
}

impl Engine for GatedEngine {
    fn run(&self, input: &EngineInput) -> Result<(), Report> {
        if let Some(gate) = &self.gate {
            gate.lock().map_err(|e| eyre!("{e}"))?.recv()?;
        }
        let variants: VariantsConfig = serde_yaml::from_str(&std::fs::read_to_string(&input.variants_config)?)?;
        let share = 1.0 / variants.variants_pangolin.len() as f64;
        let location = variants
            .variants_pangolin
            .keys()
            .map(|v| {
                let summary = serde_json::json!([{"date": "2024-05-01", "proportion": share}]);
                (v.clone(), serde_json::json!({ "timeseriesSummary": summary }))
            })
            .collect::<serde_json::Map<_, _>>();
        std::fs::write(&input.output_json, serde_json::json!({ "Genève (GE)": location }).to_string())?;
        Ok(())
    }
}

#[derive(Debug)]
struct FailingEngine;

impl Engine for FailingEngine {
    fn run(&self, _input: &EngineInput) -> Result<(), Report> {
        Err(Error::Engine("singular matrix".to_string()).into())
    }
}

fn spec() -> Result<JobSpec, Report> {
    let codes = |ms: &[&str]| ms.iter().map(|m| m.parse::<MutationCode>()).collect::<Result<Vec<_>, _>>();
    let mut builder = SignatureMatrixBuilder::new();
    builder.add(SignatureVariant::new("JN.1", VariantSource::Curated, codes(&["C241T", "A500G"])?))?;
    builder.add(SignatureVariant::new("KP.2", VariantSource::Curated, codes(&["C241T"])?))?;
    let matrix: Matrix = builder.build_matrix::<&str>(&[])?;

    let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap_or_default();
    let records = vec![CoverageRecord::new("C241T", date, 9, 10), CoverageRecord::new("A500G", date, 4, 10)];
    Ok(JobSpec::new(records, matrix, DeconvolutionParams::default()))
}

fn start<E: Engine + 'static>(engine: E, workers: usize) -> (TaskOrchestrator, InMemoryProgressStore) {
    let store = InMemoryProgressStore::new();
    let config = OrchestratorConfig { workers, ..Default::default() };
    let orchestrator = TaskOrchestrator::new(DeconvolutionPipeline::new(engine), Arc::new(store.clone()), config);
    (orchestrator, store)
}

fn poller() -> Poller {
    Poller { interval: Duration::from_millis(10), ..Default::default() }
}

/// Poll until the job reports `stage`.
async fn wait_for_stage(orchestrator: &TaskOrchestrator, id: &JobId, stage: u8) -> Result<Progress, Report> {
    for _ in 0..500 {
        let progress = orchestrator.poll(id).await?;
        if progress.current == stage {
            return Ok(progress);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Err(eyre!("Job {id} never reached stage {stage}"))
}

#[tokio::test]
async fn poll_before_and_after_completion() -> Result<(), Report> {
    let (engine, release) = GatedEngine::gated();
    let (orchestrator, _) = start(engine, 1);
    let id = orchestrator.submit(&spec()?).await?;

    let progress = wait_for_stage(&orchestrator, &id, 3).await?;
    assert_eq!(progress.status, "Running deconvolution algorithm");
    assert_eq!(progress.total, TOTAL_STAGES);
    assert_eq!(orchestrator.status(&id).await?, JobStatus::Running);
    assert!(!orchestrator.ready(&id).await?);
    assert_eq!(orchestrator.get_result(&id).await, Err(Error::NotReady(id.to_string())));

    release.send(())?;
    let mut seen = Vec::new();
    let result = poller().wait(&orchestrator, &id, |p| seen.push(p.current)).await?;

    let location = &result["Genève (GE)"];
    assert_eq!(location.keys().collect::<Vec<_>>(), ["JN.1", "KP.2"]);
    assert!(location.values().all(|v| !v.timeseries_summary.is_empty()));
    assert_eq!(location["KP.2"].timeseries_summary[0].proportion, 0.5);

    let progress = orchestrator.poll(&id).await?;
    assert_eq!(progress.current, 5);
    assert_eq!(progress.status, "Completed");
    assert_eq!(
        progress.partial_results,
        Some(serde_json::json!({"summary": "Deconvolution completed successfully"}))
    );
    assert_eq!(orchestrator.status(&id).await?, JobStatus::Succeeded);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(seen.last(), Some(&5));

    orchestrator.shutdown().await
}

#[tokio::test]
async fn engine_failure_fails_job() -> Result<(), Report> {
    let (orchestrator, _) = start(FailingEngine, 1);
    let id = orchestrator.submit(&spec()?).await?;

    let report = poller().wait(&orchestrator, &id, |_| {}).await.err().ok_or_else(|| eyre!("expected a failure"))?;
    match report.downcast_ref::<Error>() {
        Some(Error::JobFailed { id: failed, message }) => {
            assert_eq!(failed, id.as_str());
            assert!(message.contains("singular matrix"), "{message}");
        }
        other => return Err(eyre!("unexpected error: {other:?}")),
    }

    assert_eq!(orchestrator.status(&id).await?, JobStatus::Failed);
    let progress = orchestrator.poll(&id).await?;
    assert_eq!(progress.current, 3);
    assert!(progress.status.starts_with("Error: "), "{}", progress.status);
    Ok(())
}

#[tokio::test]
async fn malformed_payload_fails_at_deserialize() -> Result<(), Report> {
    let (orchestrator, _) = start(GatedEngine::default(), 1);
    let id = orchestrator.submit_task(DECONVOLVE_TASK, "{\"records\": 3}".to_string()).await?;

    let _ = poller().wait(&orchestrator, &id, |_| {}).await;
    let progress = orchestrator.poll(&id).await?;
    assert_eq!(progress.current, 2);
    assert!(progress.status.contains("Failed to deserialize job input"), "{}", progress.status);
    assert!(matches!(orchestrator.get_result(&id).await, Err(Error::JobFailed { .. })));
    Ok(())
}

#[tokio::test]
async fn unknown_task_and_job() -> Result<(), Report> {
    let (orchestrator, _) = start(GatedEngine::default(), 1);
    assert!(orchestrator.submit_task("regress", String::new()).await.is_err());

    let id = JobId::from("01J0000000000000000000000".to_string());
    assert_eq!(orchestrator.status(&id).await, Err(Error::UnknownJob(id.to_string())));
    assert_eq!(orchestrator.get_result(&id).await, Err(Error::UnknownJob(id.to_string())));
    let report = orchestrator.poll(&id).await.err().ok_or_else(|| eyre!("expected an unknown job"))?;
    assert!(matches!(report.downcast_ref::<Error>(), Some(Error::UnknownJob(_))));
    Ok(())
}

#[tokio::test]
async fn worker_pool_runs_every_job_once() -> Result<(), Report> {
    let (orchestrator, store) = start(GatedEngine::default(), 3);
    let spec = spec()?;

    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(orchestrator.submit(&spec).await?);
    }
    let unique = ids.iter().collect::<std::collections::BTreeSet<_>>();
    assert_eq!(unique.len(), ids.len());

    for id in &ids {
        let result = poller().wait(&orchestrator, id, |_| {}).await?;
        assert_eq!(result["Genève (GE)"].len(), 2);
    }
    assert_eq!(store.len().await, ids.len());
    orchestrator.shutdown().await
}

#[tokio::test]
async fn submission_is_queued() -> Result<(), Report> {
    let (engine, release) = GatedEngine::gated();
    let (orchestrator, store) = start(engine, 1);

    let first = orchestrator.submit(&spec()?).await?;
    let second = orchestrator.submit(&spec()?).await?;
    wait_for_stage(&orchestrator, &first, 3).await?;

    // one worker, so the second job waits in the queue
    let queued = orchestrator.poll(&second).await?;
    assert_eq!(queued, Progress::default());
    assert_eq!(orchestrator.status(&second).await?, JobStatus::Pending);

    let raw = store.get(&progress_key(second.as_str())).await?.ok_or_else(|| eyre!("missing record"))?;
    assert_eq!(raw, r#"{"current":0,"total":5,"status":"Queued","partial_results":null}"#);

    release.send(())?;
    release.send(())?;
    poller().wait(&orchestrator, &second, |_| {}).await?;
    orchestrator.shutdown().await
}

#[tokio::test]
async fn progress_records_expire() -> Result<(), Report> {
    let store = InMemoryProgressStore::new();
    store.set("task_progress:a", "{}".to_string(), Duration::ZERO).await?;
    store.set("task_progress:b", "{}".to_string(), PROGRESS_TTL).await?;

    assert_eq!(store.get("task_progress:a").await?, None);
    assert_eq!(store.get("task_progress:b").await?, Some("{}".to_string()));
    assert_eq!(store.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn finished_jobs_expire() -> Result<(), Report> {
    let ttl = Duration::from_secs(1);
    let config = OrchestratorConfig { workers: 1, ttl };
    let pipeline = DeconvolutionPipeline::new(GatedEngine::default());
    let orchestrator = TaskOrchestrator::new(pipeline, Arc::new(InMemoryProgressStore::new()), config);

    let id = orchestrator.submit(&spec()?).await?;
    let mut ready = false;
    for _ in 0..50 {
        ready = orchestrator.ready(&id).await?;
        if ready {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(ready);
    assert_eq!(orchestrator.get_result(&id).await?["Genève (GE)"].len(), 2);

    tokio::time::sleep(ttl + Duration::from_millis(100)).await;
    assert_eq!(orchestrator.get_result(&id).await, Err(Error::UnknownJob(id.to_string())));
    assert_eq!(orchestrator.status(&id).await, Err(Error::UnknownJob(id.to_string())));
    assert!(orchestrator.poll(&id).await.is_err());
    orchestrator.shutdown().await
}

#[tokio::test]
async fn malformed_matrix_fails_at_deserialize() -> Result<(), Report> {
    let (orchestrator, _) = start(GatedEngine::default(), 1);
    let mut payload = serde_json::to_value(spec()?)?;
    payload["matrix"] = serde_json::json!({"rows": ["C241T"], "variants": ["KP.2"], "cells": []});
    let id = orchestrator.submit_task(DECONVOLVE_TASK, payload.to_string()).await?;

    let _ = poller().wait(&orchestrator, &id, |_| {}).await;
    let progress = orchestrator.poll(&id).await?;
    assert_eq!(progress.current, 2);
    assert!(progress.status.contains("Failed to deserialize job input"), "{}", progress.status);
    assert!(matches!(orchestrator.get_result(&id).await, Err(Error::JobFailed { .. })));
    Ok(())
}

#[test]
fn job_status_display() {
    assert_eq!(JobStatus::Succeeded.to_string(), "SUCCEEDED");
    assert!(JobStatus::Failed.is_finished());
    assert!(!JobStatus::Running.is_finished());
}
