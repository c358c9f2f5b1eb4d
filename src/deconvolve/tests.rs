use crate::coverage::CoverageRecord;
use crate::deconvolve::*;
use crate::mutation::MutationCode;
use crate::signature::{Matrix, SignatureMatrixBuilder, SignatureVariant, VariantSource};
use crate::Error;

use chrono::NaiveDate;
use color_eyre::eyre::{eyre, Report, Result};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use strum::IntoEnumIterator;
use vasco_table::Table;

/// Engine that reads its inputs back and reports an even split across variants.
#[derive(Debug, Default)]
struct FakeEngine {
    seen: Mutex<Option<(Table<String>, VariantsConfig, DeconvConfig)>>,
}

impl Engine for FakeEngine {
    fn run(&self, input: &EngineInput) -> Result<(), Report> {
        let tallymut = Table::read(&input.tallymut, Some('\t'))?;
        let variants: VariantsConfig = serde_yaml::from_str(&std::fs::read_to_string(&input.variants_config)?)?;
        let deconv: DeconvConfig = serde_yaml::from_str(&std::fs::read_to_string(&input.deconv_config)?)?;

        let dates = tallymut.get_column(&"date".to_string())?.into_iter().cloned().collect::<std::collections::BTreeSet<_>>();
        let share = 1.0 / variants.variants_pangolin.len() as f64;
        let summary = dates
            .iter()
            .map(|d| serde_json::json!({"date": d, "proportion": share, "proportionLower": 0.0, "proportionUpper": 1.0}))
            .collect::<Vec<_>>();
        let location = variants
            .variants_pangolin
            .keys()
            .map(|v| (v.clone(), serde_json::json!({"timeseriesSummary": summary})))
            .collect::<serde_json::Map<_, _>>();
        let output = serde_json::json!({ "Zürich (ZH)": location });
        std::fs::write(&input.output_json, output.to_string())?;

        *self.seen.lock().map_err(|e| eyre!("{e}"))? = Some((tallymut, variants, deconv));
        Ok(())
    }
}

#[derive(Debug)]
struct FailingEngine;

impl Engine for FailingEngine {
    fn run(&self, _input: &EngineInput) -> Result<(), Report> {
        Err(Error::Engine("lollipop exited with status 1: singular matrix".to_string()).into())
    }
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, day).unwrap_or_default()
}

fn matrix() -> Result<Matrix, Report> {
    let codes = |ms: &[&str]| ms.iter().map(|m| m.parse::<MutationCode>()).collect::<Result<Vec<_>, _>>();
    let mut builder = SignatureMatrixBuilder::new();
    builder.add(SignatureVariant::new("KP.2", VariantSource::Curated, codes(&["C241T", "G100A"])?))?;
    builder.add(SignatureVariant::new("KP.3", VariantSource::Curated, codes(&["C241T", "T300C"])?))?;
    builder.build_matrix::<&str>(&[])
}

fn records() -> Vec<CoverageRecord> {
    vec![
        CoverageRecord::new("G100A", date(2), 3, 10),
        CoverageRecord::new("C241T", date(2), 10, 10),
        CoverageRecord::new("T300C", date(1), 0, 0),
        CoverageRecord::new("C241T", date(1), 8, 10),
        CoverageRecord::new("A1G", date(1), 1, 1),
    ]
}

#[test]
fn tallymut_join() -> Result<(), Report> {
    let table = tallymut(&records(), &matrix()?)?;
    assert_eq!(table.headers, ["date", "count", "cov", "frac", "mutation", "pos", "base", "KP.2", "KP.3"]);

    // date order, then matrix row order (descending position), unknown mutation dropped
    let mutations = table.get_column(&"mutation".to_string())?;
    assert_eq!(mutations, [&"T300C", &"C241T", &"C241T", &"G100A"]);

    assert_eq!(table.rows[0], ["2024-05-01", "NA", "0", "NA", "T300C", "300", "C", "0", "1"]);
    assert_eq!(table.rows[1], ["2024-05-01", "8", "10", "0.8", "C241T", "241", "T", "1", "1"]);
    Ok(())
}

#[test]
fn configure_declarations() -> Result<(), Report> {
    let params = DeconvolutionParams { bootstrap: 100, bandwidth: 14.0, ..Default::default() };
    let (variants, deconv) = configure(&matrix()?, &params);

    assert_eq!(variants.variants_pangolin.get("KP.3").map(|v| v.as_str()), Some("KP.3"));
    assert_eq!(deconv.bootstrap, 100);
    assert_eq!(deconv.kernel_params.bandwidth, 14.0);
    assert_eq!(deconv.regressor, Regressor::Robust);
    assert_eq!(deconv.regressor_params["f_scale"], serde_json::json!(0.01));
    assert_eq!(deconv.deconv_params["min_tol"], serde_json::json!(0.001));

    let yaml = to_yaml(&variants)?;
    assert_eq!(yaml, "variants_pangolin:\n  KP.2: KP.2\n  KP.3: KP.3\n");
    Ok(())
}

#[test]
fn pipeline_point_estimates() -> Result<(), Report> {
    let engine = Arc::new(FakeEngine::default());
    let pipeline = DeconvolutionPipeline::from_arc(engine.clone());

    let mut stages = Vec::new();
    let result = pipeline.run_with(&records(), &matrix()?, &DeconvolutionParams::default(), |s| stages.push(s))?;
    assert_eq!(stages, Stage::iter().collect::<Vec<_>>());

    let location = &result["Zürich (ZH)"];
    assert_eq!(location.keys().collect::<Vec<_>>(), ["KP.2", "KP.3"]);
    let summary = &location["KP.2"].timeseries_summary;
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0].date, date(1));
    assert_eq!(summary[0].proportion, 0.5);
    // bootstrap 0 strips the bounds
    assert_eq!(summary[0].proportion_lower, None);
    assert_eq!(summary[0].proportion_upper, None);

    let seen = engine.seen.lock().map_err(|e| eyre!("{e}"))?;
    let (tallymut, _, deconv) = seen.as_ref().ok_or_else(|| eyre!("engine was not called"))?;
    assert_eq!(tallymut.rows.len(), 4);
    assert_eq!(deconv.bootstrap, 0);
    Ok(())
}

#[test]
fn pipeline_keeps_bounds_with_bootstrap() -> Result<(), Report> {
    let pipeline = DeconvolutionPipeline::new(FakeEngine::default());
    let params = DeconvolutionParams { bootstrap: 10, ..Default::default() };
    let result = pipeline.run(&records(), &matrix()?, &params)?;
    let point = &result["Zürich (ZH)"]["KP.3"].timeseries_summary[0];
    assert_eq!(point.proportion_lower, Some(0.0));
    assert_eq!(point.proportion_upper, Some(1.0));
    Ok(())
}

#[test]
fn pipeline_deterministic() -> Result<(), Report> {
    let pipeline = DeconvolutionPipeline::new(FakeEngine::default());
    let params = DeconvolutionParams::default();
    let first = pipeline.run(&records(), &matrix()?, &params)?;
    let second = pipeline.run(&records(), &matrix()?, &params)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn pipeline_engine_failure() -> Result<(), Report> {
    let pipeline = DeconvolutionPipeline::new(FailingEngine);
    let report = pipeline
        .run(&records(), &matrix()?, &DeconvolutionParams::default())
        .err()
        .ok_or_else(|| eyre!("expected an engine failure"))?;
    assert!(matches!(report.downcast_ref::<Error>(), Some(Error::Engine(_))));
    Ok(())
}

#[test]
fn pipeline_rejects_invalid_input() -> Result<(), Report> {
    let pipeline = DeconvolutionPipeline::new(FakeEngine::default());

    let params = DeconvolutionParams { bandwidth: -1.0, ..Default::default() };
    assert!(pipeline.run(&records(), &matrix()?, &params).is_err());

    let unrelated = vec![CoverageRecord::new("A1G", date(1), 1, 1)];
    assert!(pipeline.run(&unrelated, &matrix()?, &DeconvolutionParams::default()).is_err());

    assert!(pipeline.run(&records(), &Matrix::default(), &DeconvolutionParams::default()).is_err());
    Ok(())
}

#[test]
fn parse_malformed_output() {
    assert!(matches!(parse_output("{\"loc\": [1, 2]}", 0), Err(Error::Engine(_))));
    assert!(matches!(parse_output("not json", 0), Err(Error::Engine(_))));
}

#[test]
fn parse_timestamp_dates() -> Result<(), Report> {
    let json = r#"{"loc": {"KP.2": {"timeseriesSummary": [{"date": "2024-05-01T00:00:00", "proportion": 1.0}]}}}"#;
    let result = parse_output(json, 10)?;
    assert_eq!(result["loc"]["KP.2"].timeseries_summary[0].date, date(1));
    Ok(())
}

#[test]
fn params_json_defaults() -> Result<(), Report> {
    let params: DeconvolutionParams = serde_json::from_str(r#"{"bootstrap": 50}"#)?;
    assert_eq!(params.bootstrap, 50);
    assert_eq!(params.bandwidth, 30.0);
    assert_eq!(params.regressor, Regressor::Robust);
    Ok(())
}
