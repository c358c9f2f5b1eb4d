use crate::cli::*;
use crate::deconvolve::{DeconvolutionParams, Regressor};
use crate::signature::definition::GithubSource;
use crate::signature::Matrix;

use clap::Parser;
use color_eyre::eyre::{eyre, Report, Result};
use indoc::indoc;
use pretty_assertions::assert_eq;

const DELTA: &str = indoc! {"
    variant:
      short: dl
      pangolin: B.1.617.2
    mut:
      210: G>T
      241: C>T
"};

const OMICRON: &str = indoc! {"
    variant:
      short: om
      pangolin: B.1.1.529
      nextstrain: 21K
    mut:
      241: C>T
      28881: GGG>AAC
"};

#[test]
fn parse_global_verbosity() {
    let args = Cli::parse_from(["vasco", "signatures", "list", "-d", "voc", "--verbosity", "debug"]);
    assert_eq!(args.verbosity, Verbosity::Debug);
    assert_eq!(args.verbosity.to_string(), "debug");
    match args.command {
        Command::Signatures(signatures::Args { command: signatures::Command::List(list) }) => {
            assert_eq!(list.source.definitions, Some("voc".into()))
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_coverage() -> Result<(), Report> {
    let input = [
        "vasco", "coverage", "--matrix", "matrix.csv", "--start", "2024-01-01", "--end", "2024-03-31",
        "--location", "Zürich (ZH)", "--lapis-url", "http://localhost:8080", "--output", "counts.tsv",
    ];
    let Command::Coverage(args) = Cli::try_parse_from(input)?.command else {
        return Err(eyre!("expected the coverage command"));
    };
    assert_eq!(args.start.to_string(), "2024-01-01");
    assert_eq!(args.location.as_deref(), Some("Zürich (ZH)"));
    assert_eq!(args.lapis_url, "http://localhost:8080");

    // dates must be valid
    let mut invalid = input.to_vec();
    invalid[5] = "2024-13-01";
    assert!(Cli::try_parse_from(invalid).is_err());
    Ok(())
}

#[test]
fn deconvolve_params_override_file() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("params.json");
    let file = DeconvolutionParams { bootstrap: 100, bandwidth: 7.0, ..Default::default() };
    file.write(&path)?;

    let input = ["vasco", "deconvolve", "-c", "counts.tsv", "-m", "matrix.csv", "-o", "out.json", "--bandwidth", "14"];
    let Command::Deconvolve(mut args) = Cli::try_parse_from(input)?.command else {
        return Err(eyre!("expected the deconvolve command"));
    };
    assert_eq!(args.workers, 1);
    assert_eq!(args.poll_interval, 2.0);

    let params = args.params()?;
    assert_eq!((params.bootstrap, params.bandwidth), (0, 14.0));

    args.params = Some(path);
    args.regressor = Some(Regressor::Nnls);
    let params = args.params()?;
    assert_eq!(params.bootstrap, 100);
    assert_eq!(params.bandwidth, 14.0);
    assert_eq!(params.regressor, Regressor::Nnls);

    args.bandwidth = Some(0.0);
    assert!(args.params().is_err());
    Ok(())
}

#[test]
fn deconvolve_poll_interval() -> Result<(), Report> {
    let input = ["vasco", "deconvolve", "-c", "counts.tsv", "-m", "matrix.csv", "-o", "out.json"];
    let Command::Deconvolve(mut args) = Cli::try_parse_from(input)?.command else {
        return Err(eyre!("expected the deconvolve command"));
    };
    assert_eq!(args.poll_interval()?, std::time::Duration::from_secs(2));

    args.poll_interval = 0.25;
    assert_eq!(args.poll_interval()?, std::time::Duration::from_millis(250));
    for invalid in [f64::INFINITY, f64::NAN, -1.0, 1e30] {
        args.poll_interval = invalid;
        assert!(args.poll_interval().is_err(), "{invalid}");
    }
    Ok(())
}

#[test]
fn split_assignments() -> Result<(), Report> {
    assert_eq!(signatures::split_assignment("mine = C241T,G100A")?, ("mine", "C241T,G100A"));
    assert_eq!(signatures::split_assignment("JN=JN.1*")?, ("JN", "JN.1*"));
    assert!(signatures::split_assignment("C241T").is_err());
    assert!(signatures::split_assignment("=C241T").is_err());
    Ok(())
}

#[test]
fn default_github_source() -> Result<(), Report> {
    let args = signatures::DefinitionArgs::default();
    assert_eq!(GithubSource::from_url(&args.github)?, GithubSource::default());
    Ok(())
}

#[tokio::test]
async fn list_local_definitions() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("delta.yaml"), DELTA)?;
    std::fs::write(dir.path().join("omicron.yml"), OMICRON)?;

    let args = signatures::ListArgs {
        source: signatures::DefinitionArgs { definitions: Some(dir.path().into()), ..Default::default() },
    };
    let table = signatures::list(&args).await?.to_string();
    assert!(table.contains("B.1.617.2"));
    assert!(table.contains("21K"));
    Ok(())
}

#[tokio::test]
async fn matrix_from_local_and_manual() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("delta.yaml"), DELTA)?;
    std::fs::write(dir.path().join("omicron.yaml"), OMICRON)?;

    let output = dir.path().join("out").join("matrix.csv");
    std::fs::create_dir_all(dir.path().join("out"))?;
    let args = signatures::MatrixArgs {
        source: signatures::DefinitionArgs { definitions: Some(dir.path().into()), ..Default::default() },
        variants: vec!["B.1.617.2".to_string(), "mine".to_string()],
        manual: vec!["mine=C241T, A23063T".to_string()],
        output: output.clone(),
        ..Default::default()
    };
    let matrix = signatures::matrix(&args).await?;
    assert_eq!(matrix.variants(), ["B.1.617.2", "mine"]);
    assert_eq!(matrix.rows(), ["A23063T", "C241T", "G210T"]);
    assert_eq!(matrix.get("A23063T", "B.1.617.2"), Some(false));
    assert_eq!(matrix.get("C241T", "mine"), Some(true));

    assert_eq!(Matrix::read(&output)?, matrix);
    Ok(())
}

#[tokio::test]
async fn matrix_manual_only_skips_definitions() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let args = signatures::MatrixArgs {
        // an unreadable source fails only if it is loaded
        source: signatures::DefinitionArgs { definitions: Some(dir.path().join("missing")), ..Default::default() },
        manual: vec!["mine=C241T".to_string()],
        output: dir.path().join("matrix.tsv"),
        ..Default::default()
    };
    let matrix = signatures::matrix(&args).await?;
    assert_eq!(matrix.variants(), ["mine"]);
    Ok(())
}
