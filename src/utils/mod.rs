use color_eyre::eyre::{Report, Result, WrapErr};
use serde::Serialize;
use std::fmt::Debug;
use std::path::Path;

/// Create the parent directory of a file path, if it does not exist yet.
///
/// ```rust
/// use vasco::utils::create_parent_dir;
///
/// let dir = tempfile::tempdir()?;
/// let path = dir.path().join("nested").join("result.json");
/// create_parent_dir(&path)?;
/// assert!(dir.path().join("nested").exists());
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn create_parent_dir<P>(path: &P) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
{
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).wrap_err(format!("Failed to create directory: {parent:?}"))?;
        }
    }
    Ok(())
}

/// Write a value as pretty JSON, creating parent directories as needed.
pub fn write_json<T, P>(value: &T, path: &P) -> Result<(), Report>
where
    T: Serialize,
    P: AsRef<Path> + Debug,
{
    create_parent_dir(path)?;
    let output = serde_json::to_string_pretty(value).wrap_err(format!("Failed to serialize: {path:?}"))?;
    std::fs::write(path, output).wrap_err(format!("Failed to write: {path:?}"))?;
    Ok(())
}

/// Download a text document.
///
/// A GitHub response with an exhausted rate limit suggests when to retry.
#[cfg(feature = "http")]
pub async fn fetch_text(url: &str) -> Result<String, Report> {
    use color_eyre::eyre::eyre;
    use color_eyre::Help;
    use reqwest::header::USER_AGENT;

    log::debug!("Downloading: {url}");
    let client = reqwest::Client::new();
    let user_agent = format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    let response = client.get(url).header(USER_AGENT, user_agent).send().await?;

    let status = response.status();
    if !status.is_success() {
        let header = |name: &str| {
            response.headers().get(name).and_then(|v| v.to_str().ok()).and_then(|v| v.parse::<i64>().ok())
        };
        let mut report = eyre!("Failed to download: {url}").suggestion(format!("Status code: {status}"));
        if header("x-ratelimit-remaining") == Some(0) {
            let reset = header("x-ratelimit-reset")
                .and_then(|t| chrono::DateTime::<chrono::Utc>::from_timestamp(t, 0))
                .map(|t| t.with_timezone(&chrono::Local).to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string());
            report = report.suggestion(format!("GitHub API rate limit exceeded, it resets at: {reset}"));
        }
        return Err(report);
    }

    let text = response.text().await.wrap_err(format!("Failed to read response: {url}"))?;
    Ok(text)
}
