//! [`CountService`] backed by a LAPIS instance.

use crate::coverage::{CountQuery, CountService, DateCount};
use crate::mutation::MutationType;

use async_trait::async_trait;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::debug;
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Deserialize)]
struct AggregatedResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct LocationEntry {
    location_name: Option<String>,
}

/// HTTP client for the `sample/aggregated` endpoint of a LAPIS instance.
#[derive(Clone, Debug)]
pub struct LapisClient {
    base_url: String,
    client: reqwest::Client,
}

impl LapisClient {
    pub fn new(base_url: &str) -> Self {
        LapisClient { base_url: base_url.trim_end_matches('/').to_string(), client: reqwest::Client::new() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// JSON body of an aggregated count query, stratified by sampling date.
    ///
    /// ```rust
    /// use chrono::NaiveDate;
    /// use vasco::coverage::{CountQuery, LapisClient};
    /// use vasco::mutation::MutationType;
    ///
    /// let query = CountQuery {
    ///     mutation: "C241T".to_string(),
    ///     kind: MutationType::Nucleotide,
    ///     start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
    ///     end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    ///     location: Some("Zürich (ZH)".to_string()),
    /// };
    /// let payload = LapisClient::payload(&query);
    /// assert_eq!(payload["sampling_dateFrom"], "2024-01-01");
    /// assert_eq!(payload["nucleotideMutations"][0], "C241T");
    /// assert_eq!(payload["location_name"], "Zürich (ZH)");
    /// ```
    pub fn payload(query: &CountQuery) -> Value {
        let mutations_field = match query.kind {
            MutationType::Nucleotide => "nucleotideMutations",
            MutationType::AminoAcid => "aminoAcidMutations",
        };
        let mut payload = Map::new();
        payload.insert("sampling_dateFrom".to_string(), json!(query.start.format("%Y-%m-%d").to_string()));
        payload.insert("sampling_dateTo".to_string(), json!(query.end.format("%Y-%m-%d").to_string()));
        payload.insert("fields".to_string(), json!(["sampling_date"]));
        payload.insert(mutations_field.to_string(), json!([query.mutation]));
        if let Some(location) = &query.location {
            payload.insert("location_name".to_string(), json!(location));
        }
        Value::Object(payload)
    }

    /// List the sampling locations known to the instance.
    pub async fn locations(&self) -> Result<Vec<String>, Report> {
        let url = format!("{}/sample/aggregated", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("fields", "location_name"), ("limit", "100"), ("dataFormat", "JSON"), ("downloadAsFile", "false")])
            .send()
            .await
            .wrap_err(format!("Failed to query locations: {url}"))?;
        if !response.status().is_success() {
            return Err(eyre!("Failed to query locations: {url}").suggestion(format!("Status code: {}", response.status())));
        }
        let body: AggregatedResponse<LocationEntry> = response.json().await?;
        let locations = body.data.into_iter().filter_map(|e| e.location_name).sorted().dedup().collect_vec();
        Ok(locations)
    }
}

#[async_trait]
impl CountService for LapisClient {
    async fn fetch(&self, query: &CountQuery) -> Result<Vec<DateCount>, Report> {
        let url = format!("{}/sample/aggregated", self.base_url);
        let payload = LapisClient::payload(query);
        debug!("Fetching sample aggregated with payload: {payload}");

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await
            .wrap_err(format!("Failed to fetch counts for {}", query.mutation))?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(eyre!("Status code {status} for {}", query.mutation).suggestion(details));
        }

        let body: AggregatedResponse<DateCount> =
            response.json().await.wrap_err(format!("Unexpected response for {}", query.mutation))?;
        Ok(body.data)
    }
}
