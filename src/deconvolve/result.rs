use crate::Error;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Estimated proportions per location, then per variant.
pub type DeconvolutionResult = BTreeMap<String, BTreeMap<String, VariantTimeseries>>;

/// Estimated proportion of a variant on one date.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeseriesPoint {
    #[serde(serialize_with = "serialize_date", deserialize_with = "deserialize_date")]
    pub date: NaiveDate,
    pub proportion: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proportion_lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proportion_upper: Option<f64>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantTimeseries {
    pub timeseries_summary: Vec<TimeseriesPoint>,
}

fn serialize_date<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&date.format("%Y-%m-%d").to_string())
}

/// Accept plain dates and timestamps, keeping the calendar date.
fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    let day = text.get(..10).unwrap_or(&text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| serde::de::Error::custom(format!("invalid date {text:?}: {e}")))
}

/// Parse the engine's JSON summary.
///
/// Without bootstrap iterations the engine reports point estimates only, so
/// any bound fields are removed.
///
/// ```rust
/// use vasco::deconvolve::parse_output;
///
/// let json = r#"{"Zürich": {"BA.2": {"timeseriesSummary": [
///     {"date": "2024-01-01", "proportion": 0.7, "proportionLower": 0.6, "proportionUpper": 0.8}
/// ]}}}"#;
/// let result = parse_output(json, 0)?;
/// let point = &result["Zürich"]["BA.2"].timeseries_summary[0];
/// assert_eq!(point.proportion, 0.7);
/// assert_eq!(point.proportion_lower, None);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn parse_output(text: &str, bootstrap: usize) -> Result<DeconvolutionResult, Error> {
    let mut result: DeconvolutionResult =
        serde_json::from_str(text).map_err(|e| Error::Engine(format!("Malformed engine output: {e}")))?;
    if bootstrap == 0 {
        result.values_mut().flat_map(|variants| variants.values_mut()).for_each(|timeseries| {
            timeseries.timeseries_summary.iter_mut().for_each(|point| {
                point.proportion_lower = None;
                point.proportion_upper = None;
            })
        });
    }
    Ok(result)
}
