//! Per-mutation count, coverage, and frequency time series from a count service.
//!
//! For every mutation, the [`CoverageAggregator`] queries the count of each
//! symbol of the coverage alphabet at the mutation's site. Coverage on a date is
//! the sum over those symbols, frequency is the target symbol's share.

#[cfg(feature = "http")]
pub mod lapis;
mod na;

#[cfg(feature = "http")]
pub use lapis::LapisClient;
pub use na::MaybeNa;

use crate::mutation::{MutationCode, MutationType};
use crate::Error;

use async_trait::async_trait;
use chrono::NaiveDate;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use vasco_table::Table;

/// Columns of a coverage table.
pub const COVERAGE_COLUMNS: [&str; 5] = ["mutation", "sampling_date", "count", "coverage", "frequency"];

// ----------------------------------------------------------------------------
// Count Service
// ----------------------------------------------------------------------------

/// A single count query: one fully specified mutation over a date range.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CountQuery {
    pub mutation: String,
    pub kind: MutationType,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub location: Option<String>,
}

/// Number of samples carrying the queried mutation on one date.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DateCount {
    pub sampling_date: Option<NaiveDate>,
    pub count: u64,
}

impl DateCount {
    pub fn new(date: NaiveDate, count: u64) -> Self {
        DateCount { sampling_date: Some(date), count }
    }
}

/// A service that counts samples carrying a mutation, per sampling date.
#[async_trait]
pub trait CountService: Send + Sync {
    async fn fetch(&self, query: &CountQuery) -> Result<Vec<DateCount>, Report>;
}

#[async_trait]
impl<S> CountService for Arc<S>
where
    S: CountService + ?Sized,
{
    async fn fetch(&self, query: &CountQuery) -> Result<Vec<DateCount>, Report> {
        (**self).fetch(query).await
    }
}

// ----------------------------------------------------------------------------
// Coverage Records
// ----------------------------------------------------------------------------

/// Count, coverage, and frequency of one mutation on one date.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CoverageRecord {
    pub mutation: String,
    #[serde(rename = "sampling_date")]
    pub date: NaiveDate,
    pub count: MaybeNa<u64>,
    pub coverage: u64,
    pub frequency: MaybeNa<f64>,
}

impl CoverageRecord {
    /// Build a record from the target count and coverage, `NA` when there is no coverage.
    pub fn new(mutation: &str, date: NaiveDate, count: u64, coverage: u64) -> Self {
        let (count, frequency) = match coverage {
            0 => (MaybeNa::Na, MaybeNa::Na),
            _ => (MaybeNa::Value(count), MaybeNa::Value(count as f64 / coverage as f64)),
        };
        CoverageRecord { mutation: mutation.to_string(), date, count, coverage, frequency }
    }
}

/// Aggregated coverage of one mutation, overall and stratified by date.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MutationCoverage {
    pub mutation: String,
    /// Per-symbol totals over the whole date range.
    pub counts: BTreeMap<char, u64>,
    pub coverage: u64,
    pub frequency: MaybeNa<f64>,
    /// One record per date with data, in date order.
    pub stratified: Vec<CoverageRecord>,
    /// Per-symbol counts on each date.
    #[serde(skip)]
    pub date_counts: BTreeMap<NaiveDate, BTreeMap<char, u64>>,
    /// Queries that failed and were counted as zero.
    #[serde(skip)]
    pub errors: Vec<Error>,
}

impl MutationCoverage {
    /// Reduce per-symbol query results for one mutation.
    fn reduce(code: &MutationCode, kind: MutationType, results: Vec<(char, Result<Vec<DateCount>, Error>)>) -> Self {
        let mutation = code.to_string();
        let target = code.alt();
        let symbols = kind.coverage_symbols();

        let mut counts: BTreeMap<char, u64> = symbols.iter().map(|s| (*s, 0)).collect();
        let mut date_counts: BTreeMap<NaiveDate, BTreeMap<char, u64>> = BTreeMap::new();
        let mut errors = Vec::new();

        for (symbol, result) in results {
            let entries = match result {
                Ok(entries) => entries,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            for entry in entries {
                let Some(date) = entry.sampling_date else {
                    debug!("Ignoring count without a sampling date for {mutation} ({symbol}).");
                    continue;
                };
                *counts.entry(symbol).or_default() += entry.count;
                let day = date_counts.entry(date).or_insert_with(|| symbols.iter().map(|s| (*s, 0)).collect());
                *day.entry(symbol).or_default() += entry.count;
            }
        }

        let stratified = date_counts
            .iter()
            .map(|(date, day)| {
                let coverage = day.values().sum();
                let count = day.get(&target).copied().unwrap_or_default();
                CoverageRecord::new(&mutation, *date, count, coverage)
            })
            .collect_vec();

        let coverage = counts.values().sum::<u64>();
        let frequency = match coverage {
            0 => MaybeNa::Na,
            _ => MaybeNa::Value(counts.get(&target).copied().unwrap_or_default() as f64 / coverage as f64),
        };

        MutationCoverage { mutation, counts, coverage, frequency, stratified, date_counts, errors }
    }
}

// ----------------------------------------------------------------------------
// Coverage Aggregator
// ----------------------------------------------------------------------------

/// Mutations and filters of one aggregation.
#[derive(Clone, Debug, PartialEq)]
pub struct CoverageRequest {
    pub mutations: Vec<MutationCode>,
    pub kind: MutationType,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub location: Option<String>,
}

/// Fans out count queries concurrently and reduces them into [`MutationCoverage`].
///
/// ## Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use chrono::NaiveDate;
/// use color_eyre::eyre::Report;
/// use vasco::coverage::*;
/// use vasco::mutation::MutationType;
/// # use tokio_test::{assert_ok, block_on};
///
/// struct Constant;
///
/// #[async_trait]
/// impl CountService for Constant {
///     async fn fetch(&self, query: &CountQuery) -> Result<Vec<DateCount>, Report> {
///         Ok(vec![DateCount::new(query.start, 5)])
///     }
/// }
///
/// let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let request = CoverageRequest {
///     mutations: vec!["A123T".parse()?],
///     kind: MutationType::Nucleotide,
///     start: date,
///     end: date,
///     location: None,
/// };
/// # assert_ok!(block_on(async {
/// let coverage = CoverageAggregator::new(Constant).aggregate(&request).await?;
/// assert_eq!(coverage[0].coverage, 20);
/// assert_eq!(coverage[0].frequency, MaybeNa::Value(0.25));
/// # Ok::<(), color_eyre::eyre::Report>(())
/// # }));
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Debug)]
pub struct CoverageAggregator<S> {
    service: Arc<S>,
}

impl<S> Clone for CoverageAggregator<S> {
    fn clone(&self) -> Self {
        CoverageAggregator { service: Arc::clone(&self.service) }
    }
}

impl<S> CoverageAggregator<S>
where
    S: CountService + 'static,
{
    pub fn new(service: S) -> Self {
        CoverageAggregator { service: Arc::new(service) }
    }

    pub fn from_arc(service: Arc<S>) -> Self {
        CoverageAggregator { service }
    }

    /// Aggregate coverage for every requested mutation, in request order.
    ///
    /// All queries (mutations x coverage symbols) run concurrently. A failed
    /// query counts as zero for its symbol and is recorded as an
    /// [`Error::PartialFetch`] on its mutation.
    pub async fn aggregate(&self, request: &CoverageRequest) -> Result<Vec<MutationCoverage>, Report> {
        if request.start > request.end {
            return Err(eyre!("Invalid date range: {} to {}", request.start, request.end)
                .suggestion("The start date must not be after the end date."));
        }
        if let Some(code) = request.mutations.iter().find(|m| m.kind() != request.kind) {
            return Err(eyre!("Mutation {code} is not a {} mutation.", request.kind));
        }

        let symbols = request.kind.coverage_symbols();
        info!(
            "Fetching coverage for {} mutations ({} queries).",
            request.mutations.len(),
            request.mutations.len() * symbols.len()
        );

        let mut join_set = JoinSet::new();
        for (i, code) in request.mutations.iter().enumerate() {
            for symbol in symbols {
                let service = Arc::clone(&self.service);
                let query = CountQuery {
                    mutation: code.with_alt(*symbol),
                    kind: request.kind,
                    start: request.start,
                    end: request.end,
                    location: request.location.clone(),
                };
                let symbol = *symbol;
                join_set.spawn(async move {
                    let result = service.fetch(&query).await.map_err(|e| {
                        warn!("Failed to fetch counts for {}: {e}", query.mutation);
                        Error::PartialFetch { query: query.mutation.clone(), reason: format!("{e:#}") }
                    });
                    (i, symbol, result)
                });
            }
        }

        let mut results: Vec<Vec<(char, Result<Vec<DateCount>, Error>)>> =
            request.mutations.iter().map(|_| Vec::new()).collect();
        while let Some(joined) = join_set.join_next().await {
            let (i, symbol, result) = joined.wrap_err("Count query task failed.")?;
            results[i].push((symbol, result));
        }

        let coverage = request
            .mutations
            .iter()
            .zip(results)
            .map(|(code, mut results)| {
                // join order is arbitrary
                results.sort_by_key(|(symbol, _)| *symbol);
                MutationCoverage::reduce(code, request.kind, results)
            })
            .collect_vec();

        let failed = coverage.iter().map(|c| c.errors.len()).sum::<usize>();
        if failed > 0 {
            warn!("{failed} count queries failed and were counted as zero.");
        }
        Ok(coverage)
    }
}

// ----------------------------------------------------------------------------
// Coverage Table
// ----------------------------------------------------------------------------

/// Flatten the stratified records of every mutation, in mutation then date order.
pub fn records(coverage: &[MutationCoverage]) -> Vec<CoverageRecord> {
    coverage.iter().flat_map(|c| c.stratified.iter().cloned()).collect()
}

/// Convert records to a [`Table`] with the [`COVERAGE_COLUMNS`].
pub fn to_table(records: &[CoverageRecord]) -> Table<String> {
    let mut table = Table::new();
    table.headers = COVERAGE_COLUMNS.iter().map(|c| c.to_string()).collect();
    table.rows = records
        .iter()
        .map(|r| {
            vec![
                r.mutation.clone(),
                r.date.to_string(),
                r.count.to_string(),
                r.coverage.to_string(),
                r.frequency.to_string(),
            ]
        })
        .collect();
    table
}

/// Parse records from a [`Table`] with the [`COVERAGE_COLUMNS`], in any order.
pub fn from_table(table: &Table<String>) -> Result<Vec<CoverageRecord>, Report> {
    let columns = COVERAGE_COLUMNS
        .iter()
        .map(|c| table.get_header_index(&c.to_string()))
        .collect::<Result<Vec<_>, _>>()
        .suggestion(format!("Required columns: {}", COVERAGE_COLUMNS.join(", ")))?;

    table
        .rows
        .iter()
        .map(|row| {
            let field = |c: usize| row.get(columns[c]).map(|v| v.as_str()).unwrap_or_default();
            let record = CoverageRecord {
                mutation: field(0).to_string(),
                date: NaiveDate::parse_from_str(field(1), "%Y-%m-%d")?,
                count: field(2).parse()?,
                coverage: field(3).parse()?,
                frequency: field(4).parse()?,
            };
            Ok::<_, Report>(record)
        })
        .enumerate()
        .map(|(i, r)| r.wrap_err(format!("Invalid coverage record on line {}", i + 2)))
        .collect()
}

/// Write records as a delimited table (delimiter chosen by the file extension).
pub fn write<P>(records: &[CoverageRecord], path: &P) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
{
    to_table(records).write(path, None)
}

/// Read records written by [`write`].
pub fn read<P>(path: &P) -> Result<Vec<CoverageRecord>, Report>
where
    P: AsRef<Path> + Debug,
{
    let table = Table::read(path, None)?;
    from_table(&table).wrap_err(format!("Failed to read coverage table: {path:?}"))
}
