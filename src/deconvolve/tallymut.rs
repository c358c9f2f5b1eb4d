use crate::coverage::CoverageRecord;
use crate::mutation::{MutationCode, MutationType};
use crate::signature::Matrix;

use color_eyre::eyre::{Report, Result, WrapErr};
use itertools::Itertools;
use log::{debug, warn};
use std::collections::BTreeSet;
use vasco_table::Table;

/// Leading columns of a tallymut table, followed by one column per variant.
pub const TALLYMUT_COLUMNS: [&str; 7] = ["date", "count", "cov", "frac", "mutation", "pos", "base"];

/// Join coverage records with the matrix into the engine's tallymut table.
///
/// One row per (date, mutation), ordered by date and then by matrix row.
/// Records whose mutation is not a matrix row are dropped with a warning.
///
/// ```rust
/// use chrono::NaiveDate;
/// use vasco::coverage::CoverageRecord;
/// use vasco::deconvolve::tallymut;
/// use vasco::signature::{SignatureMatrixBuilder, SignatureVariant, VariantSource};
///
/// let mut builder = SignatureMatrixBuilder::new();
/// builder.add(SignatureVariant::new("BA.2", VariantSource::Manual, ["C241T".parse::<vasco::mutation::MutationCode>()?]))?;
/// let matrix = builder.build_matrix::<&str>(&[])?;
///
/// let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let records = [CoverageRecord::new("C241T", date, 5, 20)];
/// let table = tallymut(&records, &matrix)?;
/// assert_eq!(table.headers, ["date", "count", "cov", "frac", "mutation", "pos", "base", "BA.2"]);
/// assert_eq!(table.rows[0], ["2024-01-01", "5", "20", "0.25", "C241T", "241", "T", "1"]);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn tallymut(records: &[CoverageRecord], matrix: &Matrix) -> Result<Table<String>, Report> {
    // site of every matrix row
    let sites = matrix
        .rows()
        .iter()
        .map(|m| MutationCode::parse(m, MutationType::Nucleotide))
        .collect::<Result<Vec<_>, _>>()
        .wrap_err("Signature matrix rows must be nucleotide mutations.")?;

    let mut dropped = BTreeSet::new();
    let mut joined = Vec::new();
    for record in records {
        match matrix.row_index(&record.mutation) {
            Some(row) => joined.push((record.date, row, record)),
            None => {
                dropped.insert(record.mutation.as_str());
            }
        }
    }
    if !dropped.is_empty() {
        warn!(
            "Dropping coverage for {} mutations absent from the signature matrix: {}",
            dropped.len(),
            dropped.iter().join(", ")
        );
    }

    let mut table = Table::new();
    table.headers = TALLYMUT_COLUMNS.iter().map(|c| c.to_string()).chain(matrix.variants().iter().cloned()).collect();

    for (date, row, record) in joined.into_iter().sorted_by_key(|(date, row, _)| (*date, *row)) {
        let site = &sites[row];
        let one_hot = matrix.one_hot(&record.mutation).unwrap_or_default();
        let values = [
            date.to_string(),
            record.count.to_string(),
            record.coverage.to_string(),
            record.frequency.to_string(),
            record.mutation.clone(),
            site.position().to_string(),
            site.alt().to_string(),
        ]
        .into_iter()
        .chain(one_hot.iter().map(|c| u8::from(*c).to_string()));
        table.add_row(values)?;
    }

    debug!("Built tallymut table with {} rows.", table.rows.len());
    Ok(table)
}
