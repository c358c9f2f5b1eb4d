//! Named lineage signatures and the mutation x lineage indicator [`Matrix`].

pub mod definition;

pub use definition::{LineageDefinition, LineageInfo};

use crate::mutation::{MutationCode, MutationType};
use crate::Error;

use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;
use strum::EnumIter;
use vasco_table::Table;

/// Header of the leading matrix column.
pub const MUTATION_COLUMN: &str = "Mutation";

// ----------------------------------------------------------------------------
// Variant Source
// ----------------------------------------------------------------------------

/// Where the signature mutations of a [`SignatureVariant`] came from.
#[derive(Clone, Copy, Debug, Default, Deserialize, EnumIter, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariantSource {
    /// A curated lineage definition (ex. cowwid YAML).
    #[default]
    Curated,
    /// Mutations above an abundance threshold in a sequence database query.
    CustomDerived,
    /// Mutations entered by hand.
    Manual,
}

impl Display for VariantSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let source = match self {
            VariantSource::Curated => "curated",
            VariantSource::CustomDerived => "custom-derived",
            VariantSource::Manual => "manual",
        };
        write!(f, "{source}")
    }
}

// ----------------------------------------------------------------------------
// Signature Variant
// ----------------------------------------------------------------------------

/// A named lineage and the set of mutations that characterize it.
#[derive(Clone, Debug, PartialEq)]
pub struct SignatureVariant {
    pub name: String,
    pub source: VariantSource,
    /// Short alias of a curated lineage (ex. `delta`).
    pub short: Option<String>,
    /// Nextstrain clade of a curated lineage (ex. `21A`).
    pub nextstrain: Option<String>,
    mutations: BTreeMap<String, MutationCode>,
}

impl SignatureVariant {
    /// Create a variant from already parsed mutations, duplicates collapse.
    pub fn new<I>(name: &str, source: VariantSource, mutations: I) -> Self
    where
        I: IntoIterator<Item = MutationCode>,
    {
        let mutations = mutations.into_iter().map(|m| (m.to_string(), m)).collect();
        SignatureVariant { name: name.to_string(), source, short: None, nextstrain: None, mutations }
    }

    /// Create a [`VariantSource::Manual`] variant from user-entered mutation strings.
    ///
    /// Every string goes through [`MutationCode::normalize`], the first rejected
    /// string aborts.
    ///
    /// ```rust
    /// use vasco::mutation::MutationType;
    /// use vasco::signature::SignatureVariant;
    ///
    /// let variant = SignatureVariant::manual("mine", ["c241t", "3037T"], MutationType::Nucleotide)?;
    /// assert_eq!(variant.mutations().collect::<Vec<_>>(), ["3037T", "C241T"]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn manual<'a, I>(name: &str, mutations: I, kind: MutationType) -> Result<Self, Report>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let (valid, errors) = MutationCode::validate_all(mutations, kind);
        if let Some(error) = errors.into_iter().next() {
            return Err(eyre!(error)).wrap_err(format!("Invalid mutation in variant: {name}"));
        }
        Ok(SignatureVariant::new(name, VariantSource::Manual, valid))
    }

    /// Canonical mutation strings, in lexicographic order.
    pub fn mutations(&self) -> impl Iterator<Item = &str> {
        self.mutations.keys().map(|m| m.as_str())
    }

    /// Parsed mutations, in lexicographic order of their canonical strings.
    pub fn codes(&self) -> impl Iterator<Item = &MutationCode> {
        self.mutations.values()
    }

    pub fn contains(&self, mutation: &str) -> bool {
        self.mutations.contains_key(mutation)
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Signature Matrix Builder
// ----------------------------------------------------------------------------

/// Registry of [`SignatureVariant`]s with unique names.
///
/// ## Examples
///
/// ```rust
/// use vasco::mutation::MutationCode;
/// use vasco::signature::{SignatureMatrixBuilder, SignatureVariant, VariantSource};
///
/// let (c241t, a23403g) = ("C241T".parse::<MutationCode>()?, "A23403G".parse::<MutationCode>()?);
/// let mut builder = SignatureMatrixBuilder::new();
/// builder.add(SignatureVariant::new("A", VariantSource::Manual, [c241t.clone(), a23403g]))?;
/// builder.add(SignatureVariant::new("B", VariantSource::Manual, [c241t]))?;
///
/// let matrix = builder.build_matrix::<&str>(&[])?;
/// assert_eq!(matrix.rows(), ["A23403G", "C241T"]);
/// assert_eq!(matrix.variants(), ["A", "B"]);
/// assert_eq!(matrix.get("A23403G", "B"), Some(false));
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct SignatureMatrixBuilder {
    variants: BTreeMap<String, SignatureVariant>,
}

impl SignatureMatrixBuilder {
    pub fn new() -> Self {
        SignatureMatrixBuilder { variants: BTreeMap::new() }
    }

    /// Register a variant, fails with [`Error::NameCollision`] if the name is taken.
    pub fn add(&mut self, variant: SignatureVariant) -> Result<(), Error> {
        if self.variants.contains_key(&variant.name) {
            return Err(Error::NameCollision(variant.name));
        }
        debug!("Registering signature variant {} with {} mutations.", variant.name, variant.len());
        if variant.is_empty() {
            warn!("Signature variant {} has no mutations.", variant.name);
        }
        self.variants.insert(variant.name.clone(), variant);
        Ok(())
    }

    /// Unregister a variant, fails with [`Error::UnknownVariant`] if absent.
    pub fn remove(&mut self, name: &str) -> Result<SignatureVariant, Error> {
        self.variants.remove(name).ok_or_else(|| Error::UnknownVariant(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&SignatureVariant> {
        self.variants.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.variants.keys().map(|n| n.as_str()).collect()
    }

    /// Registered variants, sorted by name.
    pub fn variants(&self) -> impl Iterator<Item = &SignatureVariant> {
        self.variants.values()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Build the indicator [`Matrix`] over the selected variants (all of them if `names` is empty).
    ///
    /// Rows are the union of the selected mutations, sorted by descending
    /// position and then by canonical string. Columns are sorted by name.
    pub fn build_matrix<S>(&self, names: &[S]) -> Result<Matrix, Report>
    where
        S: AsRef<str>,
    {
        let selected = if names.is_empty() {
            self.variants.values().collect_vec()
        } else {
            names
                .iter()
                .map(|name| {
                    self.variants
                        .get(name.as_ref())
                        .ok_or_else(|| Error::UnknownVariant(name.as_ref().to_string()))
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| eyre!(e).suggestion(format!("Registered variants: {}", self.names().join(", "))))?
                .into_iter()
                .unique_by(|v| &v.name)
                .sorted_by(|a, b| a.name.cmp(&b.name))
                .collect_vec()
        };

        let rows = selected
            .iter()
            .flat_map(|v| v.codes())
            .map(|code| (Reverse(code.position()), code.to_string()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|(_, mutation)| mutation)
            .collect_vec();

        let variants = selected.iter().map(|v| v.name.clone()).collect_vec();
        let cells = rows
            .iter()
            .map(|mutation| selected.iter().map(|v| v.contains(mutation)).collect_vec())
            .collect_vec();

        debug!("Built signature matrix: {} mutations x {} variants.", rows.len(), variants.len());
        Ok(Matrix { rows, variants, cells })
    }
}

// ----------------------------------------------------------------------------
// Matrix
// ----------------------------------------------------------------------------

/// Boolean mutation x variant indicator matrix.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "MatrixRepr")]
pub struct Matrix {
    rows: Vec<String>,
    variants: Vec<String>,
    cells: Vec<Vec<bool>>,
}

/// Unchecked serialized form of a [`Matrix`].
#[derive(Deserialize)]
struct MatrixRepr {
    rows: Vec<String>,
    variants: Vec<String>,
    cells: Vec<Vec<bool>>,
}

impl TryFrom<MatrixRepr> for Matrix {
    type Error = String;

    fn try_from(repr: MatrixRepr) -> Result<Self, Self::Error> {
        Matrix::new(repr.rows, repr.variants, repr.cells).map_err(|e| e.to_string())
    }
}

impl Matrix {
    /// Assemble a matrix with one row of cells per mutation and one cell per variant.
    pub fn new(rows: Vec<String>, variants: Vec<String>, cells: Vec<Vec<bool>>) -> Result<Self, Report> {
        if cells.len() != rows.len() {
            return Err(eyre!("Signature matrix has {} mutations but {} rows of cells.", rows.len(), cells.len()));
        }
        if let Some((mutation, row)) = rows.iter().zip(cells.iter()).find(|(_, row)| row.len() != variants.len()) {
            return Err(eyre!(
                "Signature matrix row {mutation} has {} cells, expected {}.",
                row.len(),
                variants.len()
            ));
        }
        if let Some(mutation) = rows.iter().duplicates().next() {
            return Err(eyre!("Signature matrix contains a duplicate mutation: {mutation}"));
        }
        if let Some(variant) = variants.iter().duplicates().next() {
            return Err(eyre!("Signature matrix contains a duplicate variant: {variant}"));
        }
        Ok(Matrix { rows, variants, cells })
    }

    /// Mutation strings, in row order.
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Variant names, in column order.
    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    /// Cell value, or [`None`] if the mutation or variant is not in the matrix.
    pub fn get(&self, mutation: &str, variant: &str) -> Option<bool> {
        let row = self.row_index(mutation)?;
        let col = self.variants.iter().position(|v| v == variant)?;
        Some(self.cells[row][col])
    }

    /// One-hot indicators of a mutation across all variants, in column order.
    pub fn one_hot(&self, mutation: &str) -> Option<&[bool]> {
        self.row_index(mutation).map(|row| self.cells[row].as_slice())
    }

    pub fn row_index(&self, mutation: &str) -> Option<usize> {
        self.rows.iter().position(|m| m == mutation)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.variants.is_empty()
    }

    /// Parse every row back into a [`MutationCode`].
    pub fn codes(&self, kind: MutationType) -> Result<Vec<MutationCode>, Report> {
        self.rows
            .iter()
            .map(|m| MutationCode::parse(m, kind).map_err(Report::from))
            .collect::<Result<Vec<_>, _>>()
            .wrap_err("Signature matrix contains an invalid mutation.")
    }

    /// Convert to a [`Table`] with a leading [`MUTATION_COLUMN`] and 0/1 cells.
    pub fn to_table(&self) -> Table<String> {
        let mut table = Table::new();
        table.headers = std::iter::once(MUTATION_COLUMN.to_string()).chain(self.variants.iter().cloned()).collect();
        table.rows = self
            .rows
            .iter()
            .zip(self.cells.iter())
            .map(|(mutation, cells)| {
                std::iter::once(mutation.clone())
                    .chain(cells.iter().map(|c| u8::from(*c).to_string()))
                    .collect()
            })
            .collect();
        table
    }

    /// Read a [`Matrix`] from a table, the inverse of [`Matrix::to_table`].
    pub fn from_table(table: &Table<String>) -> Result<Self, Report> {
        if table.headers.first().map(|h| h.as_str()) != Some(MUTATION_COLUMN) {
            return Err(eyre!("Signature matrix is missing the leading {MUTATION_COLUMN:?} column.")
                .suggestion(format!("Headers: {:?}", table.headers)));
        }
        let variants = table.headers[1..].to_vec();
        let mut rows = Vec::new();
        let mut cells = Vec::new();
        for row in &table.rows {
            let mutation = row.first().ok_or_else(|| eyre!("Signature matrix contains an empty row."))?;
            let values = row[1..]
                .iter()
                .map(|value| match value.trim() {
                    "1" | "1.0" | "true" | "True" => Ok(true),
                    "0" | "0.0" | "false" | "False" => Ok(false),
                    other => Err(eyre!("Invalid signature matrix cell for {mutation}: {other:?}")),
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(mutation.clone());
            cells.push(values);
        }
        Matrix::new(rows, variants, cells)
    }

    /// Write as a delimited table (delimiter chosen by the file extension).
    pub fn write<P>(&self, path: &P) -> Result<(), Report>
    where
        P: AsRef<Path> + Debug,
    {
        self.to_table().write(path, None)
    }

    /// Read a delimited table written by [`Matrix::write`].
    pub fn read<P>(path: &P) -> Result<Self, Report>
    where
        P: AsRef<Path> + Debug,
    {
        let table = Table::read(path, None)?;
        Matrix::from_table(&table).wrap_err(format!("Failed to read signature matrix: {path:?}"))
    }
}
