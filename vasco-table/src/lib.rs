//! Create and manipulate a row-based [`Table`].

use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// A row-based [`Table`] of generic data.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Table<T> {
    /// Names of the table columns.
    pub headers: Vec<T>,
    /// Rows of table values.
    pub rows: Vec<Vec<T>>,
    /// Optional file path for where the table was read from.
    pub path: Option<PathBuf>,
}

impl<T> Default for Table<T>
where
    T: Clone + Display + Debug + PartialEq<T>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Table<T>
where
    T: Clone + Display + Debug + PartialEq<T>,
{
    /// Returns a new row-based [`Table`] with empty headers and rows.
    ///
    /// ## Examples
    ///
    /// ```
    /// let mut table = vasco_table::Table::new();
    /// table.headers = vec!["Mutation", "BA.2", "JN.1"];
    /// table.add_row(vec!["C241T", "1", "1"])?;
    /// # assert_eq!(table.rows, vec![vec!["C241T", "1", "1"]]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    ///
    /// | Mutation | BA.2 | JN.1 |
    /// |----------|------|------|
    /// | C241T    | 1    | 1    |
    pub fn new() -> Self {
        Table { headers: Vec::new(), rows: Vec::new(), path: None }
    }

    /// Add a new row to the table.
    ///
    /// The row must match the number of headers (when headers are set) and
    /// the length of any existing rows.
    ///
    /// ## Examples
    ///
    /// ```
    /// let mut table = vasco_table::Table::new();
    /// table.headers = vec!["1", "2", "3"];
    /// table.add_row(["A", "B", "C"])?;
    /// table.add_row(["D", "E", "F"])?;
    /// assert!(table.add_row(["G"]).is_err());
    /// # assert_eq!(table.rows, [["A", "B", "C"], ["D", "E", "F"]]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn add_row<I>(&mut self, row: I) -> Result<(), Report>
    where
        I: IntoIterator<Item = T>,
    {
        let row = row.into_iter().collect::<Vec<T>>();
        let expected = match self.rows.first() {
            Some(first) => first.len(),
            None => self.headers.len(),
        };
        if !self.headers.is_empty() || !self.rows.is_empty() {
            let new = row.len();
            if expected != new {
                return Err(eyre!("New row size ({new}) does not match existing table ({expected})."));
            }
        }
        self.rows.push(row);
        Ok(())
    }

    /// Adds a new column to the [`Table`].
    ///
    /// ## Examples
    ///
    /// ```
    /// let mut table = vasco_table::Table::new();
    /// table.headers = vec!["1", "2", "3"];
    /// table.add_row(["A", "B", "C"])?;
    /// table.add_column("4", vec!["D"])?;
    ///
    /// assert_eq!(table.get_column(&"4")?, [&"D"]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn add_column<I>(&mut self, header: T, column: I) -> Result<(), Report>
    where
        I: IntoIterator<Item = T>,
    {
        let column = column.into_iter().collect::<Vec<T>>();
        let ex = self.rows.len();
        let new = column.len();
        if ex != new {
            return Err(eyre!("New column size ({new}) does not match existing table ({ex})."));
        }

        self.headers.push(header);
        self.rows.iter_mut().zip(column).for_each(|(row, val)| row.push(val));
        Ok(())
    }

    /// Returns the [`Table`] value under a particular header and row index.
    ///
    /// ```
    /// let mut table = vasco_table::Table::new();
    /// table.headers = vec!["1", "2", "3"];
    /// table.add_row(["A", "B", "C"])?;
    ///
    /// assert_eq!(table.get(&"2", 0)?, &"B");
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn get(&self, header: &T, row: usize) -> Result<&T, Report> {
        let header_i = self.get_header_index(header)?;
        let row = self.get_row(row)?;
        Ok(&row[header_i])
    }

    /// Returns a [`Vec`] of [`Table`] values under a header.
    pub fn get_column(&self, header: &T) -> Result<Vec<&T>, Report> {
        let header_i = self.get_header_index(header)?;
        let column = self.rows.iter().map(|row| &row[header_i]).collect();
        Ok(column)
    }

    /// Returns the column index (0-based) of the header in the [`Table`].
    pub fn get_header_index(&self, header: &T) -> Result<usize, Report> {
        self.headers
            .iter()
            .position(|h| h == header)
            .ok_or_else(|| eyre!("Column '{header}' was not found in table: {:?}.", self.path))
    }

    /// Return a row of [`Table`] values from a row index.
    pub fn get_row(&self, i: usize) -> Result<&[T], Report> {
        self.rows.get(i).map(|row| row.as_slice()).ok_or_else(|| eyre!("Row ({i}) does not exist in the table."))
    }

    /// Update all values in a row.
    ///
    /// ```
    /// let mut table = vasco_table::Table::new();
    /// table.headers = vec!["1", "2", "3"];
    /// table.add_row(["A", "B", "C"])?;
    /// table.set_row(0, ["AA", "BB", "CC"])?;
    /// assert_eq!(table.get_row(0)?, ["AA", "BB", "CC"]);
    /// assert!(table.set_row(10, ["AA", "BB", "CC"]).is_err());
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn set_row<I>(&mut self, i: usize, row: I) -> Result<(), Report>
    where
        I: IntoIterator<Item = T>,
    {
        if i >= self.rows.len() {
            return Err(eyre!("Row ({i}) does not exist in the table."));
        }
        let row = row.into_iter().collect::<Vec<T>>();
        if row.len() != self.rows[i].len() {
            return Err(eyre!(
                "New row size ({}) does not match existing table ({}).",
                row.len(),
                self.rows[i].len()
            ));
        }
        self.rows[i] = row;
        Ok(())
    }

    /// Write the [`Table`] as delimited records, headers first.
    ///
    /// Fields containing the delimiter, quotes or newlines are quoted.
    pub fn to_writer<W: Write>(&self, writer: W, delim: char) -> Result<(), Report> {
        let delim = u8::try_from(delim).wrap_err(format!("Delimiter must be a single byte: {delim:?}"))?;
        let mut writer = csv::WriterBuilder::new().delimiter(delim).from_writer(writer);
        std::iter::once(&self.headers).chain(self.rows.iter()).try_for_each(|record| {
            writer.write_record(record.iter().map(|value| value.to_string())).wrap_err("Failed to write table row.")
        })?;
        writer.flush().wrap_err("Failed to flush table.")?;
        Ok(())
    }

    /// Render the [`Table`] as delimited text, headers first.
    ///
    /// ```
    /// let mut table = vasco_table::Table::new();
    /// table.headers = vec!["pos", "base"];
    /// table.add_row(["241", "T"])?;
    /// assert_eq!(table.to_delimited('\t')?, "pos\tbase\n241\tT\n");
    ///
    /// table.headers = vec!["pos", "BA.2,x"];
    /// assert_eq!(table.to_delimited(',')?, "pos,\"BA.2,x\"\n241,T\n");
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn to_delimited(&self, delim: char) -> Result<String, Report> {
        let mut output = Vec::new();
        self.to_writer(&mut output, delim)?;
        String::from_utf8(output).wrap_err("Table is not valid UTF-8.")
    }

    /// Write [`Table`] to a file.
    ///
    /// If `delim` is [`None`], it is chosen from the file extension with [`get_delimiter`].
    ///
    /// ```
    /// let mut table = vasco_table::Table::new();
    /// table.headers = vec!["1", "2", "3"];
    /// table.add_row(["A", "B", "C"])?;
    ///
    /// let dir = tempfile::tempdir()?;
    /// table.write(&dir.path().join("table.tsv"), None)?;
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn write<P>(&self, path: &P, delim: Option<char>) -> Result<(), Report>
    where
        P: AsRef<Path> + Debug,
    {
        let delim = match delim {
            Some(c) => c,
            None => get_delimiter(path)?,
        };
        let file = File::create(path).wrap_err_with(|| eyre!("Unable to create file: {path:?}"))?;
        self.to_writer(file, delim).wrap_err_with(|| eyre!("Unable to write table: {path:?}"))
    }
}

impl Table<String> {
    /// Read delimited text into a [`Table`] of [`String`] values.
    ///
    /// The first record is used as the headers. Every row must have the same
    /// number of fields as the headers.
    ///
    /// ```
    /// let text = "Mutation,BA.2\nC241T,1\n";
    /// let table = vasco_table::Table::from_reader(text.as_bytes(), ',')?;
    /// assert_eq!(table.headers, ["Mutation", "BA.2"]);
    /// assert_eq!(table.get(&"BA.2".to_string(), 0)?, "1");
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn from_reader<R: Read>(reader: R, delim: char) -> Result<Self, Report> {
        let delim = u8::try_from(delim).wrap_err(format!("Delimiter must be a single byte: {delim:?}"))?;
        let mut reader = csv::ReaderBuilder::new().delimiter(delim).has_headers(true).from_reader(reader);

        let mut table = Table::new();
        table.headers = reader.headers().wrap_err("Failed to read table headers.")?.iter().map(String::from).collect_vec();

        reader.records().try_for_each(|result| {
            let record = result.wrap_err("Failed to read table row.")?;
            table.add_row(record.iter().map(String::from))
        })?;

        Ok(table)
    }

    /// Read a TSV or CSV file into a [`Table`].
    ///
    /// If `delim` is [`None`], it is chosen from the file extension.
    pub fn read<P>(path: &P, delim: Option<char>) -> Result<Self, Report>
    where
        P: AsRef<Path> + Debug,
    {
        let delim = match delim {
            Some(c) => c,
            None => get_delimiter(path)?,
        };
        let file = File::open(path).wrap_err_with(|| eyre!("Failed to read file: {path:?}"))?;
        let mut table = Table::from_reader(file, delim).wrap_err_with(|| eyre!("Failed to parse table: {path:?}"))?;
        table.path = Some(path.as_ref().to_path_buf());
        Ok(table)
    }
}

/// Get delimiter based on file extension.
///
/// - `.tsv` => `\t`
/// - `.txt` => `\t`
/// - `.csv` => `,`
///
/// Note that `.txt` is assumed to be tab-delimited!
///
/// ```rust
/// use vasco_table::get_delimiter;
///
/// assert_eq!(get_delimiter(&"file.tsv")?, '\t');
/// assert_eq!(get_delimiter(&"file.csv")?, ',');
/// assert_eq!(get_delimiter(&"file.txt")?, '\t');
/// assert!(get_delimiter(&"file").is_err());
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn get_delimiter<P>(path: &P) -> Result<char, Report>
where
    P: AsRef<Path> + Debug,
{
    let ext = path
        .as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| eyre!("Failed to get file extension: {path:?}"))?;
    match ext {
        "tsv" | "txt" => Ok('\t'),
        "csv" => Ok(','),
        _ext => Err(eyre!("Unknown file extension: {_ext:?}").suggestion("Options: tsv, csv, or txt")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_keeps_headers_and_rows() -> Result<(), Report> {
        let mut table = Table::new();
        table.headers = vec!["date".to_string(), "count".to_string(), "frac".to_string()];
        table.add_row(["2024-01-15".to_string(), "NA".to_string(), "NA".to_string()])?;
        table.add_row(["2024-01-16".to_string(), "5".to_string(), "0.25".to_string()])?;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tallymut.tsv");
        table.write(&path, None)?;

        let observed = Table::read(&path, None)?;
        assert_eq!(observed.headers, table.headers);
        assert_eq!(observed.rows, table.rows);
        assert_eq!(observed.path, Some(path));
        Ok(())
    }

    #[test]
    fn quoted_fields_survive_write() -> Result<(), Report> {
        let mut table = Table::new();
        table.headers = vec!["Mutation".to_string(), "BA.2,x".to_string(), "JN.1\t\"KP\"".to_string()];
        table.add_row(["C241T".to_string(), "1".to_string(), "0".to_string()])?;

        let dir = tempfile::tempdir()?;
        for name in ["matrix.csv", "matrix.tsv"] {
            let path = dir.path().join(name);
            table.write(&path, None)?;
            let observed = Table::read(&path, None)?;
            assert_eq!(observed.headers, table.headers);
            assert_eq!(observed.rows, table.rows);
        }
        Ok(())
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let text = "a,b\n1,2\n3\n";
        assert!(Table::from_reader(text.as_bytes(), ',').is_err());
    }

    #[test]
    fn add_column_checks_length() -> Result<(), Report> {
        let mut table = Table::new();
        table.headers = vec!["Mutation"];
        table.add_row(["C241T"])?;
        table.add_row(["A123T"])?;
        assert!(table.add_column("BA.2", ["1"]).is_err());
        table.add_column("BA.2", ["1", "0"])?;
        assert_eq!(table.get_column(&"BA.2")?, [&"1", &"0"]);
        Ok(())
    }
}
