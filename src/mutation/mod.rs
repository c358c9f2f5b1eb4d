//! Parse, validate, and canonicalize mutation notation ([`MutationCode`]).

#[cfg(test)]
mod tests;

use crate::Error;

use color_eyre::eyre::{Report, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use strum::EnumIter;

// ----------------------------------------------------------------------------
// Mutation Type
// ----------------------------------------------------------------------------

/// The sequence space a [`MutationCode`] lives in, which determines its alphabet.
#[derive(Clone, Copy, Debug, Default, Deserialize, EnumIter, Eq, Hash, PartialEq, Serialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum MutationType {
    #[default]
    #[serde(rename = "nucleotide")]
    Nucleotide,
    #[serde(rename = "aminoAcid")]
    AminoAcid,
}

impl MutationType {
    /// Symbols a [`MutationCode`] of this type may carry, including deletion (and `N` for nucleotides).
    pub fn symbols(&self) -> &'static [char] {
        match self {
            MutationType::Nucleotide => &['A', 'C', 'G', 'T', 'N', '-'],
            MutationType::AminoAcid => &[
                'A', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'K', 'L', 'M', 'N', 'P', 'Q', 'R', 'S', 'T',
                'V', 'W', 'Y', '-',
            ],
        }
    }

    /// Symbols that are summed into the coverage of a position.
    pub fn coverage_symbols(&self) -> &'static [char] {
        match self {
            MutationType::Nucleotide => &['A', 'T', 'C', 'G'],
            MutationType::AminoAcid => &[
                'A', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'K', 'L', 'M', 'N', 'P', 'Q', 'R', 'S', 'T',
                'V', 'W', 'Y',
            ],
        }
    }

    /// Returns true if `symbol` belongs to this type's alphabet.
    pub fn contains(&self, symbol: char) -> bool {
        self.symbols().contains(&symbol)
    }
}

impl Display for MutationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MutationType::Nucleotide => "nucleotide",
            MutationType::AminoAcid => "aminoAcid",
        };
        write!(f, "{name}")
    }
}

// ----------------------------------------------------------------------------
// Mutation Code
// ----------------------------------------------------------------------------

/// A canonical single-site change: optional gene, position, optional reference and alternate symbol.
///
/// Only constructed through [`MutationCode::parse`], [`MutationCode::normalize`] or
/// [`MutationCode::canonicalize_multi`], so every instance satisfies its alphabet.
///
/// ## Examples
///
/// ```rust
/// use vasco::mutation::{MutationCode, MutationType};
///
/// let code = MutationCode::parse("C241T", MutationType::Nucleotide)?;
/// assert_eq!(code.position(), 241);
/// assert_eq!(code.reference(), Some('C'));
/// assert_eq!(code.alt(), 'T');
/// assert_eq!(code.to_string(), "C241T");
///
/// let code = MutationCode::parse("ORF1a:V3449I", MutationType::AminoAcid)?;
/// assert_eq!(code.gene(), Some("ORF1a"));
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MutationCode {
    kind: MutationType,
    gene: Option<String>,
    position: usize,
    reference: Option<char>,
    alt: char,
}

impl MutationCode {
    /// Validate the components and build a [`MutationCode`].
    fn new(
        input: &str,
        kind: MutationType,
        gene: Option<String>,
        position: usize,
        reference: Option<char>,
        alt: char,
    ) -> Result<Self, Error> {
        let invalid = |reason: String| Error::Validation { input: input.to_string(), reason };

        if position == 0 {
            return Err(invalid("position must be a positive integer".to_string()));
        }
        if let Some(r) = reference {
            if !kind.contains(r) {
                return Err(invalid(format!("reference '{r}' is not a valid {kind} symbol")));
            }
        }
        if !kind.contains(alt) {
            return Err(invalid(format!("alternate '{alt}' is not a valid {kind} symbol")));
        }
        if gene.is_some() && kind != MutationType::AminoAcid {
            return Err(invalid("only amino acid mutations may have a gene prefix".to_string()));
        }

        Ok(MutationCode { kind, gene, position, reference, alt })
    }

    /// Parse a canonical mutation string.
    ///
    /// The grammar is `[GENE:][REF]POS ALT`, where the gene prefix is only allowed for
    /// [`MutationType::AminoAcid`]. Only canonical text is accepted (upper-case
    /// symbols, no leading zeros, no whitespace), use [`MutationCode::normalize`] for
    /// user input.
    ///
    /// - [`Error::Parse`] if the string does not match the grammar.
    /// - [`Error::Validation`] if the position is 0 or a symbol is outside the alphabet.
    ///
    /// ```rust
    /// use vasco::{Error, mutation::{MutationCode, MutationType}};
    ///
    /// let nt = MutationType::Nucleotide;
    /// assert_eq!(MutationCode::parse("123-", nt)?.to_string(), "123-");
    /// assert!(matches!(MutationCode::parse("C241", nt), Err(Error::Parse { .. })));
    /// assert!(matches!(MutationCode::parse("X241T", nt), Err(Error::Validation { .. })));
    /// assert!(matches!(MutationCode::parse("C0T", nt), Err(Error::Validation { .. })));
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn parse(input: &str, kind: MutationType) -> Result<Self, Error> {
        let parse_error = |reason: &str| Error::Parse { input: input.to_string(), reason: reason.to_string() };

        // optional gene prefix
        let (gene, body) = match input.split_once(':') {
            Some((gene, body)) => {
                if gene.is_empty() || !gene.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
                    return Err(parse_error("gene prefix must be alphanumeric"));
                }
                (Some(gene.to_string()), body)
            }
            None => (None, input),
        };

        let chars = body.chars().collect::<Vec<_>>();
        let (alt, rest) = chars.split_last().ok_or_else(|| parse_error("expected a format like 'C123T', '123-', or '123A'"))?;

        // optional reference symbol, then digits
        let (reference, digits) = match rest.first() {
            Some(c) if !c.is_ascii_digit() => (Some(*c), &rest[1..]),
            _ => (None, rest),
        };
        if digits.is_empty() || !digits.iter().all(|c| c.is_ascii_digit()) {
            return Err(parse_error("expected a format like 'C123T', '123-', or '123A'"));
        }
        if alt.is_ascii_digit() {
            return Err(parse_error("missing alternate symbol"));
        }
        if digits.len() > 1 && digits[0] == '0' {
            return Err(parse_error("position has leading zeros"));
        }
        if reference.is_some_and(|r| r.is_ascii_lowercase()) || alt.is_ascii_lowercase() {
            return Err(parse_error("symbols must be upper-case"));
        }

        let position = digits
            .iter()
            .collect::<String>()
            .parse::<usize>()
            .map_err(|e| Error::Validation { input: input.to_string(), reason: format!("position is out of range: {e}") })?;

        MutationCode::new(input, kind, gene, position, reference, *alt)
    }

    /// Parse loosely formatted user input.
    ///
    /// Whitespace is trimmed, symbols are upper-cased and leading zeros are stripped
    /// before deferring to [`MutationCode::parse`]. The gene prefix keeps its case.
    ///
    /// ```rust
    /// use vasco::mutation::{MutationCode, MutationType};
    ///
    /// let code = MutationCode::normalize(" c0241t ", MutationType::Nucleotide)?;
    /// assert_eq!(code.to_string(), "C241T");
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn normalize(input: &str, kind: MutationType) -> Result<Self, Error> {
        let trimmed = input.trim();
        let (gene, body) = match trimmed.split_once(':') {
            Some((gene, body)) => (Some(gene.trim()), body.trim()),
            None => (None, trimmed),
        };
        let body = body.to_uppercase();

        // strip leading zeros from the position, keeping at least one digit
        let split = body.find(|c: char| c.is_ascii_digit()).unwrap_or(body.len());
        let (head, tail) = body.split_at(split);
        let zeros = tail.chars().take_while(|c| *c == '0').count();
        let remaining_digits = tail[zeros..].chars().take_while(|c| c.is_ascii_digit()).count();
        let zeros = if remaining_digits == 0 { zeros.saturating_sub(1) } else { zeros };
        let body = format!("{head}{}", &tail[zeros..]);

        let canonical = match gene {
            Some(gene) => format!("{gene}:{body}"),
            None => body,
        };
        MutationCode::parse(&canonical, kind)
    }

    /// Split a `{position: "REF>ALT"}` lineage definition entry into nucleotide codes.
    ///
    /// - `"C>T"` yields one code.
    /// - `"GGG>AAC"` (equal lengths) yields one code per offset.
    /// - A run of deletion markers (`"--"`) yields one ref-less deletion per marker,
    ///   all anchored at `position`.
    /// - Differing lengths (`"G>AAC"`) and unrecognized notation are skipped with a warning.
    ///
    /// ```rust
    /// use vasco::mutation::MutationCode;
    ///
    /// let codes = MutationCode::canonicalize_multi(28881, "GGG>AAC")?;
    /// let codes = codes.iter().map(|c| c.to_string()).collect::<Vec<_>>();
    /// assert_eq!(codes, ["G28881A", "G28882A", "G28883C"]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn canonicalize_multi(position: usize, change: &str) -> Result<Vec<Self>, Error> {
        let kind = MutationType::Nucleotide;
        let input = format!("{position}:{change}");

        if change.is_empty() {
            warn!("Empty mutation at position {position}. Skipping.");
            return Ok(Vec::new());
        }

        // deletion run, one code per marker at the same position
        if change.chars().all(|c| c == '-') {
            return change.chars().map(|_| MutationCode::new(&input, kind, None, position, None, '-')).collect();
        }

        let Some((reference, alt)) = change.split_once('>') else {
            warn!("Unexpected mutation format at position {position}: {change}. Expected REF>ALT format.");
            return Ok(Vec::new());
        };
        if alt.contains('>') {
            warn!("Invalid mutation format at position {position}: {change}. Expected REF>ALT format.");
            return Ok(Vec::new());
        }

        let reference = reference.chars().collect::<Vec<_>>();
        let alt = alt.chars().collect::<Vec<_>>();
        if reference.len() != alt.len() || reference.is_empty() {
            warn!("Complex mutation at position {position}: {change}. Skipping.");
            return Ok(Vec::new());
        }

        reference
            .iter()
            .zip(alt.iter())
            .enumerate()
            .map(|(i, (r, a))| MutationCode::new(&input, kind, None, position + i, Some(*r), *a))
            .collect()
    }

    /// Validate a batch of user-supplied mutation strings.
    ///
    /// Returns every accepted code, and one error per rejected string.
    pub fn validate_all<'a, I>(inputs: I, kind: MutationType) -> (Vec<Self>, Vec<Error>)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut valid = Vec::new();
        let mut errors = Vec::new();
        inputs.into_iter().for_each(|input| match MutationCode::normalize(input, kind) {
            Ok(code) => valid.push(code),
            Err(e) => errors.push(e),
        });
        (valid, errors)
    }

    pub fn kind(&self) -> MutationType {
        self.kind
    }

    pub fn gene(&self) -> Option<&str> {
        self.gene.as_deref()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn reference(&self) -> Option<char> {
        self.reference
    }

    pub fn alt(&self) -> char {
        self.alt
    }

    /// Returns true if the alternate symbol is a deletion.
    pub fn is_deletion(&self) -> bool {
        self.alt == '-'
    }

    /// The canonical string without its alternate symbol (ex. `A123` for `A123T`).
    pub fn prefix(&self) -> String {
        let s = self.to_string();
        s[..s.len() - self.alt.len_utf8()].to_string()
    }

    /// The canonical string for the same site with a different alternate symbol.
    ///
    /// ```rust
    /// use vasco::mutation::{MutationCode, MutationType};
    ///
    /// let code = MutationCode::parse("A123T", MutationType::Nucleotide)?;
    /// assert_eq!(code.with_alt('G'), "A123G");
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn with_alt(&self, alt: char) -> String {
        format!("{}{alt}", self.prefix())
    }
}

impl Display for MutationCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(gene) = &self.gene {
            write!(f, "{gene}:")?;
        }
        if let Some(reference) = self.reference {
            write!(f, "{reference}")?;
        }
        write!(f, "{}{}", self.position, self.alt)
    }
}

impl FromStr for MutationCode {
    type Err = Report;

    /// Parse a canonical nucleotide mutation.
    fn from_str(s: &str) -> Result<Self, Report> {
        Ok(MutationCode::parse(s, MutationType::Nucleotide)?)
    }
}

impl Ord for MutationCode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position
            .cmp(&other.position)
            .then_with(|| self.gene.cmp(&other.gene))
            .then_with(|| self.reference.cmp(&other.reference))
            .then_with(|| self.alt.cmp(&other.alt))
    }
}

impl PartialOrd for MutationCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
