use crate::mutation::{MutationCode, MutationType};
use crate::Error;

use color_eyre::eyre::{Report, Result};
use pretty_assertions::assert_eq;
use strum::IntoEnumIterator;

fn to_strings(codes: &[MutationCode]) -> Vec<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

#[test]
fn round_trip_canonical() -> Result<(), Report> {
    let nucleotide = ["C241T", "123T", "123-", "N5A", "A29903-"];
    for s in nucleotide {
        assert_eq!(MutationCode::parse(s, MutationType::Nucleotide)?.to_string(), s);
    }
    let amino_acid = ["ORF1a:V3449I", "S:N501Y", "S:69-", "E484K"];
    for s in amino_acid {
        assert_eq!(MutationCode::parse(s, MutationType::AminoAcid)?.to_string(), s);
    }
    Ok(())
}

#[test]
fn parse_components() -> Result<(), Report> {
    let code = MutationCode::parse("S:N501Y", MutationType::AminoAcid)?;
    assert_eq!(code.kind(), MutationType::AminoAcid);
    assert_eq!(code.gene(), Some("S"));
    assert_eq!(code.position(), 501);
    assert_eq!(code.reference(), Some('N'));
    assert_eq!(code.alt(), 'Y');
    assert_eq!(code.prefix(), "S:N501");

    let code = MutationCode::parse("123-", MutationType::Nucleotide)?;
    assert_eq!(code.reference(), None);
    assert!(code.is_deletion());
    assert_eq!(code.prefix(), "123");
    assert_eq!(code.with_alt('A'), "123A");
    Ok(())
}

#[test]
fn parse_structural_errors() {
    let nt = MutationType::Nucleotide;
    for s in ["", "T", "241", "C241", "CC241T", "C24 1T", "c241t", "C0241T", ":C241T"] {
        let result = MutationCode::parse(s, nt);
        assert!(matches!(result, Err(Error::Parse { .. })), "{s} -> {result:?}");
    }
}

#[test]
fn parse_validation_errors() {
    let nt = MutationType::Nucleotide;
    for s in ["C0T", "X241T", "C241Z", "ORF1a:C241T"] {
        let result = MutationCode::parse(s, nt);
        assert!(matches!(result, Err(Error::Validation { .. })), "{s} -> {result:?}");
    }
    // B is not one of the 20 standard residues
    let result = MutationCode::parse("S:N501B", MutationType::AminoAcid);
    assert!(matches!(result, Err(Error::Validation { .. })));
}

#[test]
fn normalize_user_input() -> Result<(), Report> {
    let nt = MutationType::Nucleotide;
    assert_eq!(MutationCode::normalize("  c241t", nt)?.to_string(), "C241T");
    assert_eq!(MutationCode::normalize("0123-", nt)?.to_string(), "123-");
    assert_eq!(MutationCode::normalize("orf1a:v3449i", MutationType::AminoAcid)?.to_string(), "orf1a:V3449I");
    assert!(matches!(MutationCode::normalize("C00T", nt), Err(Error::Validation { .. })));
    Ok(())
}

#[test]
fn canonicalize_equal_length_split() -> Result<(), Report> {
    let codes = MutationCode::canonicalize_multi(28881, "GGG>AAC")?;
    assert_eq!(to_strings(&codes), ["G28881A", "G28882A", "G28883C"]);

    let codes = MutationCode::canonicalize_multi(241, "C>T")?;
    assert_eq!(to_strings(&codes), ["C241T"]);
    Ok(())
}

#[test]
fn canonicalize_deletion_run() -> Result<(), Report> {
    let codes = MutationCode::canonicalize_multi(29734, "--")?;
    assert_eq!(to_strings(&codes), ["29734-", "29734-"]);
    Ok(())
}

#[test]
fn canonicalize_skips_unsupported() -> Result<(), Report> {
    assert!(MutationCode::canonicalize_multi(100, "G>AAC")?.is_empty());
    assert!(MutationCode::canonicalize_multi(100, "GA")?.is_empty());
    assert!(MutationCode::canonicalize_multi(100, "G>A>C")?.is_empty());
    assert!(MutationCode::canonicalize_multi(100, "")?.is_empty());
    Ok(())
}

#[test]
fn canonicalize_invalid_symbol() {
    let result = MutationCode::canonicalize_multi(100, "G>X");
    assert!(matches!(result, Err(Error::Validation { .. })));
}

#[test]
fn validate_batch() {
    let inputs = ["C241T", "bogus", "3037t", "C0T"];
    let (valid, errors) = MutationCode::validate_all(inputs, MutationType::Nucleotide);
    assert_eq!(to_strings(&valid), ["C241T", "3037T"]);
    assert_eq!(errors.len(), 2);
}

#[test]
fn order_by_position() -> Result<(), Report> {
    let mut codes = ["T5A", "C241T", "3037-", "A10G"]
        .into_iter()
        .map(|s| s.parse::<MutationCode>())
        .collect::<Result<Vec<_>, _>>()?;
    codes.sort();
    assert_eq!(to_strings(&codes), ["T5A", "A10G", "C241T", "3037-"]);
    Ok(())
}

#[test]
fn coverage_alphabet_within_symbols() {
    for kind in MutationType::iter() {
        let coverage = kind.coverage_symbols();
        assert!(coverage.iter().all(|s| kind.contains(*s)), "{kind}");
        assert!(!coverage.contains(&'-'), "{kind}");
    }
    assert_eq!(MutationType::Nucleotide.coverage_symbols().len(), 4);
    assert_eq!(MutationType::AminoAcid.coverage_symbols().len(), 20);
}
