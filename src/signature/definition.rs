//! Lineage definitions: curated YAML files and database-derived signatures.

use crate::mutation::{MutationCode, MutationType};
use crate::signature::{SignatureVariant, VariantSource};

use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Curated lineage definitions published by the cowwid project.
pub const DEFAULT_DEFINITIONS_REPO: &str = "cbg-ethz/cowwid";
pub const DEFAULT_DEFINITIONS_BRANCH: &str = "master";
pub const DEFAULT_DEFINITIONS_PATH: &str = "voc";
/// Public CovSpectrum LAPIS instance queried for database-derived signatures.
pub const DEFAULT_COVSPECTRUM_URL: &str = "https://lapis.cov-spectrum.org";
/// Default proportion of sequences that must carry a derived signature mutation.
pub const DEFAULT_MIN_PROPORTION: f64 = 0.8;

// ----------------------------------------------------------------------------
// Lineage Definition
// ----------------------------------------------------------------------------

/// Names of a curated lineage.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct LineageInfo {
    pub short: String,
    pub pangolin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nextstrain: Option<String>,
}

/// A curated lineage definition, as stored in YAML.
///
/// ```rust
/// use indoc::indoc;
/// use vasco::signature::LineageDefinition;
///
/// let yaml = indoc! {"
///     variant:
///       short: dl
///       pangolin: B.1.617.2
///       nextstrain: 21A
///     mut:
///       210: G>T
///       28881: GGG>AAC
///       29734: '--'
/// "};
/// let definition = LineageDefinition::from_yaml(yaml)?;
/// let variant = definition.to_variant()?;
/// assert_eq!(variant.name, "B.1.617.2");
/// assert_eq!(variant.len(), 5);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct LineageDefinition {
    pub variant: LineageInfo,
    /// Position (1-based) to `REF>ALT` change.
    #[serde(rename = "mut", deserialize_with = "deserialize_positions")]
    pub mutations: BTreeMap<usize, String>,
}

/// Accept both integer and quoted integer positions.
fn deserialize_positions<'de, D>(deserializer: D) -> Result<BTreeMap<usize, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: HashMap<serde_yaml::Value, serde_yaml::Value> = HashMap::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            let position = match &key {
                serde_yaml::Value::Number(n) => n.as_u64().map(|n| n as usize),
                serde_yaml::Value::String(s) => s.trim().parse::<usize>().ok(),
                _ => None,
            }
            .ok_or_else(|| de::Error::custom(format!("invalid mutation position: {key:?}")))?;
            let change = match value {
                serde_yaml::Value::String(s) => s,
                other => return Err(de::Error::custom(format!("invalid change at position {position}: {other:?}"))),
            };
            Ok((position, change))
        })
        .collect()
}

impl LineageDefinition {
    pub fn from_yaml(text: &str) -> Result<Self, Report> {
        serde_yaml::from_str(text).wrap_err("Failed to parse lineage definition YAML.")
    }

    /// Read a lineage definition from a YAML file.
    pub fn read<P>(path: &P) -> Result<Self, Report>
    where
        P: AsRef<Path> + Debug,
    {
        let text = std::fs::read_to_string(path).wrap_err(format!("Failed to read file: {path:?}"))?;
        LineageDefinition::from_yaml(&text).wrap_err(format!("Failed to parse lineage definition: {path:?}"))
    }

    /// Read every `.yaml`/`.yml` definition in a directory, sorted by file name.
    ///
    /// Files that fail to parse are skipped with a warning.
    pub fn read_dir<P>(dir: &P) -> Result<Vec<Self>, Report>
    where
        P: AsRef<Path> + Debug,
    {
        let paths = std::fs::read_dir(dir)
            .wrap_err(format!("Failed to read directory: {dir:?}"))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "yaml" || ext == "yml"))
            .sorted()
            .collect::<Vec<PathBuf>>();

        if paths.is_empty() {
            return Err(eyre!("No lineage definitions found in: {dir:?}")
                .suggestion("Lineage definitions must have the extension .yaml or .yml"));
        }

        let definitions = paths
            .iter()
            .filter_map(|path| match LineageDefinition::read(path) {
                Ok(definition) => Some(definition),
                Err(e) => {
                    warn!("Skipping lineage definition {path:?}: {e}");
                    None
                }
            })
            .collect_vec();
        info!("Loaded {} lineage definitions from {dir:?}", definitions.len());
        Ok(definitions)
    }

    /// Expand the position map into canonical nucleotide mutations.
    pub fn codes(&self) -> Result<Vec<MutationCode>, Report> {
        let mut codes = Vec::new();
        for (position, change) in &self.mutations {
            let expanded = MutationCode::canonicalize_multi(*position, change)
                .wrap_err(format!("Invalid mutation in lineage {}", self.variant.pangolin))?;
            codes.extend(expanded);
        }
        Ok(codes)
    }

    /// Convert to a [`VariantSource::Curated`] [`SignatureVariant`] named by its pangolin lineage.
    pub fn to_variant(&self) -> Result<SignatureVariant, Report> {
        let mut variant = SignatureVariant::new(&self.variant.pangolin, VariantSource::Curated, self.codes()?);
        variant.short = Some(self.variant.short.clone());
        variant.nextstrain = self.variant.nextstrain.clone();
        Ok(variant)
    }
}

// ----------------------------------------------------------------------------
// Remote Definitions
// ----------------------------------------------------------------------------

/// A GitHub directory of lineage definition YAML files.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GithubSource {
    /// Repository as `owner/name`.
    pub repo: String,
    pub branch: String,
    pub path: String,
}

impl Default for GithubSource {
    fn default() -> Self {
        GithubSource::new()
    }
}

impl GithubSource {
    pub fn new() -> Self {
        GithubSource {
            repo: DEFAULT_DEFINITIONS_REPO.to_string(),
            branch: DEFAULT_DEFINITIONS_BRANCH.to_string(),
            path: DEFAULT_DEFINITIONS_PATH.to_string(),
        }
    }

    /// Parse a browser url such as `https://github.com/cbg-ethz/cowwid/tree/master/voc`.
    ///
    /// Missing branch or path components keep their defaults.
    ///
    /// ```rust
    /// use vasco::signature::definition::GithubSource;
    ///
    /// let source = GithubSource::from_url("https://github.com/owner/repo/tree/main/defs/voc")?;
    /// assert_eq!(source.repo, "owner/repo");
    /// assert_eq!(source.branch, "main");
    /// assert_eq!(source.path, "defs/voc");
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn from_url(url: &str) -> Result<Self, Report> {
        let (_, rest) = url
            .split_once("github.com/")
            .ok_or_else(|| eyre!("Not a GitHub url: {url:?}"))
            .suggestion("Expected a url like https://github.com/cbg-ethz/cowwid/tree/master/voc")?;
        let parts = rest.trim_end_matches('/').split('/').collect_vec();
        let mut source = GithubSource::new();
        match parts.as_slice() {
            [owner, repo, kind, branch, path @ ..] if *kind == "tree" || *kind == "blob" => {
                source.repo = format!("{owner}/{repo}");
                source.branch = branch.to_string();
                if !path.is_empty() {
                    source.path = path.join("/");
                }
            }
            [owner, repo, ..] => source.repo = format!("{owner}/{repo}"),
            _ => return Err(eyre!("GitHub url is missing the owner or repository: {url:?}")),
        }
        Ok(source)
    }

    pub fn raw_url(&self, file_name: &str) -> String {
        format!("https://raw.githubusercontent.com/{}/{}/{}/{file_name}", self.repo, self.branch, self.path)
    }

    /// List the YAML file names in the source directory.
    #[cfg(feature = "http")]
    pub async fn list(&self) -> Result<Vec<String>, Report> {
        use reqwest::header::USER_AGENT;

        let url = format!("https://api.github.com/repos/{}/contents/{}", self.repo, self.path);
        let user_agent = format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        info!("Listing lineage definitions: {url}");

        let response = reqwest::Client::new()
            .get(&url)
            .query(&[("ref", &self.branch)])
            .header(USER_AGENT, &user_agent)
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(eyre!("GitHub query had status code {}: {url}", response.status())
                .suggestion("The GitHub API rate limit may have been exceeded."));
        }

        #[derive(Deserialize)]
        struct Entry {
            name: String,
        }
        let entries: Vec<Entry> = response.json().await?;
        let names = entries
            .into_iter()
            .map(|e| e.name)
            .filter(|n| n.ends_with(".yaml") || n.ends_with(".yml"))
            .collect_vec();
        debug!("Found {} lineage definitions.", names.len());
        Ok(names)
    }

    /// Download and parse one definition file.
    #[cfg(feature = "http")]
    pub async fn fetch(&self, file_name: &str) -> Result<LineageDefinition, Report> {
        let url = self.raw_url(file_name);
        let text = crate::utils::fetch_text(&url).await?;
        LineageDefinition::from_yaml(&text).wrap_err(format!("Failed to parse lineage definition: {url}"))
    }

    /// Download every definition in the directory, skipping those that fail.
    #[cfg(feature = "http")]
    pub async fn fetch_all(&self) -> Result<Vec<LineageDefinition>, Report> {
        let mut definitions = Vec::new();
        for file_name in self.list().await? {
            match self.fetch(&file_name).await {
                Ok(definition) => definitions.push(definition),
                Err(e) => warn!("Skipping lineage definition {file_name}: {e}"),
            }
        }
        Ok(definitions)
    }
}

// ----------------------------------------------------------------------------
// Database-Derived Signatures
// ----------------------------------------------------------------------------

/// One entry of a sequence database mutation query.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MutationProportion {
    pub mutation: String,
    pub proportion: f64,
    #[serde(default)]
    pub count: Option<u64>,
}

#[cfg(feature = "http")]
#[derive(Deserialize)]
struct MutationResponse {
    #[serde(default)]
    data: Vec<MutationProportion>,
}

/// Query for the mutations found in a fraction of the sequences matching a lineage query.
#[derive(Clone, Debug, PartialEq)]
pub struct DerivedQuery {
    /// CovSpectrum variant query (ex. `B.1.617.2*`).
    pub variant_query: String,
    pub kind: MutationType,
    /// Minimal proportion of sequences carrying a mutation, in `[0, 1]`.
    pub min_proportion: f64,
}

impl DerivedQuery {
    pub fn endpoint(&self, base_url: &str) -> String {
        let endpoint = match self.kind {
            MutationType::Nucleotide => "nucleotideMutations",
            MutationType::AminoAcid => "aminoAcidMutations",
        };
        format!("{}/open/v2/sample/{endpoint}", base_url.trim_end_matches('/'))
    }

    /// Query string parameters, unencoded.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("variantQuery", self.variant_query.clone()),
            ("minProportion", self.min_proportion.to_string()),
            ("limit", "1000".to_string()),
            ("downloadAsFile", "false".to_string()),
        ]
    }

    /// Full request url, with the parameters percent-encoded.
    #[cfg(feature = "http")]
    pub fn url(&self, base_url: &str) -> Result<reqwest::Url, Report> {
        let endpoint = self.endpoint(base_url);
        reqwest::Url::parse_with_params(&endpoint, self.params())
            .wrap_err(format!("Invalid CovSpectrum url: {endpoint}"))
    }

    /// Convert query results into a [`VariantSource::CustomDerived`] variant.
    ///
    /// Mutations that do not parse are skipped with a warning.
    pub fn to_variant(&self, name: &str, results: &[MutationProportion]) -> SignatureVariant {
        let codes = results.iter().filter_map(|r| match MutationCode::normalize(&r.mutation, self.kind) {
            Ok(code) => Some(code),
            Err(e) => {
                warn!("Skipping derived mutation for {name}: {e}");
                None
            }
        });
        SignatureVariant::new(name, VariantSource::CustomDerived, codes)
    }

    /// Run the query against a CovSpectrum instance.
    #[cfg(feature = "http")]
    pub async fn fetch(&self, base_url: &str) -> Result<Vec<MutationProportion>, Report> {
        let url = self.url(base_url)?;
        debug!("Querying derived mutations: {url}");
        let text = crate::utils::fetch_text(url.as_str()).await?;
        let response: MutationResponse =
            serde_json::from_str(&text).wrap_err(format!("Unexpected response from: {url}"))?;
        Ok(response.data)
    }
}
