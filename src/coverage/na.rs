use color_eyre::eyre::{Report, Result, WrapErr};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Text of a missing value.
pub const NA: &str = "NA";

/// A value that is not available (`NA`) when it is undefined, such as a frequency without coverage.
///
/// Serializes as the value itself, or the string `"NA"`.
///
/// ```rust
/// use vasco::coverage::MaybeNa;
///
/// let frequency: MaybeNa<f64> = "NA".parse()?;
/// assert!(frequency.is_na());
/// assert_eq!(serde_json::to_string(&MaybeNa::Value(0.25))?, "0.25");
/// assert_eq!(serde_json::to_string(&MaybeNa::<f64>::Na)?, "\"NA\"");
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum MaybeNa<T> {
    Value(T),
    #[default]
    Na,
}

impl<T> MaybeNa<T> {
    pub fn is_na(&self) -> bool {
        matches!(self, MaybeNa::Na)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            MaybeNa::Value(value) => Some(value),
            MaybeNa::Na => None,
        }
    }
}

impl<T: Copy> MaybeNa<T> {
    pub fn unwrap_or(&self, default: T) -> T {
        match self {
            MaybeNa::Value(value) => *value,
            MaybeNa::Na => default,
        }
    }
}

impl<T> From<Option<T>> for MaybeNa<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => MaybeNa::Value(value),
            None => MaybeNa::Na,
        }
    }
}

impl<T: Display> Display for MaybeNa<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MaybeNa::Value(value) => write!(f, "{value}"),
            MaybeNa::Na => write!(f, "{NA}"),
        }
    }
}

impl<T> FromStr for MaybeNa<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    type Err = Report;

    fn from_str(s: &str) -> Result<Self, Report> {
        match s.trim() {
            NA | "" => Ok(MaybeNa::Na),
            value => Ok(MaybeNa::Value(value.parse::<T>().wrap_err(format!("Invalid value: {value:?}"))?)),
        }
    }
}

impl<T: Serialize> Serialize for MaybeNa<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            MaybeNa::Value(value) => value.serialize(serializer),
            MaybeNa::Na => serializer.serialize_str(NA),
        }
    }
}

impl<'de, T> Deserialize<'de> for MaybeNa<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr<T> {
            Value(T),
            Text(String),
            Null(Option<()>),
        }

        match Repr::<T>::deserialize(deserializer)? {
            Repr::Value(value) => Ok(MaybeNa::Value(value)),
            Repr::Text(text) if text == NA => Ok(MaybeNa::Na),
            Repr::Text(text) => Err(serde::de::Error::custom(format!("expected a value or \"{NA}\", found {text:?}"))),
            Repr::Null(_) => Ok(MaybeNa::Na),
        }
    }
}
