//! The metadata sidecar (`meta.json`) of a dzip archive

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::result::*;

/// Value labels of one column: raw value → display label
pub type ValueLabels = IndexMap<String, String>;

/// Anything exposing the four dzip metadata fields.
///
/// This is what [`Metadata::from_config()`] adapts,
/// e.g. the metadata of a decoded SPSS file.
pub trait MetadataContainer {
    fn variable_value_labels(&self) -> &IndexMap<String, ValueLabels>;
    fn column_names_to_labels(&self) -> &IndexMap<String, String>;
    fn number_rows(&self) -> u64;
    fn number_columns(&self) -> u64;
}

/// The two shapes [`Metadata::from_config()`] accepts.
pub enum MetadataConfig<'a> {
    /// A JSON object keyed by the four field names
    Mapping(&'a Value),
    /// Something implementing the four-field interface
    Container(&'a dyn MetadataContainer),
}

impl<'a> From<&'a Value> for MetadataConfig<'a> {
    fn from(value: &'a Value) -> Self {
        MetadataConfig::Mapping(value)
    }
}

impl<'a, C: MetadataContainer> From<&'a C> for MetadataConfig<'a> {
    fn from(container: &'a C) -> Self {
        MetadataConfig::Container(container)
    }
}

/// Labels and declared shape of a dzip dataset.
///
/// `number_rows` and `number_columns` are whatever the producer declared;
/// they're never checked against the CSV payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    pub variable_value_labels: IndexMap<String, ValueLabels>,
    #[serde(deserialize_with = "null_labels_as_empty")]
    pub column_names_to_labels: IndexMap<String, String>,
    pub number_rows: u64,
    pub number_columns: u64,
}

/// pyreadstat writes `null` for columns without a label.
fn null_labels_as_empty<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let labels = IndexMap::<String, Option<String>>::deserialize(deserializer)?;
    Ok(labels
        .into_iter()
        .map(|(column, label)| (column, label.unwrap_or_default()))
        .collect())
}

impl Metadata {
    /// Builds metadata from a JSON mapping or from any [`MetadataContainer`].
    ///
    /// ```
    /// # use dzip::Metadata;
    /// let config = serde_json::json!({
    ///     "variable_value_labels": {"Col_A": {"a_1": "A"}},
    ///     "column_names_to_labels": {"Col_A": "a"},
    ///     "number_rows": 2,
    ///     "number_columns": 1,
    /// });
    /// let meta = Metadata::from_config(&config)?;
    /// assert_eq!(meta.shape(), (2, 1));
    /// # Ok::<(), dzip::result::DzipError>(())
    /// ```
    pub fn from_config<'a, C: Into<MetadataConfig<'a>>>(config: C) -> DzipResult<Self> {
        match config.into() {
            MetadataConfig::Mapping(value) => {
                if !value.is_object() {
                    return Err(DzipError::InvalidConfig(json_kind(value).to_owned()));
                }
                Ok(Metadata::deserialize(value)?)
            }
            MetadataConfig::Container(container) => Ok(Metadata {
                variable_value_labels: container.variable_value_labels().clone(),
                column_names_to_labels: container.column_names_to_labels().clone(),
                number_rows: container.number_rows(),
                number_columns: container.number_columns(),
            }),
        }
    }

    /// `(number_rows, number_columns)`, as declared
    pub fn shape(&self) -> (u64, u64) {
        (self.number_rows, self.number_columns)
    }

    /// The column names, in the order of `column_names_to_labels`.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.column_names_to_labels.keys().map(String::as_str)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl MetadataContainer for Metadata {
    fn variable_value_labels(&self) -> &IndexMap<String, ValueLabels> {
        &self.variable_value_labels
    }

    fn column_names_to_labels(&self) -> &IndexMap<String, String> {
        &self.column_names_to_labels
    }

    fn number_rows(&self) -> u64 {
        self.number_rows
    }

    fn number_columns(&self) -> u64 {
        self.number_columns
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Metadata object with dzip object metadata.")
    }
}
