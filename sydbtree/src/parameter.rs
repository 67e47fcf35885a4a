//! Parameter stores
//!
//! Both the persisted layout description of a file (the "FileID") and a per-open request (the
//! "OpenOption") are flat stores of typed values. Keys are either plain (`FieldNumber`) or
//! indexed (`FieldType[3]`). The textual form of a key is the on-disk and tooling contract, so
//! [`ParameterKey`] round trips through `Display` and `FromStr`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameter store errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    /// A key name that isn't known, or an index where none is allowed (or vice versa)
    #[error("unknown parameter key: {0}")]
    UnknownKey(String),
}

macro_rules! parameter_keys {
    (
        plain { $( $(#[$pmeta:meta])* $plain:ident => $pname:literal, )* }
        indexed { $( $(#[$imeta:meta])* $indexed:ident => $iname:literal, )* }
    ) => {
        /// A typed key into a [`Parameters`] store.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum ParameterKey {
            $( $(#[$pmeta])* $plain, )*
            $( $(#[$imeta])* $indexed(usize), )*
        }

        impl ParameterKey {
            /// The key name, without any index.
            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$plain => $pname, )*
                    $( Self::$indexed(_) => $iname, )*
                }
            }

            /// The index of an indexed key.
            pub fn index(&self) -> Option<usize> {
                match self {
                    $( Self::$plain => None, )*
                    $( Self::$indexed(i) => Some(*i), )*
                }
            }

            fn from_parts(name: &str, index: Option<usize>) -> Option<Self> {
                match (name, index) {
                    $( ($pname, None) => Some(Self::$plain), )*
                    $( ($iname, Some(i)) => Some(Self::$indexed(i)), )*
                    _ => None,
                }
            }
        }
    };
}

parameter_keys! {
    plain {
        /// Physical page size, in KB
        PageSize => "PageSize",
        /// Temporary file
        Temporary => "Temporary",
        /// Read only file
        ReadOnly => "ReadOnly",
        /// File is mounted
        Mounted => "Mounted",
        /// Uniqueness of keys
        Unique => "Unique",
        /// Number of fields, including the object id field
        FieldNumber => "FieldNumber",
        /// Number of key fields
        KeyFieldNumber => "KeyFieldNumber",
        /// Fan-out of a node
        KeyObjectPerNode => "KeyObjectPerNode",
        /// Free format hint string
        FileHint => "FileHint",
        /// Database identity
        DatabaseId => "DatabaseID",
        /// Table identity
        TableId => "TableID",
        /// File object identity
        FileObjectId => "FileObjectID",
        /// Layout version
        Version => "Version",
        /// Open mode
        OpenMode => "OpenMode",
        /// Only estimate the result
        Estimate => "Estimate",
        /// Return results as a bit set
        GetByBitSet => "GetByBitSet",
        /// A projection follows
        FieldSelect => "FieldSelect",
        /// Number of projected fields
        TargetFieldNumber => "TargetFieldNumber",
        /// Number of search conditions
        SearchFieldNumber => "SearchFieldNumber",
        /// Escape character for like conditions
        Escape => "Escape",
        /// Sort by key fields or by object id
        SortKey => "SortKey",
        /// Reverse the sort order
        SortReverse => "SortReverse",
        /// Scan or fetch
        ReadSubMode => "ReadSubMode",
        /// Number of fetch fields
        FetchFieldNumber => "FetchFieldNumber",
    }
    indexed {
        /// Storage directory
        Area => "Area",
        /// Data type code of a field
        FieldType => "FieldType",
        /// Maximum length of a variable field, or element count of an array field
        FieldLength => "FieldLength",
        /// Data type code of array elements
        ElementType => "ElementType",
        /// Maximum length of a variable array element
        ElementLength => "ElementLength",
        /// Key field sorted descending
        FieldSortOrder => "FieldSortOrder",
        /// Projected field index
        TargetFieldIndex => "TargetFieldIndex",
        /// Field index of a search condition
        SearchFieldIndex => "SearchFieldIndex",
        /// Start operator code of a search condition
        SearchStartOperator => "SearchStartOperator",
        /// Start literal of a search condition
        SearchStart => "SearchStart",
        /// Stop operator code of a search condition
        SearchStopOperator => "SearchStopOperator",
        /// Stop literal of a search condition
        SearchStop => "SearchStop",
        /// Fetch field index
        FetchFieldIndex => "FetchFieldIndex",
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(i) => write!(f, "{}[{}]", self.name(), i),
            None => write!(f, "{}", self.name()),
        }
    }
}

impl FromStr for ParameterKey {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, index) = match s.split_once('[') {
            Some((name, rest)) => {
                let index = rest
                    .strip_suffix(']')
                    .and_then(|i| i.trim().parse::<usize>().ok())
                    .ok_or_else(|| ParameterError::UnknownKey(s.to_string()))?;
                (name.trim(), Some(index))
            }
            None => (s, None),
        };
        ParameterKey::from_parts(name, index)
            .ok_or_else(|| ParameterError::UnknownKey(s.to_string()))
    }
}

/// A value held in a [`Parameters`] store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    /// Integer
    Integer(i32),
    /// Boolean
    Boolean(bool),
    /// String
    String(String),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Integer(v) => write!(f, "{v}"),
            ParameterValue::Boolean(v) => write!(f, "{v}"),
            ParameterValue::String(v) => write!(f, "{v:?}"),
        }
    }
}

/// A flat key/value store of typed parameters.
///
/// Getters return `None` when a key is absent or holds a value of another type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<String, ParameterValue>",
    try_from = "BTreeMap<String, ParameterValue>"
)]
pub struct Parameters {
    values: BTreeMap<ParameterKey, ParameterValue>,
}

/// Persisted description of a B-tree file.
pub type FileId = Parameters;

/// Options of a single open request.
pub type OpenOption = Parameters;

impl Parameters {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an integer.
    pub fn get_integer(&self, key: ParameterKey) -> Option<i32> {
        match self.values.get(&key) {
            Some(ParameterValue::Integer(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get a boolean.
    pub fn get_boolean(&self, key: ParameterKey) -> Option<bool> {
        match self.values.get(&key) {
            Some(ParameterValue::Boolean(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get a string.
    pub fn get_string(&self, key: ParameterKey) -> Option<&str> {
        match self.values.get(&key) {
            Some(ParameterValue::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Get whatever value is stored under `key`.
    pub fn get(&self, key: ParameterKey) -> Option<&ParameterValue> {
        self.values.get(&key)
    }

    /// Set an integer.
    pub fn set_integer(&mut self, key: ParameterKey, value: i32) -> &mut Self {
        self.set(key, ParameterValue::Integer(value))
    }

    /// Set a boolean.
    pub fn set_boolean(&mut self, key: ParameterKey, value: bool) -> &mut Self {
        self.set(key, ParameterValue::Boolean(value))
    }

    /// Set a string.
    pub fn set_string<S: Into<String>>(&mut self, key: ParameterKey, value: S) -> &mut Self {
        self.set(key, ParameterValue::String(value.into()))
    }

    /// Set any value.
    pub fn set(&mut self, key: ParameterKey, value: ParameterValue) -> &mut Self {
        self.values.insert(key, value);
        self
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: ParameterKey) -> Option<ParameterValue> {
        self.values.remove(&key)
    }

    /// Does the store contain `key`?
    pub fn contains(&self, key: ParameterKey) -> bool {
        self.values.contains_key(&key)
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ParameterKey, &ParameterValue)> {
        self.values.iter()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Is the store empty?
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Parameters> for BTreeMap<String, ParameterValue> {
    fn from(parameters: Parameters) -> Self {
        parameters
            .values
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

impl TryFrom<BTreeMap<String, ParameterValue>> for Parameters {
    type Error = ParameterError;

    fn try_from(map: BTreeMap<String, ParameterValue>) -> Result<Self, Self::Error> {
        let values = map
            .into_iter()
            .map(|(k, v)| Ok((k.parse::<ParameterKey>()?, v)))
            .collect::<Result<_, ParameterError>>()?;
        Ok(Self { values })
    }
}

impl FromIterator<(ParameterKey, ParameterValue)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (ParameterKey, ParameterValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_formats_keys() {
        assert_eq!(ParameterKey::FieldNumber.to_string(), "FieldNumber");
        assert_eq!(ParameterKey::FieldType(3).to_string(), "FieldType[3]");
        assert_eq!(ParameterKey::DatabaseId.to_string(), "DatabaseID");
    }

    #[test]
    fn it_parses_keys() {
        assert_eq!(
            "FieldLength[12]".parse::<ParameterKey>().expect("parses"),
            ParameterKey::FieldLength(12)
        );
        assert_eq!(
            " Mounted ".parse::<ParameterKey>().expect("parses"),
            ParameterKey::Mounted
        );
        assert!("FieldNumber[1]".parse::<ParameterKey>().is_err());
        assert!("FieldType".parse::<ParameterKey>().is_err());
        assert!("FieldType[x]".parse::<ParameterKey>().is_err());
        assert!("Bogus".parse::<ParameterKey>().is_err());
    }

    #[test]
    fn it_returns_none_for_other_types() {
        let mut params = Parameters::new();
        params.set_integer(ParameterKey::PageSize, 8);
        assert_eq!(params.get_integer(ParameterKey::PageSize), Some(8));
        assert_eq!(params.get_boolean(ParameterKey::PageSize), None);
        assert_eq!(params.get_string(ParameterKey::PageSize), None);
        assert_eq!(params.get_integer(ParameterKey::FieldNumber), None);
    }

    #[test]
    fn it_serializes_with_string_keys() {
        let mut params = Parameters::new();
        params
            .set_integer(ParameterKey::FieldType(0), 12)
            .set_string(ParameterKey::Area(0), "/data/btree");
        let json = serde_json::to_string(&params).expect("serializes");
        assert!(json.contains("\"FieldType[0]\""));
        let back: Parameters = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, params);
    }
}
