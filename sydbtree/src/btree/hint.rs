//! File hints
//!
//! A file hint is a free format string of `key=value` elements separated by `,` or `;`, for
//! example `NodeKeyDivideRate=70, NodeMergeCheckRate='20'`. Keys are case insensitive, values
//! may be quoted, and elements this layer doesn't know are ignored.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use super::BtreeError;

/// Hints understood by the B-tree layer.
#[derive(Clone, Copy, Debug, Display, EnumIter, EnumString, PartialEq, Eq, Hash)]
#[strum(ascii_case_insensitive)]
pub enum HintKey {
    /// Where a full node is split, as a percentage of its keys
    NodeKeyDivideRate,
    /// Fill rate, in percent, under which a node is checked for merging
    NodeMergeCheckRate,
    /// Combined fill rate, in percent, under which a merge is executed
    NodeMergeExecuteRate,
}

impl HintKey {
    /// Rate used when the hint is absent.
    pub fn default_rate(self) -> u32 {
        match self {
            HintKey::NodeKeyDivideRate => 50,
            HintKey::NodeMergeCheckRate => 25,
            HintKey::NodeMergeExecuteRate => 100,
        }
    }
}

/// The `key=value` elements of a hint string.
#[derive(Debug, Default)]
pub struct HintArray<'a> {
    elements: Vec<(&'a str, &'a str)>,
}

impl<'a> HintArray<'a> {
    /// Split a hint string into elements.
    pub fn parse(hint: &'a str) -> Self {
        let mut elements = vec![];
        let mut start = 0;
        let mut quote = None;
        for (pos, c) in hint.char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => (),
                (None, '\'' | '"') => quote = Some(c),
                (None, ',' | ';') => {
                    Self::push(&mut elements, &hint[start..pos]);
                    start = pos + 1;
                }
                (None, _) => (),
            }
        }
        Self::push(&mut elements, &hint[start..]);
        Self { elements }
    }

    fn push(elements: &mut Vec<(&'a str, &'a str)>, element: &'a str) {
        let element = element.trim();
        if element.is_empty() {
            return;
        }
        let (key, value) = element.split_once('=').unwrap_or((element, ""));
        elements.push((key.trim(), unquote(value.trim())));
    }

    /// Value of the first element named `key`, ignoring case.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.elements
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| *v)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Are there no elements?
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

fn unquote(value: &str) -> &str {
    for q in ['\'', '"'] {
        if let Some(inner) = value.strip_prefix(q).and_then(|v| v.strip_suffix(q)) {
            return inner;
        }
    }
    value
}

/// Node split and merge rates, in percent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHint {
    /// Split point of a full node
    pub node_key_divide_rate: u32,
    /// Merge check threshold
    pub node_merge_check_rate: u32,
    /// Merge execute threshold
    pub node_merge_execute_rate: u32,
}

impl Default for FileHint {
    fn default() -> Self {
        Self {
            node_key_divide_rate: HintKey::NodeKeyDivideRate.default_rate(),
            node_merge_check_rate: HintKey::NodeMergeCheckRate.default_rate(),
            node_merge_execute_rate: HintKey::NodeMergeExecuteRate.default_rate(),
        }
    }
}

impl FileHint {
    /// Read the rates from a hint string. Every rate must be an integer in `[0, 100]`.
    pub fn parse(hint: &str) -> Result<Self, BtreeError> {
        let array = HintArray::parse(hint);
        let mut file_hint = FileHint::default();
        for key in HintKey::iter() {
            let Some(value) = array.get(&key.to_string()) else {
                continue;
            };
            let rate = value
                .parse::<i64>()
                .ok()
                .filter(|rate| (0..=100).contains(rate))
                .ok_or_else(|| {
                    BtreeError::bad_argument(format!("illegal {key} (= {value:?})"))
                })? as u32;
            match key {
                HintKey::NodeKeyDivideRate => file_hint.node_key_divide_rate = rate,
                HintKey::NodeMergeCheckRate => file_hint.node_merge_check_rate = rate,
                HintKey::NodeMergeExecuteRate => file_hint.node_merge_execute_rate = rate,
            }
        }
        Ok(file_hint)
    }

    /// Key count under which a node is checked for merging, for a node of `key_per_node` keys.
    pub fn merge_check_threshold(&self, key_per_node: u32) -> u32 {
        Self::threshold(key_per_node, self.node_merge_check_rate)
    }

    /// Key count under which a merge is executed, for a node of `key_per_node` keys.
    pub fn merge_execute_threshold(&self, key_per_node: u32) -> u32 {
        Self::threshold(key_per_node, self.node_merge_execute_rate)
    }

    fn threshold(key_per_node: u32, rate: u32) -> u32 {
        (f64::from(key_per_node) / 100.0 * f64::from(rate)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_splits_elements() {
        let array = HintArray::parse(" a=1; B = 'x,y' ,c=\"q\",, flag ");
        assert_eq!(array.len(), 4);
        assert_eq!(array.get("A"), Some("1"));
        assert_eq!(array.get("b"), Some("x,y"));
        assert_eq!(array.get("c"), Some("q"));
        assert_eq!(array.get("flag"), Some(""));
        assert_eq!(array.get("missing"), None);
        assert!(HintArray::parse("").is_empty());
    }

    #[test]
    fn it_defaults_rates() {
        let hint = FileHint::parse("").expect("empty hint is fine");
        assert_eq!(hint, FileHint::default());
        assert_eq!(hint.node_key_divide_rate, 50);
        assert_eq!(hint.node_merge_check_rate, 25);
        assert_eq!(hint.node_merge_execute_rate, 100);
    }

    #[test]
    fn it_reads_rates() {
        let hint = FileHint::parse("nodekeydividerate=70;NodeMergeCheckRate='0', Other=abc")
            .expect("valid hint");
        assert_eq!(hint.node_key_divide_rate, 70);
        assert_eq!(hint.node_merge_check_rate, 0);
        assert_eq!(hint.node_merge_execute_rate, 100);
    }

    #[test]
    fn it_rejects_bad_rates() {
        for hint in [
            "NodeKeyDivideRate=101",
            "NodeMergeCheckRate=-1",
            "NodeMergeExecuteRate=lots",
        ] {
            assert!(
                matches!(FileHint::parse(hint), Err(BtreeError::BadArgument(_))),
                "{hint}"
            );
        }
    }

    #[test]
    fn it_scales_thresholds() {
        let hint = FileHint::default();
        assert_eq!(hint.merge_check_threshold(40), 10);
        assert_eq!(hint.merge_execute_threshold(40), 40);
        assert_eq!(hint.merge_check_threshold(2), 0);
    }
}
