//! Option values
//!
//! Integer codes of the enumerated values held in FileID and OpenOption stores.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// An enumerated option persisted as an integer code.
pub trait OptionCode: Sized + Copy {
    /// The persisted code.
    fn code(self) -> i32;

    /// Decode a persisted code.
    fn from_code(code: i32) -> Option<Self>;
}

macro_rules! option_codes {
    ($ty:ident { $( $variant:ident = $code:literal ),* $(,)? }) => {
        impl OptionCode for $ty {
            fn code(self) -> i32 {
                match self {
                    $( $ty::$variant => $code, )*
                }
            }

            fn from_code(code: i32) -> Option<Self> {
                match code {
                    $( $code => Some($ty::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

/// Key uniqueness of a file.
#[derive(Clone, Copy, Debug, Default, Display, EnumString, PartialEq, Eq, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum UniqueType {
    /// Duplicate keys allowed
    #[default]
    NotUnique,
    /// Unique by object
    Object,
    /// Unique by key fields
    Key,
}

// NotUnique is never persisted: it is what an absent `Unique` means
impl OptionCode for UniqueType {
    fn code(self) -> i32 {
        match self {
            UniqueType::NotUnique => 0,
            UniqueType::Object => 1,
            UniqueType::Key => 2,
        }
    }

    fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(UniqueType::Object),
            2 => Some(UniqueType::Key),
            _ => None,
        }
    }
}

/// Sort order of a key field.
#[derive(Clone, Copy, Debug, Default, Display, EnumString, PartialEq, Eq, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum SortOrder {
    /// Ascending
    #[default]
    Ascending,
    /// Descending
    Descending,
}

impl SortOrder {
    /// Factor applied to a field comparison result.
    pub fn multiplier(self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

/// How a file is opened.
#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum OpenMode {
    /// Sequential read
    Read,
    /// Search
    Search,
    /// Insert, update and expunge
    Update,
    /// Create
    Initialize,
    /// Bulk update, handled as Update
    Batch,
}

option_codes!(OpenMode {
    Read = 1,
    Search = 2,
    Update = 3,
    Initialize = 4,
    Batch = 5,
});

/// Comparison operator of a search condition.
#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum CompareOperator {
    /// `=`
    Equals,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEquals,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEquals,
    /// `IS NULL`
    EqualsToNull,
    /// `LIKE`
    Like,
}

option_codes!(CompareOperator {
    Equals = 0,
    GreaterThan = 1,
    GreaterThanEquals = 2,
    LessThan = 3,
    LessThanEquals = 4,
    EqualsToNull = 5,
    Like = 6,
});

/// What a scan is ordered by.
#[derive(Clone, Copy, Debug, Default, Display, EnumString, PartialEq, Eq, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum SortKey {
    /// Key field values
    #[default]
    KeyField,
    /// Object id
    #[strum(serialize = "ObjectID")]
    ObjectId,
}

option_codes!(SortKey {
    KeyField = 0,
    ObjectId = 1,
});

/// Access pattern of an open file.
#[derive(Clone, Copy, Debug, Default, Display, EnumString, PartialEq, Eq, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum ReadSubMode {
    /// Ordered range scan
    #[default]
    Scan,
    /// Point lookups by fetch field values
    Fetch,
}

option_codes!(ReadSubMode { Scan = 0, Fetch = 1 });

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_round_trips_codes() {
        for code in 1..=5 {
            let mode = OpenMode::from_code(code).expect("known mode");
            assert_eq!(mode.code(), code);
        }
        for code in 0..=6 {
            let ope = CompareOperator::from_code(code).expect("known operator");
            assert_eq!(ope.code(), code);
        }
        assert_eq!(OpenMode::from_code(0), None);
        assert_eq!(CompareOperator::from_code(7), None);
        assert_eq!(SortKey::from_code(1), Some(SortKey::ObjectId));
        assert_eq!(ReadSubMode::from_code(2), None);
    }

    #[test]
    fn it_has_no_code_for_not_unique() {
        assert_eq!(UniqueType::from_code(0), None);
        assert_eq!(UniqueType::from_code(1), Some(UniqueType::Object));
        assert_eq!(UniqueType::from_code(2), Some(UniqueType::Key));
        assert_eq!(UniqueType::Object.code(), 1);
        assert_eq!(UniqueType::Key.code(), 2);
    }

    #[test]
    fn it_multiplies_by_order() {
        assert_eq!(SortOrder::Ascending.multiplier(), 1);
        assert_eq!(SortOrder::Descending.multiplier(), -1);
    }
}
