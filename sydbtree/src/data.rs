//! Field data types
//!
//! Data type codes as persisted in `FieldType[i]`/`ElementType[i]`, their archive sizes inside
//! key and value objects, and typed literals parsed from option strings.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Size of the object type tag at the head of every object.
pub const OBJECT_TYPE_ARCHIVE_SIZE: usize = 1;
/// Size of an archived page id.
pub const PAGE_ID_ARCHIVE_SIZE: usize = 4;
/// Size of an archived area id.
pub const AREA_ID_ARCHIVE_SIZE: usize = 2;
/// Size of an archived `u32`.
pub const U32_ARCHIVE_SIZE: usize = 4;
/// Size of an archived object id (page id + area id).
pub const OBJECT_ID_ARCHIVE_SIZE: usize = PAGE_ID_ARCHIVE_SIZE + AREA_ID_ARCHIVE_SIZE;
/// Size of the length prefix of a variable field stored inside its object.
pub const INSIDE_VAR_FIELD_LEN_ARCHIVE_SIZE: usize = 1;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Data errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// Unknown data type code
    #[error("unknown data type code: {0}")]
    UnknownType(i32),

    /// Literal could not be parsed as the required type
    #[error("malformed {data_type} literal: {literal:?}")]
    Malformed {
        /// Required type
        data_type: DataType,
        /// Offending literal
        literal: String,
    },

    /// No literal form for this type
    #[error("literals of type {0} are not supported")]
    NotSupported(DataType),
}

/// Field data types.
#[derive(
    Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum DataType {
    /// 32 bit signed
    Integer = 1,
    /// 32 bit unsigned
    UnsignedInteger = 2,
    /// 64 bit signed
    Integer64 = 3,
    /// 64 bit unsigned
    UnsignedInteger64 = 4,
    /// Character string
    String = 5,
    /// Single precision float
    Float = 6,
    /// Double precision float
    Double = 7,
    /// Calendar date
    Date = 8,
    /// Date and time
    DateTime = 9,
    /// Binary data
    Binary = 10,
    /// Array of elements
    Array = 11,
    /// Object id
    #[strum(serialize = "ObjectID")]
    ObjectId = 12,
    /// Decimal
    Decimal = 13,
    /// Language tag
    Language = 14,
}

impl DataType {
    /// Decode a persisted type code.
    pub fn from_code(code: i32) -> Result<Self, DataError> {
        let data_type = match code {
            1 => DataType::Integer,
            2 => DataType::UnsignedInteger,
            3 => DataType::Integer64,
            4 => DataType::UnsignedInteger64,
            5 => DataType::String,
            6 => DataType::Float,
            7 => DataType::Double,
            8 => DataType::Date,
            9 => DataType::DateTime,
            10 => DataType::Binary,
            11 => DataType::Array,
            12 => DataType::ObjectId,
            13 => DataType::Decimal,
            14 => DataType::Language,
            _ => return Err(DataError::UnknownType(code)),
        };
        Ok(data_type)
    }

    /// The persisted type code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Is the archived form of this type variable in length?
    pub fn is_variable(self) -> bool {
        matches!(
            self,
            DataType::String
                | DataType::Binary
                | DataType::Array
                | DataType::Decimal
                | DataType::Language
        )
    }

    /// Archive size of a fixed length type.
    pub fn fixed_archive_size(self) -> Option<usize> {
        match self {
            DataType::Integer | DataType::UnsignedInteger | DataType::Float | DataType::Date => {
                Some(4)
            }
            DataType::Integer64
            | DataType::UnsignedInteger64
            | DataType::Double
            | DataType::DateTime => Some(8),
            DataType::ObjectId => Some(OBJECT_ID_ARCHIVE_SIZE),
            _ => None,
        }
    }
}

/// An object id: the page holding an object and its area within the page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// Physical page
    pub page_id: u32,
    /// Area within the page
    pub area_id: u16,
}

impl ObjectId {
    /// Decode from the packed form `page_id << 16 | area_id`.
    pub fn from_packed(packed: u64) -> Option<Self> {
        if packed >> 48 != 0 {
            return None;
        }
        Some(ObjectId {
            page_id: (packed >> 16) as u32,
            area_id: (packed & 0xFFFF) as u16,
        })
    }

    /// Encode to the packed form `page_id << 16 | area_id`.
    pub fn packed(&self) -> u64 {
        (u64::from(self.page_id) << 16) | u64::from(self.area_id)
    }
}

/// A typed field literal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// SQL NULL
    Null,
    /// 32 bit signed
    Integer(i32),
    /// 32 bit unsigned
    UnsignedInteger(u32),
    /// 64 bit signed
    Integer64(i64),
    /// 64 bit unsigned
    UnsignedInteger64(u64),
    /// Character string
    String(String),
    /// Single precision float
    Float(f32),
    /// Double precision float
    Double(f64),
    /// Calendar date
    Date(NaiveDate),
    /// Date and time
    DateTime(NaiveDateTime),
    /// Object id
    ObjectId(ObjectId),
}

impl FieldValue {
    /// Parse a literal as `data_type`.
    ///
    /// Dates are `YYYY-MM-DD`, date times `YYYY-MM-DD HH:MM:SS[.fff]` and object ids are the
    /// packed decimal form.
    pub fn parse(data_type: DataType, literal: &str) -> Result<Self, DataError> {
        let malformed = || DataError::Malformed {
            data_type,
            literal: literal.to_string(),
        };
        let trimmed = literal.trim();
        let value = match data_type {
            DataType::Integer => FieldValue::Integer(trimmed.parse().map_err(|_| malformed())?),
            DataType::UnsignedInteger => {
                FieldValue::UnsignedInteger(trimmed.parse().map_err(|_| malformed())?)
            }
            DataType::Integer64 => FieldValue::Integer64(trimmed.parse().map_err(|_| malformed())?),
            DataType::UnsignedInteger64 => {
                FieldValue::UnsignedInteger64(trimmed.parse().map_err(|_| malformed())?)
            }
            DataType::String => FieldValue::String(literal.to_string()),
            DataType::Float => FieldValue::Float(trimmed.parse().map_err(|_| malformed())?),
            DataType::Double => FieldValue::Double(trimmed.parse().map_err(|_| malformed())?),
            DataType::Date => FieldValue::Date(
                NaiveDate::parse_from_str(trimmed, DATE_FORMAT).map_err(|_| malformed())?,
            ),
            DataType::DateTime => FieldValue::DateTime(
                NaiveDateTime::parse_from_str(trimmed, DATE_TIME_FORMAT)
                    .map_err(|_| malformed())?,
            ),
            DataType::ObjectId => FieldValue::ObjectId(
                trimmed
                    .parse::<u64>()
                    .ok()
                    .and_then(ObjectId::from_packed)
                    .ok_or_else(malformed)?,
            ),
            DataType::Binary | DataType::Array | DataType::Decimal | DataType::Language => {
                return Err(DataError::NotSupported(data_type))
            }
        };
        Ok(value)
    }

    /// Is this the NULL literal?
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Write the fixed length archive of this value into `buf`.
    ///
    /// Returns the number of bytes written, or `None` for NULL, variable length values, or a
    /// buffer which is too small.
    pub fn archive_fixed(&self, buf: &mut [u8]) -> Option<usize> {
        let bytes: Vec<u8> = match self {
            FieldValue::Integer(v) => v.to_be_bytes().to_vec(),
            FieldValue::UnsignedInteger(v) => v.to_be_bytes().to_vec(),
            FieldValue::Integer64(v) => v.to_be_bytes().to_vec(),
            FieldValue::UnsignedInteger64(v) => v.to_be_bytes().to_vec(),
            FieldValue::Float(v) => v.to_be_bytes().to_vec(),
            FieldValue::Double(v) => v.to_be_bytes().to_vec(),
            FieldValue::Date(d) => d.num_days_from_ce().to_be_bytes().to_vec(),
            FieldValue::DateTime(dt) => dt.and_utc().timestamp_millis().to_be_bytes().to_vec(),
            FieldValue::ObjectId(oid) => {
                let mut b = oid.page_id.to_be_bytes().to_vec();
                b.extend_from_slice(&oid.area_id.to_be_bytes());
                b
            }
            FieldValue::Null | FieldValue::String(_) => return None,
        };
        let dest = buf.get_mut(..bytes.len())?;
        dest.copy_from_slice(&bytes);
        Some(bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_decodes_type_codes() {
        for code in 1..=14 {
            let data_type = DataType::from_code(code).expect("known code");
            assert_eq!(data_type.code(), code);
        }
        assert_eq!(DataType::from_code(0), Err(DataError::UnknownType(0)));
        assert_eq!(DataType::from_code(15), Err(DataError::UnknownType(15)));
    }

    #[test]
    fn it_knows_fixed_sizes() {
        assert_eq!(DataType::Integer.fixed_archive_size(), Some(4));
        assert_eq!(DataType::DateTime.fixed_archive_size(), Some(8));
        assert_eq!(DataType::ObjectId.fixed_archive_size(), Some(6));
        assert_eq!(DataType::String.fixed_archive_size(), None);
        assert!(DataType::Array.is_variable());
        assert!(!DataType::Date.is_variable());
    }

    #[test]
    fn it_parses_names() {
        assert_eq!(
            "objectid".parse::<DataType>().expect("parses"),
            DataType::ObjectId
        );
        assert_eq!(
            "UnsignedInteger64".parse::<DataType>().expect("parses"),
            DataType::UnsignedInteger64
        );
    }

    #[test]
    fn it_parses_literals() {
        assert_eq!(
            FieldValue::parse(DataType::Integer, " -42 ").expect("parses"),
            FieldValue::Integer(-42)
        );
        assert_eq!(
            FieldValue::parse(DataType::Date, "2023-10-01").expect("parses"),
            FieldValue::Date(NaiveDate::from_ymd_opt(2023, 10, 1).expect("valid date"))
        );
        assert!(matches!(
            FieldValue::parse(DataType::DateTime, "2023-10-01 12:30:00.250"),
            Ok(FieldValue::DateTime(_))
        ));
        assert_eq!(
            FieldValue::parse(DataType::ObjectId, "65539").expect("parses"),
            FieldValue::ObjectId(ObjectId {
                page_id: 1,
                area_id: 3
            })
        );
    }

    #[test]
    fn it_rejects_bad_literals() {
        assert!(matches!(
            FieldValue::parse(DataType::UnsignedInteger, "-1"),
            Err(DataError::Malformed { .. })
        ));
        assert!(matches!(
            FieldValue::parse(DataType::Date, "yesterday"),
            Err(DataError::Malformed { .. })
        ));
        assert_eq!(
            FieldValue::parse(DataType::Binary, "00ff"),
            Err(DataError::NotSupported(DataType::Binary))
        );
    }

    #[test]
    fn it_archives_fixed_values() {
        let mut buf = [0u8; 8];
        assert_eq!(FieldValue::Integer(1).archive_fixed(&mut buf), Some(4));
        assert_eq!(&buf[..4], &[0, 0, 0, 1]);
        let oid = FieldValue::ObjectId(ObjectId {
            page_id: 2,
            area_id: 1,
        });
        assert_eq!(oid.archive_fixed(&mut buf), Some(6));
        assert_eq!(&buf[..6], &[0, 0, 0, 2, 0, 1]);
        assert_eq!(FieldValue::Double(1.0).archive_fixed(&mut buf[..4]), None);
        assert_eq!(FieldValue::Null.archive_fixed(&mut buf), None);
    }
}
