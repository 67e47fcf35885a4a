//! B-tree file and open parameters
//!

// Re-export
pub use self::error::BtreeError;
pub use self::file_option::{
    CompareOperator, OpenMode, OptionCode, ReadSubMode, SortKey, SortOrder, UniqueType,
};
pub use self::file_parameter::{
    ArrayDescriptor, BufferingCategory, FieldDescriptor, FileParameter, Layout, LayoutConfig,
    StorageStrategy,
};
pub use self::geometry::{AreaManageGeometry, KeyPosType, PageGeometry};
pub use self::hint::{FileHint, HintKey};
pub use self::null_bitmap::NullBitmap;
pub use self::object::{ObjectBuffer, ObjectError, ObjectKind};
pub use self::open_option::OpenOptionBuilder;
pub use self::open_parameter::{OpenParameter, SearchCondition, SearchField};

mod error;
pub mod file_option;
pub mod file_parameter;
pub mod geometry;
pub mod hint;
pub mod null_bitmap;
mod object;
mod open_option;
mod open_parameter;
