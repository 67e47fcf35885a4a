//! Layout planning
//!
//! A [`FileParameter`] is built once from a FileID and is immutable afterwards (apart from the
//! storage directory, see [`FileParameter::change_btree_file_path`]). Construction works out:
//!
//!  - per field descriptors: type, fixed or variable, maximum length, inline or outside;
//!  - whether key values sit in the node key table or in separate key objects;
//!  - the direct key and value object sizes;
//!  - a physical page size big enough for one key object, one value object and the key table;
//!  - the fan-out of a node, and the merge thresholds derived from the file hint.
//!
//! Every value read from the FileID is also written to a normalised copy, available from
//! [`FileParameter::file_id`]. That copy is the persisted form of the layout: building a new
//! `FileParameter` from it yields the same [`Layout`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::Display;

use super::file_option::{OptionCode, SortOrder, UniqueType};
use super::geometry::{
    key_information_size, node_header_size, AreaManageGeometry, KeyPosType, PageGeometry,
};
use super::hint::FileHint;
use super::null_bitmap;
use super::BtreeError;
use crate::data::{
    DataType, INSIDE_VAR_FIELD_LEN_ARCHIVE_SIZE, OBJECT_ID_ARCHIVE_SIZE, OBJECT_TYPE_ARCHIVE_SIZE,
    PAGE_ID_ARCHIVE_SIZE, U32_ARCHIVE_SIZE,
};
use crate::parameter::{FileId, ParameterKey};

/// Field counts up to this are held inline.
pub const LOCAL_FIELD_LIMIT: usize = 10;

/// Per field storage, inline for small field counts.
pub type FieldArray<T> = SmallVec<[T; LOCAL_FIELD_LIMIT]>;

/// Sub directory of `Area[0]` holding the tree file.
pub const TREE_DIRECTORY: &str = "Tree";
/// Sub directory of `Area[0]` holding the value file.
pub const VALUE_DIRECTORY: &str = "Value";

/// Maximum size of a master data, version log or sync log file.
pub const DEFAULT_FILE_MAX_SIZE: u64 = u64::MAX;
/// Growth step of a master data, version log or sync log file.
pub const DEFAULT_FILE_EXTENSION_SIZE: u64 = 64 << 10;

const DEFAULT_PAGE_SIZE: usize = 4 << 10;

/// Tunables of the layout computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Share of a page, in percent, that the key table and direct key objects may use when keys
    /// contain unlimited outside fields
    pub outside_key_page_rate: usize,
    /// Variable fields with a maximum length above this are stored outside
    pub variable_field_inside_threshold: usize,
    /// Fixed keys up to this size are stored in the key table
    pub key_pos_threshold: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            outside_key_page_rate: 50,
            variable_field_inside_threshold: 8,
            key_pos_threshold: 8,
        }
    }
}

/// Buffer pool category of a file.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferingCategory {
    /// Temporary file, never logged
    Temporary,
    /// Read only file
    ReadOnly,
    /// Anything else
    #[default]
    Normal,
}

impl BufferingCategory {
    fn new(temporary: bool, read_only: bool) -> Self {
        if temporary {
            BufferingCategory::Temporary
        } else if read_only {
            BufferingCategory::ReadOnly
        } else {
            BufferingCategory::Normal
        }
    }
}

/// Where and how the tree or value file is stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStrategy {
    /// Master data directory
    pub master_path: PathBuf,
    /// Version log directory, absent for temporary files
    pub version_log_path: Option<PathBuf>,
    /// Sync log directory, absent for temporary files
    pub sync_log_path: Option<PathBuf>,
    /// Is the file mounted?
    pub mounted: bool,
    /// Physical page size in bytes
    pub page_size: usize,
    /// Percentage of a page in use before a new one is taken
    pub page_use_rate: u32,
    /// Maximum file size in bytes
    pub max_size: u64,
    /// File growth step in bytes
    pub extension_size: u64,
}

/// Array attributes of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayDescriptor {
    /// Type of the elements
    pub element_type: DataType,
    /// Maximum number of elements, `None` when unlimited
    pub max_count: Option<usize>,
    /// Are the elements fixed in length?
    pub fixed_element: bool,
    /// Maximum length of a variable element, `None` when unlimited or fixed
    pub element_max_length: Option<usize>,
}

/// Storage attributes of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Data type
    pub data_type: DataType,
    /// Is the archived field fixed in length? Arrays count as fixed: the owning object only
    /// holds their object id.
    pub fixed: bool,
    /// Maximum length of a variable field, `None` when unlimited or fixed
    pub max_length: Option<usize>,
    /// Is the value stored in a separate object?
    pub outside: bool,
    /// Array attributes
    pub array: Option<ArrayDescriptor>,
    /// Sort order, for key fields
    pub sort_order: SortOrder,
    /// Comparison factor, -1 for descending key fields
    pub multiplier: i32,
}

impl FieldDescriptor {
    fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            fixed: !data_type.is_variable() || data_type == DataType::Array,
            max_length: None,
            outside: false,
            array: None,
            sort_order: SortOrder::Ascending,
            multiplier: 1,
        }
    }

    /// Bytes the field occupies in its direct object.
    pub fn archive_size(&self) -> usize {
        if self.array.is_some() || (!self.fixed && self.outside) {
            OBJECT_ID_ARCHIVE_SIZE
        } else if self.fixed {
            self.data_type.fixed_archive_size().unwrap_or_default()
        } else {
            // Inside variable fields reserve their maximum length
            INSIDE_VAR_FIELD_LEN_ARCHIVE_SIZE + self.max_length.unwrap_or_default()
        }
    }
}

/// Every derived constant of a [`FileParameter`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Physical page size in bytes
    pub page_size: usize,
    /// Number of fields, including the object id
    pub field_num: usize,
    /// Number of key fields
    pub key_num: usize,
    /// Number of value fields
    pub value_num: usize,
    /// Key uniqueness
    pub unique: UniqueType,
    /// Where key values live
    pub key_pos_type: KeyPosType,
    /// Inline key size, 0 unless keys are in the key table
    pub key_size: usize,
    /// Direct key object size, 0 when keys are in the key table
    pub direct_key_object_size: usize,
    /// Direct value object size
    pub direct_value_object_size: usize,
    /// Node fan-out
    pub key_per_node: u32,
    /// Split point of a full node, in percent
    pub node_key_divide_rate: u32,
    /// Key count under which a node is checked for merging
    pub node_merge_check_threshold: u32,
    /// Key count under which a merge is executed
    pub node_merge_execute_threshold: u32,
    /// Is any key field variable?
    pub exist_variable_field_in_key: bool,
    /// Is any key field outside?
    pub exist_outside_field_in_key: bool,
    /// Is any value field variable?
    pub exist_variable_field_in_value: bool,
    /// Is any value field outside?
    pub exist_outside_field_in_value: bool,
    /// Is any value field an array?
    pub exist_array_field_in_value: bool,
    /// Summed maximum length of outside key fields, `None` when unlimited
    pub outside_key_field_total_length_max: Option<usize>,
    /// Field descriptors, the object id first
    pub fields: Vec<FieldDescriptor>,
}

/// The physical layout of a B-tree file.
#[derive(Clone, Debug)]
pub struct FileParameter {
    file_id: FileId,
    config: LayoutConfig,
    page_size: usize,
    temporary: bool,
    read_only: bool,
    mounted: bool,
    buffering: BufferingCategory,
    unique: UniqueType,
    key_num: usize,
    value_num: usize,
    fields: FieldArray<FieldDescriptor>,
    exist_variable_field_in_key: bool,
    exist_outside_field_in_key: bool,
    exist_variable_field_in_value: bool,
    exist_outside_field_in_value: bool,
    exist_array_field_in_value: bool,
    outside_key_field_total_length_max: Option<usize>,
    key_pos_type: KeyPosType,
    key_size: usize,
    direct_key_object_size: usize,
    direct_value_object_size: usize,
    key_per_node: u32,
    hint: FileHint,
    node_merge_check_threshold: u32,
    node_merge_execute_threshold: u32,
    tree_strategy: StorageStrategy,
    value_strategy: StorageStrategy,
}

impl FileParameter {
    /// Plan the layout of `file_id` with the default configuration and geometry.
    pub fn try_new(file_id: &FileId) -> Result<Self, BtreeError> {
        Self::try_new_with(
            file_id,
            &LayoutConfig::default(),
            &AreaManageGeometry::default(),
        )
    }

    /// Plan the layout of `file_id`.
    pub fn try_new_with(
        file_id: &FileId,
        config: &LayoutConfig,
        geometry: &dyn PageGeometry,
    ) -> Result<Self, BtreeError> {
        let mut normalized = FileId::new();

        let area = Self::read_areas(file_id, &mut normalized)?;
        let page_size = Self::read_page_size(file_id, geometry)?;
        let temporary = Self::read_flag(file_id, &mut normalized, ParameterKey::Temporary);
        let read_only = Self::read_flag(file_id, &mut normalized, ParameterKey::ReadOnly);
        let mounted = file_id
            .get_boolean(ParameterKey::Mounted)
            .ok_or_else(|| BtreeError::bad_argument("Mounted is not set"))?;
        normalized.set_boolean(ParameterKey::Mounted, mounted);
        let unique = Self::read_unique(file_id, &mut normalized)?;
        let (key_num, value_num) = Self::read_field_numbers(file_id, &mut normalized)?;

        let mut parameter = Self {
            file_id: normalized,
            config: *config,
            page_size,
            temporary,
            read_only,
            mounted,
            buffering: BufferingCategory::new(temporary, read_only),
            unique,
            key_num,
            value_num,
            fields: FieldArray::new(),
            exist_variable_field_in_key: false,
            exist_outside_field_in_key: false,
            exist_variable_field_in_value: false,
            exist_outside_field_in_value: false,
            exist_array_field_in_value: false,
            outside_key_field_total_length_max: Some(0),
            key_pos_type: KeyPosType::KeyInfo,
            key_size: 0,
            direct_key_object_size: 0,
            direct_value_object_size: 0,
            key_per_node: 0,
            hint: FileHint::default(),
            node_merge_check_threshold: 0,
            node_merge_execute_threshold: 0,
            tree_strategy: StorageStrategy::default(),
            value_strategy: StorageStrategy::default(),
        };
        parameter.set_page_size(page_size);
        parameter.set_field_params(file_id, geometry)?;
        parameter.analyze_file_hint(file_id)?;
        parameter.set_storage_strategies(&area);

        for key in [
            ParameterKey::DatabaseId,
            ParameterKey::TableId,
            ParameterKey::FileObjectId,
            ParameterKey::Version,
        ] {
            if let Some(value) = file_id.get_integer(key) {
                parameter.file_id.set_integer(key, value);
            }
        }

        tracing::info!(
            page_size = parameter.page_size,
            key_pos_type = %parameter.key_pos_type,
            key_per_node = parameter.key_per_node,
            "planned layout of {} key and {} value fields",
            key_num,
            value_num
        );
        Ok(parameter)
    }

    fn read_areas(file_id: &FileId, normalized: &mut FileId) -> Result<PathBuf, BtreeError> {
        let area = file_id
            .get_string(ParameterKey::Area(0))
            .filter(|area| !area.is_empty())
            .ok_or_else(|| BtreeError::bad_argument("Area[0] is not set"))?;
        normalized.set_string(ParameterKey::Area(0), area);
        for i in 1.. {
            let Some(other) = file_id.get_string(ParameterKey::Area(i)) else {
                break;
            };
            normalized.set_string(ParameterKey::Area(i), other);
        }
        Ok(PathBuf::from(area))
    }

    fn read_page_size(file_id: &FileId, geometry: &dyn PageGeometry) -> Result<usize, BtreeError> {
        let size = match file_id.get_integer(ParameterKey::PageSize) {
            None => DEFAULT_PAGE_SIZE,
            Some(kb) if kb <= 0 => {
                return Err(BtreeError::bad_argument(format!(
                    "illegal page size (= {kb})"
                )))
            }
            Some(kb) => (kb as usize) << 10,
        };
        geometry.verify_page_size(size)
    }

    fn read_flag(file_id: &FileId, normalized: &mut FileId, key: ParameterKey) -> bool {
        let value = file_id.get_boolean(key).unwrap_or(false);
        normalized.set_boolean(key, value);
        value
    }

    fn read_unique(file_id: &FileId, normalized: &mut FileId) -> Result<UniqueType, BtreeError> {
        let Some(code) = file_id.get_integer(ParameterKey::Unique) else {
            return Ok(UniqueType::NotUnique);
        };
        let unique = UniqueType::from_code(code)
            .ok_or_else(|| BtreeError::bad_argument(format!("unknown unique type (= {code})")))?;
        normalized.set_integer(ParameterKey::Unique, code);
        Ok(unique)
    }

    fn read_field_numbers(
        file_id: &FileId,
        normalized: &mut FileId,
    ) -> Result<(usize, usize), BtreeError> {
        let field_num = file_id
            .get_integer(ParameterKey::FieldNumber)
            .ok_or_else(|| BtreeError::bad_argument("FieldNumber is not set"))?;
        if field_num < 2 {
            return Err(BtreeError::bad_argument(format!(
                "illegal number of fields (= {field_num})"
            )));
        }
        normalized.set_integer(ParameterKey::FieldNumber, field_num);

        let key_num = file_id
            .get_integer(ParameterKey::KeyFieldNumber)
            .ok_or_else(|| BtreeError::bad_argument("KeyFieldNumber is not set"))?;
        if key_num < 1 || key_num >= field_num {
            return Err(BtreeError::bad_argument(format!(
                "illegal number of key fields (= {key_num})"
            )));
        }
        normalized.set_integer(ParameterKey::KeyFieldNumber, key_num);

        Ok((key_num as usize, (field_num - key_num - 1) as usize))
    }

    fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size;
        self.file_id
            .set_integer(ParameterKey::PageSize, (page_size >> 10) as i32);
    }

    fn grow_page_size(&mut self, geometry: &dyn PageGeometry) -> Result<(), BtreeError> {
        let grown = geometry
            .verify_page_size(self.page_size << 1)
            .map_err(|err| {
                BtreeError::not_supported(format!(
                    "page size can't grow beyond {} bytes: {err}",
                    self.page_size
                ))
            })?;
        tracing::info!("page size grown from {} to {} bytes", self.page_size, grown);
        self.set_page_size(grown);
        Ok(())
    }

    fn set_field_params(
        &mut self,
        file_id: &FileId,
        geometry: &dyn PageGeometry,
    ) -> Result<(), BtreeError> {
        for i in 0..self.field_num() {
            let data_type = self.read_field_type(file_id, i)?;
            let mut field = FieldDescriptor::new(data_type);
            if !field.fixed {
                self.set_variable_field_param(file_id, i, &mut field)?;
            }
            if data_type == DataType::Array {
                self.set_array_field_param(file_id, i, &mut field)?;
            }
            if self.is_key_field(i) {
                self.set_sort_param(file_id, i, &mut field);
            }
            self.fields.push(field);
        }
        self.set_object_form(geometry)?;
        self.set_key_per_node(file_id, geometry)
    }

    fn read_field_type(&mut self, file_id: &FileId, index: usize) -> Result<DataType, BtreeError> {
        let code = file_id
            .get_integer(ParameterKey::FieldType(index))
            .ok_or_else(|| {
                BtreeError::bad_argument(format!("field type not found. field index = {index}"))
            })?;
        let data_type = DataType::from_code(code).map_err(|_| {
            BtreeError::bad_argument(format!(
                "not support field type. field index = {index}, field type = {code}"
            ))
        })?;
        if index == 0 {
            if data_type != DataType::ObjectId {
                return Err(BtreeError::bad_argument("illegal object id field type"));
            }
        } else if matches!(data_type, DataType::Decimal | DataType::Language) {
            return Err(BtreeError::bad_argument(format!(
                "not support field type. field index = {index}, field type = {code}"
            )));
        }
        if index < self.top_value_field_index()
            && matches!(data_type, DataType::Array | DataType::Binary)
        {
            return Err(BtreeError::bad_argument(format!(
                "illegal key field type. field index = {index}, key field type = {code}"
            )));
        }
        self.file_id.set_integer(ParameterKey::FieldType(index), code);
        Ok(data_type)
    }

    // Absent or zero means unlimited
    fn read_length(
        &mut self,
        file_id: &FileId,
        key: ParameterKey,
    ) -> Result<Option<usize>, BtreeError> {
        match file_id.get_integer(key) {
            None => Ok(None),
            Some(length) if length < 0 => Err(BtreeError::bad_argument(format!(
                "illegal {key} (= {length})"
            ))),
            Some(length) => {
                self.file_id.set_integer(key, length);
                Ok((length > 0).then_some(length as usize))
            }
        }
    }

    fn set_variable_field_param(
        &mut self,
        file_id: &FileId,
        index: usize,
        field: &mut FieldDescriptor,
    ) -> Result<(), BtreeError> {
        field.max_length = self.read_length(file_id, ParameterKey::FieldLength(index))?;
        field.outside = field
            .max_length
            .map_or(true, |max| max > self.config.variable_field_inside_threshold);

        if self.is_key_field(index) {
            self.exist_variable_field_in_key = true;
            if field.outside {
                self.exist_outside_field_in_key = true;
                // One unlimited field makes the total unlimited
                self.outside_key_field_total_length_max = self
                    .outside_key_field_total_length_max
                    .zip(field.max_length)
                    .map(|(total, max)| total + max);
            }
        } else {
            self.exist_variable_field_in_value = true;
            if field.outside {
                self.exist_outside_field_in_value = true;
            }
        }
        Ok(())
    }

    fn set_array_field_param(
        &mut self,
        file_id: &FileId,
        index: usize,
        field: &mut FieldDescriptor,
    ) -> Result<(), BtreeError> {
        let code = file_id
            .get_integer(ParameterKey::ElementType(index))
            .ok_or_else(|| {
                BtreeError::bad_argument(format!("element type not found. field index = {index}"))
            })?;
        self.file_id.set_integer(ParameterKey::ElementType(index), code);
        let element_type = DataType::from_code(code)?;
        let max_count = self.read_length(file_id, ParameterKey::FieldLength(index))?;
        let fixed_element = !element_type.is_variable();
        let element_max_length = if fixed_element {
            None
        } else {
            self.read_length(file_id, ParameterKey::ElementLength(index))?
        };

        field.array = Some(ArrayDescriptor {
            element_type,
            max_count,
            fixed_element,
            element_max_length,
        });
        field.outside = true;
        self.exist_array_field_in_value = true;
        self.exist_outside_field_in_value = true;
        Ok(())
    }

    fn set_sort_param(&mut self, file_id: &FileId, index: usize, field: &mut FieldDescriptor) {
        let key = ParameterKey::FieldSortOrder(index);
        let descending = match file_id.get_boolean(key) {
            Some(descending) => {
                self.file_id.set_boolean(key, descending);
                descending
            }
            None => false,
        };
        field.sort_order = if descending {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };
        field.multiplier = field.sort_order.multiplier();
    }

    fn set_object_form(&mut self, geometry: &dyn PageGeometry) -> Result<(), BtreeError> {
        let key_size = self.fixed_key_real_size();
        self.key_pos_type =
            if !self.exist_variable_field_in_key && key_size <= self.config.key_pos_threshold {
                KeyPosType::KeyInfo
            } else {
                KeyPosType::KeyObject
            };

        match self.key_pos_type {
            KeyPosType::KeyInfo => {
                self.key_size = key_size;
                self.direct_key_object_size = 0;
            }
            KeyPosType::KeyObject => {
                self.key_size = 0;
                self.reset_page_size_for_leaf_key(geometry)?;
            }
        }
        self.reset_page_size_for_value(geometry)
    }

    fn fixed_key_real_size(&self) -> usize {
        if self.exist_variable_field_in_key {
            return 0;
        }
        self.key_fields().iter().map(FieldDescriptor::archive_size).sum()
    }

    // A leaf page must hold its header and at least one direct key object
    fn reset_page_size_for_leaf_key(
        &mut self,
        geometry: &dyn PageGeometry,
    ) -> Result<(), BtreeError> {
        self.direct_key_object_size = self.compute_direct_key_object_size();
        let header = node_header_size(true);
        while self.direct_key_object_size
            > geometry
                .page_data_size(self.page_size, 2)
                .saturating_sub(header)
        {
            self.grow_page_size(geometry)?;
        }
        Ok(())
    }

    // A value page must hold at least one direct value object
    fn reset_page_size_for_value(&mut self, geometry: &dyn PageGeometry) -> Result<(), BtreeError> {
        self.direct_value_object_size = self.compute_direct_value_object_size();
        while self.direct_value_object_size > geometry.page_data_size(self.page_size, 1) {
            self.grow_page_size(geometry)?;
        }
        Ok(())
    }

    fn compute_direct_key_object_size(&self) -> usize {
        OBJECT_TYPE_ARCHIVE_SIZE
            + null_bitmap::size(self.key_num)
            + self
                .key_fields()
                .iter()
                .map(FieldDescriptor::archive_size)
                .sum::<usize>()
    }

    fn compute_direct_value_object_size(&self) -> usize {
        // Type tag, leaf page id and key information index precede the bitmap
        OBJECT_TYPE_ARCHIVE_SIZE
            + PAGE_ID_ARCHIVE_SIZE
            + U32_ARCHIVE_SIZE
            + null_bitmap::size(self.value_num)
            + self
                .value_fields()
                .iter()
                .map(FieldDescriptor::archive_size)
                .sum::<usize>()
    }

    fn set_key_per_node(
        &mut self,
        file_id: &FileId,
        geometry: &dyn PageGeometry,
    ) -> Result<(), BtreeError> {
        match file_id.get_integer(ParameterKey::KeyObjectPerNode) {
            None => self.set_default_key_per_node(geometry)?,
            Some(key_per_node) if key_per_node < 2 => {
                return Err(BtreeError::bad_argument(format!(
                    "illegal number of key per node (= {key_per_node})"
                )))
            }
            Some(key_per_node) => {
                self.file_id
                    .set_integer(ParameterKey::KeyObjectPerNode, key_per_node);
                self.key_per_node = key_per_node as u32;
            }
        }

        let key_table_size = (key_information_size(true, self.key_pos_type, self.key_num)
            + self.key_size)
            * self.key_per_node as usize;
        let header = node_header_size(true);
        while key_table_size
            > geometry
                .page_data_size(self.page_size, 2)
                .saturating_sub(header)
        {
            self.grow_page_size(geometry)?;
        }
        Ok(())
    }

    fn set_default_key_per_node(&mut self, geometry: &dyn PageGeometry) -> Result<(), BtreeError> {
        loop {
            self.key_per_node = self.default_key_per_node(geometry);
            if self.key_per_node >= 2 {
                return Ok(());
            }
            self.grow_page_size(geometry)?;
        }
    }

    // Largest key count that fits a leaf page: a coarse search in steps of 10, then in steps
    // of 1 from the last coarse fit.
    fn default_key_per_node(&self, geometry: &dyn PageGeometry) -> u32 {
        let header = node_header_size(true);
        let key_info_size =
            key_information_size(true, self.key_pos_type, self.key_num) + self.key_size;
        let mut key_per_node = 10;

        match self.key_pos_type {
            KeyPosType::KeyInfo => {
                // Header and key table
                let data_size = geometry
                    .page_data_size(self.page_size, 2)
                    .saturating_sub(header);
                while key_info_size * key_per_node <= data_size {
                    key_per_node += 10;
                }
                key_per_node -= 10;
                for _ in 0..10 {
                    if data_size < key_info_size * key_per_node {
                        key_per_node -= 1;
                        break;
                    }
                    key_per_node += 1;
                }
            }
            KeyPosType::KeyObject => {
                let page_size = if self.exist_variable_field_in_key
                    && self.exist_outside_field_in_key
                    && self.outside_key_field_total_length_max.is_none()
                {
                    self.page_size * self.config.outside_key_page_rate / 100
                } else {
                    self.page_size
                };
                let use_size = |key_per_node: usize| {
                    header + (key_info_size + self.direct_key_object_size) * key_per_node
                };
                // Header, key table and one area per key object
                let data_size =
                    |key_per_node: usize| geometry.page_data_size(page_size, key_per_node + 2);

                // Bounded outside key fields only count in the coarse search
                let outside = self.outside_key_field_total_length_max.unwrap_or(0);
                while use_size(key_per_node) + outside * key_per_node <= data_size(key_per_node) {
                    key_per_node += 10;
                }
                key_per_node -= 10;
                for _ in 0..10 {
                    if data_size(key_per_node) < use_size(key_per_node) {
                        key_per_node = key_per_node.saturating_sub(1);
                        break;
                    }
                    key_per_node += 1;
                }
            }
        }
        key_per_node as u32
    }

    fn analyze_file_hint(&mut self, file_id: &FileId) -> Result<(), BtreeError> {
        self.hint = match file_id.get_string(ParameterKey::FileHint) {
            Some(hint) => {
                self.file_id.set_string(ParameterKey::FileHint, hint);
                FileHint::parse(hint)?
            }
            None => FileHint::default(),
        };
        self.node_merge_check_threshold = self.hint.merge_check_threshold(self.key_per_node);
        self.node_merge_execute_threshold = self.hint.merge_execute_threshold(self.key_per_node);
        Ok(())
    }

    fn set_storage_strategies(&mut self, area: &Path) {
        self.tree_strategy = self.storage_strategy(area, TREE_DIRECTORY);
        self.value_strategy = self.storage_strategy(area, VALUE_DIRECTORY);
    }

    fn storage_strategy(&self, area: &Path, directory: &str) -> StorageStrategy {
        let master_path = area.join(directory);
        let log_path =
            (self.buffering != BufferingCategory::Temporary).then(|| master_path.clone());
        StorageStrategy {
            master_path,
            version_log_path: log_path.clone(),
            sync_log_path: log_path,
            mounted: self.mounted,
            page_size: self.page_size,
            page_use_rate: 100,
            max_size: DEFAULT_FILE_MAX_SIZE,
            extension_size: DEFAULT_FILE_EXTENSION_SIZE,
        }
    }

    /// Move the file to `path`. Only `Area[0]` and the storage strategies change.
    pub fn change_btree_file_path<P: AsRef<Path>>(&mut self, path: P) {
        let path = path.as_ref();
        self.file_id
            .set_string(ParameterKey::Area(0), path.to_string_lossy());
        self.set_storage_strategies(path);
    }

    /// The normalised FileID.
    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }

    /// Snapshot of every derived constant.
    pub fn layout(&self) -> Layout {
        Layout {
            page_size: self.page_size,
            field_num: self.field_num(),
            key_num: self.key_num,
            value_num: self.value_num,
            unique: self.unique,
            key_pos_type: self.key_pos_type,
            key_size: self.key_size,
            direct_key_object_size: self.direct_key_object_size,
            direct_value_object_size: self.direct_value_object_size,
            key_per_node: self.key_per_node,
            node_key_divide_rate: self.hint.node_key_divide_rate,
            node_merge_check_threshold: self.node_merge_check_threshold,
            node_merge_execute_threshold: self.node_merge_execute_threshold,
            exist_variable_field_in_key: self.exist_variable_field_in_key,
            exist_outside_field_in_key: self.exist_outside_field_in_key,
            exist_variable_field_in_value: self.exist_variable_field_in_value,
            exist_outside_field_in_value: self.exist_outside_field_in_value,
            exist_array_field_in_value: self.exist_array_field_in_value,
            outside_key_field_total_length_max: self.outside_key_field_total_length_max,
            fields: self.fields.to_vec(),
        }
    }

    /// Physical page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Is the file temporary?
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Is the file read only?
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Is the file mounted?
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Buffer pool category.
    pub fn buffering_category(&self) -> BufferingCategory {
        self.buffering
    }

    /// Key uniqueness.
    pub fn unique(&self) -> UniqueType {
        self.unique
    }

    /// Number of fields, including the object id.
    pub fn field_num(&self) -> usize {
        self.key_num + self.value_num + 1
    }

    /// Number of key fields.
    pub fn key_num(&self) -> usize {
        self.key_num
    }

    /// Number of value fields.
    pub fn value_num(&self) -> usize {
        self.value_num
    }

    /// Index of the first value field.
    pub fn top_value_field_index(&self) -> usize {
        self.key_num + 1
    }

    /// Is field `index` a key field?
    pub fn is_key_field(&self, index: usize) -> bool {
        index > 0 && index < self.top_value_field_index()
    }

    /// Every field descriptor, the object id first.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Descriptor of field `index`.
    pub fn field(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    /// Key field descriptors.
    pub fn key_fields(&self) -> &[FieldDescriptor] {
        let top = self.top_value_field_index().min(self.fields.len());
        &self.fields[1.min(top)..top]
    }

    /// Value field descriptors.
    pub fn value_fields(&self) -> &[FieldDescriptor] {
        let top = self.top_value_field_index().min(self.fields.len());
        &self.fields[top..]
    }

    /// Bytes field `index` occupies in its direct object.
    pub fn field_archive_size(&self, index: usize) -> Option<usize> {
        self.field(index).map(FieldDescriptor::archive_size)
    }

    /// Where key values live.
    pub fn key_pos_type(&self) -> KeyPosType {
        self.key_pos_type
    }

    /// Inline key size, 0 unless keys are in the key table.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Direct key object size, 0 when keys are in the key table.
    pub fn direct_key_object_size(&self) -> usize {
        self.direct_key_object_size
    }

    /// Direct value object size.
    pub fn direct_value_object_size(&self) -> usize {
        self.direct_value_object_size
    }

    /// Node fan-out.
    pub fn key_per_node(&self) -> u32 {
        self.key_per_node
    }

    /// Parsed file hint.
    pub fn file_hint(&self) -> &FileHint {
        &self.hint
    }

    /// Split point of a full node, in percent.
    pub fn node_key_divide_rate(&self) -> u32 {
        self.hint.node_key_divide_rate
    }

    /// Key count under which a node is checked for merging.
    pub fn node_merge_check_threshold(&self) -> u32 {
        self.node_merge_check_threshold
    }

    /// Key count under which a merge is executed.
    pub fn node_merge_execute_threshold(&self) -> u32 {
        self.node_merge_execute_threshold
    }

    /// Is any key field variable?
    pub fn exist_variable_field_in_key(&self) -> bool {
        self.exist_variable_field_in_key
    }

    /// Is any key field outside?
    pub fn exist_outside_field_in_key(&self) -> bool {
        self.exist_outside_field_in_key
    }

    /// Is any value field variable?
    pub fn exist_variable_field_in_value(&self) -> bool {
        self.exist_variable_field_in_value
    }

    /// Is any value field outside?
    pub fn exist_outside_field_in_value(&self) -> bool {
        self.exist_outside_field_in_value
    }

    /// Is any value field an array?
    pub fn exist_array_field_in_value(&self) -> bool {
        self.exist_array_field_in_value
    }

    /// Summed maximum length of outside key fields, `None` when unlimited.
    pub fn outside_key_field_total_length_max(&self) -> Option<usize> {
        self.outside_key_field_total_length_max
    }

    /// Storage of the tree file.
    pub fn tree_storage_strategy(&self) -> &StorageStrategy {
        &self.tree_strategy
    }

    /// Storage of the value file.
    pub fn value_storage_strategy(&self) -> &StorageStrategy {
        &self.value_strategy
    }

    /// The configuration the layout was planned with.
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests;
