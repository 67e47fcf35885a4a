//! Open requests
//!
//! An [`OpenParameter`] is the validated, typed form of an open option store, checked against
//! the [`FileParameter`] of the file being opened. It is built fresh for every open and never
//! changes afterwards.

use serde::{Deserialize, Serialize};

use super::file_option::{CompareOperator, OpenMode, OptionCode, ReadSubMode, SortKey};
use super::file_parameter::FileParameter;
use super::BtreeError;
use crate::data::{DataType, FieldValue};
use crate::parameter::{OpenOption, ParameterKey};

/// One search condition on a key field (or the object id).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchField {
    /// Field searched, 0 for the object id
    pub field_index: usize,
    /// Start operator
    pub start_operator: CompareOperator,
    /// Start literal, [`FieldValue::Null`] for `EqualsToNull`
    pub start: FieldValue,
    /// Stop operator, `None` for an open ended condition
    pub stop_operator: Option<CompareOperator>,
    /// Stop literal
    pub stop: Option<FieldValue>,
}

/// Every search condition of an open.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCondition {
    /// No condition was given: the result is known to be empty
    pub void_search: bool,
    /// Conditions, in request order
    pub fields: Vec<SearchField>,
    /// Escape character of like conditions
    pub escape: Option<char>,
}

/// A validated open request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenParameter {
    open_mode: OpenMode,
    estimate: bool,
    get_by_bit_set: bool,
    field_select: bool,
    target_fields: Vec<usize>,
    select_object_id: bool,
    exist_target_field_in_key: bool,
    exist_target_field_in_value: bool,
    search_condition: SearchCondition,
    sort_key: SortKey,
    sort_reverse: bool,
    read_sub_mode: ReadSubMode,
    fetch_fields: Vec<usize>,
}

impl OpenParameter {
    /// Validate `open_option` against the layout of `file`.
    pub fn try_new(file: &FileParameter, open_option: &OpenOption) -> Result<Self, BtreeError> {
        let code = open_option
            .get_integer(ParameterKey::OpenMode)
            .ok_or_else(|| BtreeError::bad_argument("unset open mode"))?;
        let open_mode = match OpenMode::from_code(code) {
            Some(OpenMode::Batch) => OpenMode::Update,
            Some(open_mode) => open_mode,
            None => {
                return Err(BtreeError::bad_argument(format!(
                    "illegal open mode (= {code})"
                )))
            }
        };
        let flag = |key| open_option.get_boolean(key).unwrap_or(false);

        let mut parameter = Self {
            open_mode,
            estimate: flag(ParameterKey::Estimate),
            get_by_bit_set: flag(ParameterKey::GetByBitSet),
            field_select: flag(ParameterKey::FieldSelect),
            target_fields: vec![],
            select_object_id: true,
            exist_target_field_in_key: true,
            exist_target_field_in_value: true,
            search_condition: SearchCondition::default(),
            sort_key: SortKey::KeyField,
            sort_reverse: false,
            read_sub_mode: ReadSubMode::Scan,
            fetch_fields: vec![],
        };

        if parameter.field_select {
            parameter.target_fields = read_indices(
                open_option,
                ParameterKey::TargetFieldNumber,
                ParameterKey::TargetFieldIndex,
                file.field_num() + 1,
                "select field",
            )?;
            parameter.set_target_fields(file);
        }

        parameter.search_condition = read_search_condition(file, open_option)?;

        if let Some(code) = open_option.get_integer(ParameterKey::SortKey) {
            parameter.sort_key = SortKey::from_code(code)
                .ok_or_else(|| BtreeError::bad_argument(format!("illegal sort key (= {code})")))?;
        }
        parameter.check_sort_key()?;
        parameter.sort_reverse = flag(ParameterKey::SortReverse);

        if let Some(code) = open_option.get_integer(ParameterKey::ReadSubMode) {
            parameter.read_sub_mode = ReadSubMode::from_code(code).ok_or_else(|| {
                BtreeError::bad_argument(format!("illegal read sub mode (= {code})"))
            })?;
        }
        if parameter.read_sub_mode == ReadSubMode::Fetch {
            parameter.fetch_fields = read_indices(
                open_option,
                ParameterKey::FetchFieldNumber,
                ParameterKey::FetchFieldIndex,
                file.field_num(),
                "fetch field",
            )?;
        }

        tracing::debug!(
            open_mode = %parameter.open_mode,
            void_search = parameter.search_condition.void_search,
            "open parameter with {} search conditions",
            parameter.search_condition.fields.len()
        );
        Ok(parameter)
    }

    /// Carry the request of `original` over to the (possibly changed) layout of `file`. Only the
    /// projection classification is recomputed.
    pub fn from_original(file: &FileParameter, original: &OpenParameter) -> Self {
        let mut parameter = original.clone();
        if parameter.field_select {
            parameter.set_target_fields(file);
        } else {
            parameter.select_object_id = true;
            parameter.exist_target_field_in_key = true;
            parameter.exist_target_field_in_value = true;
        }
        parameter
    }

    fn set_target_fields(&mut self, file: &FileParameter) {
        self.select_object_id = false;
        self.exist_target_field_in_key = false;
        self.exist_target_field_in_value = false;
        for &index in &self.target_fields {
            if index == 0 {
                self.select_object_id = true;
            } else if index < file.top_value_field_index() {
                self.exist_target_field_in_key = true;
            } else {
                self.exist_target_field_in_value = true;
            }
        }
    }

    fn check_sort_key(&self) -> Result<(), BtreeError> {
        let Some(top) = self.search_condition.fields.first() else {
            return Ok(());
        };
        let searched_by = if top.field_index == 0 {
            SortKey::ObjectId
        } else {
            SortKey::KeyField
        };
        if searched_by != self.sort_key {
            return Err(BtreeError::bad_argument(format!(
                "illegal sort key: {} with a search on {searched_by}",
                self.sort_key
            )));
        }
        Ok(())
    }

    /// Open mode, `Batch` already folded into `Update`.
    pub fn open_mode(&self) -> OpenMode {
        self.open_mode
    }

    /// Only estimate the result?
    pub fn is_estimate(&self) -> bool {
        self.estimate
    }

    /// Return the result as a bit set?
    pub fn is_get_by_bit_set(&self) -> bool {
        self.get_by_bit_set
    }

    /// Was a projection given?
    pub fn is_field_select(&self) -> bool {
        self.field_select
    }

    /// Projected field indices, empty without a projection.
    pub fn target_fields(&self) -> &[usize] {
        &self.target_fields
    }

    /// Is the object id selected?
    pub fn select_object_id(&self) -> bool {
        self.select_object_id
    }

    /// Is any key field selected?
    pub fn exist_target_field_in_key(&self) -> bool {
        self.exist_target_field_in_key
    }

    /// Is any value field selected?
    pub fn exist_target_field_in_value(&self) -> bool {
        self.exist_target_field_in_value
    }

    /// The search conditions.
    pub fn search_condition(&self) -> &SearchCondition {
        &self.search_condition
    }

    /// Sort key.
    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    /// Is the sort order reversed?
    pub fn is_sort_reverse(&self) -> bool {
        self.sort_reverse
    }

    /// Scan or fetch.
    pub fn read_sub_mode(&self) -> ReadSubMode {
        self.read_sub_mode
    }

    /// Fetch field indices, empty unless fetching.
    pub fn fetch_fields(&self) -> &[usize] {
        &self.fetch_fields
    }
}

// A counted list of field indices, each below `limit`
fn read_indices(
    open_option: &OpenOption,
    count_key: ParameterKey,
    index_key: fn(usize) -> ParameterKey,
    limit: usize,
    what: &str,
) -> Result<Vec<usize>, BtreeError> {
    let count = open_option
        .get_integer(count_key)
        .filter(|count| *count >= 1)
        .ok_or_else(|| BtreeError::bad_argument(format!("unset {what}")))?;
    (0..count as usize)
        .map(|i| {
            open_option
                .get_integer(index_key(i))
                .filter(|index| *index >= 0 && (*index as usize) < limit)
                .map(|index| index as usize)
                .ok_or_else(|| {
                    BtreeError::bad_argument(format!(
                        "illegal {what} index (= {:?}, limit {limit})",
                        open_option.get(index_key(i))
                    ))
                })
        })
        .collect()
}

fn read_search_condition(
    file: &FileParameter,
    open_option: &OpenOption,
) -> Result<SearchCondition, BtreeError> {
    let count = open_option
        .get_integer(ParameterKey::SearchFieldNumber)
        .unwrap_or(0);
    if count < 0 {
        return Err(BtreeError::bad_argument(format!(
            "illegal number of search fields (= {count})"
        )));
    }
    if count == 0 {
        return Ok(SearchCondition {
            void_search: true,
            ..Default::default()
        });
    }

    let fields = (0..count as usize)
        .map(|i| read_search_field(file, open_option, i))
        .collect::<Result<Vec<_>, _>>()?;

    let like = fields
        .iter()
        .any(|field| field.start_operator == CompareOperator::Like);
    let escape = if like {
        open_option
            .get_string(ParameterKey::Escape)
            .and_then(|escape| escape.chars().next())
    } else {
        None
    };

    Ok(SearchCondition {
        void_search: false,
        fields,
        escape,
    })
}

fn read_search_field(
    file: &FileParameter,
    open_option: &OpenOption,
    i: usize,
) -> Result<SearchField, BtreeError> {
    let field_index = open_option
        .get_integer(ParameterKey::SearchFieldIndex(i))
        .filter(|index| *index >= 0 && (*index as usize) <= file.key_num())
        .ok_or_else(|| {
            BtreeError::bad_argument(format!(
                "illegal search key field index (= {:?})",
                open_option.get(ParameterKey::SearchFieldIndex(i))
            ))
        })? as usize;
    let data_type = file
        .field(field_index)
        .map(|field| field.data_type)
        .ok_or_else(|| BtreeError::bad_argument(format!("no field {field_index}")))?;

    let start_operator = read_operator(open_option, ParameterKey::SearchStartOperator(i), "start")?;
    let start = if start_operator == CompareOperator::EqualsToNull {
        FieldValue::Null
    } else {
        let literal = open_option
            .get_string(ParameterKey::SearchStart(i))
            .ok_or_else(|| BtreeError::bad_argument("unset search condition (start value)"))?;
        parse_literal(data_type, literal)?
    };

    let (stop_operator, stop) = match open_option.get_string(ParameterKey::SearchStop(i)) {
        Some("") => {
            return Err(BtreeError::bad_argument(
                "unset search condition (stop value)",
            ))
        }
        Some(literal) => {
            let stop = parse_literal(data_type, literal)?;
            let stop_operator =
                read_operator(open_option, ParameterKey::SearchStopOperator(i), "stop")?;
            (Some(stop_operator), Some(stop))
        }
        None => (None, None),
    };

    Ok(SearchField {
        field_index,
        start_operator,
        start,
        stop_operator,
        stop,
    })
}

fn read_operator(
    open_option: &OpenOption,
    key: ParameterKey,
    what: &str,
) -> Result<CompareOperator, BtreeError> {
    let code = open_option
        .get_integer(key)
        .filter(|code| *code >= 0)
        .ok_or_else(|| {
            BtreeError::bad_argument(format!("unset search condition ({what} compare operator)"))
        })?;
    CompareOperator::from_code(code)
        .ok_or_else(|| BtreeError::bad_argument(format!("unknown compare operator (= {code})")))
}

fn parse_literal(data_type: DataType, literal: &str) -> Result<FieldValue, BtreeError> {
    if data_type == DataType::Binary {
        return Err(BtreeError::not_supported("can't search by binary field"));
    }
    Ok(FieldValue::parse(data_type, literal)?)
}
