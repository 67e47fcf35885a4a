//! Open option builder
//!
//! Building an [`OpenOption`] store key by key is error prone: counts and indexed keys must
//! agree. [`OpenOptionBuilder`] keeps them in step.
//!
//! ```
//! use sydbtree::btree::{CompareOperator, OpenMode, OpenOptionBuilder};
//!
//! let option = OpenOptionBuilder::new(OpenMode::Search)
//!     .select([0, 2])
//!     .search_range(1, CompareOperator::GreaterThan, "10", CompareOperator::LessThanEquals, "20")
//!     .build();
//! assert_eq!(option.len(), 11);
//! ```

use super::file_option::{CompareOperator, OpenMode, OptionCode, ReadSubMode, SortKey};
use crate::parameter::{OpenOption, ParameterKey};

/// Builds an [`OpenOption`] store.
#[derive(Clone, Debug)]
pub struct OpenOptionBuilder {
    option: OpenOption,
    search_count: usize,
}

impl OpenOptionBuilder {
    /// Start a request opening in `open_mode`.
    pub fn new(open_mode: OpenMode) -> Self {
        let mut option = OpenOption::new();
        option.set_integer(ParameterKey::OpenMode, open_mode.code());
        Self {
            option,
            search_count: 0,
        }
    }

    /// Only estimate the result.
    pub fn estimate(mut self, estimate: bool) -> Self {
        self.option.set_boolean(ParameterKey::Estimate, estimate);
        self
    }

    /// Return the result as a bit set.
    pub fn get_by_bit_set(mut self, get_by_bit_set: bool) -> Self {
        self.option
            .set_boolean(ParameterKey::GetByBitSet, get_by_bit_set);
        self
    }

    /// Project `fields`.
    pub fn select<I: IntoIterator<Item = usize>>(mut self, fields: I) -> Self {
        self.option.set_boolean(ParameterKey::FieldSelect, true);
        let count = Self::set_indices(&mut self.option, ParameterKey::TargetFieldIndex, fields);
        self.option
            .set_integer(ParameterKey::TargetFieldNumber, count as i32);
        self
    }

    /// Add a condition `field <operator> start`.
    pub fn search(mut self, field: usize, operator: CompareOperator, start: &str) -> Self {
        let i = self.push_search(field, operator);
        self.option.set_string(ParameterKey::SearchStart(i), start);
        self
    }

    /// Add a range condition on `field`.
    pub fn search_range(
        mut self,
        field: usize,
        start_operator: CompareOperator,
        start: &str,
        stop_operator: CompareOperator,
        stop: &str,
    ) -> Self {
        let i = self.push_search(field, start_operator);
        self.option
            .set_string(ParameterKey::SearchStart(i), start)
            .set_string(ParameterKey::SearchStop(i), stop)
            .set_integer(ParameterKey::SearchStopOperator(i), stop_operator.code());
        self
    }

    /// Add a condition `field IS NULL`.
    pub fn search_null(mut self, field: usize) -> Self {
        self.push_search(field, CompareOperator::EqualsToNull);
        self
    }

    /// Add a condition `field LIKE pattern [ESCAPE escape]`.
    pub fn like(mut self, field: usize, pattern: &str, escape: Option<char>) -> Self {
        let i = self.push_search(field, CompareOperator::Like);
        self.option.set_string(ParameterKey::SearchStart(i), pattern);
        if let Some(escape) = escape {
            self.option
                .set_string(ParameterKey::Escape, escape.to_string());
        }
        self
    }

    /// Declare that no row can match.
    pub fn void_search(mut self) -> Self {
        self.search_count = 0;
        self.option.set_integer(ParameterKey::SearchFieldNumber, 0);
        self
    }

    /// Sort by `sort_key`.
    pub fn sort_key(mut self, sort_key: SortKey) -> Self {
        self.option
            .set_integer(ParameterKey::SortKey, sort_key.code());
        self
    }

    /// Reverse the sort order.
    pub fn sort_reverse(mut self, reverse: bool) -> Self {
        self.option.set_boolean(ParameterKey::SortReverse, reverse);
        self
    }

    /// Fetch by the values of `fields`.
    pub fn fetch<I: IntoIterator<Item = usize>>(mut self, fields: I) -> Self {
        self.option
            .set_integer(ParameterKey::ReadSubMode, ReadSubMode::Fetch.code());
        let count = Self::set_indices(&mut self.option, ParameterKey::FetchFieldIndex, fields);
        self.option
            .set_integer(ParameterKey::FetchFieldNumber, count as i32);
        self
    }

    /// The finished store.
    pub fn build(self) -> OpenOption {
        self.option
    }

    fn push_search(&mut self, field: usize, operator: CompareOperator) -> usize {
        let i = self.search_count;
        self.search_count += 1;
        self.option
            .set_integer(ParameterKey::SearchFieldNumber, self.search_count as i32)
            .set_integer(ParameterKey::SearchFieldIndex(i), field as i32)
            .set_integer(ParameterKey::SearchStartOperator(i), operator.code());
        i
    }

    fn set_indices<I: IntoIterator<Item = usize>>(
        option: &mut OpenOption,
        key: fn(usize) -> ParameterKey,
        fields: I,
    ) -> usize {
        let mut count = 0;
        for (i, field) in fields.into_iter().enumerate() {
            option.set_integer(key(i), field as i32);
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::{BtreeError, FileParameter, OpenParameter};
    use crate::data::{DataType, FieldValue};
    use crate::parameter::FileId;

    fn file_parameter() -> FileParameter {
        let mut file_id = FileId::new();
        file_id
            .set_string(ParameterKey::Area(0), "/var/sydney/t3")
            .set_boolean(ParameterKey::Mounted, false)
            .set_integer(ParameterKey::FieldNumber, 4)
            .set_integer(ParameterKey::KeyFieldNumber, 2)
            .set_integer(ParameterKey::FieldType(0), DataType::ObjectId.code())
            .set_integer(ParameterKey::FieldType(1), DataType::String.code())
            .set_integer(ParameterKey::FieldType(2), DataType::DateTime.code())
            .set_integer(ParameterKey::FieldType(3), DataType::Integer64.code());
        FileParameter::try_new(&file_id).expect("valid layout")
    }

    #[test]
    fn it_builds_accepted_options() {
        let option = OpenOptionBuilder::new(OpenMode::Read)
            .estimate(true)
            .get_by_bit_set(true)
            .select([0, 3])
            .like(1, "ab%", Some('#'))
            .search_range(
                2,
                CompareOperator::GreaterThanEquals,
                "2023-01-01 00:00:00",
                CompareOperator::LessThan,
                "2024-01-01 00:00:00",
            )
            .search_null(1)
            .sort_reverse(true)
            .build();
        assert_eq!(option.get_integer(ParameterKey::SearchFieldNumber), Some(3));

        let parameter = OpenParameter::try_new(&file_parameter(), &option).expect("valid open");
        assert!(parameter.is_estimate());
        assert!(parameter.is_get_by_bit_set());
        assert_eq!(parameter.target_fields(), &[0, 3]);
        assert!(parameter.select_object_id());
        assert!(!parameter.exist_target_field_in_key());
        assert!(parameter.is_sort_reverse());

        let condition = parameter.search_condition();
        assert_eq!(condition.escape, Some('#'));
        assert_eq!(condition.fields.len(), 3);
        assert_eq!(condition.fields[0].start, FieldValue::String("ab%".to_string()));
        assert_eq!(
            condition.fields[1].stop_operator,
            Some(CompareOperator::LessThan)
        );
        assert!(matches!(condition.fields[1].stop, Some(FieldValue::DateTime(_))));
        assert!(condition.fields[2].start.is_null());
    }

    #[test]
    fn it_builds_fetches() {
        let option = OpenOptionBuilder::new(OpenMode::Search)
            .fetch([1, 2])
            .build();
        let parameter = OpenParameter::try_new(&file_parameter(), &option).expect("valid open");
        assert_eq!(parameter.read_sub_mode(), ReadSubMode::Fetch);
        assert_eq!(parameter.fetch_fields(), &[1, 2]);
    }

    #[test]
    fn it_builds_void_searches() {
        let option = OpenOptionBuilder::new(OpenMode::Search)
            .search(1, CompareOperator::Equals, "x")
            .void_search()
            .build();
        let parameter = OpenParameter::try_new(&file_parameter(), &option).expect("valid open");
        assert!(parameter.search_condition().void_search);
    }

    #[test]
    fn it_builds_object_id_searches() {
        let option = OpenOptionBuilder::new(OpenMode::Update)
            .search(0, CompareOperator::Equals, "131072")
            .sort_key(SortKey::ObjectId)
            .build();
        let parameter = OpenParameter::try_new(&file_parameter(), &option).expect("valid open");
        assert_eq!(parameter.sort_key(), SortKey::ObjectId);

        let mismatched = OpenOptionBuilder::new(OpenMode::Update)
            .search(0, CompareOperator::Equals, "131072")
            .build();
        assert!(matches!(
            OpenParameter::try_new(&file_parameter(), &mismatched),
            Err(BtreeError::BadArgument(_))
        ));
    }
}
