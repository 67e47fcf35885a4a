use super::*;

use crate::btree::geometry::MAX_PAGE_SIZE;
use crate::BINCODER;
use bincode::Options;

// Object id, then `keys` key fields, then `values` value fields
fn file_id(keys: &[DataType], values: &[DataType]) -> FileId {
    let mut file_id = FileId::new();
    file_id
        .set_string(ParameterKey::Area(0), "/var/sydney/t1")
        .set_boolean(ParameterKey::Mounted, true)
        .set_integer(
            ParameterKey::FieldNumber,
            (1 + keys.len() + values.len()) as i32,
        )
        .set_integer(ParameterKey::KeyFieldNumber, keys.len() as i32)
        .set_integer(ParameterKey::FieldType(0), DataType::ObjectId.code());
    for (i, data_type) in keys.iter().chain(values.iter()).enumerate() {
        file_id.set_integer(ParameterKey::FieldType(i + 1), data_type.code());
    }
    file_id
}

fn assert_bad_argument(file_id: &FileId) {
    let result = FileParameter::try_new(file_id);
    assert!(
        matches!(result, Err(BtreeError::BadArgument(_))),
        "{result:?}"
    );
}

#[test_log::test]
fn it_plans_variable_keys_as_key_objects() {
    let mut file_id = file_id(
        &[DataType::Integer, DataType::Integer, DataType::String],
        &[DataType::Integer],
    );
    file_id.set_integer(ParameterKey::FieldLength(3), 100);

    let parameter = FileParameter::try_new(&file_id).expect("valid layout");
    assert!(parameter.exist_variable_field_in_key());
    assert!(parameter.exist_outside_field_in_key());
    assert_eq!(parameter.outside_key_field_total_length_max(), Some(100));
    assert_eq!(parameter.key_pos_type(), KeyPosType::KeyObject);
    assert_eq!(parameter.key_size(), 0);

    // type tag + bitmap + 2 integers + outside object id
    assert_eq!(parameter.direct_key_object_size(), 1 + 1 + 4 + 4 + 6);
    // type tag + page id + key index + bitmap + integer
    assert_eq!(parameter.direct_value_object_size(), 1 + 4 + 4 + 1 + 4);
    assert_eq!(parameter.page_size(), 4096);
    assert_eq!(parameter.key_per_node(), 40);

    // The key table and the key objects fit a leaf page
    let key_per_node = parameter.key_per_node() as usize;
    let used = node_header_size(true)
        + (key_information_size(true, KeyPosType::KeyObject, 3)
            + parameter.direct_key_object_size())
            * key_per_node;
    let available =
        AreaManageGeometry::default().page_data_size(parameter.page_size(), key_per_node + 2);
    assert!(used <= available, "{used} > {available}");
}

#[test]
fn it_plans_small_fixed_keys_in_the_key_table() {
    let file_id = file_id(&[DataType::Integer], &[DataType::Integer]);
    let parameter = FileParameter::try_new(&file_id).expect("valid layout");
    assert!(!parameter.exist_variable_field_in_key());
    assert_eq!(parameter.key_pos_type(), KeyPosType::KeyInfo);
    assert_eq!(parameter.key_size(), 4);
    assert_eq!(parameter.direct_key_object_size(), 0);
    // (object id + bitmap + key) per entry in 4023 - 28 bytes
    assert_eq!(parameter.key_per_node(), 363);
    assert_eq!(parameter.node_merge_check_threshold(), 90);
    assert_eq!(parameter.node_merge_execute_threshold(), 363);
}

#[test]
fn it_externalizes_wide_fixed_keys() {
    let file_id = file_id(&[DataType::Integer64, DataType::Integer], &[]);
    let parameter = FileParameter::try_new(&file_id).expect("valid layout");
    assert_eq!(parameter.value_num(), 0);
    assert_eq!(parameter.key_pos_type(), KeyPosType::KeyObject);
    assert_eq!(parameter.direct_key_object_size(), 1 + 1 + 8 + 4);
    // No value fields still needs the value header
    assert_eq!(parameter.direct_value_object_size(), 1 + 4 + 4);
}

#[test]
fn it_halves_the_page_for_unlimited_outside_keys() {
    let file_id = file_id(&[DataType::String], &[]);
    let parameter = FileParameter::try_new(&file_id).expect("valid layout");
    assert_eq!(parameter.outside_key_field_total_length_max(), None);
    assert_eq!(parameter.key_per_node(), 80);

    let config = LayoutConfig {
        outside_key_page_rate: 100,
        ..Default::default()
    };
    let whole = FileParameter::try_new_with(&file_id, &config, &AreaManageGeometry::default())
        .expect("valid layout");
    assert_eq!(whole.key_per_node(), 165);
    assert_eq!(whole.config(), &config);
}

#[test]
fn it_keeps_short_variable_fields_inside() {
    let mut file_id = file_id(&[DataType::Integer], &[DataType::String, DataType::String]);
    file_id
        .set_integer(ParameterKey::FieldLength(2), 8)
        .set_integer(ParameterKey::FieldLength(3), 9);
    let parameter = FileParameter::try_new(&file_id).expect("valid layout");

    let inside = parameter.field(2).expect("field 2");
    assert!(!inside.fixed);
    assert!(!inside.outside);
    assert_eq!(inside.archive_size(), 1 + 8);

    let outside = parameter.field(3).expect("field 3");
    assert!(outside.outside);
    assert_eq!(outside.archive_size(), 6);

    assert!(parameter.exist_variable_field_in_value());
    assert!(parameter.exist_outside_field_in_value());
    assert!(!parameter.exist_variable_field_in_key());
}

#[test]
fn it_describes_array_fields() {
    let mut file_id = file_id(&[DataType::Integer], &[DataType::Array]);
    file_id
        .set_integer(ParameterKey::ElementType(2), DataType::String.code())
        .set_integer(ParameterKey::FieldLength(2), 10)
        .set_integer(ParameterKey::ElementLength(2), 20);
    let parameter = FileParameter::try_new(&file_id).expect("valid layout");

    let field = parameter.field(2).expect("field 2");
    assert!(field.fixed);
    assert!(field.outside);
    assert_eq!(field.archive_size(), 6);
    assert_eq!(
        field.array,
        Some(ArrayDescriptor {
            element_type: DataType::String,
            max_count: Some(10),
            fixed_element: false,
            element_max_length: Some(20),
        })
    );
    assert!(parameter.exist_array_field_in_value());
    assert!(parameter.exist_outside_field_in_value());
    assert_eq!(
        parameter.file_id().get_integer(ParameterKey::ElementLength(2)),
        Some(20)
    );
}

#[test]
fn it_reads_sort_orders() {
    let mut file_id = file_id(&[DataType::Integer, DataType::Double], &[]);
    file_id.set_boolean(ParameterKey::FieldSortOrder(1), true);
    let parameter = FileParameter::try_new(&file_id).expect("valid layout");
    let multipliers: Vec<_> = parameter.fields().iter().map(|f| f.multiplier).collect();
    assert_eq!(multipliers, vec![1, -1, 1]);
    assert_eq!(
        parameter.field(1).map(|f| f.sort_order),
        Some(SortOrder::Descending)
    );
    assert_eq!(
        parameter
            .file_id()
            .get_boolean(ParameterKey::FieldSortOrder(1)),
        Some(true)
    );
    assert!(!parameter
        .file_id()
        .contains(ParameterKey::FieldSortOrder(2)));
}

#[test]
fn it_grows_the_page_for_an_explicit_fan_out() {
    let mut file_id = file_id(&[DataType::String], &[]);
    file_id.set_integer(ParameterKey::KeyObjectPerNode, 1000);
    let parameter = FileParameter::try_new(&file_id).expect("valid layout");
    assert_eq!(parameter.key_per_node(), 1000);
    // 12 bytes per entry needs more than 8K
    assert_eq!(parameter.page_size(), 16 << 10);
    assert_eq!(
        parameter.file_id().get_integer(ParameterKey::PageSize),
        Some(16)
    );
    assert_eq!(parameter.tree_storage_strategy().page_size, 16 << 10);
}

#[test]
fn it_grows_the_page_for_a_wide_key() {
    let keys = vec![DataType::Integer; 1000];
    let parameter = FileParameter::try_new(&file_id(&keys, &[])).expect("valid layout");
    assert!(parameter.direct_key_object_size() > 4096);
    assert!(parameter.page_size() >= 8 << 10);
    assert!(parameter.key_per_node() >= 2);
}

#[test]
fn it_reports_unsatisfiable_layouts() {
    let small = AreaManageGeometry {
        max_page_size: 8 << 10,
    };
    let keys = vec![DataType::Integer; 1000];
    let result =
        FileParameter::try_new_with(&file_id(&keys, &[]), &LayoutConfig::default(), &small);
    assert!(matches!(result, Err(BtreeError::NotSupported(_))), "{result:?}");

    let mut file_id = file_id(&[DataType::String], &[]);
    file_id.set_integer(ParameterKey::KeyObjectPerNode, 1000);
    let result = FileParameter::try_new_with(&file_id, &LayoutConfig::default(), &small);
    assert!(matches!(result, Err(BtreeError::NotSupported(_))), "{result:?}");
}

#[test]
fn it_always_branches() {
    let key_types = [
        DataType::Integer,
        DataType::UnsignedInteger64,
        DataType::String,
        DataType::Double,
        DataType::DateTime,
        DataType::ObjectId,
    ];
    let lengths = [None, Some(1), Some(8), Some(9), Some(300), Some(4000)];
    for key_count in 1..=4 {
        for (t, length) in key_types.iter().zip(lengths.iter().cycle().skip(key_count)) {
            let keys = vec![*t; key_count];
            let mut file_id = file_id(&keys, &[DataType::String, DataType::Float]);
            if let Some(length) = length {
                for i in 1..=key_count {
                    file_id.set_integer(ParameterKey::FieldLength(i), *length);
                }
            }
            let parameter = FileParameter::try_new(&file_id).expect("valid layout");
            assert!(
                parameter.key_per_node() >= 2,
                "{keys:?} {length:?}: {}",
                parameter.key_per_node()
            );
            assert!(parameter.page_size() <= MAX_PAGE_SIZE);
        }
    }
}

#[test]
fn it_plans_identically_from_identical_input() {
    let mut input = file_id(
        &[DataType::String, DataType::Date],
        &[DataType::Binary, DataType::Array],
    );
    input
        .set_integer(ParameterKey::FieldLength(1), 40)
        .set_integer(ParameterKey::ElementType(4), DataType::Integer.code())
        .set_string(ParameterKey::FileHint, "NodeMergeCheckRate=40")
        .set_integer(ParameterKey::Unique, 2)
        .set_integer(ParameterKey::Version, 3);

    let first = FileParameter::try_new(&input).expect("valid layout");
    let second = FileParameter::try_new(&input).expect("valid layout");
    let first_bytes = BINCODER.serialize(&first.layout()).expect("serializes");
    let second_bytes = BINCODER.serialize(&second.layout()).expect("serializes");
    assert_eq!(first_bytes, second_bytes);

    // The normalized FileID is a complete description
    let again = FileParameter::try_new(first.file_id()).expect("valid layout");
    assert_eq!(again.layout(), first.layout());
    assert_eq!(again.file_id(), first.file_id());
    assert_eq!(first.unique(), UniqueType::Key);
    assert_eq!(first.file_id().get_integer(ParameterKey::Version), Some(3));
}

#[test]
fn it_derives_merge_thresholds_from_the_hint() {
    let mut file_id = file_id(&[DataType::Integer], &[DataType::Integer]);
    file_id.set_string(
        ParameterKey::FileHint,
        "NodeKeyDivideRate=70, NodeMergeCheckRate=10, NodeMergeExecuteRate=50",
    );
    let parameter = FileParameter::try_new(&file_id).expect("valid layout");
    assert_eq!(parameter.node_key_divide_rate(), 70);
    assert_eq!(parameter.node_merge_check_threshold(), 36);
    assert_eq!(parameter.node_merge_execute_threshold(), 181);
    assert_eq!(parameter.file_hint().node_merge_check_rate, 10);
}

#[test]
fn it_derives_storage_strategies() {
    let parameter =
        FileParameter::try_new(&file_id(&[DataType::Integer], &[])).expect("valid layout");
    let tree = parameter.tree_storage_strategy();
    assert_eq!(tree.master_path, PathBuf::from("/var/sydney/t1/Tree"));
    assert_eq!(tree.version_log_path.as_deref(), Some(tree.master_path.as_path()));
    assert_eq!(tree.sync_log_path.as_deref(), Some(tree.master_path.as_path()));
    assert!(tree.mounted);
    assert_eq!(tree.page_use_rate, 100);
    assert_eq!(tree.max_size, DEFAULT_FILE_MAX_SIZE);
    assert_eq!(tree.extension_size, DEFAULT_FILE_EXTENSION_SIZE);
    assert_eq!(
        parameter.value_storage_strategy().master_path,
        PathBuf::from("/var/sydney/t1/Value")
    );
    assert_eq!(parameter.buffering_category(), BufferingCategory::Normal);
}

#[test]
fn it_skips_logs_for_temporary_files() {
    let mut file_id = file_id(&[DataType::Integer], &[]);
    file_id
        .set_boolean(ParameterKey::Temporary, true)
        .set_boolean(ParameterKey::ReadOnly, true);
    let parameter = FileParameter::try_new(&file_id).expect("valid layout");
    assert!(parameter.is_temporary());
    assert!(parameter.is_read_only());
    assert_eq!(parameter.buffering_category(), BufferingCategory::Temporary);
    assert_eq!(parameter.tree_storage_strategy().version_log_path, None);
    assert_eq!(parameter.value_storage_strategy().sync_log_path, None);
}

#[test]
fn it_changes_the_file_path() {
    let mut parameter =
        FileParameter::try_new(&file_id(&[DataType::Integer], &[])).expect("valid layout");
    let layout = parameter.layout();
    parameter.change_btree_file_path("/srv/moved");
    assert_eq!(
        parameter.file_id().get_string(ParameterKey::Area(0)),
        Some("/srv/moved")
    );
    assert_eq!(
        parameter.value_storage_strategy().master_path,
        PathBuf::from("/srv/moved/Value")
    );
    assert_eq!(parameter.layout(), layout);
}

#[test]
fn it_normalizes_the_file_id() {
    let mut input = file_id(&[DataType::Integer], &[]);
    input
        .set_string(ParameterKey::Area(1), "/var/sydney/t1b")
        .set_integer(ParameterKey::DatabaseId, 7)
        .set_string(ParameterKey::SearchStart(0), "ignored");
    let parameter = FileParameter::try_new(&input).expect("valid layout");
    let normalized = parameter.file_id();
    assert_eq!(normalized.get_integer(ParameterKey::PageSize), Some(4));
    assert_eq!(normalized.get_boolean(ParameterKey::Temporary), Some(false));
    assert_eq!(normalized.get_boolean(ParameterKey::ReadOnly), Some(false));
    assert_eq!(
        normalized.get_string(ParameterKey::Area(1)),
        Some("/var/sydney/t1b")
    );
    assert_eq!(normalized.get_integer(ParameterKey::DatabaseId), Some(7));
    assert!(!normalized.contains(ParameterKey::SearchStart(0)));
    assert!(!normalized.contains(ParameterKey::Unique));
}

#[test]
fn it_rejects_bad_file_ids() {
    let valid = || file_id(&[DataType::Integer], &[DataType::String]);

    let mut no_area = valid();
    no_area.remove(ParameterKey::Area(0));
    assert_bad_argument(&no_area);

    let mut empty_area = valid();
    empty_area.set_string(ParameterKey::Area(0), "");
    assert_bad_argument(&empty_area);

    let mut zero_page = valid();
    zero_page.set_integer(ParameterKey::PageSize, 0);
    assert_bad_argument(&zero_page);

    let mut unmounted = valid();
    unmounted.remove(ParameterKey::Mounted);
    assert_bad_argument(&unmounted);

    let mut one_field = valid();
    one_field.set_integer(ParameterKey::FieldNumber, 1);
    assert_bad_argument(&one_field);

    for key_num in [0, 3] {
        let mut bad_keys = valid();
        bad_keys.set_integer(ParameterKey::KeyFieldNumber, key_num);
        assert_bad_argument(&bad_keys);
    }

    let mut bad_object_id = valid();
    bad_object_id.set_integer(ParameterKey::FieldType(0), DataType::Integer.code());
    assert_bad_argument(&bad_object_id);

    let mut missing_type = valid();
    missing_type.remove(ParameterKey::FieldType(2));
    assert_bad_argument(&missing_type);

    for data_type in [DataType::Decimal, DataType::Language] {
        let mut unsupported = valid();
        unsupported.set_integer(ParameterKey::FieldType(2), data_type.code());
        assert_bad_argument(&unsupported);
    }

    let mut unknown_type = valid();
    unknown_type.set_integer(ParameterKey::FieldType(2), 99);
    assert_bad_argument(&unknown_type);

    for data_type in [DataType::Binary, DataType::Array] {
        let mut bad_key = valid();
        bad_key.set_integer(ParameterKey::FieldType(1), data_type.code());
        assert_bad_argument(&bad_key);
    }

    for unique in [0, 3] {
        let mut bad_unique = valid();
        bad_unique.set_integer(ParameterKey::Unique, unique);
        assert_bad_argument(&bad_unique);
    }

    let mut narrow = valid();
    narrow.set_integer(ParameterKey::KeyObjectPerNode, 1);
    assert_bad_argument(&narrow);

    let mut negative = valid();
    negative.set_integer(ParameterKey::FieldLength(2), -1);
    assert_bad_argument(&negative);

    let mut no_element = valid();
    no_element.set_integer(ParameterKey::FieldType(2), DataType::Array.code());
    assert_bad_argument(&no_element);

    let mut bad_hint = valid();
    bad_hint.set_string(ParameterKey::FileHint, "NodeMergeExecuteRate=101");
    assert_bad_argument(&bad_hint);
}

#[test]
fn it_rejects_field_counts_without_field_types() {
    let mut file_id = file_id(&[DataType::Integer], &[DataType::String]);
    file_id.set_integer(ParameterKey::FieldNumber, i32::MAX);
    let result = FileParameter::try_new(&file_id);
    match result {
        Err(BtreeError::BadArgument(message)) => {
            assert!(message.contains("field index = 3"), "{message}")
        }
        other => panic!("unexpected {other:?}"),
    }
}
