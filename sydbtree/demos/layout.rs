use std::path::Path;

use anyhow::Result;

use sydbtree::btree::{FileParameter, KeyPosType};
use sydbtree::data::DataType;
use sydbtree::parameter::{FileId, ParameterKey};
use sydbtree::FileIdFile;

#[tokio::main]
async fn main() -> Result<()> {
    // Two integer keys and an unlimited string value
    let mut file_id = FileId::new();
    file_id
        .set_string(ParameterKey::Area(0), "/tmp/sydbtree-demo")
        .set_boolean(ParameterKey::Mounted, true)
        .set_integer(ParameterKey::FieldNumber, 4)
        .set_integer(ParameterKey::KeyFieldNumber, 2)
        .set_integer(ParameterKey::FieldType(0), DataType::ObjectId.code())
        .set_integer(ParameterKey::FieldType(1), DataType::Integer.code())
        .set_integer(ParameterKey::FieldType(2), DataType::Integer.code())
        .set_integer(ParameterKey::FieldType(3), DataType::String.code());

    // Plan the layout: small fixed keys sit in the key table
    let file = FileParameter::try_new(&file_id)?;
    assert_eq!(file.key_pos_type(), KeyPosType::KeyInfo);
    assert!(file.key_per_node() >= 2);
    println!(
        "page size {}, {} keys per node",
        file.page_size(),
        file.key_per_node()
    );

    // Persist the normalized FileID and plan again from it
    let id_file = FileIdFile::try_new(Path::new("layout.sid"), file.file_id()).await?;
    drop(id_file);
    let mut id_file = FileIdFile::try_open(Path::new("layout.sid")).await?;
    let again = FileParameter::try_new(&id_file.read().await?)?;
    assert_eq!(again.layout(), file.layout());

    std::fs::remove_file("layout.sid")?;
    Ok(())
}
