//! End-to-end tests: columns are staged, written as a column-oriented FITS
//! file, and read back through block-mapped inputs.

use std::io::Write;

use fitsio_blocks::colfits::{ColFitsReader, ColFitsWriter};
use fitsio_blocks::column::{
    ColumnInfo, ColumnKind, ColumnStore, ColumnValue, FileColumnStore, ScalarType,
};
use fitsio_blocks::config::{BlockConfig, ColumnConfig, MappingMode, StoreConfig};
use fitsio_blocks::endian::decode_be;
use fitsio_blocks::mapped::BlockInput;
use fitsio_blocks::store::{ByteStore, FileByteStore};
use fitsio_blocks::{Error, BLOCK_SIZE};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn filled(kind: ColumnKind, name: &str, values: impl IntoIterator<Item = ColumnValue>) -> Box<dyn ColumnStore> {
    let mut store = FileColumnStore::new(kind, ColumnInfo::new(name), &ColumnConfig::default());
    for v in values {
        store.store_value(&v).unwrap();
    }
    store.end_stores().unwrap();
    Box::new(store)
}

// ---------------------------------------------------------------------------
// Column stores
// ---------------------------------------------------------------------------

#[test]
fn thousand_ints() {
    let values: Vec<i32> = (0..1000).map(|i| i * 7919 - 3_000_000).collect();
    let mut store = filled(
        ColumnKind::Scalar(ScalarType::Int),
        "ints",
        values.iter().map(|&v| ColumnValue::Int(v)),
    );
    assert_eq!(store.data_length().unwrap(), 4000);
    let mut out = Vec::new();
    store.stream_data(&mut out).unwrap();
    assert_eq!(out.len(), 4000);
    assert_eq!(decode_be::<i32>(&out), values);
    store.dispose().unwrap();
}

#[test]
fn store_after_seal_is_illegal() {
    let mut store = filled(ColumnKind::Scalar(ScalarType::Float), "f", [ColumnValue::Float(1.0)]);
    assert!(matches!(
        store.store_value(&ColumnValue::Float(2.0)),
        Err(Error::IllegalState(_))
    ));
}

#[test]
fn file_store_holds_more_than_its_buffers() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::default()
        .buffer_size(4096)
        .copy_chunk_size(1000)
        .temp_dir(dir.path());
    let mut store = FileByteStore::with_config(config);
    let chunk: Vec<u8> = (0..=255u8).collect();
    for _ in 0..40_000 {
        store.stream().unwrap().write_all(&chunk).unwrap();
    }
    assert_eq!(store.position(), 40_000 * 256);

    let mut out = Vec::with_capacity(40_000 * 256);
    store.copy_to(&mut out).unwrap();
    assert_eq!(out.len(), 40_000 * 256);
    assert!(out.chunks(256).all(|c| c == &chunk[..]));

    Box::new(store).dispose().unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

// ---------------------------------------------------------------------------
// Whole files
// ---------------------------------------------------------------------------

#[test]
fn write_file_and_map_it_back() {
    let nrow = 5000;
    let mut columns = vec![
        filled(
            ColumnKind::Scalar(ScalarType::Long),
            "id",
            (0..nrow).map(|i| ColumnValue::Long(i as i64 * 1_000_000_007)),
        ),
        filled(
            ColumnKind::Scalar(ScalarType::Short),
            "flag",
            (0..nrow).map(|i| if i % 10 == 0 { ColumnValue::Null } else { ColumnValue::Short(i as i16 % 300) }),
        ),
        filled(
            ColumnKind::String,
            "label",
            (0..nrow).map(|i| ColumnValue::from(format!("row{i}"))),
        ),
        filled(
            ColumnKind::FixedArray {
                element: ScalarType::Double,
                shape: vec![3],
            },
            "pos",
            (0..nrow).map(|i| ColumnValue::DoubleArray(vec![i as f64, -(i as f64), 0.5])),
        ),
    ];

    let mut file = tempfile::NamedTempFile::new().unwrap();
    let written = ColFitsWriter::new()
        .extname("CATALOG")
        .write(file.as_file_mut(), &mut columns)
        .unwrap();
    file.as_file_mut().flush().unwrap();
    assert_eq!(written % BLOCK_SIZE as u64, 0);
    assert_eq!(std::fs::metadata(file.path()).unwrap().len(), written);
    for column in columns {
        column.dispose().unwrap();
    }

    // Small blocks so every column spans several mappings.
    let config = BlockConfig::default().block_size(10_000).mapping(MappingMode::Mmap);
    let handle = std::fs::File::open(file.path()).unwrap();
    let reader = ColFitsReader::open(BlockInput::open(handle, 0, written, &config).unwrap()).unwrap();
    assert_eq!(reader.header().string("EXTNAME").as_deref(), Some("CATALOG"));
    assert_eq!(reader.header().string("TFORM3").as_deref(), Some("35000A"));
    assert_eq!(reader.header().string("TDIM4").as_deref(), Some("(3,5000)"));
    assert_eq!(reader.header().integer("TNULL2"), Some(i16::MIN as i64));

    let ids: Vec<i64> = reader.column_values(0).unwrap();
    assert_eq!(ids[4321], 4321 * 1_000_000_007);

    let flags: Vec<i16> = reader.column_values(1).unwrap();
    assert_eq!(flags[10], i16::MIN);
    assert_eq!(flags[11], 11);

    let labels = reader.column_bytes(2).unwrap();
    assert_eq!(&labels[..7], b"row0   ");
    assert_eq!(&labels[7 * 4999..], b"row4999");

    let pos: Vec<f64> = reader.column_values(3).unwrap();
    assert_eq!(&pos[3 * 42..3 * 43], &[42.0, -42.0, 0.5]);
    reader.close();
}
