//! Column-at-a-time accumulation and serialization.
//!
//! A [`ColumnStore`] receives one value per row, is sealed with
//! [`ColumnStore::end_stores`], and can then report its header cards and
//! stream its data as a single column-oriented binary table cell: all rows of
//! the column laid end to end.

use std::io::{self, Write};

use tracing::{debug, warn};

use crate::card::{CardFactory, CardImage};
use crate::column::header::BintableColumnHeader;
use crate::column::value::{ColumnInfo, ColumnKind, ColumnValue, ScalarType};
use crate::config::{ColumnConfig, Staging};
use crate::endian::{write_f32s_be, write_f64s_be, write_ints_be};
use crate::error::{Error, Result};
use crate::store::{ByteStore, Counted, FileByteStore, MemoryByteStore};

/// Accumulates the values of one column.
///
/// Calls follow the sequence `store_value`* → `end_stores` → any number of
/// `data_length`, `stream_data` and `header_cards` → `dispose`. Repeated
/// `stream_data` calls write identical bytes.
pub trait ColumnStore: Send {
    /// Append the next row's value.
    fn store_value(&mut self, value: &ColumnValue) -> Result<()>;

    /// Seal the store; no further values are accepted.
    fn end_stores(&mut self) -> Result<()>;

    /// Exact number of bytes [`ColumnStore::stream_data`] writes.
    fn data_length(&self) -> Result<u64>;

    /// Write the serialized column.
    fn stream_data(&mut self, dest: &mut dyn Write) -> Result<()>;

    /// The cards describing this column, named through `colhead`. `jcol` is
    /// the 1-based column number used in card comments.
    fn header_cards(&self, colhead: &dyn BintableColumnHeader, jcol: usize) -> Result<Vec<CardImage>>;

    /// Release staging resources.
    fn dispose(self: Box<Self>) -> Result<()>;
}

const FLAG_GOOD: u8 = 1;
const FLAG_BAD: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Accumulating,
    Sealed,
}

/// Facts gathered while storing that fix the output layout.
#[derive(Debug, Default)]
struct Stats {
    has_null: bool,
    saw_min: bool,
    saw_max: bool,
    /// Longest string in bytes, or longest variable array in elements.
    max_len: usize,
}

/// Output layout decided at `end_stores`.
#[derive(Debug, Clone)]
struct Layout {
    /// Elements per row.
    items: usize,
    /// Stored value used for integer nulls.
    null_value: Option<i64>,
}

/// A [`ColumnStore`] that stages values in a [`ByteStore`].
///
/// Fixed-width data (logicals, floats, fixed arrays) is staged in its final
/// form. Integers are staged with a validity flag so a null sentinel can be
/// chosen once every value has been seen; strings and variable arrays are
/// staged with a length prefix and padded on output.
pub struct FileColumnStore {
    kind: ColumnKind,
    info: ColumnInfo,
    pad_byte: u8,
    allow_zero_length_string: bool,
    factory: CardFactory,
    staging: Box<dyn ByteStore>,
    state: State,
    nrow: u64,
    stats: Stats,
    layout: Option<Layout>,
}

impl FileColumnStore {
    pub fn new(kind: ColumnKind, info: ColumnInfo, config: &ColumnConfig) -> Self {
        let staging: Box<dyn ByteStore> = match &config.staging {
            Staging::File(store) => Box::new(FileByteStore::with_config(store.clone())),
            Staging::Memory => Box::new(MemoryByteStore::new()),
        };
        FileColumnStore {
            kind,
            info,
            pad_byte: config.pad_byte,
            allow_zero_length_string: config.allow_zero_length_string,
            factory: config.card_factory,
            staging,
            state: State::Accumulating,
            nrow: 0,
            stats: Stats::default(),
            layout: None,
        }
    }

    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    pub fn info(&self) -> &ColumnInfo {
        &self.info
    }

    /// Rows stored so far.
    pub fn row_count(&self) -> u64 {
        self.nrow
    }

    fn layout(&self) -> Result<&Layout> {
        match (&self.state, &self.layout) {
            (State::Sealed, Some(layout)) => Ok(layout),
            _ => Err(Error::IllegalState("column store is not sealed")),
        }
    }

    /// Choose the stored integer used for nulls: the type minimum, else the
    /// maximum. `None` if the column has no nulls or both are taken by data.
    fn choose_null(&self, ty: ScalarType) -> Option<i64> {
        if !self.stats.has_null {
            return None;
        }
        let (min, max) = ty.integer_range()?;
        let logical = if !self.stats.saw_min {
            min
        } else if !self.stats.saw_max {
            max
        } else {
            warn!(
                column = %self.info.name,
                "no free value for nulls; they are written as 0x80.. with no TNULL"
            );
            return None;
        };
        Some(logical - ty.zero_offset().unwrap_or(0))
    }

    fn tdim(&self, layout: &Layout) -> String {
        let mut dims: Vec<String> = match &self.kind {
            ColumnKind::Scalar(_) => Vec::new(),
            ColumnKind::FixedArray { shape, .. } => shape.iter().map(usize::to_string).collect(),
            ColumnKind::String | ColumnKind::VariableArray { .. } => vec![layout.items.to_string()],
        };
        dims.push(self.nrow.to_string());
        format!("({})", dims.join(","))
    }

    fn element(&self) -> Option<ScalarType> {
        match &self.kind {
            ColumnKind::Scalar(t) => Some(*t),
            ColumnKind::String => None,
            ColumnKind::FixedArray { element, .. } | ColumnKind::VariableArray { element } => {
                Some(*element)
            }
        }
    }

    fn element_size(&self) -> usize {
        self.element().map_or(1, ScalarType::size)
    }
}

impl ColumnStore for FileColumnStore {
    fn store_value(&mut self, value: &ColumnValue) -> Result<()> {
        if self.state != State::Accumulating {
            return Err(Error::IllegalState("value stored after end_stores"));
        }
        let rec = encode(&self.kind, &mut self.stats, value)?;
        self.staging.stream()?.write_all(&rec)?;
        self.nrow += 1;
        Ok(())
    }

    fn end_stores(&mut self) -> Result<()> {
        if self.state != State::Accumulating {
            return Err(Error::IllegalState("end_stores called twice"));
        }
        let layout = match &self.kind {
            ColumnKind::Scalar(ty) => Layout {
                items: 1,
                null_value: self.choose_null(*ty),
            },
            ColumnKind::String => {
                let min = if self.allow_zero_length_string { 0 } else { 1 };
                Layout {
                    items: self.stats.max_len.max(min),
                    null_value: None,
                }
            }
            ColumnKind::FixedArray { shape, .. } => Layout {
                items: shape.iter().product(),
                null_value: None,
            },
            ColumnKind::VariableArray { .. } => Layout {
                items: self.stats.max_len,
                null_value: None,
            },
        };
        debug!(
            column = %self.info.name,
            rows = self.nrow,
            staged = self.staging.position(),
            items = layout.items,
            "sealed column"
        );
        self.layout = Some(layout);
        self.state = State::Sealed;
        Ok(())
    }

    fn data_length(&self) -> Result<u64> {
        let layout = self.layout()?;
        Ok(self.nrow * (layout.items * self.element_size()) as u64)
    }

    fn stream_data(&mut self, dest: &mut dyn Write) -> Result<()> {
        let layout = self.layout()?.clone();
        let expected = self.data_length()?;
        let mut sink = Counted::new(dest);
        match &self.kind {
            ColumnKind::Scalar(ty) if ty.integer_range().is_some() => {
                let mut fill = Vec::new();
                match layout.null_value {
                    Some(null) => put_integer(&mut fill, *ty, null + ty.zero_offset().unwrap_or(0)),
                    None => {
                        fill.resize(ty.size(), 0);
                        fill[0] = 0x80;
                    }
                }
                let mut decoder = Unstager::new(&mut sink, Record::Flagged { size: ty.size(), null: fill });
                self.staging.copy_to(&mut decoder)?;
                decoder.finish()?;
            }
            ColumnKind::String => {
                let record = Record::Counted {
                    size: 1,
                    items: layout.items,
                    blank: vec![self.pad_byte],
                };
                let mut decoder = Unstager::new(&mut sink, record);
                self.staging.copy_to(&mut decoder)?;
                decoder.finish()?;
            }
            ColumnKind::VariableArray { element } => {
                let record = Record::Counted {
                    size: element.size(),
                    items: layout.items,
                    blank: blank_elements(*element, 1),
                };
                let mut decoder = Unstager::new(&mut sink, record);
                self.staging.copy_to(&mut decoder)?;
                decoder.finish()?;
            }
            _ => self.staging.copy_to(&mut sink)?,
        }
        if sink.count != expected {
            return Err(Error::CorruptStaging(format!(
                "column {} wrote {} bytes, expected {expected}",
                self.info.name, sink.count
            )));
        }
        Ok(())
    }

    fn header_cards(&self, colhead: &dyn BintableColumnHeader, jcol: usize) -> Result<Vec<CardImage>> {
        let layout = self.layout()?;
        let f = self.factory;
        let code = self.element().map_or('A', ScalarType::tform_char);
        let count = layout.items as u64 * self.nrow;
        let note = |what: &str| format!("{what} for column {jcol}");

        let mut cards = Vec::new();
        if !self.info.name.trim().is_empty() {
            cards.push(f.string_card(
                &colhead.key_name("TTYPE"),
                &self.info.name,
                Some(note("label").as_str()),
            )?);
        }
        cards.extend([
            f.string_card(
                &colhead.key_name("TFORM"),
                &format!("{count}{code}"),
                Some(note("format").as_str()),
            )?,
            f.string_card(
                &colhead.key_name("TDIM"),
                &self.tdim(layout),
                Some(note("dimensions").as_str()),
            )?,
        ]);
        if let Some(null) = layout.null_value {
            cards.push(f.integer_card(
                &colhead.key_name("TNULL"),
                null,
                Some(note("blank value").as_str()),
            )?);
        }
        if let Some(zero) = self.element().and_then(ScalarType::zero_offset) {
            cards.push(f.integer_card(
                &colhead.key_name("TZERO"),
                zero,
                Some(note("offset").as_str()),
            )?);
        }
        let described = [
            ("TUNIT", &self.info.unit, "units"),
            ("TCOMM", &self.info.description, "description"),
            ("TUCD", &self.info.ucd, "UCD"),
            ("TUTYP", &self.info.utype, "Utype"),
        ];
        for (root, text, what) in described {
            if let Some(text) = text.as_deref().filter(|t| !t.trim().is_empty()) {
                cards.push(f.string_card(
                    &colhead.key_name(root),
                    text,
                    Some(note(what).as_str()),
                )?);
            }
        }
        Ok(cards)
    }

    fn dispose(self: Box<Self>) -> Result<()> {
        debug!(column = %self.info.name, "disposing column store");
        self.staging.dispose()?;
        Ok(())
    }
}

impl std::fmt::Debug for FileColumnStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileColumnStore")
            .field("kind", &self.kind)
            .field("name", &self.info.name)
            .field("state", &self.state)
            .field("nrow", &self.nrow)
            .finish()
    }
}

/// Stage `value` in the form it will be written, or with a flag or length
/// prefix where the output depends on values not yet seen.
fn encode(kind: &ColumnKind, stats: &mut Stats, value: &ColumnValue) -> Result<Vec<u8>> {
    let mismatch = || Error::TypeMismatch {
        expected: kind.name(),
        actual: value.type_name(),
    };
    let mut rec = Vec::new();
    match kind {
        ColumnKind::Scalar(ScalarType::Logical) => match value {
            ColumnValue::Logical(b) => rec.push(if *b { b'T' } else { b'F' }),
            ColumnValue::Null => rec.push(0),
            _ => return Err(mismatch()),
        },
        ColumnKind::Scalar(ScalarType::Float) => match value {
            ColumnValue::Float(f) => write_f32s_be(&mut rec, &[*f])?,
            ColumnValue::Null => write_f32s_be(&mut rec, &[f32::NAN])?,
            _ => return Err(mismatch()),
        },
        ColumnKind::Scalar(ScalarType::Double) => match value {
            ColumnValue::Double(f) => write_f64s_be(&mut rec, &[*f])?,
            ColumnValue::Null => write_f64s_be(&mut rec, &[f64::NAN])?,
            _ => return Err(mismatch()),
        },
        ColumnKind::Scalar(ty) => {
            let (min, max) = ty.integer_range().ok_or_else(mismatch)?;
            if *value == ColumnValue::Null {
                stats.has_null = true;
                rec.push(FLAG_BAD);
                put_integer(&mut rec, *ty, 0);
            } else {
                let n = value.integer_of(*ty).ok_or_else(mismatch)?;
                stats.saw_min |= n == min;
                stats.saw_max |= n == max;
                rec.push(FLAG_GOOD);
                put_integer(&mut rec, *ty, n);
            }
        }
        ColumnKind::String => {
            let text = match value {
                ColumnValue::String(s) => s.as_str(),
                ColumnValue::Null => "",
                _ => return Err(mismatch()),
            };
            let bytes: Vec<u8> = text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect();
            stats.max_len = stats.max_len.max(bytes.len());
            put_len(&mut rec, bytes.len())?;
            rec.extend_from_slice(&bytes);
        }
        ColumnKind::FixedArray { element, shape } => {
            let nel: usize = shape.iter().product();
            rec = match array_payload(*element, value).map_err(|_| mismatch())? {
                Some((count, bytes)) if count == nel => bytes,
                _ => blank_elements(*element, nel),
            };
        }
        ColumnKind::VariableArray { element } => {
            match array_payload(*element, value).map_err(|_| mismatch())? {
                Some((count, bytes)) => {
                    stats.max_len = stats.max_len.max(count);
                    put_len(&mut rec, count)?;
                    rec.extend_from_slice(&bytes);
                }
                None => put_len(&mut rec, 0)?,
            }
        }
    }
    Ok(rec)
}

fn put_len(rec: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| Error::CorruptStaging(format!("cell of {len} items is too long")))?;
    rec.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

/// Append integer `n` of type `ty` in stored form: offset by `TZERO` and
/// big-endian.
fn put_integer(rec: &mut Vec<u8>, ty: ScalarType, n: i64) {
    match ty {
        ScalarType::Byte => rec.push(n as u8),
        ScalarType::SignedByte => rec.push((n as i8 as u8) ^ 0x80),
        ScalarType::Short => rec.extend_from_slice(&(n as i16).to_be_bytes()),
        ScalarType::Int => rec.extend_from_slice(&(n as i32).to_be_bytes()),
        _ => rec.extend_from_slice(&n.to_be_bytes()),
    }
}

/// `count` elements of the blank value for `element`: NaN for floats, zero
/// bytes otherwise.
fn blank_elements(element: ScalarType, count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(count * element.size());
    match element {
        ScalarType::Float => {
            for _ in 0..count {
                out.extend_from_slice(&f32::NAN.to_be_bytes());
            }
        }
        ScalarType::Double => {
            for _ in 0..count {
                out.extend_from_slice(&f64::NAN.to_be_bytes());
            }
        }
        _ => out.resize(count * element.size(), 0),
    }
    out
}

/// Encoded elements of an array value: `Ok(None)` for null, `Err(())` when
/// the value does not match `element`.
fn array_payload(element: ScalarType, value: &ColumnValue) -> std::result::Result<Option<(usize, Vec<u8>)>, ()> {
    let mut out = Vec::new();
    let count = match (element, value) {
        (_, ColumnValue::Null) => return Ok(None),
        (ScalarType::Logical, ColumnValue::LogicalArray(v)) => {
            out.extend(v.iter().map(|&b| if b { b'T' } else { b'F' }));
            v.len()
        }
        (ScalarType::Byte, ColumnValue::ByteArray(v)) => {
            out.extend_from_slice(v);
            v.len()
        }
        (ScalarType::SignedByte, ColumnValue::SignedByteArray(v)) => {
            out.extend(v.iter().map(|&b| (b as u8) ^ 0x80));
            v.len()
        }
        (ScalarType::Short, ColumnValue::ShortArray(v)) => {
            write_ints_be(&mut out, v).map_err(|_| ())?;
            v.len()
        }
        (ScalarType::Int, ColumnValue::IntArray(v)) => {
            write_ints_be(&mut out, v).map_err(|_| ())?;
            v.len()
        }
        (ScalarType::Long, ColumnValue::LongArray(v)) => {
            write_ints_be(&mut out, v).map_err(|_| ())?;
            v.len()
        }
        (ScalarType::Float, ColumnValue::FloatArray(v)) => {
            write_f32s_be(&mut out, v).map_err(|_| ())?;
            v.len()
        }
        (ScalarType::Double, ColumnValue::DoubleArray(v)) => {
            write_f64s_be(&mut out, v).map_err(|_| ())?;
            v.len()
        }
        _ => return Err(()),
    };
    Ok(Some((count, out)))
}


/// Format of one staged record.
enum Record {
    /// Flag byte then a `size`-byte value; bad values are replaced by `null`.
    Flagged { size: usize, null: Vec<u8> },
    /// Big-endian `u32` element count then that many `size`-byte elements,
    /// padded with `blank` to `items` elements.
    Counted { size: usize, items: usize, blank: Vec<u8> },
}

/// Turns staged records back into output bytes as they are replayed.
struct Unstager<'a, W: Write + ?Sized> {
    dest: &'a mut W,
    record: Record,
    pending: Vec<u8>,
}

impl<'a, W: Write + ?Sized> Unstager<'a, W> {
    fn new(dest: &'a mut W, record: Record) -> Self {
        Unstager {
            dest,
            record,
            pending: Vec::new(),
        }
    }

    /// Emit every complete record in `pending`, returning bytes consumed.
    fn drain_records(&mut self) -> io::Result<usize> {
        let mut at = 0;
        let buf = &self.pending;
        match &self.record {
            Record::Flagged { size, null } => {
                while buf.len() - at > *size {
                    let value = &buf[at + 1..at + 1 + size];
                    match buf[at] {
                        FLAG_GOOD => self.dest.write_all(value)?,
                        FLAG_BAD => self.dest.write_all(null)?,
                        flag => {
                            return Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                format!("bad staging flag {flag}"),
                            ))
                        }
                    }
                    at += 1 + size;
                }
            }
            Record::Counted { size, items, blank } => {
                while buf.len() - at >= 4 {
                    let mut len = [0u8; 4];
                    len.copy_from_slice(&buf[at..at + 4]);
                    let count = u32::from_be_bytes(len) as usize;
                    if count > *items {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("staged cell of {count} items exceeds width {items}"),
                        ));
                    }
                    let end = at + 4 + count * size;
                    if buf.len() < end {
                        break;
                    }
                    self.dest.write_all(&buf[at + 4..end])?;
                    for _ in count..*items {
                        self.dest.write_all(blank)?;
                    }
                    at = end;
                }
            }
        }
        Ok(at)
    }

    fn finish(self) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(Error::CorruptStaging(format!(
                "{} trailing bytes in staged column",
                self.pending.len()
            )))
        }
    }
}

impl<W: Write + ?Sized> Write for Unstager<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        let used = self.drain_records()?;
        self.pending.drain(..used);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.dest.flush()
    }
}
