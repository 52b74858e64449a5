//! Column-oriented FITS files.
//!
//! A column-oriented file holds an empty primary HDU followed by a `BINTABLE`
//! extension with exactly one row. Each column is a single cell containing all
//! of the table's values for that column, so a column can be read with one
//! contiguous access however many rows the table has.

use std::io::Write;

use tracing::debug;

use crate::block::{padded_byte_len, write_padding, DATA_PAD_BYTE};
use crate::card::{CardFactory, CardImage};
use crate::column::{BintableColumnHeader, ColumnStore, StandardColumnHeader};
use crate::endian::{decode_be, BeScalar};
use crate::error::{Error, Result};
use crate::header::{is_fits_magic, read_header, write_header, Header};
use crate::mapped::BlockInput;

/// Writes sealed [`ColumnStore`]s as a column-oriented FITS file.
#[derive(Debug, Clone, Default)]
pub struct ColFitsWriter {
    factory: CardFactory,
    extname: Option<String>,
}

impl ColFitsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn card_factory(mut self, factory: CardFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn extname(mut self, name: impl Into<String>) -> Self {
        self.extname = Some(name.into());
        self
    }

    /// The primary header: no data, extensions follow.
    pub fn primary_cards(&self) -> Result<Vec<CardImage>> {
        let f = self.factory;
        Ok(vec![
            f.logical_card("SIMPLE", true, Some("conforms to FITS standard"))?,
            f.integer_card("BITPIX", 8, Some("no data"))?,
            f.integer_card("NAXIS", 0, Some("no data"))?,
            f.logical_card("EXTEND", true, Some("extensions follow"))?,
        ])
    }

    /// The `BINTABLE` header for `columns`, which must all be sealed.
    /// `colhead(jcol)` supplies the keyword resolver for 1-based column `jcol`.
    pub fn table_cards<H>(&self, columns: &[Box<dyn ColumnStore>], colhead: H) -> Result<Vec<CardImage>>
    where
        H: Fn(usize) -> Box<dyn BintableColumnHeader>,
    {
        let f = self.factory;
        let mut row_len = 0u64;
        for column in columns {
            row_len += column.data_length()?;
        }
        let mut cards = vec![
            f.string_card("XTENSION", "BINTABLE", Some("binary table extension"))?,
            f.integer_card("BITPIX", 8, Some("8-bit bytes"))?,
            f.integer_card("NAXIS", 2, Some("2-dimensional table"))?,
            f.integer_card("NAXIS1", to_i64(row_len)?, Some("width of table in bytes"))?,
            f.integer_card("NAXIS2", 1, Some("single-row table"))?,
            f.integer_card("PCOUNT", 0, Some("size of special data area"))?,
            f.integer_card("GCOUNT", 1, Some("one data group"))?,
            f.integer_card("TFIELDS", to_i64(columns.len() as u64)?, Some("number of columns"))?,
        ];
        if let Some(name) = &self.extname {
            cards.push(f.string_card("EXTNAME", name, Some("table name"))?);
        }
        for (i, column) in columns.iter().enumerate() {
            let jcol = i + 1;
            cards.extend(column.header_cards(&*colhead(jcol), jcol)?);
        }
        Ok(cards)
    }

    /// Write a complete file with the standard column keywords. Returns the
    /// number of bytes written.
    pub fn write<W: Write + ?Sized>(&self, dest: &mut W, columns: &mut [Box<dyn ColumnStore>]) -> Result<u64> {
        self.write_with(dest, columns, |jcol| Box::new(StandardColumnHeader::new(jcol)))
    }

    /// Write a complete file, naming column keywords through `colhead`.
    pub fn write_with<W, H>(&self, dest: &mut W, columns: &mut [Box<dyn ColumnStore>], colhead: H) -> Result<u64>
    where
        W: Write + ?Sized,
        H: Fn(usize) -> Box<dyn BintableColumnHeader>,
    {
        let mut written = write_header(dest, &self.primary_cards()?)?;
        written += write_header(dest, &self.table_cards(columns, colhead)?)?;

        let mut data_len = 0u64;
        let mut out = &mut *dest;
        for column in columns.iter_mut() {
            column.stream_data(&mut out)?;
            data_len += column.data_length()?;
        }
        write_padding(out, data_len, DATA_PAD_BYTE)?;
        written += padded_byte_len(data_len);
        debug!(columns = columns.len(), bytes = written, "wrote column-oriented table");
        Ok(written)
    }
}

fn to_i64(n: u64) -> Result<i64> {
    i64::try_from(n).map_err(|_| Error::MalformedCard(format!("value {n} does not fit a header card")))
}

/// Location and format of one column in a column-oriented file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub name: Option<String>,
    /// `TFORMn` text, e.g. `1000J`.
    pub tform: String,
    /// Element type code.
    pub code: char,
    pub count: u64,
    /// Logical offset of the column's data in the input.
    pub offset: u64,
    pub len: u64,
}

/// Element width for a `TFORM` type code.
fn code_size(code: char) -> Option<u64> {
    match code {
        'L' | 'B' | 'A' | 'X' => Some(1),
        'I' => Some(2),
        'J' | 'E' => Some(4),
        'K' | 'D' | 'C' => Some(8),
        'M' => Some(16),
        _ => None,
    }
}

fn parse_tform(tform: &str) -> Result<(u64, char)> {
    let tform = tform.trim();
    let split = tform
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| Error::MalformedCard(format!("TFORM {tform:?} has no type code")))?;
    let count = if split == 0 {
        1
    } else {
        tform[..split]
            .parse()
            .map_err(|_| Error::MalformedCard(format!("bad TFORM repeat in {tform:?}")))?
    };
    let code = tform[split..]
        .chars()
        .next()
        .ok_or_else(|| Error::MalformedCard(format!("TFORM {tform:?} has no type code")))?;
    Ok((count, code))
}

/// Read access to a column-oriented file through a [`BlockInput`].
#[derive(Debug)]
pub struct ColFitsReader {
    input: BlockInput,
    header: Header,
    columns: Vec<ColumnLayout>,
}

impl ColFitsReader {
    /// Read the primary and table headers and lay out the columns.
    pub fn open(mut input: BlockInput) -> Result<Self> {
        let mut magic = [0u8; 10];
        input.seek_to(0);
        input.read_fully(&mut magic)?;
        if !is_fits_magic(&magic) {
            return Err(Error::MalformedCard(String::from("not a FITS file")));
        }
        input.seek_to(0);
        let primary = read_header(&mut input)?;
        input.skip(padded_byte_len(primary.data_len()?));

        let header = read_header(&mut input)?;
        if header.string("XTENSION").as_deref() != Some("BINTABLE") {
            return Err(Error::MalformedCard(String::from("first extension is not a BINTABLE")));
        }
        let nrow = header.integer("NAXIS2").unwrap_or(0);
        if nrow != 1 {
            return Err(Error::MalformedCard(format!(
                "column-oriented table must have one row, found {nrow}"
            )));
        }
        let tfields = header.integer("TFIELDS").unwrap_or(0).max(0) as usize;
        let mut offset = input.position();
        let mut columns = Vec::with_capacity(tfields);
        for jcol in 1..=tfields {
            let tform = header
                .string(&format!("TFORM{jcol}"))
                .ok_or_else(|| Error::MalformedCard(format!("missing TFORM{jcol}")))?;
            let (count, code) = parse_tform(&tform)?;
            let size = code_size(code)
                .ok_or_else(|| Error::MalformedCard(format!("unsupported TFORM code {code:?}")))?;
            let len = count
                .checked_mul(size)
                .ok_or_else(|| Error::MalformedCard(format!("TFORM{jcol} {tform:?} is too large")))?;
            columns.push(ColumnLayout {
                name: header.string(&format!("TTYPE{jcol}")),
                tform: tform.clone(),
                code,
                count,
                offset,
                len,
            });
            offset = offset
                .checked_add(len)
                .ok_or_else(|| Error::MalformedCard(format!("TFORM{jcol} {tform:?} is too large")))?;
        }
        let width = offset - input.position();
        let naxis1 = header.integer("NAXIS1").unwrap_or(0);
        if u64::try_from(naxis1).ok() != Some(width) {
            return Err(Error::MalformedCard(format!(
                "NAXIS1 = {naxis1} but columns occupy {width} bytes"
            )));
        }
        if offset > input.len() {
            return Err(Error::MalformedCard(format!(
                "columns end at byte {offset}, past the end of the input ({})",
                input.len()
            )));
        }
        debug!(columns = columns.len(), "opened column-oriented table");
        Ok(ColFitsReader { input, header, columns })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn columns(&self) -> &[ColumnLayout] {
        &self.columns
    }

    /// Index of the column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.as_deref() == Some(name))
    }

    /// Raw bytes of column `index` (0-based). Uses its own cursor, so readers
    /// may be shared across threads by reference.
    pub fn column_bytes(&self, index: usize) -> Result<Vec<u8>> {
        let layout = self
            .columns
            .get(index)
            .ok_or(Error::IllegalState("column index out of range"))?;
        let len = usize::try_from(layout.len)
            .map_err(|_| Error::IllegalState("column too large for memory"))?;
        let mut cursor = self.input.copy();
        cursor.seek_to(layout.offset);
        let mut buf = vec![0u8; len];
        cursor.read_fully(&mut buf)?;
        Ok(buf)
    }

    /// Values of a numeric column (0-based `index`).
    pub fn column_values<T: BeScalar>(&self, index: usize) -> Result<Vec<T>> {
        let layout = self
            .columns
            .get(index)
            .ok_or(Error::IllegalState("column index out of range"))?;
        let expected = code_size(layout.code).unwrap_or(0) as usize;
        if expected != T::SIZE {
            return Err(Error::TypeMismatch {
                expected: "element of matching width",
                actual: "requested element type",
            });
        }
        Ok(decode_be(&self.column_bytes(index)?))
    }

    /// Release the reader's blocks.
    pub fn close(self) {
        self.input.close();
    }
}
