//! FITS header assembly and reading.

use std::io::{Read, Write};

use crate::block::{checked_padded_byte_len, padded_byte_len, BLOCK_SIZE, CARD_SIZE, HEADER_PAD_BYTE};
use crate::card::{CardFactory, CardImage, ParsedCard};
use crate::error::{Error, Result};

use tracing::debug;

/// Bytes that open every FITS file: the `SIMPLE` keyword and value indicator.
pub const FITS_MAGIC: &[u8; 10] = b"SIMPLE  = ";

/// Returns `true` if `bytes` begins with the FITS primary header magic.
pub fn is_fits_magic(bytes: &[u8]) -> bool {
    bytes.len() >= FITS_MAGIC.len() && &bytes[..FITS_MAGIC.len()] == FITS_MAGIC
}

/// The cards of one header unit, excluding the terminating `END` card.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    cards: Vec<CardImage>,
}

impl Header {
    pub fn new(cards: Vec<CardImage>) -> Self {
        Header { cards }
    }

    pub fn cards(&self) -> &[CardImage] {
        &self.cards
    }

    /// Size of the header on disk, including `END` and block padding.
    pub fn byte_len(&self) -> u64 {
        padded_byte_len(((self.cards.len() + 1) * CARD_SIZE) as u64)
    }

    /// Parse the first card whose keyword equals `keyword`.
    pub fn find(&self, keyword: &str) -> Option<ParsedCard> {
        find_card(&self.cards, keyword)
    }

    pub fn integer(&self, keyword: &str) -> Option<i64> {
        self.find(keyword).and_then(|c| c.as_integer())
    }

    pub fn string(&self, keyword: &str) -> Option<String> {
        self.find(keyword)
            .and_then(|c| c.as_string().map(String::from))
    }

    /// Size in bytes of the data unit that follows this header, excluding
    /// padding: `|BITPIX|/8 * GCOUNT * (PCOUNT + NAXIS1 * ... * NAXISn)`.
    pub fn data_len(&self) -> Result<u64> {
        let bitpix = self
            .integer("BITPIX")
            .ok_or_else(|| Error::MalformedCard(String::from("missing BITPIX")))?;
        let naxis = self
            .integer("NAXIS")
            .ok_or_else(|| Error::MalformedCard(String::from("missing NAXIS")))?;
        if naxis == 0 {
            return Ok(0);
        }
        let overflow = || Error::MalformedCard(String::from("data unit size overflows"));
        let mut nel: u64 = 1;
        for i in 1..=naxis {
            let dim = self
                .integer(&format!("NAXIS{i}"))
                .ok_or_else(|| Error::MalformedCard(format!("missing NAXIS{i}")))?;
            nel = nel.checked_mul(dim.max(0) as u64).ok_or_else(overflow)?;
        }
        let pcount = self.integer("PCOUNT").unwrap_or(0).max(0) as u64;
        let gcount = self.integer("GCOUNT").unwrap_or(1).max(0) as u64;
        let len = pcount
            .checked_add(nel)
            .and_then(|n| n.checked_mul(gcount))
            .and_then(|n| n.checked_mul(bitpix.unsigned_abs() / 8))
            .ok_or_else(overflow)?;
        // Callers skip the padded length, so that must fit as well.
        checked_padded_byte_len(len).ok_or_else(overflow)?;
        Ok(len)
    }
}

/// Parse the first card in `cards` whose keyword equals `keyword`.
pub fn find_card(cards: &[CardImage], keyword: &str) -> Option<ParsedCard> {
    cards
        .iter()
        .find(|c| c.keyword() == keyword)
        .map(CardImage::parse)
}

/// Read 2880-byte header blocks from `input` until the `END` card.
///
/// The input is left positioned at the start of the data unit.
pub fn read_header<R: Read + ?Sized>(input: &mut R) -> Result<Header> {
    let mut cards = Vec::new();
    let mut block = [0u8; BLOCK_SIZE];
    loop {
        input.read_exact(&mut block).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
            _ => Error::Io(e),
        })?;
        for raw in block.chunks_exact(CARD_SIZE) {
            let card = CardImage::new(raw)?;
            if card.is_end() {
                debug!(cards = cards.len(), "read header");
                return Ok(Header { cards });
            }
            cards.push(card);
        }
    }
}

/// Serialize cards into complete header blocks.
///
/// Appends the `END` card and pads the final block with spaces; the result is
/// always a multiple of [`BLOCK_SIZE`].
pub fn serialize_header(cards: &[CardImage]) -> Vec<u8> {
    let total = padded_byte_len(((cards.len() + 1) * CARD_SIZE) as u64) as usize;
    let mut buf = Vec::with_capacity(total);
    for card in cards {
        buf.extend_from_slice(card.as_bytes());
    }
    buf.extend_from_slice(CardFactory::DEFAULT.end_card().as_bytes());
    buf.resize(total, HEADER_PAD_BYTE);
    buf
}

/// Write a serialized header to `dest`, returning the number of bytes written.
pub fn write_header<W: Write + ?Sized>(dest: &mut W, cards: &[CardImage]) -> Result<u64> {
    let bytes = serialize_header(cards);
    dest.write_all(&bytes)?;
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_cards() -> Vec<CardImage> {
        let f = CardFactory::DEFAULT;
        vec![
            f.logical_card("SIMPLE", true, None).unwrap(),
            f.integer_card("BITPIX", 8, None).unwrap(),
            f.integer_card("NAXIS", 0, None).unwrap(),
            f.string_card("ORIGIN", "test", Some("creator")).unwrap(),
        ]
    }

    #[test]
    fn magic_check() {
        let bytes = serialize_header(&sample_cards());
        assert!(is_fits_magic(&bytes));
        assert!(!is_fits_magic(b"XTENSION= 'BINTABLE'"));
        assert!(!is_fits_magic(b"SIMP"));
    }

    #[test]
    fn serialize_pads_to_block() {
        let bytes = serialize_header(&sample_cards());
        assert_eq!(bytes.len(), BLOCK_SIZE);
        assert_eq!(&bytes[4 * CARD_SIZE..4 * CARD_SIZE + 3], b"END");
        assert!(bytes[5 * CARD_SIZE..].iter().all(|&b| b == HEADER_PAD_BYTE));
    }

    #[test]
    fn serialize_exactly_36_cards_needs_two_blocks() {
        let f = CardFactory::DEFAULT;
        let cards: Vec<_> = (0..36)
            .map(|i| f.integer_card(&format!("KEY{i}"), i, None).unwrap())
            .collect();
        assert_eq!(serialize_header(&cards).len(), 2 * BLOCK_SIZE);
    }

    #[test]
    fn read_back_serialized_header() {
        let cards = sample_cards();
        let mut bytes = serialize_header(&cards);
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut cursor = Cursor::new(bytes);
        let header = read_header(&mut cursor).unwrap();
        assert_eq!(header.cards(), &cards[..]);
        assert_eq!(header.byte_len(), BLOCK_SIZE as u64);
        assert_eq!(cursor.position(), BLOCK_SIZE as u64);
        assert_eq!(header.string("ORIGIN").as_deref(), Some("test"));
        assert_eq!(header.integer("BITPIX"), Some(8));
        assert_eq!(header.data_len().unwrap(), 0);
    }

    #[test]
    fn read_truncated_header_is_eof() {
        let bytes = serialize_header(&sample_cards());
        let mut cursor = Cursor::new(&bytes[..BLOCK_SIZE - 1]);
        assert!(matches!(read_header(&mut cursor), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn read_header_without_end_is_eof() {
        let bytes = vec![b' '; BLOCK_SIZE];
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(read_header(&mut cursor), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn read_header_reports_malformed_card() {
        let mut bytes = serialize_header(&sample_cards());
        bytes[85] = 0x01;
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            read_header(&mut cursor),
            Err(Error::MalformedCard(_))
        ));
    }

    #[test]
    fn bintable_data_len() {
        let f = CardFactory::DEFAULT;
        let header = Header::new(vec![
            f.string_card("XTENSION", "BINTABLE", None).unwrap(),
            f.integer_card("BITPIX", 8, None).unwrap(),
            f.integer_card("NAXIS", 2, None).unwrap(),
            f.integer_card("NAXIS1", 4000, None).unwrap(),
            f.integer_card("NAXIS2", 1, None).unwrap(),
            f.integer_card("PCOUNT", 0, None).unwrap(),
            f.integer_card("GCOUNT", 1, None).unwrap(),
        ]);
        assert_eq!(header.data_len().unwrap(), 4000);
    }

    #[test]
    fn oversized_data_unit_is_an_error() {
        let f = CardFactory::DEFAULT;
        let header = Header::new(vec![
            f.string_card("XTENSION", "BINTABLE", None).unwrap(),
            f.integer_card("BITPIX", 8, None).unwrap(),
            f.integer_card("NAXIS", 2, None).unwrap(),
            f.integer_card("NAXIS1", i64::MAX, None).unwrap(),
            f.integer_card("NAXIS2", 4, None).unwrap(),
            f.integer_card("PCOUNT", 1, None).unwrap(),
        ]);
        assert!(matches!(header.data_len(), Err(Error::MalformedCard(_))));

        // Fits in u64 but not once padded to whole blocks.
        let header = Header::new(vec![
            f.integer_card("BITPIX", 8, None).unwrap(),
            f.integer_card("NAXIS", 1, None).unwrap(),
            f.integer_card("NAXIS1", i64::MAX, None).unwrap(),
            f.integer_card("PCOUNT", i64::MAX, None).unwrap(),
        ]);
        assert!(matches!(header.data_len(), Err(Error::MalformedCard(_))));
    }
}
