//! FITS header card codec.
//!
//! A [`CardImage`] is exactly 80 printable ASCII bytes and can only be
//! constructed from input that satisfies that contract. Decoding a card into a
//! [`ParsedCard`] never fails: cards whose value section is absent or not
//! recognisable decode to [`CardValue::NoValue`] or commentary text.
//! [`CardFactory`] builds well-formed cards from typed values.

use core::fmt;
use core::str::{self, FromStr};

use crate::block::CARD_SIZE;
use crate::error::{Error, Result};
use crate::value::{format_float, format_value, parse_quoted, parse_value, split_comment, HeaderValue};

/// Width of the keyword field (columns 1-8).
pub const KEYWORD_LEN: usize = 8;

// ── CardImage ──

/// One 80-byte FITS header record, guaranteed to contain only bytes in
/// `0x20..=0x7E`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CardImage([u8; CARD_SIZE]);

fn check_printable(bytes: &[u8]) -> Result<()> {
    if bytes.len() != CARD_SIZE {
        return Err(Error::MalformedCard(format!(
            "length {}, expected {CARD_SIZE}",
            bytes.len()
        )));
    }
    if let Some(pos) = bytes.iter().position(|b| !(0x20..=0x7E).contains(b)) {
        return Err(Error::MalformedCard(format!(
            "byte 0x{:02x} at position {pos} is not printable ASCII",
            bytes[pos]
        )));
    }
    Ok(())
}

impl CardImage {
    /// Construct a card from exactly 80 bytes of printable ASCII.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        check_printable(bytes)?;
        let mut buf = [b' '; CARD_SIZE];
        buf.copy_from_slice(bytes);
        Ok(CardImage(buf))
    }

    /// Construct a card from an 80-character printable ASCII string.
    pub fn from_text(text: &str) -> Result<Self> {
        Self::new(text.as_bytes())
    }

    /// Construct a card from text shorter than 80 characters, padding the
    /// remainder with spaces.
    pub fn padded(text: &str) -> Result<Self> {
        if text.len() > CARD_SIZE {
            return Err(Error::MalformedCard(format!(
                "length {}, expected at most {CARD_SIZE}",
                text.len()
            )));
        }
        let mut buf = [b' '; CARD_SIZE];
        buf[..text.len()].copy_from_slice(text.as_bytes());
        Self::new(&buf)
    }

    /// The raw 80 bytes.
    pub fn as_bytes(&self) -> &[u8; CARD_SIZE] {
        &self.0
    }

    /// The card rendered as text; lossless with respect to [`CardImage::from_text`].
    pub fn as_str(&self) -> &str {
        str::from_utf8(&self.0).unwrap_or("")
    }

    /// The keyword (columns 1-8) with trailing blanks removed.
    pub fn keyword(&self) -> &str {
        self.as_str()[..KEYWORD_LEN].trim_end()
    }

    /// Returns `true` if this is the `END` card.
    pub fn is_end(&self) -> bool {
        &self.0[..KEYWORD_LEN] == b"END     "
    }

    /// Returns `true` if columns 9-10 hold the value indicator `= `.
    pub fn has_value_indicator(&self) -> bool {
        &self.0[KEYWORD_LEN..KEYWORD_LEN + 2] == b"= "
    }

    /// Decode this card according to the FITS fixed-column rules.
    pub fn parse(&self) -> ParsedCard {
        ParsedCard::from_card(self)
    }
}

impl TryFrom<&[u8]> for CardImage {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        CardImage::new(bytes)
    }
}

impl FromStr for CardImage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CardImage::from_text(s)
    }
}

impl fmt::Display for CardImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for CardImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardImage({:?})", self.as_str().trim_end())
    }
}

// ── ParsedCard ──

/// The decoded content of a card.
#[derive(Debug, Clone, PartialEq)]
pub enum CardValue {
    Integer(i64),
    Float(f64),
    String(String),
    Logical(bool),
    Complex(f64, f64),
    /// Free text of a `COMMENT`, `HISTORY`, blank-keyword or other
    /// valueless card.
    Comment(String),
    /// String segment of a `CONTINUE` long-string card.
    Continuation(String),
    /// An entirely blank card.
    Blank,
    /// A keyword card whose value is absent or unrecognisable.
    NoValue,
    /// The `END` card.
    End,
}

impl From<HeaderValue> for CardValue {
    fn from(v: HeaderValue) -> Self {
        match v {
            HeaderValue::Logical(b) => CardValue::Logical(b),
            HeaderValue::Integer(n) => CardValue::Integer(n),
            HeaderValue::Float(f) => CardValue::Float(f),
            HeaderValue::String(s) => CardValue::String(s),
            HeaderValue::Complex(re, im) => CardValue::Complex(re, im),
        }
    }
}

/// A decoded header card.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCard {
    keyword: Option<String>,
    value: CardValue,
    comment: Option<String>,
}

/// Keywords that never carry a value indicator.
const COMMENTARY_KEYWORDS: [&str; 3] = ["COMMENT", "HISTORY", ""];

fn text_or_none(text: &str) -> Option<String> {
    let text = text.trim_end();
    if text.is_empty() {
        None
    } else {
        Some(String::from(text))
    }
}

impl ParsedCard {
    fn from_card(card: &CardImage) -> Self {
        let text = card.as_str();
        let kw = card.keyword();
        let keyword = if kw.is_empty() { None } else { Some(String::from(kw)) };
        let rest = &text[KEYWORD_LEN..];

        if card.is_end() {
            return ParsedCard {
                keyword,
                value: CardValue::End,
                comment: None,
            };
        }

        if COMMENTARY_KEYWORDS.contains(&kw) {
            let value = match text_or_none(rest) {
                Some(body) => CardValue::Comment(body),
                None if keyword.is_none() => CardValue::Blank,
                None => CardValue::Comment(String::new()),
            };
            return ParsedCard {
                keyword,
                value,
                comment: None,
            };
        }

        if kw == "CONTINUE" {
            let lead = rest.trim_start();
            if let Some((s, remainder)) = parse_quoted(lead) {
                let (_, comment) = split_comment(remainder);
                return ParsedCard {
                    keyword,
                    value: CardValue::Continuation(s),
                    comment: comment.map(String::from),
                };
            }
        }

        if card.has_value_indicator() {
            let field = &text[KEYWORD_LEN + 2..];
            return match parse_value(field) {
                Some((value, comment)) => ParsedCard {
                    keyword,
                    value: value.into(),
                    comment: comment.map(String::from),
                },
                None => ParsedCard {
                    keyword,
                    value: CardValue::NoValue,
                    comment: split_comment(field).1.map(String::from),
                },
            };
        }

        ParsedCard {
            keyword,
            value: match text_or_none(rest) {
                Some(body) => CardValue::Comment(body),
                None => CardValue::NoValue,
            },
            comment: None,
        }
    }

    /// The trimmed keyword, or `None` for a blank keyword.
    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref()
    }

    pub fn value(&self) -> &CardValue {
        &self.value
    }

    /// The `/`-delimited trailing comment, if any.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.value {
            CardValue::Integer(n) => Some(n),
            _ => None,
        }
    }

    /// Numeric value as a float; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self.value {
            CardValue::Float(f) => Some(f),
            CardValue::Integer(n) => Some(n as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match &self.value {
            CardValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_logical(&self) -> Option<bool> {
        match self.value {
            CardValue::Logical(b) => Some(b),
            _ => None,
        }
    }
}

// ── CardFactory ──

/// Builds [`CardImage`]s from typed values.
///
/// The default factory truncates string values that do not fit on one card
/// and replaces characters outside printable ASCII with `?`. The strict
/// factory reports both conditions as [`Error::MalformedCard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardFactory {
    strict: bool,
}

impl Default for CardFactory {
    fn default() -> Self {
        CardFactory::DEFAULT
    }
}

/// Longest quoted string that fits in columns 11-80.
const MAX_QUOTED_LEN: usize = CARD_SIZE - 10;

fn validate_keyword(key: &str) -> Result<()> {
    let ok = key.len() <= KEYWORD_LEN
        && key
            .bytes()
            .all(|b| matches!(b, b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_'));
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidKeyword(String::from(key)))
    }
}

impl CardFactory {
    pub const DEFAULT: CardFactory = CardFactory { strict: false };
    pub const STRICT: CardFactory = CardFactory { strict: true };

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    fn sanitize(&self, text: &str) -> Result<String> {
        if text.bytes().all(|b| (0x20..=0x7E).contains(&b)) {
            return Ok(String::from(text));
        }
        if self.strict {
            return Err(Error::MalformedCard(format!(
                "non-printable characters in {text:?}"
            )));
        }
        Ok(text
            .chars()
            .map(|c| if (' '..='~').contains(&c) { c } else { '?' })
            .collect())
    }

    /// Assemble `keyword= value / comment`, truncating the comment to fit.
    fn assemble(&self, key: &str, field: &str, comment: Option<&str>) -> Result<CardImage> {
        validate_keyword(key)?;
        let mut text = format!("{key:<8}= {field}");
        if let Some(comment) = comment {
            let comment = self.sanitize(comment)?;
            if text.len() + 3 < CARD_SIZE {
                text.push_str(" / ");
                text.push_str(&comment);
            }
        }
        text.truncate(CARD_SIZE);
        CardImage::padded(&text)
    }

    /// A card with a quoted string value.
    pub fn string_card(&self, key: &str, value: &str, comment: Option<&str>) -> Result<CardImage> {
        let value = self.sanitize(value)?;
        let mut quoted = format_value(&HeaderValue::String(value.clone()));
        if quoted.len() > MAX_QUOTED_LEN {
            if self.strict {
                return Err(Error::MalformedCard(format!(
                    "string value for {key} too long ({} characters)",
                    value.len()
                )));
            }
            // Trim characters until the escaped form fits.
            let mut chars: Vec<char> = value.chars().collect();
            while quoted.len() > MAX_QUOTED_LEN {
                chars.pop();
                let s: String = chars.iter().collect();
                quoted = format_value(&HeaderValue::String(s));
            }
        }
        self.assemble(key, &quoted, comment)
    }

    pub fn integer_card(&self, key: &str, value: i64, comment: Option<&str>) -> Result<CardImage> {
        self.assemble(key, &format_value(&HeaderValue::Integer(value)), comment)
    }

    /// A card with a floating-point value. Non-finite values, which FITS
    /// cannot represent, produce an undefined value unless strict.
    pub fn real_card(&self, key: &str, value: f64, comment: Option<&str>) -> Result<CardImage> {
        if !value.is_finite() {
            if self.strict {
                return Err(Error::MalformedCard(format!(
                    "non-finite value {value} for {key}"
                )));
            }
            return self.assemble(key, &format!("{:>20}", ""), comment);
        }
        self.assemble(key, &format!("{:>20}", format_float(value, 20)), comment)
    }

    pub fn logical_card(&self, key: &str, value: bool, comment: Option<&str>) -> Result<CardImage> {
        self.assemble(key, &format_value(&HeaderValue::Logical(value)), comment)
    }

    /// A `COMMENT` card; text beyond column 80 is dropped.
    pub fn comment_card(&self, text: &str) -> Result<CardImage> {
        let text = self.sanitize(text)?;
        let mut line = format!("COMMENT {text}");
        line.truncate(CARD_SIZE);
        CardImage::padded(&line)
    }

    /// The `END` card.
    pub fn end_card(&self) -> CardImage {
        let mut buf = [b' '; CARD_SIZE];
        buf[..3].copy_from_slice(b"END");
        CardImage(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn card(s: &str) -> CardImage {
        CardImage::padded(s).unwrap()
    }

    // ---- construction ----

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            CardImage::new(&[b' '; 79]),
            Err(Error::MalformedCard(_))
        ));
        assert!(matches!(
            CardImage::new(&[b' '; 81]),
            Err(Error::MalformedCard(_))
        ));
        assert!(CardImage::from_text("SIMPLE  =").is_err());
    }

    #[test]
    fn rejects_unprintable_bytes() {
        let mut bytes = [b' '; CARD_SIZE];
        bytes[40] = 0x7F;
        assert!(matches!(CardImage::new(&bytes), Err(Error::MalformedCard(_))));
        bytes[40] = b'\n';
        assert!(CardImage::new(&bytes).is_err());
        bytes[40] = 0xC3;
        assert!(CardImage::new(&bytes).is_err());
    }

    #[test]
    fn display_is_the_raw_text() {
        let c = card("OBJECT  = 'M31     '");
        assert_eq!(c.to_string().len(), CARD_SIZE);
        assert!(c.to_string().starts_with("OBJECT  = 'M31"));
    }

    // ---- parsing ----

    #[test]
    fn parse_string_value_with_comment() {
        let p = card("TELESCOP= 'Hubble  '           / telescope name").parse();
        assert_eq!(p.keyword(), Some("TELESCOP"));
        assert_eq!(p.as_string(), Some("Hubble"));
        assert_eq!(p.comment(), Some("telescope name"));
    }

    #[test]
    fn parse_integer_value() {
        let p = card("BITPIX  =                    8 / bits per pixel").parse();
        assert_eq!(p.as_integer(), Some(8));
        assert_eq!(p.as_float(), Some(8.0));
        assert_eq!(p.comment(), Some("bits per pixel"));
    }

    #[test]
    fn parse_float_value() {
        let p = card("TZERO1  =               -128.0").parse();
        assert_eq!(p.value(), &CardValue::Float(-128.0));
    }

    #[test]
    fn parse_logical_value() {
        let p = card("SIMPLE  =                    T").parse();
        assert_eq!(p.as_logical(), Some(true));
    }

    #[test]
    fn parse_comment_card() {
        let p = card("COMMENT   written by fitsio-blocks").parse();
        assert_eq!(p.keyword(), Some("COMMENT"));
        assert_eq!(
            p.value(),
            &CardValue::Comment(String::from("  written by fitsio-blocks"))
        );
    }

    #[test]
    fn parse_history_card_with_equals_is_commentary() {
        let p = card("HISTORY = not a value").parse();
        assert!(matches!(p.value(), CardValue::Comment(_)));
    }

    #[test]
    fn parse_blank_card() {
        let p = card("").parse();
        assert_eq!(p.keyword(), None);
        assert_eq!(p.value(), &CardValue::Blank);
    }

    #[test]
    fn parse_blank_keyword_with_text() {
        let p = card("        free text").parse();
        assert_eq!(p.keyword(), None);
        assert_eq!(p.value(), &CardValue::Comment(String::from("free text")));
    }

    #[test]
    fn parse_continue_card() {
        let p = card("CONTINUE  'more text&'  / continued").parse();
        assert_eq!(p.value(), &CardValue::Continuation(String::from("more text&")));
        assert_eq!(p.comment(), Some("continued"));
    }

    #[test]
    fn parse_end_card() {
        let p = CardFactory::DEFAULT.end_card().parse();
        assert_eq!(p.value(), &CardValue::End);
    }

    #[test]
    fn parse_undefined_value_keeps_comment() {
        let p = card("BLANK   =                      / undefined value").parse();
        assert_eq!(p.value(), &CardValue::NoValue);
        assert_eq!(p.comment(), Some("undefined value"));
    }

    #[test]
    fn parse_unparseable_value_is_novalue() {
        let p = card("WEIRD   = @@@@").parse();
        assert_eq!(p.value(), &CardValue::NoValue);
    }

    #[test]
    fn parse_lowercase_keyword_does_not_fail() {
        let p = card("bitpix  =                   16").parse();
        assert_eq!(p.keyword(), Some("bitpix"));
        assert_eq!(p.as_integer(), Some(16));
    }

    #[test]
    fn parse_keyword_without_indicator() {
        let p = card("DATE    2024-01-01").parse();
        assert_eq!(p.value(), &CardValue::Comment(String::from("2024-01-01")));
        assert_eq!(card("NOVALUE").parse().value(), &CardValue::NoValue);
    }

    // ---- factory ----

    #[test]
    fn factory_string_card_round_trip() {
        let c = CardFactory::DEFAULT
            .string_card("TFORM1", "1000J", Some("format for column 1"))
            .unwrap();
        assert!(c.as_str().starts_with("TFORM1  = '1000J   ' / format for column 1"));
        let p = c.parse();
        assert_eq!(p.as_string(), Some("1000J"));
        assert_eq!(p.comment(), Some("format for column 1"));
    }

    #[test]
    fn factory_integer_card_layout() {
        let c = CardFactory::DEFAULT.integer_card("NAXIS2", 1, None).unwrap();
        assert_eq!(&c.as_str()[..30], "NAXIS2  =                    1");
    }

    #[test]
    fn factory_real_card_round_trip() {
        let c = CardFactory::DEFAULT
            .real_card("TZERO3", -128.0, Some("unsigned offset"))
            .unwrap();
        assert_eq!(c.parse().as_float(), Some(-128.0));
    }

    #[test]
    fn factory_real_card_non_finite() {
        let c = CardFactory::DEFAULT.real_card("CRVAL1", f64::NAN, None).unwrap();
        assert_eq!(c.parse().value(), &CardValue::NoValue);
        assert!(CardFactory::STRICT.real_card("CRVAL1", f64::NAN, None).is_err());
    }

    #[test]
    fn factory_logical_card() {
        let c = CardFactory::DEFAULT.logical_card("EXTEND", true, None).unwrap();
        assert_eq!(c.as_bytes()[29], b'T');
        assert_eq!(c.parse().as_logical(), Some(true));
    }

    #[test]
    fn factory_rejects_bad_keywords() {
        let f = CardFactory::DEFAULT;
        assert!(matches!(
            f.integer_card("TTYPE1000", 1, None),
            Err(Error::InvalidKeyword(_))
        ));
        assert!(f.integer_card("ttype1", 1, None).is_err());
    }

    #[test]
    fn factory_truncates_long_strings() {
        let long = "x".repeat(100);
        let c = CardFactory::DEFAULT.string_card("TCOMM1", &long, None).unwrap();
        let s = c.parse();
        assert_eq!(s.as_string().map(str::len), Some(68));
        assert!(CardFactory::STRICT.string_card("TCOMM1", &long, None).is_err());
    }

    #[test]
    fn factory_truncation_keeps_escapes_intact() {
        let tricky = "'".repeat(50);
        let c = CardFactory::DEFAULT.string_card("TUNIT1", &tricky, None).unwrap();
        let s = c.parse();
        let parsed = s.as_string().unwrap();
        assert!(parsed.chars().all(|ch| ch == '\''));
        assert_eq!(parsed.len(), 34);
    }

    #[test]
    fn factory_replaces_unprintable() {
        let c = CardFactory::DEFAULT.string_card("TUNIT1", "µm", None).unwrap();
        assert_eq!(c.parse().as_string(), Some("?m"));
        assert!(CardFactory::STRICT.string_card("TUNIT1", "µm", None).is_err());
    }

    #[test]
    fn factory_comment_card() {
        let c = CardFactory::DEFAULT.comment_card("hello").unwrap();
        assert_eq!(c.keyword(), "COMMENT");
        assert_eq!(c.parse().value(), &CardValue::Comment(String::from("hello")));
    }

    proptest! {
        #[test]
        fn printable_text_round_trips(s in "[ -~]{80}") {
            let c = CardImage::from_text(&s).unwrap();
            prop_assert_eq!(c.as_str(), s.as_str());
            let _ = c.parse();
        }

        #[test]
        fn wrong_length_always_rejected(len in 0usize..200) {
            prop_assume!(len != CARD_SIZE);
            prop_assert!(CardImage::new(&vec![b'A'; len]).is_err());
        }

        #[test]
        fn integer_cards_parse_back(n in any::<i64>()) {
            let c = CardFactory::STRICT.integer_card("NAXIS1", n, None).unwrap();
            prop_assert_eq!(c.parse().as_integer(), Some(n));
        }
    }
}
