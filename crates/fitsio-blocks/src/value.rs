//! Lexical parsing and fixed-format rendering of the value field of a card
//! (columns 11-80).

/// A typed value carried by a keyword card.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// FITS logical value (`T` or `F`).
    Logical(bool),
    /// FITS integer value.
    Integer(i64),
    /// FITS floating-point value.
    Float(f64),
    /// FITS character string (content between single quotes, trailing blanks trimmed).
    String(String),
    /// FITS complex value `(real, imaginary)`.
    Complex(f64, f64),
}

/// Position of a `/` comment separator in `field`, scanning only outside
/// quoted strings. Returns the byte index of the slash.
fn find_separator(field: &[u8]) -> Option<usize> {
    let mut in_string = false;
    for (i, &b) in field.iter().enumerate() {
        match b {
            b'\'' => in_string = !in_string,
            b'/' if !in_string => return Some(i),
            _ => {}
        }
    }
    None
}

/// Split a field at the comment separator into `(value_part, comment)`.
///
/// The comment does not include the slash or one optional following space.
/// Real-world writers frequently omit the space after the slash, so both
/// `/ text` and `/text` are accepted.
pub(crate) fn split_comment(field: &str) -> (&str, Option<&str>) {
    match find_separator(field.as_bytes()) {
        Some(idx) => {
            let rest = &field[idx + 1..];
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            let comment = rest.trim_end();
            let comment = if comment.is_empty() {
                None
            } else {
                Some(comment)
            };
            (&field[..idx], comment)
        }
        None => (field, None),
    }
}

/// Parse a quoted string starting at the first byte of `text`.
///
/// Doubled quotes represent a literal quote. An unterminated string is
/// accepted up to the end of the field. Returns the string and the remainder
/// after the closing quote.
pub(crate) fn parse_quoted(text: &str) -> Option<(String, &str)> {
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'\'') {
        return None;
    }
    let mut value = String::new();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                value.push('\'');
                i += 2;
                continue;
            }
            i += 1;
            break;
        }
        value.push(bytes[i] as char);
        i += 1;
    }
    let trimmed_len = value.trim_end().len();
    value.truncate(trimmed_len);
    Some((value, &text[i.min(text.len())..]))
}

/// Parse a float string, handling FITS `D` exponent notation.
fn parse_float_str(s: &str) -> Option<f64> {
    s.replace(['D', 'd'], "E").parse::<f64>().ok()
}

fn parse_complex(text: &str) -> Option<HeaderValue> {
    let inner = text.strip_prefix('(')?.strip_suffix(')')?;
    let (left, right) = inner.split_once(',')?;
    let re = parse_float_str(left.trim())?;
    let im = parse_float_str(right.trim())?;
    Some(HeaderValue::Complex(re, im))
}

/// Parse the value field of a card (the text after `= `).
///
/// Returns the typed value and an optional comment, or `None` when the field
/// holds no recognisable value (an undefined value).
pub(crate) fn parse_value(field: &str) -> Option<(HeaderValue, Option<&str>)> {
    let lead = field.trim_start();

    if lead.starts_with('\'') {
        let (s, remainder) = parse_quoted(lead)?;
        let (_, comment) = split_comment(remainder);
        return Some((HeaderValue::String(s), comment));
    }

    let (val_part, comment) = split_comment(field);
    let val_text = val_part.trim();
    if val_text.is_empty() {
        return None;
    }

    let value = match val_text {
        "T" => HeaderValue::Logical(true),
        "F" => HeaderValue::Logical(false),
        t if t.starts_with('(') => parse_complex(t)?,
        t if !t.contains(['.', 'E', 'e', 'D', 'd']) => match t.parse::<i64>() {
            Ok(n) => HeaderValue::Integer(n),
            Err(_) => HeaderValue::Float(parse_float_str(t)?),
        },
        t => HeaderValue::Float(parse_float_str(t)?),
    };
    Some((value, comment))
}

/// Render a float in at most `max_len` characters, preferring the shortest
/// representation that round-trips.
pub(crate) fn format_float(f: f64, max_len: usize) -> String {
    if f == 0.0 {
        return String::from("0.0");
    }
    let shortest = format!("{f:E}");
    if shortest.len() <= max_len {
        return shortest;
    }
    let mut precision = 15usize;
    loop {
        let s = format!("{f:.precision$E}");
        if s.len() <= max_len || precision == 0 {
            return s;
        }
        precision -= 1;
    }
}

/// Quote a string value, doubling embedded quotes and padding the content to
/// the FITS minimum of 8 characters.
pub(crate) fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    while out.len() < 9 {
        out.push(' ');
    }
    out.push('\'');
    out
}

/// Render a value in FITS fixed format: numbers and logicals right-justified
/// to column 30, strings starting at column 11.
pub(crate) fn format_value(value: &HeaderValue) -> String {
    match value {
        HeaderValue::Logical(b) => format!("{:>20}", if *b { "T" } else { "F" }),
        HeaderValue::Integer(n) => format!("{n:>20}"),
        HeaderValue::Float(f) => format!("{:>20}", format_float(*f, 20)),
        HeaderValue::String(s) => quote_string(s),
        HeaderValue::Complex(re, im) => {
            let s = format!("({}, {})", format_float(*re, 20), format_float(*im, 20));
            format!("{s:>20}")
        }
    }
}
