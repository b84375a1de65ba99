//! Header blocks: an ordered list of fields read from the front of a stream.

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::io::BufRead;

/// One header field. Wraps a String tuple for more literate usage and application of traits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: String,
    pub value: String,
}

impl Field {
    pub fn new(key: &str, value: &str) -> Field {
        Field {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.value)
    }
}

/// A header block.
///
/// Fields keep their arrival order, duplicates included. Lookups ignore the case of the key,
/// since mailers in the wild disagree on `Content-type` versus `Content-Type`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    fields: Vec<Field>,
}

impl Header {
    pub fn new() -> Header {
        Header::default()
    }

    /// Append a field, keeping any existing fields with the same key.
    pub fn push(&mut self, key: &str, value: &str) {
        self.fields.push(Field::new(key, value));
    }

    /// Value of the first field named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.key.eq_ignore_ascii_case(key))
            .map(|f| f.value.as_str())
    }

    /// Values of every field named `key`, in arrival order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.key.eq_ignore_ascii_case(key))
            .map(|f| f.value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }
}

impl<'a> IntoIterator for &'a Header {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, field) in self.fields.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}

/// Strip one trailing `\n` or `\r\n`.
pub(crate) fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Read a header block, leaving `reader` positioned at the first byte of the body.
///
/// The block ends at the first empty line. Folded lines are unfolded with a single space. A stream
/// that ends after at least one field is accepted as a header with an empty body; a stream that is
/// already exhausted yields [`Error::UnexpectedEof`].
pub(crate) fn read_header<R: BufRead + ?Sized>(reader: &mut R) -> Result<Header> {
    // A key is any run of printable characters other than the colon, at the start of a line.
    lazy_static! {
        static ref FIELD: Regex = Regex::new(r"^([!-9;-~]+):(.*)$").unwrap();
    }

    let mut header = Header::new();
    let mut line = Vec::new();
    let mut first = true;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            if first {
                return Err(Error::UnexpectedEof);
            }
            break;
        }
        first = false;

        let text = String::from_utf8_lossy(trim_newline(&line));
        if text.is_empty() {
            break;
        }

        if text.starts_with(' ') || text.starts_with('\t') {
            let field = match header.fields.last_mut() {
                Some(field) => field,
                None => return Err(Error::MalformedHeader(text.into_owned())),
            };
            let continuation = text.trim();
            if !continuation.is_empty() {
                if !field.value.is_empty() {
                    field.value.push(' ');
                }
                field.value.push_str(continuation);
            }
            continue;
        }

        if let Some(c) = FIELD.captures(&text) {
            header.push(&c[1], c[2].trim());
            continue;
        }
        return Err(Error::MalformedHeader(text.into_owned()));
    }

    Ok(header)
}
