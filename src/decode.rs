//! Content decoding stages: transfer encodings and charset conversion to UTF-8.
//!
//! Every stage is a plain `Read` wrapping the stage before it, so a pipeline is pulled one chunk
//! at a time and decoding errors only surface when bytes are read.

use crate::error::{Error, Result};
use crate::header::trim_newline;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use encoding_rs::{CoderResult, Decoder, Encoding};
use std::io::{self, BufRead, BufReader, Read};

/// Standard alphabet, padding optional. Mailers routinely drop the trailing `=`.
pub(crate) static BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

const CHUNK: usize = 4096;

/// A recognized Content-Transfer-Encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// `7bit`, `8bit`, `binary` or no header at all.
    Identity,
    QuotedPrintable,
    Base64,
}

impl TransferEncoding {
    /// Look up a Content-Transfer-Encoding value; `None` if it is not one we can reverse.
    pub fn from_label(label: &str) -> Option<TransferEncoding> {
        match label.trim().to_ascii_lowercase().as_str() {
            "quoted-printable" => Some(TransferEncoding::QuotedPrintable),
            "base64" => Some(TransferEncoding::Base64),
            "8bit" | "7bit" | "binary" | "" => Some(TransferEncoding::Identity),
            _ => None,
        }
    }

    /// Wrap `reader` in the reader that reverses this encoding.
    pub fn wrap<R: Read + Send + 'static>(self, reader: R) -> Box<dyn Read + Send> {
        match self {
            TransferEncoding::Identity => Box::new(reader),
            TransferEncoding::QuotedPrintable => Box::new(QuotedPrintableReader::new(reader)),
            TransferEncoding::Base64 => Box::new(base64::read::DecoderReader::new(
                Base64Cleaner::new(reader),
                &BASE64,
            )),
        }
    }
}

/// Decodes quoted-printable content one line at a time.
///
/// Each line keeps its own line break, `\n` or `\r\n`, unless it ends in a soft break. Bytes that
/// should have been escaped, such as raw UTF-8, pass through unchanged.
pub(crate) struct QuotedPrintableReader<R> {
    inner: BufReader<R>,
    line: Vec<u8>,
    escaped: Vec<u8>,
    decoded: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl<R: Read> QuotedPrintableReader<R> {
    pub(crate) fn new(inner: R) -> QuotedPrintableReader<R> {
        QuotedPrintableReader {
            inner: BufReader::new(inner),
            line: Vec::new(),
            escaped: Vec::new(),
            decoded: Vec::new(),
            pos: 0,
            finished: false,
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        self.line.clear();
        self.decoded.clear();
        self.pos = 0;
        if self.inner.read_until(b'\n', &mut self.line)? == 0 {
            self.finished = true;
            return Ok(());
        }

        let content = trim_newline(&self.line);
        let newline = &self.line[content.len()..];
        // Trailing whitespace is transport padding.
        let end = content
            .iter()
            .rposition(|&b| b != b' ' && b != b'\t')
            .map_or(0, |i| i + 1);
        let (content, soft_break) = match content[..end].strip_suffix(b"=") {
            Some(content) => (content, true),
            None => (&content[..end], false),
        };

        self.escaped.clear();
        for &b in content {
            if b == b' ' || b == b'\t' || (b'!'..=b'~').contains(&b) {
                self.escaped.push(b);
            } else {
                self.escaped.extend_from_slice(format!("={:02X}", b).as_bytes());
            }
        }
        let decoded = quoted_printable::decode(&self.escaped, quoted_printable::ParseMode::Robust)
            .map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("quoted-printable: {:?}", e))
            })?;
        self.decoded.extend_from_slice(&decoded);
        if !soft_break {
            self.decoded.extend_from_slice(newline);
        }
        Ok(())
    }
}

impl<R: Read> Read for QuotedPrintableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.decoded.len() {
            if self.finished {
                return Ok(0);
            }
            self.fill()?;
        }
        let n = buf.len().min(self.decoded.len() - self.pos);
        buf[..n].copy_from_slice(&self.decoded[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Drops every byte outside the base64 alphabet, such as the line breaks of wrapped bodies.
pub(crate) struct Base64Cleaner<R> {
    inner: R,
}

impl<R: Read> Base64Cleaner<R> {
    pub(crate) fn new(inner: R) -> Base64Cleaner<R> {
        Base64Cleaner { inner }
    }
}

fn is_base64_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='
}

impl<R: Read> Read for Base64Cleaner<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.inner.read(buf)?;
            if n == 0 {
                return Ok(0);
            }
            let mut kept = 0;
            for i in 0..n {
                if is_base64_byte(buf[i]) {
                    buf[kept] = buf[i];
                    kept += 1;
                }
            }
            // A chunk made only of line breaks must not look like end of stream.
            if kept > 0 {
                return Ok(kept);
            }
        }
    }
}

/// Find the converter for a charset label, e.g. `iso-8859-1` or `Windows-1252`.
pub fn for_charset(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| Error::UnsupportedCharset(label.to_string()))
}

/// Converts the bytes of `inner` from a source charset to UTF-8.
///
/// Malformed sequences become U+FFFD rather than errors.
pub struct Utf8Reader<R> {
    inner: R,
    decoder: Decoder,
    input: Vec<u8>,
    output: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl<R: Read> Utf8Reader<R> {
    pub fn new(encoding: &'static Encoding, inner: R) -> Utf8Reader<R> {
        Utf8Reader {
            inner,
            decoder: encoding.new_decoder(),
            input: vec![0; CHUNK],
            output: Vec::new(),
            pos: 0,
            finished: false,
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        let n = self.inner.read(&mut self.input)?;
        let last = n == 0;
        let capacity = self
            .decoder
            .max_utf8_buffer_length(n)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "charset buffer overflow"))?;

        self.output.clear();
        self.output.resize(capacity, 0);
        self.pos = 0;
        let (result, read, written, _) =
            self.decoder
                .decode_to_utf8(&self.input[..n], &mut self.output, last);
        debug_assert!(result == CoderResult::InputEmpty && read == n);
        self.output.truncate(written);
        self.finished = last;
        Ok(())
    }
}

impl<R: Read> Read for Utf8Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.output.len() {
            if self.finished {
                return Ok(0);
            }
            self.fill()?;
        }
        let n = buf.len().min(self.output.len() - self.pos);
        buf[..n].copy_from_slice(&self.output[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
