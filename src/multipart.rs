//! Splitting a multipart body into its boundary-delimited parts.

use crate::error::{Error, Result};
use crate::header::{read_header, trim_newline, Header};
use std::io::{self, BufRead, Read};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    /// `--boundary`: another part follows.
    Next,
    /// `--boundary--`: no more parts.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the first delimiter line.
    Preamble,
    /// A part has been handed out and may still have unread content.
    InPart,
    /// The current part ended at a delimiter line.
    AtDelimiter(Delimiter),
    /// The stream ended inside a part; the next call reports the unclosed boundary.
    Unterminated,
    /// The unclosed-boundary marker has been handed out.
    MarkerSent,
    /// The close delimiter was seen; anything after it is epilogue.
    Finished,
}

/// Iterates over the parts of one multipart body.
///
/// Reading is strictly forward: asking for the next part discards whatever is left of the
/// current one. A body that ends without its close delimiter yields one extra part with an empty
/// header as a marker, after which the splitter fails with [`Error::UnexpectedEof`].
pub(crate) struct Multipart<'r> {
    reader: &'r mut dyn BufRead,
    dash_boundary: Vec<u8>,
    state: State,
    /// Line break held back until we know the next line is not a delimiter.
    held: Vec<u8>,
    chunk: Vec<u8>,
    pos: usize,
    line: Vec<u8>,
    /// The part handed out last had no header fields.
    empty_header: bool,
}

impl<'r> Multipart<'r> {
    pub(crate) fn new(reader: &'r mut dyn BufRead, boundary: &str) -> Multipart<'r> {
        Multipart {
            reader,
            dash_boundary: format!("--{}", boundary).into_bytes(),
            state: State::Preamble,
            held: Vec::new(),
            chunk: Vec::new(),
            pos: 0,
            line: Vec::new(),
            empty_header: false,
        }
    }

    /// Advance to the next part. `Ok(None)` is the clean end of the body.
    pub(crate) fn next_part(&mut self) -> Result<Option<(Header, PartReader<'_, 'r>)>> {
        if self.dash_boundary == b"--" {
            return Err(Error::EmptyBoundary);
        }

        while self.state == State::InPart {
            self.fill()?;
        }
        self.chunk.clear();
        self.pos = 0;

        let delimiter = match self.state {
            State::Preamble => self.skip_preamble()?,
            State::AtDelimiter(delimiter) => delimiter,
            State::Unterminated => {
                self.state = State::MarkerSent;
                if self.empty_header {
                    // The part just drained already looked like a marker.
                    return Err(Error::UnexpectedEof);
                }
                return Ok(Some((Header::new(), PartReader { multipart: self })));
            }
            State::MarkerSent => return Err(Error::UnexpectedEof),
            State::Finished | State::InPart => return Ok(None),
        };

        if delimiter == Delimiter::Close {
            self.state = State::Finished;
            return Ok(None);
        }

        let header = match read_header(&mut *self.reader) {
            Ok(header) => header,
            Err(Error::UnexpectedEof) => {
                // A delimiter with nothing after it: the body was cut off.
                self.state = State::MarkerSent;
                return Ok(Some((Header::new(), PartReader { multipart: self })));
            }
            Err(e) => return Err(e),
        };
        self.state = State::InPart;
        self.held.clear();
        self.empty_header = header.is_empty();
        Ok(Some((header, PartReader { multipart: self })))
    }

    fn skip_preamble(&mut self) -> Result<Delimiter> {
        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line)? == 0 {
                return Err(Error::UnexpectedEof);
            }
            if let Some(delimiter) = self.classify(&self.line) {
                return Ok(delimiter);
            }
        }
    }

    fn classify(&self, line: &[u8]) -> Option<Delimiter> {
        let line = trim_newline(line);
        let end = line
            .iter()
            .rposition(|&b| b != b' ' && b != b'\t')
            .map_or(0, |i| i + 1);
        let rest = line[..end].strip_prefix(self.dash_boundary.as_slice())?;
        match rest {
            b"" => Some(Delimiter::Next),
            b"--" => Some(Delimiter::Close),
            _ => None,
        }
    }

    /// Load the next line of the current part into `chunk`.
    fn fill(&mut self) -> io::Result<()> {
        self.chunk.clear();
        self.pos = 0;
        self.line.clear();

        if self.reader.read_until(b'\n', &mut self.line)? == 0 {
            self.chunk.append(&mut self.held);
            self.state = State::Unterminated;
            return Ok(());
        }
        if let Some(delimiter) = self.classify(&self.line) {
            self.held.clear();
            self.state = State::AtDelimiter(delimiter);
            return Ok(());
        }

        let body = trim_newline(&self.line);
        self.chunk.append(&mut self.held);
        self.chunk.extend_from_slice(body);
        self.held.extend_from_slice(&self.line[body.len()..]);
        Ok(())
    }
}

/// The content of one part, ending before the delimiter line that follows it.
pub(crate) struct PartReader<'a, 'r> {
    multipart: &'a mut Multipart<'r>,
}

impl Read for PartReader<'_, '_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mp = &mut *self.multipart;
        while mp.pos >= mp.chunk.len() {
            if mp.state != State::InPart {
                return Ok(0);
            }
            mp.fill()?;
        }
        let n = buf.len().min(mp.chunk.len() - mp.pos);
        buf[..n].copy_from_slice(&mp.chunk[mp.pos..mp.pos + n]);
        mp.pos += n;
        Ok(n)
    }
}
