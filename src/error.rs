//! Fatal errors and recoverable issues.

use std::fmt;
use thiserror::Error;

/// Fatal parse error.
///
/// # Remarks
/// This library is permissive and tries to parse input as best as it can. Anything that can be
/// worked around is recorded as an [`Issue`] on the affected part instead. An `Error` means no
/// tree was produced at all.
#[derive(Error, Debug)]
pub enum Error {
    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended where more input was required.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// A header line that is neither a field nor a continuation.
    #[error("malformed header line {0:?}")]
    MalformedHeader(String),

    /// A Content-Type (or Content-Disposition) value that could not be parsed.
    #[error("malformed media type {value:?}: {reason}")]
    MediaType { value: String, reason: &'static str },

    /// A child part without a Content-Type field.
    #[error("missing Content-Type at boundary {boundary:?}")]
    MissingContentType { boundary: String },

    /// A part with an empty header that was followed by more parts.
    #[error("empty header at boundary {boundary:?}")]
    EmptyHeader { boundary: String },

    /// The splitter failed while probing past an empty header.
    #[error("error at boundary {boundary:?}: {source}")]
    Boundary {
        boundary: String,
        #[source]
        source: Box<Error>,
    },

    /// A multipart body declared without a usable boundary.
    #[error("multipart boundary is empty")]
    EmptyBoundary,

    /// Multiparts nested deeper than the parser allows.
    #[error("multipart nesting exceeds {max} levels")]
    TooDeep { max: usize },

    /// No conversion to UTF-8 is known for this label.
    #[error("unsupported charset {0:?}")]
    UnsupportedCharset(String),
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the root cause is the input running out, however it was reported.
    pub fn is_eof(&self) -> bool {
        match self {
            Error::UnexpectedEof => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            Error::Boundary { source, .. } => source.is_eof(),
            _ => false,
        }
    }
}

/// Category of a recoverable issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// Content-Transfer-Encoding value not recognized; content is left undecoded.
    ContentEncoding,
    /// The declared charset could not be converted to UTF-8.
    CharsetConversion,
    /// The document has no Content-Type header.
    MissingContentType,
    /// A multipart boundary was not closed with its terminating delimiter.
    MissingBoundary,
    /// Content-Disposition is present but could not be parsed.
    MalformedDisposition,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssueKind::ContentEncoding => "Unrecognized Content-Transfer-Encoding",
            IssueKind::CharsetConversion => "Character Set Conversion",
            IssueKind::MissingContentType => "Missing Content-Type",
            IssueKind::MissingBoundary => "Missing Boundary",
            IssueKind::MalformedDisposition => "Malformed Content-Disposition",
        };
        f.write_str(name)
    }
}

/// A recoverable problem found while parsing one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    pub detail: String,
}

impl Issue {
    pub fn new(kind: IssueKind, detail: impl Into<String>) -> Issue {
        Issue {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.detail)
    }
}
