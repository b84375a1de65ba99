//! # crease
//!
//! A robust, minimal library for parsing MIME documents into a tree of parts.
//!
//! Supports nested multipart documents, quoted-printable and base64 bodies, and conversion of
//! declared charsets to UTF-8. `crease` assumes input is mostly compliant and tries to parse input
//! as best as possible: malformed but recoverable input is recorded as an [`Issue`] on the
//! affected part, and only structural failures abort the parse.
//!
//! Output is the tree of parts with lazily decoded content, and no filtering. Finding the text
//! body or the attachments is left to the consumer.
//!
//! # Example
//!
//! ```
//! use crease::{Message, PartId};
//! use std::io::Read;
//!
//! let raw = b"Content-Type: multipart/mixed; boundary=\"b\"\r\n\
//!     \r\n\
//!     --b\r\n\
//!     Content-Type: text/plain; charset=iso-8859-1\r\n\
//!     Content-Transfer-Encoding: quoted-printable\r\n\
//!     \r\n\
//!     caf=E9\r\n\
//!     --b--\r\n";
//! let mut message = Message::new(raw)?;
//!
//! let text = message.children(PartId::ROOT).next().unwrap();
//! let mut content = String::new();
//! message[text].read_to_string(&mut content)?;
//! assert_eq!(content, "café");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![cfg_attr(feature = "nightly", feature(test))]
#[macro_use]
extern crate lazy_static;

mod decode;
mod encoded_word;
mod error;
mod header;
mod media;
mod multipart;
mod parser;
mod part;

pub use decode::{for_charset, TransferEncoding, Utf8Reader};
pub use encoded_word::decode_header;
pub use error::{Error, Issue, IssueKind, Result};
pub use header::{Field, Header};
pub use media::{parse_media_type, Params};
pub use parser::{Parser, DEFAULT_MAX_DEPTH};
pub use part::{Children, DepthFirst, Message, Part, PartId};

/// Parse a MIME document from `reader` into a tree of parts, with the default [`Parser`].
pub fn read_parts<R: std::io::Read>(reader: R) -> Result<Message> {
    Parser::default().read_parts(reader)
}
