//! Building the part tree from a byte stream.

use crate::error::{Error, IssueKind, Result};
use crate::header::read_header;
use crate::media::{parse_media_type, Params};
use crate::multipart::Multipart;
use crate::part::{resolve, Message, Part, PartId};
use std::io::{BufRead, BufReader, Read};
use tracing::{debug, trace};

/// How deep multiparts may nest before the document is rejected.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Parser configuration.
///
/// ```
/// use crease::Parser;
/// let raw = "Content-Type: text/plain\r\n\r\nhello";
/// let message = Parser::new().max_depth(4).read_parts(raw.as_bytes()).unwrap();
/// assert_eq!(message.root().content_type(), "text/plain");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parser {
    max_depth: usize,
}

impl Default for Parser {
    fn default() -> Parser {
        Parser {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// The part most recently attached under `parent`, carried through one multipart level.
#[derive(Debug, Clone, Copy)]
struct Level {
    parent: PartId,
    last: Option<PartId>,
    count: usize,
}

impl Level {
    fn new(parent: PartId) -> Level {
        Level {
            parent,
            last: None,
            count: 0,
        }
    }

    fn push(self, id: PartId) -> Level {
        Level {
            last: Some(id),
            count: self.count + 1,
            ..self
        }
    }
}

impl Parser {
    pub fn new() -> Parser {
        Parser::default()
    }

    /// Limit multipart nesting to `max_depth` levels below the root.
    pub fn max_depth(mut self, max_depth: usize) -> Parser {
        self.max_depth = max_depth;
        self
    }

    /// Parse a MIME document from `reader` into a tree of parts.
    ///
    /// A missing top-level Content-Type is tolerated and noted on the root. Problems inside
    /// individual parts are recorded on those parts; only structural failures return an error.
    pub fn read_parts<R: Read>(&self, reader: R) -> Result<Message> {
        let mut reader = BufReader::new(reader);
        let header = read_header(&mut reader)?;

        let content_type = header.get("Content-Type").unwrap_or("").to_string();
        let (media_type, params) = if content_type.is_empty() {
            (String::new(), Params::new())
        } else {
            parse_media_type(&content_type)?
        };

        let mut root = Part::new(None, &media_type, header);
        if content_type.is_empty() {
            root.add_issue(
                IssueKind::MissingContentType,
                "MIME parts should have a Content-Type header",
            );
        }
        root.set_charset(params.get("charset").map_or("", String::as_str));
        let resolved = resolve(root.header(), &params);
        root.apply(resolved);

        let mut message = Message::with_root(root);
        if message.root().is_multipart() {
            let boundary = params.get("boundary").cloned().unwrap_or_default();
            self.parse_parts(
                &mut message,
                Level::new(PartId::ROOT),
                &mut reader,
                &boundary,
                1,
            )?;
        } else {
            message.root_mut().build_content(&mut reader)?;
        }

        Ok(message)
    }

    /// Attach every part of the multipart `body` under `level.parent`, recursing into nested
    /// multiparts. Returns the level as it stands after the last part.
    fn parse_parts(
        &self,
        message: &mut Message,
        mut level: Level,
        body: &mut dyn BufRead,
        boundary: &str,
        depth: usize,
    ) -> Result<Level> {
        if depth > self.max_depth {
            return Err(Error::TooDeep {
                max: self.max_depth,
            });
        }
        debug!(boundary, depth, "descending into multipart");

        let mut multipart = Multipart::new(body, boundary);
        loop {
            let (header, mut part_body) = match multipart.next_part()? {
                Some(next) => next,
                None => break,
            };

            if header.is_empty() {
                // The part is not real: the boundary was never closed. Tolerated only if nothing
                // follows.
                drop(part_body);
                match multipart.next_part() {
                    Ok(None) => {}
                    Err(e) if e.is_eof() => {}
                    Err(e) => {
                        return Err(Error::Boundary {
                            boundary: boundary.to_string(),
                            source: Box::new(e),
                        })
                    }
                    Ok(Some(_)) => {
                        return Err(Error::EmptyHeader {
                            boundary: boundary.to_string(),
                        })
                    }
                }
                let owner = level.last.unwrap_or(level.parent);
                message[owner].add_issue(
                    IssueKind::MissingBoundary,
                    format!("Boundary {:?} was not closed correctly", boundary),
                );
                break;
            }

            let content_type = match header.get("Content-Type").filter(|v| !v.is_empty()) {
                Some(value) => value.to_string(),
                None => {
                    return Err(Error::MissingContentType {
                        boundary: boundary.to_string(),
                    })
                }
            };
            let (media_type, params) = parse_media_type(&content_type)?;

            let id = message.attach(Part::new(Some(level.parent), &media_type, header), level.last);
            level = level.push(id);
            trace!(part = id.index(), content_type = %media_type, "linked part");

            let resolved = resolve(message[id].header(), &params);
            message[id].apply(resolved);

            match params.get("boundary").filter(|b| !b.is_empty()) {
                Some(nested) => {
                    let mut nested_body = BufReader::new(part_body);
                    let inner = self.parse_parts(
                        message,
                        Level::new(id),
                        &mut nested_body,
                        nested,
                        depth + 1,
                    )?;
                    trace!(part = id.index(), children = inner.count, "nested multipart done");
                }
                None => message[id].build_content(&mut part_body)?,
            }
        }

        debug!(boundary, parts = level.count, "finished multipart");
        Ok(level)
    }
}

impl Message {
    /// Parse an in-memory MIME document with the default [`Parser`].
    pub fn new(raw_message: &[u8]) -> Result<Message> {
        Parser::default().read_parts(raw_message)
    }

    /// Parse a MIME document from `reader` with the default [`Parser`].
    pub fn from_reader<R: Read>(reader: R) -> Result<Message> {
        Parser::default().read_parts(reader)
    }
}
