//! The part tree and the per-part content pipeline.

use crate::decode::{for_charset, TransferEncoding, Utf8Reader};
use crate::encoded_word::decode_header;
use crate::error::{Issue, IssueKind, Result};
use crate::header::Header;
use crate::media::{parse_media_type, Params};
use std::fmt;
use std::io::{self, Cursor, Read};
use std::ops::{Index, IndexMut};
use std::sync::Arc;
use tracing::warn;

/// Index of a [`Part`] inside its [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartId(usize);

impl PartId {
    /// The root part of every message.
    pub const ROOT: PartId = PartId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// One node of the MIME tree: the whole document, a multipart container, or a leaf with content.
///
/// The children of a part form a list: [`Part::first_child`] points at the head and each child
/// points at the next through [`Part::next_sibling`].
pub struct Part {
    header: Header,
    parent: Option<PartId>,
    first_child: Option<PartId>,
    next_sibling: Option<PartId>,
    content_type: String,
    disposition: String,
    filename: String,
    charset: String,
    issues: Vec<Issue>,
    content: Option<Content>,
}

impl Part {
    pub(crate) fn new(parent: Option<PartId>, content_type: &str, header: Header) -> Part {
        Part {
            header,
            parent,
            first_child: None,
            next_sibling: None,
            content_type: content_type.to_string(),
            disposition: String::new(),
            filename: String::new(),
            charset: String::new(),
            issues: Vec::new(),
            content: None,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn parent(&self) -> Option<PartId> {
        self.parent
    }

    pub fn first_child(&self) -> Option<PartId> {
        self.first_child
    }

    pub fn next_sibling(&self) -> Option<PartId> {
        self.next_sibling
    }

    /// Content-Type without parameters, lower-cased. Empty if the header was missing.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Content-Disposition without parameters, lower-cased.
    pub fn disposition(&self) -> &str {
        &self.disposition
    }

    /// File name from the disposition or content type, decoded.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Declared charset label, as written in the header.
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Problems found while parsing this part. They did not stop the parse.
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type.starts_with("multipart/")
    }

    /// Bytes of the body exactly as transmitted. Empty for multipart containers.
    pub fn raw_content(&self) -> &[u8] {
        match &self.content {
            Some(content) => &content.raw[..],
            None => &[],
        }
    }

    /// Transfer encoding applied by the decoded stage, if this part has content.
    pub fn transfer_encoding(&self) -> Option<TransferEncoding> {
        self.content.as_ref().map(|c| c.transfer)
    }

    /// A fresh reader over the body with its transfer encoding reversed, before any charset
    /// conversion.
    ///
    /// Every call starts from the beginning of the body. It does not share a position with the
    /// single-pass stream read through `Read for Part`, and reading one does not consume the other.
    pub fn decoded_reader(&self) -> Box<dyn Read + Send> {
        match &self.content {
            Some(content) => content.transfer.wrap(Cursor::new(content.raw.clone())),
            None => Box::new(io::empty()),
        }
    }

    /// Read the rest of the normalized content into a string.
    pub fn read_text(&mut self) -> io::Result<String> {
        let mut text = String::new();
        self.read_to_string(&mut text)?;
        Ok(text)
    }

    pub(crate) fn set_charset(&mut self, charset: &str) {
        self.charset = charset.to_string();
    }

    pub(crate) fn add_issue(&mut self, kind: IssueKind, detail: impl Into<String>) {
        let issue = Issue::new(kind, detail);
        warn!(content_type = %self.content_type, "{}", issue);
        self.issues.push(issue);
    }

    /// Apply the disposition, file name and charset found in the headers.
    pub(crate) fn apply(&mut self, resolved: ContentHeaders) {
        self.disposition = resolved.disposition;
        self.filename = resolved.filename;
        if self.charset.is_empty() {
            self.charset = resolved.charset;
        }
        for issue in resolved.issues {
            self.add_issue(issue.kind, issue.detail);
        }
    }

    /// Buffer the body and set up the raw, decoded and UTF-8 stages.
    ///
    /// An unrecognized transfer encoding leaves the content undecoded and skips charset
    /// conversion. An unknown charset leaves the decoded bytes as they are. Both are recorded as
    /// issues on this part.
    pub(crate) fn build_content(&mut self, body: &mut dyn Read) -> Result<()> {
        let mut raw = Vec::new();
        body.read_to_end(&mut raw)?;
        let raw: Arc<[u8]> = raw.into();

        let label = self
            .header
            .get("Content-Transfer-Encoding")
            .unwrap_or("")
            .to_string();
        let (transfer, valid) = match TransferEncoding::from_label(&label) {
            Some(transfer) => (transfer, true),
            None => {
                self.add_issue(
                    IssueKind::ContentEncoding,
                    format!("Unrecognized Content-Transfer-Encoding type {:?}", label),
                );
                (TransferEncoding::Identity, false)
            }
        };

        let mut reader = transfer.wrap(Cursor::new(raw.clone()));
        if valid && !self.charset.is_empty() {
            match for_charset(&self.charset) {
                Ok(encoding) => reader = Box::new(Utf8Reader::new(encoding, reader)),
                Err(e) => self.add_issue(IssueKind::CharsetConversion, e.to_string()),
            }
        }

        self.content = Some(Content {
            raw,
            transfer,
            reader,
        });
        Ok(())
    }
}

/// Reads the decoded, UTF-8 converted content. Single pass: once read, it is gone.
impl Read for Part {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.content {
            Some(content) => content.reader.read(buf),
            None => Ok(0),
        }
    }
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("content_type", &self.content_type)
            .field("disposition", &self.disposition)
            .field("filename", &self.filename)
            .field("charset", &self.charset)
            .field("parent", &self.parent)
            .field("first_child", &self.first_child)
            .field("next_sibling", &self.next_sibling)
            .field("issues", &self.issues)
            .finish_non_exhaustive()
    }
}

/// Buffered body plus the reader chain built over it.
struct Content {
    raw: Arc<[u8]>,
    transfer: TransferEncoding,
    reader: Box<dyn Read + Send>,
}

/// What the headers of a part say about its disposition, file name and charset.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ContentHeaders {
    pub disposition: String,
    pub filename: String,
    pub charset: String,
    pub issues: Vec<Issue>,
}

/// Resolve disposition, file name and charset from `header` and the Content-Type `params`.
///
/// The disposition's `filename` wins over the content type's `name`, which wins over `file`.
/// Never fails: a missing disposition is normal, a malformed one is only noted.
pub(crate) fn resolve(header: &Header, params: &Params) -> ContentHeaders {
    let mut resolved = ContentHeaders::default();

    if let Some(value) = header.get("Content-Disposition") {
        match parse_media_type(value) {
            Ok((disposition, dparams)) => {
                resolved.disposition = disposition;
                resolved.filename = decoded_param(&dparams, "filename");
            }
            Err(e) => resolved
                .issues
                .push(Issue::new(IssueKind::MalformedDisposition, e.to_string())),
        }
    }
    if resolved.filename.is_empty() {
        resolved.filename = decoded_param(params, "name");
    }
    if resolved.filename.is_empty() {
        resolved.filename = decoded_param(params, "file");
    }
    resolved.charset = params.get("charset").cloned().unwrap_or_default();

    resolved
}

fn decoded_param(params: &Params, key: &str) -> String {
    params.get(key).map(|v| decode_header(v)).unwrap_or_default()
}

/// A parsed MIME document: an arena of parts rooted at [`PartId::ROOT`].
pub struct Message {
    parts: Vec<Part>,
}

impl Message {
    pub(crate) fn with_root(root: Part) -> Message {
        Message { parts: vec![root] }
    }

    pub fn root(&self) -> &Part {
        &self.parts[0]
    }

    pub fn root_mut(&mut self) -> &mut Part {
        &mut self.parts[0]
    }

    pub fn get(&self, id: PartId) -> Option<&Part> {
        self.parts.get(id.0)
    }

    pub fn get_mut(&mut self, id: PartId) -> Option<&mut Part> {
        self.parts.get_mut(id.0)
    }

    /// Number of parts, the root included.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Direct children of `id`, in document order.
    pub fn children(&self, id: PartId) -> Children<'_> {
        Children {
            message: self,
            next: self.get(id).and_then(Part::first_child),
        }
    }

    /// Every part in document order (depth first, parents before children).
    pub fn depth_first(&self) -> DepthFirst<'_> {
        DepthFirst {
            message: self,
            stack: vec![PartId::ROOT],
        }
    }

    /// First part in document order matching `predicate`.
    pub fn find<P>(&self, mut predicate: P) -> Option<PartId>
    where
        P: FnMut(&Part) -> bool,
    {
        self.depth_first().find(|&id| predicate(&self[id]))
    }

    /// Add `part` under `parent`, after `previous` if it already has children.
    pub(crate) fn attach(&mut self, part: Part, previous: Option<PartId>) -> PartId {
        let id = PartId(self.parts.len());
        let parent = part.parent;
        self.parts.push(part);
        match (previous, parent) {
            (Some(previous), _) => self[previous].next_sibling = Some(id),
            (None, Some(parent)) => self[parent].first_child = Some(id),
            (None, None) => {}
        }
        id
    }
}

impl Index<PartId> for Message {
    type Output = Part;

    fn index(&self, id: PartId) -> &Part {
        &self.parts[id.0]
    }
}

impl IndexMut<PartId> for Message {
    fn index_mut(&mut self, id: PartId) -> &mut Part {
        &mut self.parts[id.0]
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.parts.iter()).finish()
    }
}

/// Prints the tree one part per line, indented by depth.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.depth_first() {
            let mut depth = 0;
            let mut up = self[id].parent;
            while let Some(parent) = up {
                depth += 1;
                up = self[parent].parent;
            }
            let part = &self[id];
            write!(f, "{:indent$}{}", "", part.content_type, indent = depth * 2)?;
            if !part.filename.is_empty() {
                write!(f, " {:?}", part.filename)?;
            }
            for issue in &part.issues {
                write!(f, " {}", issue)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub struct Children<'a> {
    message: &'a Message,
    next: Option<PartId>,
}

impl Iterator for Children<'_> {
    type Item = PartId;

    fn next(&mut self) -> Option<PartId> {
        let id = self.next?;
        self.next = self.message[id].next_sibling;
        Some(id)
    }
}

pub struct DepthFirst<'a> {
    message: &'a Message,
    stack: Vec<PartId>,
}

impl Iterator for DepthFirst<'_> {
    type Item = PartId;

    fn next(&mut self) -> Option<PartId> {
        let id = self.stack.pop()?;
        let part = &self.message[id];
        if let Some(sibling) = part.next_sibling {
            self.stack.push(sibling);
        }
        if let Some(child) = part.first_child {
            self.stack.push(child);
        }
        Some(id)
    }
}
