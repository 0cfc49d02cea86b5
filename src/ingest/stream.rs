//! Incremental reader turning an extraction artifact into a lazy paragraph stream.
//!
//! The extraction collaborator writes arbitrarily large JSON blobs of the form
//! `{"file_type": ..., "file_name": ..., "request_id": ..., "items": [{page}, ...]}`.
//! [`ItemScanner`] lexes bytes as they arrive, emits each page object of the top-level
//! `items` array as soon as its closing brace is seen, and discards consumed input so no
//! more than one unparsed page remainder is ever buffered.

use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use thiserror::Error;

use crate::storage::{ByteStream, StorageError};

/// Errors raised while streaming an extraction artifact.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The stream ended while the `items` array was still open or never appeared.
    #[error("Incomplete extraction stream: {0}")]
    IncompleteStream(String),
    /// A completed page object failed to deserialize.
    #[error("Failed to parse extraction item: {0}")]
    Parse(#[from] serde_json::Error),
    /// The underlying blob read failed.
    #[error("Blob storage error: {0}")]
    Storage(#[from] StorageError),
}

/// One paragraph of extracted text with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEntry {
    /// Page the paragraph was extracted from.
    pub page_number: Option<u32>,
    /// Paragraph position within the page.
    pub paragraph_number: Option<u32>,
    /// Trimmed paragraph text.
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct PageItem {
    #[serde(default)]
    page_number: Option<u32>,
    #[serde(default)]
    paragraphs: Vec<ParagraphItem>,
}

#[derive(Debug, Deserialize)]
struct ParagraphItem {
    #[serde(default)]
    paragraph_number: Option<u32>,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScannerState {
    /// Searching for the top-level `items` key inside the root object.
    Preamble,
    /// Inside the `items` array, between or within page objects.
    Items,
    /// The `items` array closed; remaining bytes are drained unread.
    Done,
}

/// Incremental lexer over the extraction artifact.
///
/// Feed byte chunks with [`ItemScanner::feed`]; each call returns the paragraphs of every
/// page object completed by those bytes. Call [`ItemScanner::finish`] at end of stream to
/// surface a truncated artifact as an error.
#[derive(Debug)]
pub struct ItemScanner {
    buffer: Vec<u8>,
    pos: usize,
    state: ScannerState,
    depth: usize,
    in_string: bool,
    escape: bool,
    capturing_key: bool,
    key: Vec<u8>,
    items_key_seen: bool,
    item_start: Option<usize>,
    prev_significant: u8,
}

impl ItemScanner {
    /// Create a scanner positioned before the root object.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            pos: 0,
            state: ScannerState::Preamble,
            depth: 0,
            in_string: false,
            escape: false,
            capturing_key: false,
            key: Vec::new(),
            items_key_seen: false,
            item_start: None,
            prev_significant: 0,
        }
    }

    /// Consume the next chunk of bytes, returning paragraphs of pages completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<DocumentEntry>, IngestError> {
        self.buffer.extend_from_slice(chunk);
        let mut entries = Vec::new();

        while self.pos < self.buffer.len() {
            let byte = self.buffer[self.pos];

            if self.in_string {
                if self.escape {
                    self.escape = false;
                } else if byte == b'\\' {
                    self.escape = true;
                } else if byte == b'"' {
                    self.in_string = false;
                    self.capturing_key = false;
                } else if self.capturing_key {
                    self.key.push(byte);
                }
                self.pos += 1;
                continue;
            }

            match byte {
                b'"' => {
                    self.in_string = true;
                    // A string opening right after `{` or `,` at root depth is a key.
                    if self.state == ScannerState::Preamble
                        && self.depth == 1
                        && matches!(self.prev_significant, b'{' | b',')
                    {
                        self.capturing_key = true;
                        self.key.clear();
                    }
                    self.prev_significant = byte;
                }
                b'{' | b'[' => {
                    self.depth += 1;
                    if self.state == ScannerState::Preamble
                        && byte == b'['
                        && self.depth == 2
                        && self.items_key_seen
                    {
                        self.state = ScannerState::Items;
                    } else if self.state == ScannerState::Items
                        && byte == b'{'
                        && self.depth == 3
                    {
                        self.item_start = Some(self.pos);
                    }
                    self.prev_significant = byte;
                }
                b'}' | b']' => {
                    if self.depth == 0 {
                        return Err(IngestError::IncompleteStream(
                            "unbalanced closing bracket".to_string(),
                        ));
                    }
                    self.depth -= 1;
                    if self.state == ScannerState::Items {
                        if byte == b'}' && self.depth == 2 {
                            let start = self.item_start.take().ok_or_else(|| {
                                IngestError::IncompleteStream(
                                    "item closed without an opening brace".to_string(),
                                )
                            })?;
                            let page: PageItem =
                                serde_json::from_slice(&self.buffer[start..=self.pos])?;
                            flatten_page(page, &mut entries);
                        } else if byte == b']' && self.depth == 1 {
                            self.state = ScannerState::Done;
                        }
                    }
                    self.prev_significant = byte;
                }
                b':' => {
                    if self.state == ScannerState::Preamble
                        && self.depth == 1
                        && self.key.as_slice() == b"items"
                    {
                        self.items_key_seen = true;
                    }
                    self.prev_significant = byte;
                }
                b',' => {
                    if self.state == ScannerState::Preamble && self.depth == 1 {
                        self.items_key_seen = false;
                    }
                    self.prev_significant = byte;
                }
                c if c.is_ascii_whitespace() => {}
                _ => self.prev_significant = byte,
            }
            self.pos += 1;
        }

        self.compact();
        Ok(entries)
    }

    /// Signal end of stream, failing when the artifact was truncated mid-structure.
    pub fn finish(&self) -> Result<(), IngestError> {
        match self.state {
            ScannerState::Done => Ok(()),
            ScannerState::Preamble => Err(IngestError::IncompleteStream(
                "stream ended before the items array was found".to_string(),
            )),
            ScannerState::Items => Err(IngestError::IncompleteStream(
                "stream ended inside the items array".to_string(),
            )),
        }
    }

    /// Drop consumed bytes, keeping only an in-progress page object.
    fn compact(&mut self) {
        let keep_from = self.item_start.unwrap_or(self.pos);
        if keep_from == 0 {
            return;
        }
        self.buffer.drain(..keep_from);
        self.pos -= keep_from;
        if let Some(start) = self.item_start.as_mut() {
            *start -= keep_from;
        }
    }
}

impl Default for ItemScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn flatten_page(page: PageItem, entries: &mut Vec<DocumentEntry>) {
    for paragraph in page.paragraphs {
        let text = paragraph.content.trim();
        if text.is_empty() {
            continue;
        }
        entries.push(DocumentEntry {
            page_number: page.page_number,
            paragraph_number: paragraph.paragraph_number,
            text: text.to_string(),
        });
    }
}

/// Turn a blob byte stream into a lazy, finite sequence of document entries.
///
/// The stream is consumed once; paragraphs are yielded as soon as their page finishes
/// parsing, without buffering the whole artifact.
pub fn stream_entries(
    mut source: ByteStream,
) -> impl Stream<Item = Result<DocumentEntry, IngestError>> {
    try_stream! {
        let mut scanner = ItemScanner::new();
        while let Some(chunk) = source.next().await {
            let chunk = chunk?;
            for entry in scanner.feed(&chunk)? {
                yield entry;
            }
        }
        scanner.finish()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIFACT: &str = r#"{
        "file_type": "pdf",
        "file_name": "evidence [items].pdf",
        "request_id": "req-1",
        "items": [
            {
                "page_number": 1,
                "paragraphs": [
                    {"paragraph_number": 1, "content": "First paragraph."},
                    {"paragraph_number": 2, "content": "  "}
                ],
                "tables": [{"rows": [["a", "b"]]}]
            },
            {
                "page_number": 2,
                "paragraphs": [
                    {"paragraph_number": 1, "content": " Second page text. "}
                ]
            }
        ]
    }"#;

    fn collect_entries(chunk_size: usize) -> Vec<DocumentEntry> {
        let bytes = ARTIFACT.as_bytes();
        let mut scanner = ItemScanner::new();
        let mut entries = Vec::new();
        for chunk in bytes.chunks(chunk_size) {
            entries.extend(scanner.feed(chunk).expect("feed"));
        }
        scanner.finish().expect("finish");
        entries
    }

    #[test]
    fn yields_every_paragraph_in_order() {
        let entries = collect_entries(ARTIFACT.len());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].page_number, Some(1));
        assert_eq!(entries[0].text, "First paragraph.");
        assert_eq!(entries[1].page_number, Some(2));
        assert_eq!(entries[1].text, "Second page text.");
    }

    #[test]
    fn byte_at_a_time_feed_matches_whole_blob() {
        assert_eq!(collect_entries(1), collect_entries(ARTIFACT.len()));
    }

    #[test]
    fn buffer_never_retains_consumed_pages() {
        let bytes = ARTIFACT.as_bytes();
        let mut scanner = ItemScanner::new();
        for chunk in bytes.chunks(7) {
            scanner.feed(chunk).expect("feed");
            // At most one partially-read page object stays buffered.
            assert!(scanner.buffer.len() <= 256);
        }
    }

    #[test]
    fn items_key_inside_string_value_is_ignored() {
        // "file_name" above contains the text "[items]" and must not trigger array mode.
        let entries = collect_entries(11);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn truncated_stream_fails_at_finish() {
        let bytes = &ARTIFACT.as_bytes()[..ARTIFACT.len() / 2];
        let mut scanner = ItemScanner::new();
        scanner.feed(bytes).expect("feed");
        assert!(matches!(
            scanner.finish(),
            Err(IngestError::IncompleteStream(_))
        ));
    }

    #[test]
    fn missing_items_array_fails_at_finish() {
        let mut scanner = ItemScanner::new();
        scanner
            .feed(br#"{"file_type": "pdf", "request_id": "req-1"}"#)
            .expect("feed");
        assert!(matches!(
            scanner.finish(),
            Err(IngestError::IncompleteStream(_))
        ));
    }

    #[test]
    fn trailing_fields_after_items_are_drained() {
        let raw = br#"{"items": [{"page_number": 3, "paragraphs": [{"paragraph_number": 1, "content": "tail"}]}], "file_name": "x.json"}"#;
        let mut scanner = ItemScanner::new();
        let entries = scanner.feed(raw).expect("feed");
        scanner.finish().expect("finish");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].page_number, Some(3));
    }
}
