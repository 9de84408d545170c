// CWA session reader: block classification loop and metadata accumulation

use crate::core::block::{BlockKind, CwaBlock};
use crate::core::constants::*;
use crate::core::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use tracing::debug;

// Short annotation keys written by the device setup tools, mapped to their
// canonical long names.
const LABEL_MAP: &[(&str, &str)] = &[
    // At device set-up time
    ("_c", "studyCentre"),
    ("_s", "studyCode"),
    ("_i", "investigator"),
    ("_x", "exerciseCode"),
    ("_v", "volunteerNum"),
    ("_p", "bodyLocation"),
    ("_so", "setupOperator"),
    ("_n", "notes"),
    // At retrieval time
    ("_b", "startTime"),
    ("_e", "endTime"),
    ("_ro", "recoveryOperator"),
    ("_r", "retrievalTime"),
    ("_co", "comments"),
];

/// Serializable summary of the session established by the file header.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub device_id: Option<u16>,
    pub session_id: Option<u32>,
    pub annotations: BTreeMap<String, String>,
}

/// Pulls blocks from a byte source, tracks the current session identity and
/// accumulates header metadata.
///
/// One `CwaBlock` is owned and reused across decodes; `peek_block` hands out
/// a borrow of it, so a peeked block cannot outlive the next decode.
pub struct CwaReader<R> {
    source: R,
    block: CwaBlock,
    session_id: Option<u32>,
    device_id: Option<u16>,
    annotations: BTreeMap<String, String>,
}

impl<R: Read> CwaReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            block: CwaBlock::new(),
            session_id: None,
            device_id: None,
            annotations: BTreeMap::new(),
        }
    }

    /// Returns the buffered block without consuming it, decoding a new one
    /// only if none is buffered. Data blocks belonging to a different
    /// session than the established one are dropped, never surfaced; `None`
    /// strictly means end-of-stream.
    pub fn peek_block(&mut self) -> Result<Option<&CwaBlock>> {
        loop {
            if !self.block.is_valid() && !self.block.read_from(&mut self.source)? {
                return Ok(None);
            }
            if self.block.is_data_block() && self.session_id != Some(self.block.session_id()) {
                self.block.invalidate();
                continue;
            }
            break;
        }
        Ok(Some(&self.block))
    }

    /// Consumes the buffered block, or skips one physical block when none is
    /// buffered.
    pub fn read_block(&mut self) -> Result<()> {
        if !self.block.is_valid() {
            self.block.read_from(&mut self.source)?;
        }
        self.block.invalidate();
        Ok(())
    }

    /// Drives the reader forward past header and unrecognized blocks until
    /// the first data block (left buffered) or end-of-stream. Header blocks
    /// encountered here establish the session identity (first header only)
    /// and contribute annotations.
    pub fn skip_non_data_blocks(&mut self) -> Result<()> {
        loop {
            let kind = match self.peek_block()? {
                None => return Ok(()),
                Some(block) => block.kind(),
            };
            match kind {
                BlockKind::Data => return Ok(()),
                BlockKind::Header => self.process_header()?,
                BlockKind::Invalid => self.read_block()?,
            }
        }
    }

    /// Parses the two annotation sectors of a logical header: bytes 64..512
    /// of the current block, then the full 512 bytes of the next physical
    /// block. Consumes both.
    fn process_header(&mut self) -> Result<()> {
        if self.session_id.is_none() {
            self.session_id = Some(self.block.session_id());
            self.device_id = Some(self.block.device_id());
        }

        let mut metadata = String::with_capacity(2 * BLOCK_SIZE);
        push_annotation_chars(&mut metadata, &self.block.raw()[ANNOTATION_OFFSET..]);
        metadata.push('&');

        self.block.invalidate();
        if self.block.read_from(&mut self.source)? {
            push_annotation_chars(&mut metadata, &self.block.raw()[..]);
            self.block.invalidate();
        }

        self.parse_annotations(&metadata);
        Ok(())
    }

    fn parse_annotations(&mut self, metadata: &str) {
        for pair in metadata.split('&').filter(|p| !p.is_empty()) {
            let eq = match pair.find('=') {
                Some(i) if i > 0 && i < pair.len() - 1 => i,
                _ => continue,
            };
            let name = match percent_decode(&pair[..eq]) {
                Some(name) => name,
                None => {
                    debug!("skipping annotation with undecodable name: {}", pair);
                    continue;
                }
            };
            let value = match percent_decode(&pair[eq + 1..]) {
                Some(value) => value,
                None => {
                    debug!("skipping annotation with undecodable value: {}", pair);
                    continue;
                }
            };
            let canonical = LABEL_MAP
                .iter()
                .find(|(short, _)| *short == name)
                .map(|(_, long)| (*long).to_string())
                .unwrap_or(name);
            self.annotations.insert(canonical, value);
        }
    }

    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    pub fn device_id(&self) -> Option<u16> {
        self.device_id
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    pub fn session_info(&self) -> SessionInfo {
        SessionInfo {
            device_id: self.device_id,
            session_id: self.session_id,
            annotations: self.annotations.clone(),
        }
    }
}

/// Appends the annotation-relevant characters of a sector: printable ASCII
/// with spaces dropped, and the `?` separator fixup mapped back to `&`.
fn push_annotation_chars(out: &mut String, sector: &[u8]) {
    for &b in sector {
        if b > 0x20 && b < 0x7F {
            out.push(if b == b'?' { '&' } else { b as char });
        }
    }
}

/// URL-decodes one annotation name or value. Returns `None` for malformed
/// escapes or non-UTF-8 results; the caller skips that pair.
fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3)?;
                let hi = (hex[0] as char).to_digit(16)?;
                let lo = (hex[1] as char).to_digit(16)?;
                out.push((hi * 16 + lo) as u8);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testutil::{data_block, header_blocks, TestDataBlock};
    use std::io::Cursor;

    fn reader_over(bytes: Vec<u8>) -> CwaReader<Cursor<Vec<u8>>> {
        CwaReader::new(Cursor::new(bytes))
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("plain").as_deref(), Some("plain"));
        assert_eq!(percent_decode("a%20b").as_deref(), Some("a b"));
        assert_eq!(percent_decode("a+b").as_deref(), Some("a b"));
        assert_eq!(percent_decode("%41%627").as_deref(), Some("Ab7"));
        assert_eq!(percent_decode("bad%2"), None);
        assert_eq!(percent_decode("bad%zz"), None);
    }

    #[test]
    fn test_skip_establishes_session_and_annotations() {
        let mut file = header_blocks(9, 42, "_c=centre%201?_s=ax3", "_b=1400000000000");
        file.extend(data_block(&TestDataBlock::new(9, &[(1, 2, 3)])));
        let mut reader = reader_over(file);
        reader.skip_non_data_blocks().unwrap();

        assert_eq!(reader.session_id(), Some(9));
        assert_eq!(reader.device_id(), Some(42));
        assert_eq!(
            reader.annotations().get("studyCentre").map(String::as_str),
            Some("centre 1")
        );
        assert_eq!(
            reader.annotations().get("studyCode").map(String::as_str),
            Some("ax3")
        );
        assert_eq!(
            reader.annotations().get("startTime").map(String::as_str),
            Some("1400000000000")
        );

        // The first data block is left buffered for the caller
        let block = reader.peek_block().unwrap().expect("data block");
        assert!(block.is_data_block());
        assert_eq!(block.sample_values(), &[1, 2, 3]);
    }

    #[test]
    fn test_annotation_edge_pairs() {
        let file = header_blocks(1, 1, "nameonly?=value?empty=?a=1?a=2", "unknownKey=kept");
        let mut reader = reader_over(file);
        reader.skip_non_data_blocks().unwrap();

        let ann = reader.annotations();
        // Name-only and half-empty pairs are discarded
        assert!(!ann.contains_key("nameonly"));
        assert!(!ann.contains_key("empty"));
        assert!(!ann.contains_key(""));
        // Later duplicate wins
        assert_eq!(ann.get("a").map(String::as_str), Some("2"));
        // Names outside the label map are kept as-is
        assert_eq!(ann.get("unknownKey").map(String::as_str), Some("kept"));
    }

    #[test]
    fn test_malformed_escape_skips_single_pair() {
        let file = header_blocks(1, 1, "good=1?bad=%zz?also=2", "");
        let mut reader = reader_over(file);
        reader.skip_non_data_blocks().unwrap();
        let ann = reader.annotations();
        assert_eq!(ann.get("good").map(String::as_str), Some("1"));
        assert!(!ann.contains_key("bad"));
        assert_eq!(ann.get("also").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_foreign_session_data_dropped() {
        let mut file = header_blocks(1, 42, "", "");
        file.extend(data_block(&TestDataBlock::new(2, &[(9, 9, 9)])));
        file.extend(data_block(&TestDataBlock::new(1, &[(1, 1, 1)])));
        let mut reader = reader_over(file);
        reader.skip_non_data_blocks().unwrap();

        // The session-2 block is dropped; peek lands on the session-1 block
        let block = reader.peek_block().unwrap().expect("data block");
        assert_eq!(block.session_id(), 1);
        assert_eq!(block.sample_values(), &[1, 1, 1]);
        reader.read_block().unwrap();
        assert!(reader.peek_block().unwrap().is_none());
    }

    #[test]
    fn test_data_before_any_header_dropped() {
        let file = data_block(&TestDataBlock::new(5, &[(1, 1, 1)]));
        let mut reader = reader_over(file);
        assert!(reader.peek_block().unwrap().is_none());
    }

    #[test]
    fn test_truncated_header_sector_two() {
        // Header first block followed by nothing: sector 1 still parses
        let file = header_blocks(1, 7, "_n=note", "")[..BLOCK_SIZE].to_vec();
        let mut reader = reader_over(file);
        reader.skip_non_data_blocks().unwrap();
        assert_eq!(
            reader.annotations().get("notes").map(String::as_str),
            Some("note")
        );
        assert_eq!(reader.device_id(), Some(7));
    }
}
