//! Header metadata extraction.
//!
//! Two independent strategies behind one entry point, [`extract`]:
//!
//! - **Interchange**: EDI envelope fields (`ISA01`..`ISA16`, `GS01`..`GS08`,
//!   `ST01`..`ST02`). The envelope declares its own separators: the byte at
//!   offset 3 splits elements, the byte at offset 105 ends segments.
//! - **Tag**: the first inline `<key>value</key>` span of the file.
//!
//! Only a bounded prefix of the file is ever read. Every failure (missing
//! file, short header, absent key) resolves to `None`.

use log::debug;
use regex::bytes::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes scanned for interchange keys.
pub const INTERCHANGE_PREFIX_LEN: u64 = 256;
/// Bytes scanned for inline tags.
pub const TAG_PREFIX_LEN: u64 = 2048;

const ELEMENT_SEPARATOR_OFFSET: usize = 3;
const SEGMENT_DELIMITER_OFFSET: usize = 105;

/// Characters stripped from both ends of every element.
const TRIM_SET: &[u8] = b" \t\n\r\0\x0B";

/// Highest element number exposed for each envelope segment.
const INTERCHANGE_SEGMENTS: &[(&str, u32)] = &[("ISA", 16), ("GS", 8), ("ST", 2)];

/// Whether `key` selects the interchange strategy.
pub fn is_interchange_key(key: &str) -> bool {
    INTERCHANGE_SEGMENTS.iter().any(|(tag, max)| {
        key.strip_prefix(tag)
            .filter(|digits| digits.len() == 2 && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u32>().ok())
            .is_some_and(|n| (1..=*max).contains(&n))
    })
}

/// Look up `key` in the header of the file at `path`.
pub fn extract(key: &str, path: &Path) -> Option<String> {
    if is_interchange_key(key) {
        let header = read_prefix(path, INTERCHANGE_PREFIX_LEN)?;
        MetadataIndex::from_interchange(&header)?.get(key).map(str::to_string)
    } else {
        let header = read_prefix(path, TAG_PREFIX_LEN)?;
        find_tag(&header, key)
    }
}

// ── Interchange index ────────────────────────────────────────────────────────

/// Flat `TAGnn → value` mapping of one interchange header.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MetadataIndex {
    fields: HashMap<String, String>,
}

impl MetadataIndex {
    /// Index an interchange header. Returns `None` when the buffer is too
    /// short to declare both separators.
    pub fn from_interchange(header: &[u8]) -> Option<Self> {
        let separator = *header.get(ELEMENT_SEPARATOR_OFFSET)?;
        let delimiter = *header.get(SEGMENT_DELIMITER_OFFSET)?;

        let mut fields = HashMap::new();
        for segment in header.split(|b| *b == delimiter) {
            let mut elements = segment.split(|b| *b == separator).map(trim_element);
            let Some(tag) = elements.next() else {
                continue;
            };
            let tag = String::from_utf8_lossy(tag);
            for (position, value) in elements.enumerate() {
                // Later segments overwrite earlier ones with the same key.
                fields.insert(
                    format!("{}{:02}", tag, position + 1),
                    String::from_utf8_lossy(value).into_owned(),
                );
            }
        }
        Some(Self { fields })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn trim_element(element: &[u8]) -> &[u8] {
    let start = element
        .iter()
        .position(|b| !TRIM_SET.contains(b))
        .unwrap_or(element.len());
    let end = element
        .iter()
        .rposition(|b| !TRIM_SET.contains(b))
        .map_or(start, |p| p + 1);
    &element[start..end]
}

// ── Tag lookup ───────────────────────────────────────────────────────────────

/// Text of the first `<key>value</key>` span in `header`.
pub fn find_tag(header: &[u8], key: &str) -> Option<String> {
    let escaped = regex::escape(key);
    let pattern = format!("(?m)<{0}>([^<]*)</{0}>", escaped);
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            debug!("tag pattern for '{}' rejected: {}", key, e);
            return None;
        }
    };
    re.captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
}

fn read_prefix(path: &Path, limit: u64) -> Option<Vec<u8>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            debug!("metadata scan of '{}' skipped: {}", path.display(), e);
            return None;
        }
    };
    let mut buf = Vec::with_capacity(limit as usize);
    if let Err(e) = file.take(limit).read_to_end(&mut buf) {
        debug!("metadata scan of '{}' failed: {}", path.display(), e);
        return None;
    }
    Some(buf)
}
