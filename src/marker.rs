//! Layout of the marker string inside the target class.
//!
//! The target class carries a string constant of the form
//!
//! ```text
//! xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx0
//! |<-------- PATTERN x PATTERN_COUNT -------->|^ version counter
//! ```
//!
//! Every transformation bumps the counter and writes one record into the next
//! pattern-wide slot after the first pattern:
//!
//! ```text
//! slot 0        slot 1         slot 2         ...  slot 5         counter
//! xxxxxxxx      0JINSTax       1JINSTbx       ...  xxxxxxxx       2
//! ```
//!
//! A record is `[version before the patch][WATERMARK][identity]`.

use crate::pattern;

/// Class name prefix of the class being watermarked.
pub const TARGET_CLASS: &str = "io/simonis/InstrumentationTest";

/// Filler the marker string is made of.
pub const PATTERN: [u8; 8] = *b"xxxxxxxx";

/// Number of `PATTERN` repetitions in front of the version counter.
pub const PATTERN_COUNT: usize = 6;

/// Tag identifying this agent as the writer of a record.
pub const WATERMARK: [u8; 5] = *b"JINST";

/// Counter value of an untouched marker.
pub const INITIAL_VERSION: u8 = b'0';

/// Identity used when no options are given.
pub const DEFAULT_IDENTITY: u8 = b'a';

pub const RECORD_LEN: usize = 1 + WATERMARK.len() + 1;

/// Slot `PATTERN_COUNT` would start on the counter byte itself.
pub const MAX_RECORDS: usize = PATTERN_COUNT - 1;

const _: () = assert!(RECORD_LEN <= PATTERN.len());
// The last record ends before the counter byte.
const _: () = assert!(slot_offset(0, MAX_RECORDS) + RECORD_LEN <= counter_offset(0));

/// Offset of the version counter for a marker found at `marker`.
pub const fn counter_offset(marker: usize) -> usize {
    marker + PATTERN_COUNT * PATTERN.len()
}

/// Offset of record slot `slot` (1-based) for a marker found at `marker`.
pub const fn slot_offset(marker: usize, slot: usize) -> usize {
    marker + slot * PATTERN.len()
}

/// Locates the marker in a class buffer.
pub fn locate(buf: &[u8]) -> Option<usize> {
    pattern::find(buf, &PATTERN)
}

/// One record written by one transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchRecord {
    /// 1-based slot index, also the transformation's position in the sequence.
    pub slot: usize,
    /// Absolute buffer offset of the record.
    pub offset: usize,
    /// Counter value before this transformation.
    pub version: u8,
    pub identity: u8,
}

impl PatchRecord {
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0] = self.version;
        out[1..=WATERMARK.len()].copy_from_slice(&WATERMARK);
        out[RECORD_LEN - 1] = self.identity;
        out
    }

    /// Decodes the record at `offset`, `None` if the watermark is missing.
    fn decode(buf: &[u8], slot: usize, offset: usize) -> Option<Self> {
        let bytes = buf.get(offset..offset + RECORD_LEN)?;
        if bytes[1..=WATERMARK.len()] != WATERMARK {
            return None;
        }
        Some(PatchRecord {
            slot,
            offset,
            version: bytes[0],
            identity: bytes[RECORD_LEN - 1],
        })
    }
}

/// What a marker says about the transformations applied to a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    pub marker_offset: usize,
    /// Raw counter byte.
    pub version: u8,
    /// Watermarked records in slot order. Slots without the watermark are
    /// skipped.
    pub records: Vec<PatchRecord>,
}

impl History {
    /// Number of transformations the counter claims, if it is a digit.
    pub fn transform_count(&self) -> Option<usize> {
        self.version
            .is_ascii_digit()
            .then(|| (self.version - INITIAL_VERSION) as usize)
    }

    /// Identities of the transformers in the order they ran.
    pub fn identities(&self) -> Vec<u8> {
        self.records.iter().map(|r| r.identity).collect()
    }
}

/// Reads back the counter and all records of the marker in `buf`.
///
/// `None` if there is no marker or the buffer ends before its counter.
pub fn read_history(buf: &[u8]) -> Option<History> {
    let marker_offset = locate(buf)?;
    let version = *buf.get(counter_offset(marker_offset))?;

    let mut history = History {
        marker_offset,
        version,
        records: Vec::new(),
    };
    let recorded = history.transform_count().unwrap_or(0).min(MAX_RECORDS);
    history.records = (1..=recorded)
        .filter_map(|slot| PatchRecord::decode(buf, slot, slot_offset(marker_offset, slot)))
        .collect();
    Some(history)
}
