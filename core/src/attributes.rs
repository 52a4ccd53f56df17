//! Per-character attribute and clause decoding.
//!
//! The host reports composition strings as UTF-16 and indexes attributes,
//! clause boundaries and the caret in UTF-16 units. Everything exposed by this
//! crate is indexed by `char` instead, so the decoder first builds a
//! [`Utf16Text`] that knows where each char starts and then projects the raw
//! arrays onto it.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{ImeError, Result};

/// Visual classification of one composition character.
///
/// Consumers only use this to pick a colour; it carries no other meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionAttribute {
    /// Raw input not yet converted.
    Input,
    /// Focused conversion unit, converted.
    TargetConverted,
    /// Converted but not focused.
    Converted,
    /// Focused conversion unit, not converted.
    TargetNotConverted,
    /// Input the IME engine rejects.
    InputError,
    /// Locked segment within the composition.
    FixedConverted,
}

impl CompositionAttribute {
    /// Every variant, in native code order.
    pub const ALL: [CompositionAttribute; 6] = [
        Self::Input,
        Self::TargetConverted,
        Self::Converted,
        Self::TargetNotConverted,
        Self::InputError,
        Self::FixedConverted,
    ];

    /// Map a native attribute code. Codes outside the known table yield `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Native attribute code of this variant.
    pub fn code(self) -> u8 {
        match self {
            Self::Input => 0,
            Self::TargetConverted => 1,
            Self::Converted => 2,
            Self::TargetNotConverted => 3,
            Self::InputError => 4,
            Self::FixedConverted => 5,
        }
    }

    /// Whether this character belongs to the focused conversion unit.
    pub fn is_target(self) -> bool {
        matches!(self, Self::TargetConverted | Self::TargetNotConverted)
    }
}

impl Default for CompositionAttribute {
    fn default() -> Self {
        Self::Input
    }
}

/// Decode the attribute at `index` of a raw native attribute array.
///
/// Unknown codes decode as [`CompositionAttribute::Input`].
pub fn decode_attribute(raw: &[u8], index: usize) -> Result<CompositionAttribute> {
    let code = raw.get(index).copied().ok_or(ImeError::IndexOutOfRange {
        index,
        len: raw.len(),
    })?;
    Ok(classify_code(code))
}

fn classify_code(code: u8) -> CompositionAttribute {
    CompositionAttribute::from_code(code).unwrap_or_else(|| {
        tracing::warn!(code, "unknown composition attribute code, treating as input");
        CompositionAttribute::Input
    })
}

/// UTF-16 text decoded into a `String`, remembering the UTF-16 offset at
/// which every char starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Utf16Text {
    text: String,
    char_starts: Vec<usize>,
    units: usize,
}

impl Utf16Text {
    /// Decode a UTF-16 buffer. Unpaired surrogates become U+FFFD.
    pub fn decode(units: &[u16]) -> Self {
        let mut text = String::with_capacity(units.len());
        let mut char_starts = Vec::with_capacity(units.len());
        let mut offset = 0;
        for decoded in char::decode_utf16(units.iter().copied()) {
            char_starts.push(offset);
            match decoded {
                Ok(ch) => {
                    text.push(ch);
                    offset += ch.len_utf16();
                }
                Err(_) => {
                    text.push(char::REPLACEMENT_CHARACTER);
                    offset += 1;
                }
            }
        }
        Self {
            text,
            char_starts,
            units: units.len(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Length in chars.
    pub fn char_len(&self) -> usize {
        self.char_starts.len()
    }

    /// Length in UTF-16 units.
    pub fn unit_len(&self) -> usize {
        self.units
    }

    /// UTF-16 offset at which each char starts.
    pub fn char_starts(&self) -> &[usize] {
        &self.char_starts
    }

    /// Convert a UTF-16 offset into a char index, clamped to `char_len()`.
    ///
    /// An offset that splits a surrogate pair rounds up to the next char.
    pub fn char_index(&self, unit_offset: usize) -> usize {
        self.char_starts.partition_point(|&start| start < unit_offset)
    }
}

/// Project a raw per-unit attribute array onto the chars of `text`.
///
/// The result always has exactly `text.char_len()` entries: a char whose
/// first unit has no attribute is classified as `Input`.
pub fn decode_attributes(raw: &[u8], text: &Utf16Text) -> Vec<CompositionAttribute> {
    if !raw.is_empty() && raw.len() != text.unit_len() {
        tracing::debug!(
            attrs = raw.len(),
            units = text.unit_len(),
            "attribute array length differs from text length"
        );
    }
    text.char_starts()
        .iter()
        .map(|&start| {
            raw.get(start)
                .copied()
                .map(classify_code)
                .unwrap_or_default()
        })
        .collect()
}

/// Decode raw clause offsets into char boundaries.
///
/// Offsets are converted from UTF-16 units, clamped to the text length and
/// made non-decreasing by dropping any value smaller than its predecessor.
pub fn decode_clauses(raw: &[u32], text: &Utf16Text) -> Vec<usize> {
    let mut boundaries: Vec<usize> = Vec::with_capacity(raw.len());
    for &offset in raw {
        let index = text.char_index(offset as usize).min(text.char_len());
        match boundaries.last() {
            Some(&last) if index < last => {
                tracing::debug!(offset, last, "dropping out-of-order clause boundary");
            }
            _ => boundaries.push(index),
        }
    }
    boundaries
}

/// Contiguous runs delimited by consecutive boundaries. Empty runs are skipped.
pub fn clause_ranges(boundaries: &[usize]) -> impl Iterator<Item = Range<usize>> + '_ {
    boundaries
        .windows(2)
        .map(|pair| pair[0]..pair[1])
        .filter(|range| !range.is_empty())
}

/// Convert a string into the UTF-16 units the host would report.
pub fn to_utf16(text: &str) -> Vec<u16> {
    text.encode_utf16().collect()
}
