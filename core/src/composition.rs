//! In-progress composition and its reading shadow.
//!
//! The composition is the uncommitted text the user is building, e.g. typing
//! "nihao" might show "你好" with "ni hao" as the reading. It is replaced
//! wholesale every time the host reports a change and cleared when the
//! composition ends, is cancelled or is committed.

use serde::Serialize;
use std::ops::Range;

use crate::attributes::{self, CompositionAttribute, Utf16Text};
use crate::error::{ImeError, Result};

/// Raw composition payload as gathered from the host, still in UTF-16 units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawComposition {
    pub text: Vec<u16>,
    pub attributes: Vec<u8>,
    pub clauses: Vec<u32>,
    pub reading: Vec<u16>,
    pub reading_attributes: Vec<u8>,
    pub reading_clauses: Vec<u32>,
    /// Caret offset in UTF-16 units of `text`.
    pub cursor: u32,
}

/// Decoded composition state. All indices are char indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompositionState {
    text: String,
    reading_text: String,
    cursor: usize,
    attributes: Vec<CompositionAttribute>,
    reading_attributes: Vec<CompositionAttribute>,
    clauses: Vec<usize>,
    reading_clauses: Vec<usize>,
}

impl CompositionState {
    /// Create an empty composition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-derive every field from a raw payload.
    ///
    /// Afterwards `attributes().len() == char_len()` and every clause
    /// boundary lies in `[0, char_len()]`, non-decreasing.
    pub fn on_composition_changed(&mut self, raw: &RawComposition) {
        let text = Utf16Text::decode(&raw.text);
        let reading = Utf16Text::decode(&raw.reading);

        self.attributes = attributes::decode_attributes(&raw.attributes, &text);
        self.clauses = attributes::decode_clauses(&raw.clauses, &text);
        self.cursor = text.char_index(raw.cursor as usize);
        self.reading_attributes = attributes::decode_attributes(&raw.reading_attributes, &reading);
        self.reading_clauses = attributes::decode_clauses(&raw.reading_clauses, &reading);
        self.text = text.into_string();
        self.reading_text = reading.into_string();

        debug_assert_eq!(self.attributes.len(), self.char_len());
    }

    /// Clear every field.
    pub fn on_composition_ended(&mut self) {
        self.text.clear();
        self.reading_text.clear();
        self.cursor = 0;
        self.attributes.clear();
        self.reading_attributes.clear();
        self.clauses.clear();
        self.reading_clauses.clear();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Phonetic shadow of the composition; may differ in length from `text`.
    pub fn reading_text(&self) -> &str {
        &self.reading_text
    }

    /// Caret position as a char index into `text`.
    pub fn cursor_position(&self) -> usize {
        self.cursor
    }

    pub fn attributes(&self) -> &[CompositionAttribute] {
        &self.attributes
    }

    pub fn reading_attributes(&self) -> &[CompositionAttribute] {
        &self.reading_attributes
    }

    /// Clause boundaries over `text`.
    pub fn clauses(&self) -> &[usize] {
        &self.clauses
    }

    /// Clause boundaries over `reading_text`.
    pub fn reading_clauses(&self) -> &[usize] {
        &self.reading_clauses
    }

    /// Number of chars in the composition.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Attribute of the char at `index`.
    pub fn attribute_at(&self, index: usize) -> Result<CompositionAttribute> {
        self.attributes
            .get(index)
            .copied()
            .ok_or(ImeError::IndexOutOfRange {
                index,
                len: self.attributes.len(),
            })
    }

    /// Attribute of the reading char at `index`.
    pub fn reading_attribute_at(&self, index: usize) -> Result<CompositionAttribute> {
        self.reading_attributes
            .get(index)
            .copied()
            .ok_or(ImeError::IndexOutOfRange {
                index,
                len: self.reading_attributes.len(),
            })
    }

    /// Chars paired with their attribute, in order.
    pub fn chars_with_attributes(&self) -> impl Iterator<Item = (char, CompositionAttribute)> + '_ {
        self.text.chars().zip(self.attributes.iter().copied())
    }

    /// Clause runs as char ranges.
    pub fn clause_ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        attributes::clause_ranges(&self.clauses)
    }

    /// Char range of the clause that holds the focused conversion unit.
    pub fn target_clause(&self) -> Option<Range<usize>> {
        let target = self.attributes.iter().position(|attr| attr.is_target())?;
        self.clause_ranges()
            .find(|range| range.contains(&target))
            .or(Some(target..target + 1))
    }

    /// Substring covering a char range. Ranges past the end are clamped.
    pub fn slice(&self, range: Range<usize>) -> &str {
        let start = self.byte_offset(range.start);
        let end = self.byte_offset(range.end.max(range.start));
        &self.text[start..end]
    }

    fn byte_offset(&self, char_index: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_index)
            .map(|(offset, _)| offset)
            .unwrap_or(self.text.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::to_utf16;

    fn raw(text: &str, attrs: &[u8], clauses: &[u32], cursor: u32) -> RawComposition {
        RawComposition {
            text: to_utf16(text),
            attributes: attrs.to_vec(),
            clauses: clauses.to_vec(),
            cursor,
            ..RawComposition::default()
        }
    }

    #[test]
    fn test_new() {
        let comp = CompositionState::new();
        assert!(comp.is_empty());
        assert_eq!(comp.cursor_position(), 0);
        assert!(comp.attributes().is_empty());
        assert!(comp.clauses().is_empty());
    }

    #[test]
    fn test_char_len_counts_text_not_attributes() {
        let mut comp = CompositionState::new();
        // Attribute array longer than the text, with a surrogate pair
        comp.on_composition_changed(&raw("𠀀b", &[1, 1, 0, 0, 0], &[0, 3], 3));
        assert_eq!(comp.char_len(), 2);
        assert_eq!(comp.attributes().len(), comp.char_len());
        assert_eq!(comp.char_len(), comp.text().chars().count());
    }

    #[test]
    fn test_changed_decodes_fields() {
        let mut comp = CompositionState::new();
        let mut payload = raw("你好世界", &[2, 2, 1, 1], &[0, 2, 4], 4);
        payload.reading = to_utf16("ni hao shi jie");
        payload.reading_clauses = vec![0, 7, 14];

        comp.on_composition_changed(&payload);

        assert_eq!(comp.text(), "你好世界");
        assert_eq!(comp.reading_text(), "ni hao shi jie");
        assert_eq!(comp.cursor_position(), 4);
        assert_eq!(comp.char_len(), 4);
        assert_eq!(comp.clauses(), &[0, 2, 4]);
        assert_eq!(comp.reading_clauses(), &[0, 7, 14]);
        assert_eq!(comp.reading_attributes().len(), 14);
        assert_eq!(comp.attribute_at(2).unwrap(), CompositionAttribute::TargetConverted);
    }

    #[test]
    fn test_attribute_at_out_of_range() {
        let mut comp = CompositionState::new();
        comp.on_composition_changed(&raw("ab", &[0, 0], &[], 2));
        assert!(matches!(
            comp.attribute_at(2),
            Err(ImeError::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(comp.reading_attribute_at(0).is_err());
    }

    #[test]
    fn test_target_clause() {
        let mut comp = CompositionState::new();
        comp.on_composition_changed(&raw("你好世界", &[2, 2, 1, 1], &[0, 2, 4], 4));
        assert_eq!(comp.target_clause(), Some(2..4));
        assert_eq!(comp.slice(2..4), "世界");

        comp.on_composition_changed(&raw("ni", &[0, 0], &[], 2));
        assert_eq!(comp.target_clause(), None);
    }

    #[test]
    fn test_target_without_clauses_is_single_char() {
        let mut comp = CompositionState::new();
        comp.on_composition_changed(&raw("abc", &[0, 3, 0], &[], 0));
        assert_eq!(comp.target_clause(), Some(1..2));
    }

    #[test]
    fn test_slice_clamps() {
        let mut comp = CompositionState::new();
        comp.on_composition_changed(&raw("你好", &[0, 0], &[], 0));
        assert_eq!(comp.slice(1..9), "好");
        assert_eq!(comp.slice(5..9), "");
    }

    #[test]
    fn test_cursor_clamped_to_text() {
        let mut comp = CompositionState::new();
        comp.on_composition_changed(&raw("ab", &[0, 0], &[], 40));
        assert_eq!(comp.cursor_position(), 2);
    }

    #[test]
    fn test_ended_clears() {
        let mut comp = CompositionState::new();
        comp.on_composition_changed(&raw("你好", &[1, 1], &[0, 2], 2));
        comp.on_composition_ended();
        assert_eq!(comp, CompositionState::new());
    }
}
