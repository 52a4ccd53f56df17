//! In-memory backend with scripted payloads.
//!
//! Lets the bridge run without a live input method: tests and the replay
//! tool load what the next queries should return, then feed the bridge the
//! raw messages a real host would send. Payloads are stored in their native
//! encodings (UTF-16, per-unit attributes, candidate blobs) so the full
//! decoding path is exercised.

use crate::attributes::CompositionAttribute;
use crate::candidate::RawCandidateList;
use crate::composition::RawComposition;
use crate::error::{ImeError, Result};
use crate::native::{
    self, AttributeField, ClauseField, ImeBackend, RawMessage, StringField,
};
use crate::result::RawResult;

/// Scripted [`ImeBackend`].
#[derive(Debug, Default)]
pub struct SyntheticBackend {
    composition: RawComposition,
    result: RawResult,
    candidates: Vec<u8>,
    fail_queries: bool,
    fail_release: bool,
    associated: bool,
    associate_calls: usize,
    disassociate_calls: usize,
    release_calls: usize,
    passed_through: Vec<RawMessage>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self {
            associated: true,
            candidates: native::encode_candidate_list(&RawCandidateList::default()),
            ..Self::default()
        }
    }

    /// Composition the next queries return. Attributes and clause
    /// boundaries are per char; `cursor` is a char index.
    pub fn set_composition(
        &mut self,
        text: &str,
        attributes: &[CompositionAttribute],
        clauses: &[usize],
        cursor: usize,
    ) {
        self.composition.text = text.encode_utf16().collect();
        self.composition.attributes = unit_attributes(text, attributes);
        self.composition.clauses = clauses.iter().map(|&c| unit_offset(text, c)).collect();
        self.composition.cursor = unit_offset(text, cursor);
    }

    /// Reading string of the composition, with per-char clause boundaries.
    pub fn set_reading(&mut self, reading: &str, clauses: &[usize]) {
        self.composition.reading = reading.encode_utf16().collect();
        self.composition.reading_attributes =
            unit_attributes(reading, &vec![CompositionAttribute::Input; reading.chars().count()]);
        self.composition.reading_clauses =
            clauses.iter().map(|&c| unit_offset(reading, c)).collect();
    }

    /// Replace the composition payload with raw native data.
    pub fn set_raw_composition(&mut self, raw: RawComposition) {
        self.composition = raw;
    }

    pub fn clear_composition(&mut self) {
        self.composition = RawComposition::default();
    }

    /// Candidate list the next query returns.
    pub fn set_candidates<S: AsRef<str>>(
        &mut self,
        items: &[S],
        page_start: u32,
        page_size: u32,
        selection: u32,
    ) {
        self.candidates = native::encode_candidate_list(&RawCandidateList {
            style: 0,
            items: items.iter().map(|s| s.as_ref().to_string()).collect(),
            selection,
            page_start,
            page_size,
        });
    }

    /// Candidate payload as raw bytes, e.g. to inject a malformed blob.
    pub fn set_candidate_blob(&mut self, blob: Vec<u8>) {
        self.candidates = blob;
    }

    /// Committed text the next result query returns.
    pub fn set_result(&mut self, text: &str) {
        self.result = RawResult {
            text: text.encode_utf16().collect(),
            clauses: vec![0, text.encode_utf16().count() as u32],
            ..RawResult::default()
        };
    }

    /// Committed text as raw UTF-16 units.
    pub fn set_result_units(&mut self, units: Vec<u16>) {
        self.result = RawResult {
            text: units,
            ..RawResult::default()
        };
    }

    pub fn set_result_reading(&mut self, reading: &str) {
        self.result.reading = reading.encode_utf16().collect();
        self.result.reading_clauses = vec![0, self.result.reading.len() as u32];
    }

    /// Make every query fail until reset.
    pub fn set_fail_queries(&mut self, fail: bool) {
        self.fail_queries = fail;
    }

    /// Make `release` fail.
    pub fn set_fail_release(&mut self, fail: bool) {
        self.fail_release = fail;
    }

    pub fn is_associated(&self) -> bool {
        self.associated
    }

    pub fn associate_calls(&self) -> usize {
        self.associate_calls
    }

    pub fn disassociate_calls(&self) -> usize {
        self.disassociate_calls
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls
    }

    /// Messages forwarded to the default handler, in order.
    pub fn passed_through(&self) -> &[RawMessage] {
        &self.passed_through
    }

    fn check(&self, query: &'static str) -> Result<()> {
        if self.fail_queries {
            Err(ImeError::query(query, "scripted failure"))
        } else {
            Ok(())
        }
    }
}

impl ImeBackend for SyntheticBackend {
    fn query_composition_buffer(&mut self, field: StringField) -> Result<Vec<u16>> {
        self.check("composition buffer")?;
        Ok(match field {
            StringField::Composition => self.composition.text.clone(),
            StringField::CompositionReading => self.composition.reading.clone(),
            StringField::Result => self.result.text.clone(),
            StringField::ResultReading => self.result.reading.clone(),
        })
    }

    fn query_attributes(&mut self, field: AttributeField) -> Result<Vec<u8>> {
        self.check("attributes")?;
        Ok(match field {
            AttributeField::Composition => self.composition.attributes.clone(),
            AttributeField::CompositionReading => self.composition.reading_attributes.clone(),
        })
    }

    fn query_clauses(&mut self, field: ClauseField) -> Result<Vec<u32>> {
        self.check("clauses")?;
        Ok(match field {
            ClauseField::Composition => self.composition.clauses.clone(),
            ClauseField::CompositionReading => self.composition.reading_clauses.clone(),
            ClauseField::Result => self.result.clauses.clone(),
            ClauseField::ResultReading => self.result.reading_clauses.clone(),
        })
    }

    fn query_cursor_position(&mut self) -> Result<u32> {
        self.check("cursor position")?;
        Ok(self.composition.cursor)
    }

    fn query_candidates(&mut self) -> Result<Vec<u8>> {
        self.check("candidates")?;
        Ok(self.candidates.clone())
    }

    fn associate_context(&mut self) -> Result<()> {
        self.associate_calls += 1;
        self.associated = true;
        Ok(())
    }

    fn disassociate_context(&mut self) -> Result<()> {
        self.disassociate_calls += 1;
        self.associated = false;
        Ok(())
    }

    fn default_handler(&mut self, message: &RawMessage) -> isize {
        self.passed_through.push(*message);
        0
    }

    fn release(&mut self) -> Result<()> {
        self.release_calls += 1;
        if self.fail_release {
            return Err(ImeError::ContextRelease("scripted failure".into()));
        }
        self.associated = true;
        Ok(())
    }
}

fn unit_offset(text: &str, char_index: usize) -> u32 {
    text.chars().take(char_index).map(char::len_utf16).sum::<usize>() as u32
}

fn unit_attributes(text: &str, attributes: &[CompositionAttribute]) -> Vec<u8> {
    text.chars()
        .enumerate()
        .flat_map(|(i, ch)| {
            let code = attributes.get(i).copied().unwrap_or_default().code();
            std::iter::repeat(code).take(ch.len_utf16())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composition_is_encoded_per_unit() {
        let mut backend = SyntheticBackend::new();
        backend.set_composition(
            "a𠀀",
            &[CompositionAttribute::Input, CompositionAttribute::Converted],
            &[0, 1, 2],
            2,
        );
        assert_eq!(
            backend.query_composition_buffer(StringField::Composition).unwrap().len(),
            3
        );
        assert_eq!(backend.query_attributes(AttributeField::Composition).unwrap(), vec![0, 2, 2]);
        assert_eq!(backend.query_clauses(ClauseField::Composition).unwrap(), vec![0, 1, 3]);
        assert_eq!(backend.query_cursor_position().unwrap(), 3);
    }

    #[test]
    fn test_scripted_failure() {
        let mut backend = SyntheticBackend::new();
        backend.set_fail_queries(true);
        assert!(matches!(
            backend.query_candidates(),
            Err(ImeError::NativeQueryFailure { query: "candidates", .. })
        ));
        assert!(backend.query_result().is_err());
    }

    #[test]
    fn test_default_candidates_decode_empty() {
        let mut backend = SyntheticBackend::new();
        let blob = backend.query_candidates().unwrap();
        assert!(native::decode_candidate_list(&blob).unwrap().items.is_empty());
    }
}
