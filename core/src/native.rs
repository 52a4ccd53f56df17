//! Host message catalogue, classification and the narrow backend interface.
//!
//! Message ids and flag values are those of the Windows IMM protocol. The
//! bridge only ever sees a [`RawMessage`]; every follow-up query for the
//! data a message announces goes through [`ImeBackend`], so decoding can be
//! exercised with synthetic payloads.

use crate::candidate::RawCandidateList;
use crate::error::{ImeError, Result};

pub const WM_DESTROY: u32 = 0x0002;
pub const WM_NCDESTROY: u32 = 0x0082;
pub const WM_CHAR: u32 = 0x0102;
pub const WM_IME_STARTCOMPOSITION: u32 = 0x010D;
pub const WM_IME_ENDCOMPOSITION: u32 = 0x010E;
pub const WM_IME_COMPOSITION: u32 = 0x010F;
pub const WM_IME_SETCONTEXT: u32 = 0x0281;
pub const WM_IME_NOTIFY: u32 = 0x0282;

pub const GCS_COMPREADSTR: isize = 0x0001;
pub const GCS_COMPREADATTR: isize = 0x0002;
pub const GCS_COMPREADCLAUSE: isize = 0x0004;
pub const GCS_COMPSTR: isize = 0x0008;
pub const GCS_COMPATTR: isize = 0x0010;
pub const GCS_COMPCLAUSE: isize = 0x0020;
pub const GCS_CURSORPOS: isize = 0x0080;
pub const GCS_RESULTREADSTR: isize = 0x0200;
pub const GCS_RESULTREADCLAUSE: isize = 0x0400;
pub const GCS_RESULTSTR: isize = 0x0800;
pub const GCS_RESULTCLAUSE: isize = 0x1000;

/// Flags a typical IME sends with a composition update.
pub const GCS_COMPOSITION_ALL: isize = GCS_COMPREADSTR
    | GCS_COMPREADATTR
    | GCS_COMPREADCLAUSE
    | GCS_COMPSTR
    | GCS_COMPATTR
    | GCS_COMPCLAUSE
    | GCS_CURSORPOS;
/// Flags a typical IME sends with a commit.
pub const GCS_RESULT_ALL: isize =
    GCS_RESULTREADSTR | GCS_RESULTREADCLAUSE | GCS_RESULTSTR | GCS_RESULTCLAUSE;

pub const IMN_CHANGECANDIDATE: usize = 0x0003;
pub const IMN_CLOSECANDIDATE: usize = 0x0004;
pub const IMN_OPENCANDIDATE: usize = 0x0005;

/// `ISC_SHOWUICOMPOSITIONWINDOW | ISC_SHOWUIALLCANDIDATEWINDOW | ISC_SHOWUIGUIDELINE`.
pub const ISC_SHOWUIALL: isize = 0xC000_000F_u32 as i32 as isize;

/// A window message exactly as the host delivered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMessage {
    pub msg: u32,
    pub wparam: usize,
    pub lparam: isize,
}

impl RawMessage {
    pub fn new(msg: u32, wparam: usize, lparam: isize) -> Self {
        Self { msg, wparam, lparam }
    }

    pub fn start_composition() -> Self {
        Self::new(WM_IME_STARTCOMPOSITION, 0, 0)
    }

    /// Composition update carrying `flags` (`GCS_*`).
    pub fn composition(flags: isize) -> Self {
        Self::new(WM_IME_COMPOSITION, 0, flags)
    }

    pub fn end_composition() -> Self {
        Self::new(WM_IME_ENDCOMPOSITION, 0, 0)
    }

    /// Candidate notification with an `IMN_*` command.
    pub fn notify(command: usize) -> Self {
        Self::new(WM_IME_NOTIFY, command, 0)
    }

    pub fn char(code: u32) -> Self {
        Self::new(WM_CHAR, code as usize, 0)
    }

    pub fn set_context(active: bool, show_flags: isize) -> Self {
        Self::new(WM_IME_SETCONTEXT, active as usize, show_flags)
    }

    pub fn destroy() -> Self {
        Self::new(WM_DESTROY, 0, 0)
    }

    /// For an activating `WM_IME_SETCONTEXT`, clear the bits that ask the OS
    /// to draw its own IME windows unless `show_default_ime_window` is set.
    /// Every other message is returned unchanged.
    pub fn without_default_ui(mut self, show_default_ime_window: bool) -> Self {
        if self.msg == WM_IME_SETCONTEXT && self.wparam != 0 && !show_default_ime_window {
            self.lparam &= !ISC_SHOWUIALL;
        }
        self
    }

    fn has_flag(&self, flag: isize) -> bool {
        self.lparam & flag != 0
    }
}

/// What a raw message means to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    CompositionStarted,
    CompositionChanged,
    /// Composition finished or cancelled.
    CompositionEnded,
    CandidatesChanged,
    CandidatesEnded,
    /// Text committed; the composition may also have been refreshed.
    ResultReceived,
    /// Char message with its UTF-16 unit.
    Char(u32),
    SetContext,
    WindowClosing,
    Unrecognized,
}

impl MessageKind {
    /// Whether this kind is part of the IME protocol, as opposed to window
    /// lifecycle or unrelated traffic.
    pub fn is_ime(self) -> bool {
        !matches!(self, Self::WindowClosing | Self::Unrecognized)
    }
}

/// Classify a raw message.
pub fn classify(message: &RawMessage) -> MessageKind {
    match message.msg {
        WM_IME_STARTCOMPOSITION => MessageKind::CompositionStarted,
        WM_IME_ENDCOMPOSITION => MessageKind::CompositionEnded,
        WM_IME_COMPOSITION => {
            if message.has_flag(GCS_RESULTSTR) {
                MessageKind::ResultReceived
            } else if message.has_flag(GCS_COMPSTR) {
                MessageKind::CompositionChanged
            } else if message.lparam == 0 {
                MessageKind::CompositionEnded
            } else {
                // Caret or attribute-only updates still re-read the buffer
                MessageKind::CompositionChanged
            }
        }
        WM_IME_NOTIFY => match message.wparam {
            IMN_OPENCANDIDATE | IMN_CHANGECANDIDATE => MessageKind::CandidatesChanged,
            IMN_CLOSECANDIDATE => MessageKind::CandidatesEnded,
            _ => MessageKind::Unrecognized,
        },
        WM_CHAR => MessageKind::Char(message.wparam as u32),
        WM_IME_SETCONTEXT => MessageKind::SetContext,
        WM_DESTROY | WM_NCDESTROY => MessageKind::WindowClosing,
        _ => MessageKind::Unrecognized,
    }
}

/// Which UTF-16 string to read from the input context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringField {
    Composition,
    CompositionReading,
    Result,
    ResultReading,
}

impl StringField {
    /// Matching `GCS_*` index.
    pub fn gcs(self) -> isize {
        match self {
            Self::Composition => GCS_COMPSTR,
            Self::CompositionReading => GCS_COMPREADSTR,
            Self::Result => GCS_RESULTSTR,
            Self::ResultReading => GCS_RESULTREADSTR,
        }
    }
}

/// Which attribute array to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeField {
    Composition,
    CompositionReading,
}

impl AttributeField {
    pub fn gcs(self) -> isize {
        match self {
            Self::Composition => GCS_COMPATTR,
            Self::CompositionReading => GCS_COMPREADATTR,
        }
    }
}

/// Which clause array to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseField {
    Composition,
    CompositionReading,
    Result,
    ResultReading,
}

impl ClauseField {
    pub fn gcs(self) -> isize {
        match self {
            Self::Composition => GCS_COMPCLAUSE,
            Self::CompositionReading => GCS_COMPREADCLAUSE,
            Self::Result => GCS_RESULTCLAUSE,
            Self::ResultReading => GCS_RESULTREADCLAUSE,
        }
    }
}

/// Narrow interface to the host's input context and window.
///
/// All calls happen on the window's message thread.
pub trait ImeBackend {
    /// Read a UTF-16 string from the input context.
    fn query_composition_buffer(&mut self, field: StringField) -> Result<Vec<u16>>;

    /// Read a per-unit attribute array.
    fn query_attributes(&mut self, field: AttributeField) -> Result<Vec<u8>>;

    /// Read clause offsets, in UTF-16 units.
    fn query_clauses(&mut self, field: ClauseField) -> Result<Vec<u32>>;

    /// Caret offset in UTF-16 units of the composition string.
    fn query_cursor_position(&mut self) -> Result<u32>;

    /// Raw candidate list blob in the host's native layout.
    fn query_candidates(&mut self) -> Result<Vec<u8>>;

    /// Committed text of the current result.
    fn query_result(&mut self) -> Result<Vec<u16>> {
        self.query_composition_buffer(StringField::Result)
    }

    /// Associate the window with its input context.
    fn associate_context(&mut self) -> Result<()>;

    /// Detach the window from its input context without destroying it.
    fn disassociate_context(&mut self) -> Result<()>;

    /// Forward a message to the window's previous handler.
    fn default_handler(&mut self, message: &RawMessage) -> isize;

    /// Restore the window's original handler and context association.
    fn release(&mut self) -> Result<()>;
}

const CANDIDATE_HEADER_WORDS: usize = 6;

/// Decode a native candidate list blob.
///
/// Layout (little-endian `u32`): `size, style, count, selection, page_start,
/// page_size`, then `count` offsets from the start of the blob to
/// NUL-terminated UTF-16 strings.
pub fn decode_candidate_list(blob: &[u8]) -> Result<RawCandidateList> {
    let word = |index: usize| -> Result<u32> {
        let start = index * 4;
        blob.get(start..start + 4)
            .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            .ok_or_else(|| {
                ImeError::malformed(
                    "candidate list",
                    format!("truncated at word {} of {} bytes", index, blob.len()),
                )
            })
    };

    let size = word(0)? as usize;
    if size > blob.len() {
        return Err(ImeError::malformed(
            "candidate list",
            format!("declared size {} exceeds {} bytes", size, blob.len()),
        ));
    }
    let style = word(1)?;
    let count = word(2)? as usize;
    let selection = word(3)?;
    let page_start = word(4)?;
    let page_size = word(5)?;

    let table_end = (CANDIDATE_HEADER_WORDS + count)
        .checked_mul(4)
        .filter(|&end| end <= blob.len())
        .ok_or_else(|| {
            ImeError::malformed("candidate list", format!("{} offsets do not fit", count))
        })?;

    let mut items = Vec::with_capacity(count);
    for i in 0..count {
        let offset = word(CANDIDATE_HEADER_WORDS + i)? as usize;
        if offset < table_end || offset >= blob.len() {
            return Err(ImeError::malformed(
                "candidate list",
                format!("candidate {} offset {} out of bounds", i, offset),
            ));
        }
        items.push(read_wide_cstr(&blob[offset..]));
    }

    Ok(RawCandidateList {
        style,
        items,
        selection,
        page_start,
        page_size,
    })
}

fn read_wide_cstr(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Encode a candidate list in the native layout.
pub fn encode_candidate_list(list: &RawCandidateList) -> Vec<u8> {
    let strings: Vec<Vec<u16>> = list
        .items
        .iter()
        .map(|item| item.encode_utf16().chain(std::iter::once(0)).collect())
        .collect();
    let table_end = (CANDIDATE_HEADER_WORDS + strings.len()) * 4;
    let total = table_end + strings.iter().map(|s| s.len() * 2).sum::<usize>();

    let mut blob = Vec::with_capacity(total);
    for value in [
        total as u32,
        list.style,
        strings.len() as u32,
        list.selection,
        list.page_start,
        list.page_size,
    ] {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    let mut offset = table_end;
    for s in &strings {
        blob.extend_from_slice(&(offset as u32).to_le_bytes());
        offset += s.len() * 2;
    }
    for s in &strings {
        for unit in s {
            blob.extend_from_slice(&unit.to_le_bytes());
        }
    }
    blob
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_composition_flags() {
        assert_eq!(
            classify(&RawMessage::composition(GCS_COMPOSITION_ALL)),
            MessageKind::CompositionChanged
        );
        assert_eq!(
            classify(&RawMessage::composition(GCS_RESULT_ALL)),
            MessageKind::ResultReceived
        );
        assert_eq!(
            classify(&RawMessage::composition(GCS_RESULT_ALL | GCS_COMPOSITION_ALL)),
            MessageKind::ResultReceived
        );
        assert_eq!(classify(&RawMessage::composition(0)), MessageKind::CompositionEnded);
        assert_eq!(
            classify(&RawMessage::composition(GCS_CURSORPOS)),
            MessageKind::CompositionChanged
        );
    }

    #[test]
    fn test_without_default_ui() {
        let activate = RawMessage::set_context(true, ISC_SHOWUIALL | 0x20);
        assert_eq!(activate.without_default_ui(false).lparam, 0x20);
        assert_eq!(activate.without_default_ui(true), activate);

        // Deactivation and unrelated messages pass untouched
        let deactivate = RawMessage::set_context(false, ISC_SHOWUIALL);
        assert_eq!(deactivate.without_default_ui(false), deactivate);
        let other = RawMessage::new(0x0200, 0, ISC_SHOWUIALL);
        assert_eq!(other.without_default_ui(false), other);
    }

    #[test]
    fn test_classify_notify_and_lifecycle() {
        assert_eq!(
            classify(&RawMessage::notify(IMN_OPENCANDIDATE)),
            MessageKind::CandidatesChanged
        );
        assert_eq!(
            classify(&RawMessage::notify(IMN_CHANGECANDIDATE)),
            MessageKind::CandidatesChanged
        );
        assert_eq!(
            classify(&RawMessage::notify(IMN_CLOSECANDIDATE)),
            MessageKind::CandidatesEnded
        );
        assert_eq!(classify(&RawMessage::notify(0x0008)), MessageKind::Unrecognized);
        assert_eq!(classify(&RawMessage::start_composition()), MessageKind::CompositionStarted);
        assert_eq!(classify(&RawMessage::end_composition()), MessageKind::CompositionEnded);
        assert_eq!(classify(&RawMessage::char(0x61)), MessageKind::Char(0x61));
        assert_eq!(classify(&RawMessage::destroy()), MessageKind::WindowClosing);
        assert_eq!(
            classify(&RawMessage::new(WM_NCDESTROY, 0, 0)),
            MessageKind::WindowClosing
        );
        assert_eq!(classify(&RawMessage::new(0x0200, 0, 0)), MessageKind::Unrecognized);
        assert!(!MessageKind::Unrecognized.is_ime());
        assert!(MessageKind::Char(8).is_ime());
    }

    #[test]
    fn test_candidate_blob_layout() {
        let list = RawCandidateList {
            style: 1,
            items: vec!["你".into(), "尼".into()],
            selection: 1,
            page_start: 0,
            page_size: 9,
        };
        let blob = encode_candidate_list(&list);
        // header + 2 offsets + 2 * (1 unit + NUL) * 2 bytes
        assert_eq!(blob.len(), 8 * 4 + 8);
        assert_eq!(&blob[0..4], &(blob.len() as u32).to_le_bytes());
        assert_eq!(&blob[24..28], &32u32.to_le_bytes());
        assert_eq!(&blob[28..32], &36u32.to_le_bytes());
        assert_eq!(decode_candidate_list(&blob).unwrap(), list);
    }

    #[test]
    fn test_decode_empty_list() {
        let blob = encode_candidate_list(&RawCandidateList::default());
        let decoded = decode_candidate_list(&blob).unwrap();
        assert!(decoded.items.is_empty());
    }

    #[test]
    fn test_decode_rejects_truncated_blob() {
        let list = RawCandidateList {
            items: vec!["abc".into()],
            page_size: 5,
            ..RawCandidateList::default()
        };
        let blob = encode_candidate_list(&list);
        assert!(matches!(
            decode_candidate_list(&blob[..10]),
            Err(ImeError::MalformedPayload { .. })
        ));
        // Declared size larger than what we got
        assert!(decode_candidate_list(&blob[..blob.len() - 2]).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_offset() {
        let list = RawCandidateList {
            items: vec!["a".into()],
            ..RawCandidateList::default()
        };
        let mut blob = encode_candidate_list(&list);
        blob[24..28].copy_from_slice(&4u32.to_le_bytes());
        assert!(decode_candidate_list(&blob).is_err());
    }

    #[test]
    fn test_unterminated_string_reads_to_end() {
        let list = RawCandidateList {
            items: vec!["ab".into()],
            ..RawCandidateList::default()
        };
        let mut blob = encode_candidate_list(&list);
        blob.truncate(blob.len() - 2);
        let total = blob.len() as u32;
        blob[0..4].copy_from_slice(&total.to_le_bytes());
        assert_eq!(decode_candidate_list(&blob).unwrap().items, vec!["ab".to_string()]);
    }
}
