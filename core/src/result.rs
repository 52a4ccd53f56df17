//! Committed text and control keys.
//!
//! Committed text and control keys arrive through different host
//! notifications and stay distinct here: a committed char never doubles as a
//! key code, so a code point that happens to equal Backspace is still text.

use serde::{Deserialize, Serialize};

use crate::attributes::{self, Utf16Text};

/// Key code of Backspace as delivered in a char message.
pub const KEY_BACKSPACE: u32 = 0x08;
/// Key code of Enter as delivered in a char message.
pub const KEY_ENTER: u32 = 0x0D;
/// Key code of Escape as delivered in a char message.
pub const KEY_ESCAPE: u32 = 0x1B;

/// Discrete control signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSignal {
    /// Escape. The application decides what to discard.
    Cancel,
    /// Enter. The application decides what to accept.
    Accept,
    /// Remove the last accumulated unit.
    Backspace,
}

impl ControlSignal {
    /// Map a control key code, `None` for anything else.
    pub fn from_key_code(code: u32) -> Option<Self> {
        match code {
            KEY_BACKSPACE => Some(Self::Backspace),
            KEY_ESCAPE => Some(Self::Cancel),
            KEY_ENTER => Some(Self::Accept),
            _ => None,
        }
    }
}

/// One-shot result notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultEvent {
    /// One committed unit, after glyph substitution.
    CommittedText(char),
    ControlSignal(ControlSignal),
}

/// Which code points may reach the presentation layer unchanged.
///
/// Anything above `supported_max` is replaced by `placeholder`; code points
/// below the range pass through so ASCII keeps working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlyphPolicy {
    /// Start of the script block. Substitution ignores it; renderers use
    /// [`in_script_range`](Self::in_script_range) to pick the script font.
    pub supported_min: u32,
    pub supported_max: u32,
    pub placeholder: char,
}

impl Default for GlyphPolicy {
    fn default() -> Self {
        Self {
            // CJK Unified Ideographs as covered by GB2312-era fonts
            supported_min: 0x4E00,
            supported_max: 0x9FA5,
            placeholder: '?',
        }
    }
}

impl GlyphPolicy {
    /// Whether `ch` lies inside the supported script block.
    pub fn in_script_range(&self, ch: char) -> bool {
        (self.supported_min..=self.supported_max).contains(&(ch as u32))
    }

    /// `ch`, or the placeholder when it is above the supported range.
    pub fn substitute(&self, ch: char) -> char {
        if ch as u32 > self.supported_max {
            self.placeholder
        } else {
            ch
        }
    }

    /// Apply [`substitute`](Self::substitute) to a whole string.
    pub fn substitute_str(&self, text: &str) -> String {
        text.chars().map(|ch| self.substitute(ch)).collect()
    }
}

/// Raw result payload, in UTF-16 units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResult {
    pub text: Vec<u16>,
    pub reading: Vec<u16>,
    pub clauses: Vec<u32>,
    pub reading_clauses: Vec<u32>,
}

/// Last committed result, kept for hosts that want the whole string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSnapshot {
    pub text: String,
    pub reading: String,
    pub clauses: Vec<usize>,
    pub reading_clauses: Vec<usize>,
}

/// What happened to a char message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharDisposition {
    Emit(ResultEvent),
    /// High surrogate stored until its partner arrives.
    Pending,
    /// Not text and not a recognised control key.
    Ignored,
}

/// Turns result and char notifications into [`ResultEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct ResultEmitter {
    glyphs: GlyphPolicy,
    pending_high: Option<u16>,
    last: ResultSnapshot,
}

impl ResultEmitter {
    pub fn new(glyphs: GlyphPolicy) -> Self {
        Self {
            glyphs,
            pending_high: None,
            last: ResultSnapshot::default(),
        }
    }

    pub fn glyphs(&self) -> &GlyphPolicy {
        &self.glyphs
    }

    /// Last committed result.
    pub fn last_result(&self) -> &ResultSnapshot {
        &self.last
    }

    /// Decode a committed result into one event per char.
    pub fn on_result_received(&mut self, raw: &RawResult) -> Vec<ResultEvent> {
        let text = Utf16Text::decode(&raw.text);
        let reading = Utf16Text::decode(&raw.reading);
        self.last = ResultSnapshot {
            clauses: attributes::decode_clauses(&raw.clauses, &text),
            reading_clauses: attributes::decode_clauses(&raw.reading_clauses, &reading),
            text: text.into_string(),
            reading: reading.into_string(),
        };
        self.last
            .text
            .chars()
            .map(|ch| ResultEvent::CommittedText(self.glyphs.substitute(ch)))
            .collect()
    }

    /// Map a control key code to a signal.
    pub fn on_control_key(&mut self, code: u32) -> Option<ResultEvent> {
        ControlSignal::from_key_code(code).map(ResultEvent::ControlSignal)
    }

    /// Handle a char message carrying one UTF-16 unit (or a full code point).
    pub fn on_char(&mut self, code: u32) -> CharDisposition {
        if let Some(event) = self.on_control_key(code) {
            self.pending_high = None;
            return CharDisposition::Emit(event);
        }

        let unit = u16::try_from(code).ok();
        match unit {
            Some(high @ 0xD800..=0xDBFF) => {
                self.pending_high = Some(high);
                return CharDisposition::Pending;
            }
            Some(low @ 0xDC00..=0xDFFF) => {
                let Some(high) = self.pending_high.take() else {
                    tracing::debug!(code, "dropping unpaired low surrogate");
                    return CharDisposition::Ignored;
                };
                return match char::decode_utf16([high, low]).next() {
                    Some(Ok(ch)) => self.commit_char(ch),
                    _ => CharDisposition::Ignored,
                };
            }
            _ => {}
        }

        if self.pending_high.take().is_some() {
            tracing::debug!(code, "dropping unpaired high surrogate");
        }
        match char::from_u32(code) {
            Some(ch) if !ch.is_control() => self.commit_char(ch),
            _ => CharDisposition::Ignored,
        }
    }

    fn commit_char(&self, ch: char) -> CharDisposition {
        CharDisposition::Emit(ResultEvent::CommittedText(self.glyphs.substitute(ch)))
    }
}
