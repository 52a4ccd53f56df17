//! Application-side accumulation of committed text.
//!
//! The bridge never keeps a "typed so far" string; this buffer is what a
//! host application typically folds [`ResultEvent`]s into.

use crate::result::{ControlSignal, ResultEvent};

/// Text accumulated from result events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitBuffer {
    text: String,
}

impl CommitBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Length in chars.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn push(&mut self, ch: char) {
        self.text.push(ch);
    }

    /// Remove the last char. Returns false when the buffer was empty.
    pub fn delete_last(&mut self) -> bool {
        self.text.pop().is_some()
    }

    /// Fold one event into the buffer.
    ///
    /// `Cancel` discards the buffer. `Accept` also empties it but hands the
    /// accepted text back so the caller can act on it.
    pub fn apply(&mut self, event: &ResultEvent) -> Option<String> {
        match event {
            ResultEvent::CommittedText(ch) => {
                self.push(*ch);
                None
            }
            ResultEvent::ControlSignal(ControlSignal::Backspace) => {
                self.delete_last();
                None
            }
            ResultEvent::ControlSignal(ControlSignal::Cancel) => {
                self.clear();
                None
            }
            ResultEvent::ControlSignal(ControlSignal::Accept) => Some(std::mem::take(&mut self.text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_delete() {
        let mut buf = CommitBuffer::new();
        buf.apply(&ResultEvent::CommittedText('你'));
        buf.apply(&ResultEvent::CommittedText('好'));
        assert_eq!(buf.text(), "你好");
        assert_eq!(buf.char_len(), 2);

        buf.apply(&ResultEvent::ControlSignal(ControlSignal::Backspace));
        assert_eq!(buf.text(), "你");
    }

    #[test]
    fn test_backspace_on_empty() {
        let mut buf = CommitBuffer::new();
        assert!(!buf.delete_last());
        buf.apply(&ResultEvent::ControlSignal(ControlSignal::Backspace));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_cancel_and_accept_are_distinct() {
        let mut buf = CommitBuffer::new();
        buf.push('a');
        assert_eq!(buf.apply(&ResultEvent::ControlSignal(ControlSignal::Cancel)), None);
        assert!(buf.is_empty());

        buf.push('b');
        assert_eq!(
            buf.apply(&ResultEvent::ControlSignal(ControlSignal::Accept)),
            Some("b".to_string())
        );
        assert!(buf.is_empty());
    }
}
