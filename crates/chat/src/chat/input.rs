use crate::chat::attachment::Attachment;
use crate::chat::events::SendIntent;

/// Display-only cap on message length. Longer text is still sent.
pub const SOFT_TEXT_LIMIT: usize = 2000;

/// Text being composed in the input box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    text: String,
    limit: usize,
}

impl Default for Draft {
    fn default() -> Self {
        Self::new(SOFT_TEXT_LIMIT)
    }
}

impl Draft {
    pub fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn push_str(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Shift+Enter: newline instead of submit.
    pub fn insert_newline(&mut self) {
        self.text.push('\n');
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_over_limit(&self) -> bool {
        self.char_count() > self.limit
    }

    /// Counter shown under the input, e.g. `42/2000`.
    pub fn counter_label(&self) -> String {
        format!("{}/{}", self.char_count(), self.limit)
    }

    pub fn can_submit(&self, has_attachments: bool, busy: bool) -> bool {
        !busy && (!self.text.trim().is_empty() || has_attachments)
    }

    /// Enter: hands back a trimmed intent and clears the draft, or leaves the draft as
    /// is when there is nothing to send or a reply is still pending.
    pub fn take_intent(&mut self, attachments: Vec<Attachment>, busy: bool) -> Option<SendIntent> {
        if !self.can_submit(!attachments.is_empty(), busy) {
            return None;
        }

        let text = self.text.trim().to_string();
        self.clear();
        Some(SendIntent::new(text).with_attachments(attachments))
    }
}
