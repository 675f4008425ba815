//! the input latch guarding submission, plus the focus reassertion flag.

use thiserror::Error;

/// why a submission was turned away. absorbed locally; nothing is appended.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRejected {
    #[error("input is blocked while a response is pending")]
    AlreadyBlocked,
    #[error("input is empty")]
    EmptyInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputGate {
    blocked: bool,
    pending_text: String,
    reassert_focus: bool,
}

impl Default for InputGate {
    /// starts blocked; warm-up releases it.
    fn default() -> Self {
        Self { blocked: true, pending_text: String::new(), reassert_focus: false }
    }
}

impl InputGate {
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn pending_text(&self) -> &str {
        &self.pending_text
    }

    pub fn set_pending_text(&mut self, text: impl Into<String>) {
        self.pending_text = text.into();
    }

    pub fn clear_pending_text(&mut self) {
        self.pending_text.clear();
    }

    /// accepts non-blank text while unblocked and latches the gate.
    /// returns the trimmed text with vertical tabs turned into newlines.
    pub fn try_submit(&mut self, text: &str) -> Result<String, InputRejected> {
        if self.blocked {
            return Err(InputRejected::AlreadyBlocked);
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(InputRejected::EmptyInput);
        }
        self.blocked = true;
        Ok(trimmed.replace('\u{0B}', "\n"))
    }

    pub fn release(&mut self) {
        self.blocked = false;
    }

    pub(crate) fn block(&mut self) {
        self.blocked = true;
    }

    /// asks the host to put focus back on the text field on its next tick.
    pub fn schedule_focus_reassert(&mut self) {
        self.reassert_focus = true;
    }

    /// one-shot: returns true at most once per scheduled reassertion.
    pub fn take_focus_reassert(&mut self) -> bool {
        std::mem::take(&mut self.reassert_focus)
    }
}
