//! State of one open editor: the document, the memo it belongs to, its
//! attachments and the timers that restyle and auto-save it.
//!
//! Handlers receive the session explicitly; nothing here is global.

use crate::annotate::{annotate, Annotation};
use crate::debounce::{Debouncer, Ticket};
use crate::editor_core::{
    apply_markdown_command, ApplyOutcome, CommandOutcome, CoreError, Document, MarkdownCommand,
    Selection,
};
use crate::memo::{Attachment, Memo};
use thiserror::Error;

pub const MAX_ATTACHMENT_BYTES: u64 = 30 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("{name} is {size} bytes, the limit is 30 MiB")]
    TooLarge { name: String, size: u64 },
    #[error("{0} is already attached")]
    Duplicate(String),
}

/// A local file waiting to be uploaded with the next save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAttachment {
    pub filename: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl PendingAttachment {
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Counts shown on the attachment button.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttachmentBadge {
    pub saved: usize,
    pub new: usize,
}

/// Timers a text change asks the caller to arm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EditEffects {
    pub restyle: Option<Ticket>,
    pub autosave: Option<Ticket>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveRequest {
    /// `None` creates a new memo.
    pub memo_name: Option<String>,
    pub content: String,
    pub revision: u64,
}

#[derive(Debug, Default)]
pub struct EditSession {
    document: Document,
    memo: Option<Memo>,
    existing: Vec<Attachment>,
    pending: Vec<PendingAttachment>,
    restyle: Debouncer,
    autosave: Debouncer,
    annotations: Vec<Annotation>,
    styled_revision: Option<u64>,
    saved_revision: u64,
}

impl EditSession {
    pub fn new_memo() -> Self {
        Self::default()
    }

    pub fn edit(memo: Memo) -> Self {
        let mut session = Self {
            document: Document::new(memo.content.clone()),
            existing: memo.attachments().to_vec(),
            memo: Some(memo),
            ..Self::default()
        };
        session.restyle_now();
        session
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn memo(&self) -> Option<&Memo> {
        self.memo.as_ref()
    }

    pub fn is_new(&self) -> bool {
        self.memo.is_none()
    }

    pub fn is_dirty(&self) -> bool {
        self.document.revision != self.saved_revision
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// True when the stored annotations were computed from the current text.
    pub fn is_styled(&self) -> bool {
        self.styled_revision == Some(self.document.revision)
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.document.set_selection(selection);
    }

    pub fn input(&mut self, text: String, selection: Selection) -> (ApplyOutcome, EditEffects) {
        let outcome = self.document.replace_from_input(text, selection);
        let effects = self.effects_for(outcome.text_changed);
        (outcome, effects)
    }

    pub fn command(
        &mut self,
        command: MarkdownCommand,
    ) -> Result<(CommandOutcome, EditEffects), CoreError> {
        let before = self.document.revision;
        let outcome = apply_markdown_command(&mut self.document, command)?;
        let effects = self.effects_for(self.document.revision != before);
        Ok((outcome, effects))
    }

    fn effects_for(&mut self, text_changed: bool) -> EditEffects {
        if !text_changed {
            return EditEffects::default();
        }
        EditEffects {
            restyle: Some(self.restyle.schedule()),
            autosave: self.memo.is_some().then(|| self.autosave.schedule()),
        }
    }

    /// Runs a debounced restyle. Superseded tickets return `None` and leave
    /// the previous annotations in place.
    pub fn restyle(&mut self, ticket: Ticket) -> Option<&[Annotation]> {
        if !self.restyle.fire(ticket) {
            return None;
        }
        self.restyle_now();
        Some(&self.annotations)
    }

    pub fn restyle_now(&mut self) {
        self.restyle.cancel();
        self.annotations = annotate(&self.document.text);
        self.styled_revision = Some(self.document.revision);
        log::debug!(
            "restyled revision {} ({} annotations)",
            self.document.revision,
            self.annotations.len()
        );
    }

    /// Save request for a debounced auto-save, if the ticket is still live
    /// and an existing memo has unsaved edits.
    pub fn autosave(&mut self, ticket: Ticket) -> Option<SaveRequest> {
        if !self.autosave.fire(ticket) || !self.is_dirty() {
            return None;
        }
        self.memo.as_ref()?;
        Some(self.save_request())
    }

    /// Explicit save; cancels any pending auto-save.
    pub fn save_request(&mut self) -> SaveRequest {
        self.autosave.cancel();
        SaveRequest {
            memo_name: self.memo.as_ref().map(|m| m.name.clone()),
            content: self.document.text.clone(),
            revision: self.document.revision,
        }
    }

    /// Records a completed save. The document is never replaced by the
    /// server copy; later edits stay dirty.
    pub fn mark_saved(&mut self, revision: u64, memo: Memo) {
        self.saved_revision = self.saved_revision.max(revision);
        self.existing = memo.attachments().to_vec();
        self.memo = Some(memo);
    }

    pub fn existing_attachments(&self) -> &[Attachment] {
        &self.existing
    }

    /// Attachment list fetched separately when the memo listing omitted it.
    pub fn set_existing_attachments(&mut self, attachments: Vec<Attachment>) {
        self.existing = attachments;
    }

    pub fn pending_attachments(&self) -> &[PendingAttachment] {
        &self.pending
    }

    pub fn add_attachment(&mut self, attachment: PendingAttachment) -> Result<(), AttachmentError> {
        if attachment.size() > MAX_ATTACHMENT_BYTES {
            return Err(AttachmentError::TooLarge {
                size: attachment.size(),
                name: attachment.filename,
            });
        }
        let duplicate = self
            .pending
            .iter()
            .any(|p| p.filename == attachment.filename && p.size() == attachment.size());
        if duplicate {
            return Err(AttachmentError::Duplicate(attachment.filename));
        }
        self.pending.push(attachment);
        Ok(())
    }

    pub fn remove_attachment(&mut self, index: usize) -> Option<PendingAttachment> {
        (index < self.pending.len()).then(|| self.pending.remove(index))
    }

    /// Hands the pending uploads to the save path.
    pub fn take_pending(&mut self) -> Vec<PendingAttachment> {
        std::mem::take(&mut self.pending)
    }

    pub fn badge(&self) -> AttachmentBadge {
        AttachmentBadge {
            saved: self.existing.len(),
            new: self.pending.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::StyleTag;

    fn memo(content: &str) -> Memo {
        Memo {
            name: "memos/1".to_string(),
            content: content.to_string(),
            ..Memo::default()
        }
    }

    fn file(name: &str, len: usize) -> PendingAttachment {
        PendingAttachment {
            filename: name.to_string(),
            mime_type: "text/plain".to_string(),
            content: vec![0; len],
        }
    }

    #[test]
    fn opening_a_memo_styles_it() {
        let session = EditSession::edit(memo("# Title"));
        assert!(session.is_styled());
        assert!(!session.is_dirty());
        assert_eq!(session.annotations()[0].style, StyleTag::Heading1);
    }

    #[test]
    fn only_latest_restyle_applies() {
        let mut session = EditSession::new_memo();
        let (_, first) = session.input("**a".to_string(), Selection::cursor(3));
        let (_, second) = session.input("**a**".to_string(), Selection::cursor(5));

        assert!(session.restyle(first.restyle.unwrap()).is_none());
        assert!(!session.is_styled());
        let annotations = session.restyle(second.restyle.unwrap()).unwrap();
        assert_eq!(annotations.len(), 1);
        assert!(session.is_styled());
    }

    #[test]
    fn new_memos_do_not_autosave() {
        let mut session = EditSession::new_memo();
        let (_, effects) = session.input("draft".to_string(), Selection::cursor(5));
        assert!(effects.autosave.is_none());
        assert!(session.is_new());
    }

    #[test]
    fn autosave_uses_latest_ticket_and_dirty_state() {
        let mut session = EditSession::edit(memo("a"));
        let (_, first) = session.input("ab".to_string(), Selection::cursor(2));
        let (_, second) = session.input("abc".to_string(), Selection::cursor(3));

        assert!(session.autosave(first.autosave.unwrap()).is_none());
        let request = session.autosave(second.autosave.unwrap()).unwrap();
        assert_eq!(request.memo_name.as_deref(), Some("memos/1"));
        assert_eq!(request.content, "abc");

        session.mark_saved(request.revision, memo("abc"));
        assert!(!session.is_dirty());
    }

    #[test]
    fn edits_during_save_stay_dirty() {
        let mut session = EditSession::edit(memo("a"));
        session.input("ab".to_string(), Selection::cursor(2));
        let request = session.save_request();
        session.input("abc".to_string(), Selection::cursor(3));

        session.mark_saved(request.revision, memo("ab"));
        assert!(session.is_dirty());
        assert_eq!(session.document().text, "abc");
    }

    #[test]
    fn explicit_save_cancels_autosave() {
        let mut session = EditSession::edit(memo("a"));
        let (_, effects) = session.input("ab".to_string(), Selection::cursor(2));
        session.save_request();
        assert!(session.autosave(effects.autosave.unwrap()).is_none());
    }

    #[test]
    fn commands_schedule_restyle() {
        let mut session = EditSession::new_memo();
        session.input("- item".to_string(), Selection::cursor(6));
        let (outcome, effects) = session.command(MarkdownCommand::ContinueList).unwrap();
        assert!(outcome.consumed);
        assert!(effects.restyle.is_some());
        assert_eq!(session.document().text, "- item\n- ");
    }

    #[test]
    fn attachment_limits_and_badge() {
        let mut session = EditSession::edit(Memo {
            attachments: vec![Attachment::default()],
            ..memo("x")
        });
        session.add_attachment(file("a.txt", 3)).unwrap();
        assert_eq!(
            session.add_attachment(file("a.txt", 3)),
            Err(AttachmentError::Duplicate("a.txt".to_string()))
        );
        assert!(matches!(
            session.add_attachment(file("big.bin", MAX_ATTACHMENT_BYTES as usize + 1)),
            Err(AttachmentError::TooLarge { .. })
        ));
        assert_eq!(session.badge(), AttachmentBadge { saved: 1, new: 1 });

        assert!(session.remove_attachment(5).is_none());
        assert_eq!(session.remove_attachment(0).unwrap().filename, "a.txt");
        assert_eq!(session.badge().new, 0);
    }
}
