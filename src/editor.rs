//! SimpleTextEditor: caret-based editing on top of a [`CollabService`]
//!
//! Turns "type this at the cursor" into a changeset plus before/after
//! selections, and keeps the cursor in place while foreign edits and
//! undo/redo move text around it.

use crate::changeset::{char_len, Bias, Changeset};
use crate::error::Result;
use crate::history::PushOptions;
use crate::protocol::{RevisionRecord, SubmittedRecord};
use crate::selection::SelectionRange;
use crate::service::{CollabService, Delivery};

#[derive(Debug)]
pub struct SimpleTextEditor {
    service: CollabService,
    selection: SelectionRange,
}

impl SimpleTextEditor {
    /// Wrap `service` with the caret at the end of the current view
    pub fn new(service: CollabService) -> Result<Self> {
        let len = service.view()?.output_len();
        Ok(Self {
            service,
            selection: SelectionRange::caret(len),
        })
    }

    pub fn service(&self) -> &CollabService {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut CollabService {
        &mut self.service
    }

    pub fn into_service(self) -> CollabService {
        self.service
    }

    pub fn text(&self) -> Result<&str> {
        self.service.view_text()
    }

    pub fn selection(&self) -> SelectionRange {
        self.selection
    }

    /// Move the selection, clamped to the current text
    pub fn set_selection(&mut self, selection: SelectionRange) -> Result<()> {
        let len = self.service.view()?.output_len();
        self.selection = selection.clamp(len);
        Ok(())
    }

    /// Replace the selection with `text`, leaving a caret after it
    pub fn insert(&mut self, text: &str) -> Result<bool> {
        let (start, end) = self.selection.ordered();
        self.replace(start, end, text)
    }

    /// Delete the selection, or the char before the caret
    pub fn delete_backward(&mut self) -> Result<bool> {
        let (start, end) = self.selection.ordered();
        match (start, end) {
            (0, 0) => Ok(false),
            (start, end) if start == end => self.replace(start - 1, end, ""),
            (start, end) => self.replace(start, end, ""),
        }
    }

    /// Delete the selection, or the char after the caret
    pub fn delete_forward(&mut self) -> Result<bool> {
        let len = self.service.view()?.output_len();
        let (start, end) = self.selection.ordered();
        if start != end {
            return self.replace(start, end, "");
        }
        if end >= len {
            return Ok(false);
        }
        self.replace(start, end + 1, "")
    }

    fn replace(&mut self, start: usize, end: usize, text: &str) -> Result<bool> {
        let len = self.service.view()?.output_len();
        let changeset = Changeset::replace(len, start, end, text)?;
        let after = SelectionRange::caret(start + char_len(text));

        let pushed = self.service.push_selection_changeset(
            changeset,
            self.selection,
            after,
            PushOptions::default(),
        )?;
        if pushed {
            self.selection = after;
        }
        Ok(pushed)
    }

    pub fn undo(&mut self) -> Result<bool> {
        let change = self.service.undo_view_change()?;
        Ok(self.follow_step(change))
    }

    pub fn redo(&mut self) -> Result<bool> {
        let change = self.service.redo_view_change()?;
        Ok(self.follow_step(change))
    }

    fn follow_step(&mut self, change: Option<Changeset>) -> bool {
        match change {
            Some(change) => {
                self.selection = self.selection.follow(&change, Bias::After);
                true
            }
            None => false,
        }
    }

    /// Submit pending local edits if possible
    pub fn submit(&mut self) -> Result<Option<SubmittedRecord>> {
        if !self.service.can_submit_changes() {
            return Ok(None);
        }
        self.service.submit_changes().map(Some)
    }

    pub fn submitted_changes_acknowledged(&mut self, record: RevisionRecord) -> Result<Delivery> {
        let delivery = self.service.submitted_changes_acknowledged(record)?;
        self.follow_delivery(&delivery);
        Ok(delivery)
    }

    /// Apply a foreign edit; the caret stays before foreign text inserted
    /// at it
    pub fn handle_external_change(&mut self, record: RevisionRecord) -> Result<Delivery> {
        let delivery = self.service.handle_external_change(record)?;
        self.follow_delivery(&delivery);
        Ok(delivery)
    }

    fn follow_delivery(&mut self, delivery: &Delivery) {
        for change in &delivery.view_changes {
            self.selection = self.selection.follow(change, Bias::Before);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollabConfig;
    use crate::protocol::TextRevision;

    fn editor(text: &str) -> SimpleTextEditor {
        let service = CollabService::new(CollabConfig::new("me"), TextRevision::new(0, text)).unwrap();
        SimpleTextEditor::new(service).unwrap()
    }

    #[test]
    fn test_typing_and_deleting() {
        let mut editor = editor("");
        editor.insert("hello").unwrap();
        editor.insert(" world").unwrap();
        assert_eq!(editor.text().unwrap(), "hello world");
        assert_eq!(editor.selection(), SelectionRange::caret(11));

        editor.delete_backward().unwrap();
        assert_eq!(editor.text().unwrap(), "hello worl");

        editor.set_selection(SelectionRange::new(0, 6)).unwrap();
        editor.delete_forward().unwrap();
        assert_eq!(editor.text().unwrap(), "worl");
        assert_eq!(editor.selection(), SelectionRange::caret(0));
        assert!(!editor.delete_backward().unwrap());
    }

    #[test]
    fn test_insert_replaces_selection() {
        let mut editor = editor("abc");
        editor.set_selection(SelectionRange::new(2, 1)).unwrap();
        editor.insert("XY").unwrap();
        assert_eq!(editor.text().unwrap(), "aXYc");
        assert_eq!(editor.selection(), SelectionRange::caret(3));
    }

    #[test]
    fn test_undo_moves_caret() {
        let mut editor = editor("ab");
        editor.set_selection(SelectionRange::caret(1)).unwrap();
        editor.insert("xyz").unwrap();
        assert_eq!(editor.selection(), SelectionRange::caret(4));

        assert!(editor.undo().unwrap());
        assert_eq!(editor.text().unwrap(), "ab");
        assert_eq!(editor.selection(), SelectionRange::caret(1));

        assert!(editor.redo().unwrap());
        assert_eq!(editor.text().unwrap(), "axyzb");
        assert_eq!(editor.selection(), SelectionRange::caret(4));
    }

    #[test]
    fn test_caret_follows_foreign_edit() {
        let mut editor = editor("hello");
        editor.set_selection(SelectionRange::caret(5)).unwrap();

        let prepend = RevisionRecord::new(1, Changeset::replace(5, 0, 0, ">> ").unwrap());
        editor.handle_external_change(prepend).unwrap();
        assert_eq!(editor.text().unwrap(), ">> hello");
        assert_eq!(editor.selection(), SelectionRange::caret(8));

        let at_caret = RevisionRecord::new(2, Changeset::replace(8, 8, 8, "!").unwrap());
        editor.handle_external_change(at_caret).unwrap();
        assert_eq!(editor.text().unwrap(), ">> hello!");
        assert_eq!(editor.selection(), SelectionRange::caret(8));
    }
}
