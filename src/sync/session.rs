//! Edit session
//!
//! A session is created by a load and holds everything a save needs: the
//! working document, the fingerprint it was loaded at, and the page editor
//! buffer whose edits have not been folded into the document yet.

use chrono::{DateTime, Utc};

use crate::model::{ConfigurationDocument, ModelError, PageDraft};
use crate::remote::Fingerprint;

/// Uncommitted edits to one page
#[derive(Debug, Clone, PartialEq)]
pub struct EditorBuffer {
    pub page_id: String,
    pub draft: PageDraft,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub document: ConfigurationDocument,
    /// Fingerprint of the stored document this session is based on; `None`
    /// when nothing was stored yet
    pub baseline: Option<Fingerprint>,
    pub editor: Option<EditorBuffer>,
    /// Set by a conflicting save; cleared only by reloading
    pub needs_reload: bool,
    pub loaded_at: DateTime<Utc>,
}

impl Session {
    pub fn new(document: ConfigurationDocument, baseline: Option<Fingerprint>) -> Self {
        Self {
            document,
            baseline,
            editor: None,
            needs_reload: false,
            loaded_at: Utc::now(),
        }
    }

    /// Open a page in the editor, folding in any page that was already open
    pub fn open_editor(&mut self, page_id: &str) -> Result<PageDraft, ModelError> {
        self.flush_editor()?;
        let page = self
            .document
            .page(page_id)
            .ok_or_else(|| ModelError::PageNotFound(page_id.to_string()))?;

        let draft = PageDraft::from_page(page);
        self.editor = Some(EditorBuffer {
            page_id: page_id.to_string(),
            draft: draft.clone(),
        });
        Ok(draft)
    }

    /// Record edits in the open editor; invalid slugs are refused immediately
    pub fn edit_draft(&mut self, changes: PageDraft) -> Result<PageDraft, ModelError> {
        let editor = self.editor.as_ref().ok_or(ModelError::NoOpenEditor)?;
        let mut merged = editor.draft.clone();
        merged.merge(changes);
        self.document.validate_draft(&editor.page_id, &merged)?;

        let editor = self.editor.as_mut().ok_or(ModelError::NoOpenEditor)?;
        editor.draft = merged.clone();
        Ok(merged)
    }

    /// Close the editor, applying its draft or discarding it
    pub fn close_editor(&mut self, apply: bool) -> Result<Option<String>, ModelError> {
        if apply {
            self.flush_editor()?;
        }
        Ok(self.editor.take().map(|e| e.page_id))
    }

    /// Fold the open draft into the document; the editor stays open
    pub fn flush_editor(&mut self) -> Result<(), ModelError> {
        match &self.editor {
            Some(editor) => self.document.apply_draft(&editor.page_id, &editor.draft),
            None => Ok(()),
        }
    }

    /// Snapshot for saving, with the open editor's edits included
    pub fn capture(&mut self) -> Result<(ConfigurationDocument, Option<Fingerprint>), ModelError> {
        self.flush_editor()?;
        Ok((self.document.clone(), self.baseline.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bootstrap_document;

    fn session() -> Session {
        Session::new(bootstrap_document(), Some(Fingerprint::new("sha1")))
    }

    #[test]
    fn test_capture_includes_open_edit() {
        let mut session = session();
        session.open_editor("p_home").unwrap();
        session
            .edit_draft(PageDraft {
                content: Some("<p>Updated</p>".to_string()),
                ..Default::default()
            })
            .unwrap();

        let (snapshot, baseline) = session.capture().unwrap();
        assert_eq!(snapshot.home_page().unwrap().content, "<p>Updated</p>");
        assert_eq!(baseline, Some(Fingerprint::new("sha1")));
        assert!(session.editor.is_some());
    }

    #[test]
    fn test_invalid_draft_is_refused_early() {
        let mut session = session();
        session.open_editor("p_home").unwrap();
        let err = session
            .edit_draft(PageDraft {
                slug: Some("start".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err, ModelError::HomeRename);
        assert_eq!(session.editor.as_ref().unwrap().draft.slug.as_deref(), Some("home"));
    }

    #[test]
    fn test_switching_pages_keeps_edits() {
        let mut session = session();
        let page = session.document.create_page();

        session.open_editor(&page.id).unwrap();
        session
            .edit_draft(PageDraft {
                title: Some("DMCA".to_string()),
                slug: Some("dmca".to_string()),
                ..Default::default()
            })
            .unwrap();
        session.open_editor("p_home").unwrap();

        assert_eq!(session.document.page(&page.id).unwrap().slug, "dmca");
        assert_eq!(session.editor.as_ref().unwrap().page_id, "p_home");
    }

    #[test]
    fn test_close_without_apply_discards() {
        let mut session = session();
        session.open_editor("p_home").unwrap();
        session
            .edit_draft(PageDraft {
                title: Some("Changed".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(session.close_editor(false).unwrap().as_deref(), Some("p_home"));
        assert_eq!(session.document.home_page().unwrap().title, "Home");
        assert_eq!(session.edit_draft(PageDraft::default()), Err(ModelError::NoOpenEditor));
    }
}
