//! The document model: one session of append-only paragraphs, with an
//! optional running sprint.
//!
//! The cursor is always at the end of the final paragraph; every mutation
//! except `new_para` touches only that tail paragraph. Attributed text is
//! carried as Markdown and wrapped in Pango markup at render time, so the
//! model never needs to know about grapheme clusters.

pub mod wordcount;

use std::path::Path;
use std::time::Duration;

use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::db::{Db, DbError};
use crate::durations::format_duration;
use crate::time_utils::{format_clock, format_timestamp, now_local};

/// One stored writing session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub started_on: Date,
    pub updated_at: OffsetDateTime,
    pub exported_at: Option<OffsetDateTime>,
    pub wordcount: usize,
}

impl Session {
    /// True when the session has changed since it was last exported.
    pub fn needs_export(&self) -> bool {
        match self.exported_at {
            None => true,
            Some(exported_at) => exported_at < self.updated_at,
        }
    }
}

/// A timed sub-session, bracketed by comment paragraphs.
#[derive(Debug, Clone, PartialEq)]
pub struct Sprint {
    pub id: Uuid,
    pub session_id: Uuid,
    pub started_at: OffsetDateTime,
    pub intended_duration: Duration,
    pub ended_at: Option<OffsetDateTime>,
    pub wordcount: usize,
}

impl Sprint {
    pub fn elapsed(&self) -> Duration {
        let delta = now_local() - self.started_at;
        delta.try_into().unwrap_or(Duration::ZERO)
    }

    pub fn remaining(&self) -> Duration {
        self.intended_duration.saturating_sub(self.elapsed())
    }

    pub fn actual_duration(&self) -> Duration {
        match self.ended_at {
            None => self.elapsed(),
            Some(ended_at) => (ended_at - self.started_at)
                .try_into()
                .unwrap_or(Duration::ZERO),
        }
    }

    pub fn completed(&self) -> bool {
        self.elapsed() >= self.intended_duration
    }
}

/// A paragraph of session Markdown. Only `markdown` is mutable after
/// creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub id: Uuid,
    pub session_id: Uuid,
    pub index: usize,
    pub sprint_id: Option<Uuid>,
    pub markdown: String,
}

impl Paragraph {
    /// Comment paragraphs start with `#` and stay out of the word count.
    pub fn is_comment(&self) -> bool {
        self.markdown.starts_with('#')
    }
}

#[derive(Debug, Default)]
pub struct DocumentModel {
    session_id: Option<Uuid>,
    sprint_id: Option<Uuid>,
    sprint: Option<Sprint>,
    sprint_start_para: Option<usize>,
    /// Paragraphs in index order; the position in the vec is the index.
    contents: Vec<Paragraph>,
    unsaved_changes: bool,
}

impl DocumentModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_session(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn has_sprint(&self) -> bool {
        self.sprint_id.is_some()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn sprint(&self) -> Option<&Sprint> {
        self.sprint.as_ref()
    }

    pub fn contents(&self) -> &[Paragraph] {
        &self.contents
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.unsaved_changes
    }

    /// The tail paragraph, which the cursor is pinned to.
    pub fn currently(&self) -> Option<&Paragraph> {
        self.contents.last()
    }

    pub fn cursor_para_id(&self) -> Option<Uuid> {
        self.currently().map(|p| p.id)
    }

    pub fn wordcount(&self) -> usize {
        wordcount::count_markdown(self.contents.iter().map(|p| p.markdown.as_str()))
    }

    pub fn sprint_wordcount(&self) -> Option<usize> {
        let start = self.sprint_start_para?;
        Some(wordcount::count_markdown(
            self.contents[start..].iter().map(|p| p.markdown.as_str()),
        ))
    }

    /// Loads a stored session and pins the cursor to a fresh empty tail.
    pub fn load_session(&mut self, session_id: Uuid, db: &Db) -> Result<(), DbError> {
        let mut paras = db.load_session_paragraphs(session_id)?;
        if paras.last().is_none_or(|p| !p.markdown.is_empty()) {
            paras.push(Paragraph {
                id: Uuid::new_v4(),
                session_id,
                index: paras.len(),
                sprint_id: None,
                markdown: String::new(),
            });
        }
        self.contents = paras;
        self.session_id = Some(session_id);
        self.sprint_id = None;
        self.sprint = None;
        self.sprint_start_para = None;
        self.unsaved_changes = false;
        Ok(())
    }

    /// Persists the session if anything changed.
    pub fn save_session(&mut self, db: &Db) -> Result<(), DbError> {
        let Some(session_id) = self.session_id else {
            return Ok(());
        };
        if !self.unsaved_changes {
            return Ok(());
        }
        log::debug!("saving session {session_id}");
        db.save_session(session_id, self.wordcount(), &self.contents)?;
        self.unsaved_changes = false;
        Ok(())
    }

    pub fn delete_session(&mut self, db: &Db) -> Result<(), DbError> {
        if let Some(session_id) = self.session_id {
            db.delete_session(session_id)?;
        }
        self.contents.clear();
        self.session_id = None;
        self.sprint_id = None;
        self.sprint = None;
        self.sprint_start_para = None;
        self.unsaved_changes = false;
        Ok(())
    }

    /// Opens a sprint: a header comment paragraph, then a fresh paragraph to
    /// write in.
    pub fn begin_sprint(&mut self, db: &Db, duration: Duration) -> Result<(), DbError> {
        debug_assert!(self.has_session() && !self.has_sprint());
        let Some(session_id) = self.session_id else {
            return Ok(());
        };
        let sprint_id = db.new_sprint(session_id, duration)?;
        let sprint = db.load_sprint(sprint_id)?;
        self.sprint_id = Some(sprint_id);
        self.new_para();
        if let Some(para) = self.contents.last_mut() {
            para.markdown = format!(
                "# Started {} sprint at {}.",
                format_duration(sprint.intended_duration),
                format_clock(sprint.started_at)
            );
        }
        self.sprint_start_para = self.currently().map(|p| p.index);
        self.sprint = Some(sprint);
        self.new_para();
        self.unsaved_changes = true;
        Ok(())
    }

    /// Closes the sprint with a footer comment paragraph.
    pub fn end_sprint(&mut self, db: &Db) -> Result<(), DbError> {
        debug_assert!(self.has_session() && self.has_sprint());
        let Some(sprint_id) = self.sprint_id else {
            return Ok(());
        };
        let words = self.sprint_wordcount().unwrap_or(0);
        db.update_sprint(sprint_id, words, true)?;
        let sprint = db.load_sprint(sprint_id)?;
        self.new_para();
        if let Some(para) = self.contents.last_mut() {
            para.markdown = format!(
                "# Sprint ended after {} with {}.",
                format_duration(sprint.actual_duration()),
                wordcount::format_wordcount(sprint.wordcount)
            );
        }
        self.sprint_id = None;
        self.sprint = None;
        self.sprint_start_para = None;
        self.new_para();
        self.unsaved_changes = true;
        Ok(())
    }

    /// Appends one character to the tail paragraph.
    pub fn keystroke(&mut self, keystroke: char) {
        if let Some(para) = self.contents.last_mut() {
            para.markdown.push(keystroke);
            self.unsaved_changes = true;
        }
    }

    /// Removes the last character of the tail paragraph. Never crosses a
    /// paragraph boundary.
    pub fn backspace(&mut self) {
        if let Some(para) = self.contents.last_mut() {
            if para.markdown.pop().is_some() {
                self.unsaved_changes = true;
            }
        }
    }

    /// Starts a fresh paragraph, unless the current one is still empty.
    pub fn new_para(&mut self) {
        let Some(session_id) = self.session_id else {
            return;
        };
        if self.currently().is_some_and(|p| p.markdown.is_empty()) {
            return;
        }
        self.contents.push(Paragraph {
            id: Uuid::new_v4(),
            session_id,
            index: self.contents.len(),
            sprint_id: self.sprint_id,
            markdown: String::new(),
        });
        self.unsaved_changes = true;
    }

    pub fn export_markdown(&self) -> String {
        self.contents
            .iter()
            .map(|p| p.markdown.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Writes the whole session to the export directory and stamps the
    /// exported-at time.
    pub fn export_session(&self, db: &Db, export_path: &Path) -> Result<(), ExportError> {
        let Some(session_id) = self.session_id else {
            return Ok(());
        };
        write_export(
            db,
            session_id,
            export_path,
            self.wordcount(),
            &self.export_markdown(),
        )
    }

    /// True for characters the drafting screen will actually insert: letters,
    /// marks, numbers, punctuation, symbols, and the plain space.
    pub fn graphical_char(c: char) -> bool {
        c == ' ' || (!c.is_control() && !c.is_whitespace())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("could not write export file")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Exports a stored session straight from the database, without loading it
/// into a document model.
pub fn export_stored_session(
    db: &Db,
    session_id: Uuid,
    export_path: &Path,
) -> Result<(), ExportError> {
    let paragraphs = db.load_session_paragraphs(session_id)?;
    let markdown = paragraphs
        .iter()
        .map(|p| p.markdown.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let words = wordcount::count_markdown(paragraphs.iter().map(|p| p.markdown.as_str()));
    write_export(db, session_id, export_path, words, &markdown)
}

fn write_export(
    db: &Db,
    session_id: Uuid,
    export_path: &Path,
    words: usize,
    markdown: &str,
) -> Result<(), ExportError> {
    std::fs::create_dir_all(export_path)?;
    let timestamp = now_local();
    let filename = format!(
        "{session_id} - {} - {}.md",
        format_timestamp(timestamp),
        wordcount::format_wordcount(words)
    );
    std::fs::write(export_path.join(filename), markdown)?;
    db.set_exported_time(session_id, timestamp)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_doc() -> (Db, DocumentModel) {
        let db = Db::open_in_memory().unwrap();
        let session_id = db.new_session().unwrap();
        let mut doc = DocumentModel::new();
        doc.load_session(session_id, &db).unwrap();
        (db, doc)
    }

    fn assert_dense_indices(doc: &DocumentModel) {
        for (position, para) in doc.contents().iter().enumerate() {
            assert_eq!(para.index, position);
        }
    }

    #[test]
    fn keystrokes_append_to_tail() {
        let (_db, mut doc) = open_doc();
        for c in "hello".chars() {
            doc.keystroke(c);
        }
        assert_eq!(doc.currently().unwrap().markdown, "hello");
        assert!(doc.is_dirty());
    }

    #[test]
    fn backspace_on_empty_paragraph_is_a_noop() {
        let (_db, mut doc) = open_doc();
        doc.backspace();
        assert_eq!(doc.currently().unwrap().markdown, "");
        assert!(!doc.is_dirty());
    }

    #[test]
    fn backspace_never_crosses_paragraphs() {
        let (_db, mut doc) = open_doc();
        doc.keystroke('a');
        doc.new_para();
        doc.backspace();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.contents()[0].markdown, "a");
    }

    #[test]
    fn new_para_is_idempotent_on_empty_tail() {
        let (_db, mut doc) = open_doc();
        doc.keystroke('x');
        doc.new_para();
        doc.new_para();
        doc.new_para();
        assert_eq!(doc.len(), 2);
        assert_dense_indices(&doc);
    }

    #[test]
    fn indices_stay_dense_across_mutations() {
        let (_db, mut doc) = open_doc();
        for word in ["one", "two", "three"] {
            for c in word.chars() {
                doc.keystroke(c);
            }
            doc.new_para();
        }
        doc.backspace();
        assert_dense_indices(&doc);
        assert_eq!(doc.len(), 4);
    }

    #[test]
    fn wordcount_survives_type_then_backspace() {
        let (_db, mut doc) = open_doc();
        for c in "two words".chars() {
            doc.keystroke(c);
        }
        let before = doc.wordcount();
        doc.keystroke('é');
        doc.backspace();
        assert_eq!(doc.wordcount(), before);
    }

    #[test]
    fn comment_paragraphs_do_not_count() {
        let (_db, mut doc) = open_doc();
        for c in "# some header note".chars() {
            doc.keystroke(c);
        }
        doc.new_para();
        for c in "real words".chars() {
            doc.keystroke(c);
        }
        assert_eq!(doc.wordcount(), 2);
    }

    #[test]
    fn sprint_brackets_paragraphs_with_comments() {
        let (db, mut doc) = open_doc();
        for c in "before".chars() {
            doc.keystroke(c);
        }
        doc.begin_sprint(&db, Duration::from_secs(900)).unwrap();
        assert!(doc.has_sprint());
        let header = &doc.contents()[doc.len() - 2];
        assert!(header.is_comment());
        assert!(header.markdown.contains("15m sprint"));

        for c in "sprint words here".chars() {
            doc.keystroke(c);
        }
        assert_eq!(doc.sprint_wordcount(), Some(3));

        doc.end_sprint(&db).unwrap();
        assert!(!doc.has_sprint());
        let footer = &doc.contents()[doc.len() - 2];
        assert!(footer.is_comment());
        assert!(footer.markdown.contains("3 words"));
        assert_eq!(doc.currently().unwrap().markdown, "");
        assert_dense_indices(&doc);
    }

    #[test]
    fn load_session_appends_empty_tail_when_needed() {
        let (db, mut doc) = open_doc();
        for c in "tail".chars() {
            doc.keystroke(c);
        }
        doc.save_session(&db).unwrap();
        let session_id = doc.session_id().unwrap();

        let mut reloaded = DocumentModel::new();
        reloaded.load_session(session_id, &db).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.currently().unwrap().markdown, "");
        assert!(!reloaded.is_dirty());
    }

    #[test]
    fn save_session_is_a_noop_when_clean() {
        let (db, mut doc) = open_doc();
        doc.save_session(&db).unwrap();
        assert!(!doc.is_dirty());
        doc.keystroke('a');
        doc.save_session(&db).unwrap();
        assert!(!doc.is_dirty());
        let session = db.load_session(doc.session_id().unwrap()).unwrap().unwrap();
        assert_eq!(session.wordcount, 1);
    }

    #[test]
    fn export_writes_markdown_file() {
        let (db, mut doc) = open_doc();
        for c in "exported words".chars() {
            doc.keystroke(c);
        }
        doc.save_session(&db).unwrap();
        let dir = tempfile::tempdir().unwrap();
        doc.export_session(&db, dir.path()).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].as_ref().unwrap().file_name();
        let name = name.to_string_lossy();
        assert!(name.ends_with("2 words.md"), "filename was {name}");
        let session = db.load_session(doc.session_id().unwrap()).unwrap().unwrap();
        assert!(!session.needs_export());
    }

    #[test]
    fn graphical_chars() {
        assert!(DocumentModel::graphical_char('a'));
        assert!(DocumentModel::graphical_char('»'));
        assert!(DocumentModel::graphical_char(' '));
        assert!(!DocumentModel::graphical_char('\n'));
        assert!(!DocumentModel::graphical_char('\t'));
        assert!(!DocumentModel::graphical_char('\u{7}'));
    }
}
