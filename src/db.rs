//! SQLite persistence for sessions, sprints, and paragraphs.
//!
//! One database file holds everything. Timestamps are stored as unix seconds
//! so SQL comparisons stay cheap; dates and durations are stored in their
//! human-readable forms.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::doc::{Paragraph, Session, Sprint};
use crate::durations::{format_duration, parse_duration};
use crate::time_utils::{format_date, now_local, parse_date};

const DB_VERSION: i64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("expected DB version {expected} in {path}, but found {found}")]
    Version {
        path: PathBuf,
        expected: i64,
        found: i64,
    },
    #[error("could not create database directory {path}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("malformed row: {0}")]
    Malformed(String),
}

const SCHEMA: &str = r#"
CREATE TABLE sessions (
    id TEXT PRIMARY KEY,
    started_on TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    exported_at INTEGER,
    wordcount INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX sessions_started_on ON sessions (started_on);
CREATE INDEX sessions_updated_at ON sessions (updated_at);

CREATE TABLE sprints (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions (id),
    duration TEXT NOT NULL,
    wordcount INTEGER NOT NULL DEFAULT 0,
    started_at INTEGER NOT NULL,
    ended_at INTEGER
);
CREATE INDEX sprints_session_id ON sprints (session_id);

CREATE TABLE paragraphs (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions (id),
    "index" INTEGER NOT NULL,
    sprint_id TEXT REFERENCES sprints (id),
    markdown TEXT NOT NULL,
    UNIQUE (session_id, "index")
);
CREATE INDEX paragraphs_session_id ON paragraphs (session_id);
"#;

#[derive(Debug)]
pub struct Db {
    conn: RefCell<Connection>,
}

impl Db {
    /// Opens (or creates) the database at `path`. A version mismatch in an
    /// existing file is fatal.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let exists = path.is_file();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DbError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        if exists {
            let found: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
            if found != DB_VERSION {
                return Err(DbError::Version {
                    path: path.to_path_buf(),
                    expected: DB_VERSION,
                    found,
                });
            }
        } else {
            conn.execute_batch(SCHEMA)?;
            conn.pragma_update(None, "user_version", DB_VERSION)?;
        }

        Ok(Self {
            conn: RefCell::new(conn),
        })
    }

    /// In-memory database for tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", DB_VERSION)?;
        Ok(Self {
            conn: RefCell::new(conn),
        })
    }

    /// Creates a session with a single empty paragraph at index 0.
    pub fn new_session(&self) -> Result<Uuid, DbError> {
        let session_id = Uuid::new_v4();
        let now = now_local();
        let conn = self.conn.borrow_mut();
        conn.execute(
            "INSERT INTO sessions (id, started_on, updated_at, exported_at, wordcount)
             VALUES (?1, ?2, ?3, NULL, 0)",
            params![
                session_id.to_string(),
                format_date(now.date()),
                now.unix_timestamp()
            ],
        )?;
        conn.execute(
            "INSERT INTO paragraphs (id, session_id, \"index\", sprint_id, markdown)
             VALUES (?1, ?2, 0, NULL, '')",
            params![Uuid::new_v4().to_string(), session_id.to_string()],
        )?;
        Ok(session_id)
    }

    /// Most recently updated sessions first.
    pub fn list_sessions(
        &self,
        limit: Option<usize>,
        only_exportable: bool,
    ) -> Result<Vec<Session>, DbError> {
        let mut sql = String::from(
            "SELECT id, started_on, updated_at, exported_at, wordcount FROM sessions",
        );
        if only_exportable {
            sql.push_str(" WHERE exported_at IS NULL OR exported_at < updated_at");
        }
        sql.push_str(" ORDER BY updated_at DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], session_from_row)?;
        rows.collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
    }

    pub fn load_session(&self, session_id: Uuid) -> Result<Option<Session>, DbError> {
        let conn = self.conn.borrow();
        let row = conn
            .query_row(
                "SELECT id, started_on, updated_at, exported_at, wordcount
                 FROM sessions WHERE id = ?1",
                params![session_id.to_string()],
                session_from_row,
            )
            .optional()?;
        row.transpose()
    }

    pub fn load_session_paragraphs(&self, session_id: Uuid) -> Result<Vec<Paragraph>, DbError> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, \"index\", sprint_id, markdown
             FROM paragraphs WHERE session_id = ?1 ORDER BY \"index\" ASC",
        )?;
        let rows = stmt.query_map(params![session_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut paragraphs = Vec::new();
        for row in rows {
            let (id, session_id, index, sprint_id, markdown) = row?;
            paragraphs.push(Paragraph {
                id: parse_uuid(&id)?,
                session_id: parse_uuid(&session_id)?,
                index: index as usize,
                sprint_id: sprint_id.as_deref().map(parse_uuid).transpose()?,
                markdown,
            });
        }
        Ok(paragraphs)
    }

    /// Persists the paragraphs and updates the session word count. Paragraph
    /// rows are upserted on `(session_id, index)`; only the sprint link and
    /// the markdown ever change.
    pub fn save_session(
        &self,
        session_id: Uuid,
        wordcount: usize,
        paragraphs: &[Paragraph],
    ) -> Result<(), DbError> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE sessions SET updated_at = ?2, wordcount = ?3 WHERE id = ?1",
            params![
                session_id.to_string(),
                now_local().unix_timestamp(),
                wordcount as i64
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO paragraphs (id, session_id, \"index\", sprint_id, markdown)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (session_id, \"index\")
                 DO UPDATE SET sprint_id = excluded.sprint_id, markdown = excluded.markdown",
            )?;
            for para in paragraphs {
                stmt.execute(params![
                    para.id.to_string(),
                    para.session_id.to_string(),
                    para.index as i64,
                    para.sprint_id.map(|id| id.to_string()),
                    para.markdown,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn delete_session(&self, session_id: Uuid) -> Result<(), DbError> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM paragraphs WHERE session_id = ?1",
            params![session_id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM sprints WHERE session_id = ?1",
            params![session_id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM sessions WHERE id = ?1",
            params![session_id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn set_exported_time(
        &self,
        session_id: Uuid,
        timestamp: OffsetDateTime,
    ) -> Result<(), DbError> {
        self.conn.borrow().execute(
            "UPDATE sessions SET exported_at = ?2 WHERE id = ?1",
            params![session_id.to_string(), timestamp.unix_timestamp()],
        )?;
        Ok(())
    }

    pub fn new_sprint(&self, session_id: Uuid, duration: Duration) -> Result<Uuid, DbError> {
        let sprint_id = Uuid::new_v4();
        self.conn.borrow().execute(
            "INSERT INTO sprints (id, session_id, duration, wordcount, started_at, ended_at)
             VALUES (?1, ?2, ?3, 0, ?4, NULL)",
            params![
                sprint_id.to_string(),
                session_id.to_string(),
                format_duration(duration),
                now_local().unix_timestamp()
            ],
        )?;
        Ok(sprint_id)
    }

    pub fn load_sprint(&self, sprint_id: Uuid) -> Result<Sprint, DbError> {
        let conn = self.conn.borrow();
        let (id, session_id, duration, wordcount, started_at, ended_at) = conn.query_row(
            "SELECT id, session_id, duration, wordcount, started_at, ended_at
             FROM sprints WHERE id = ?1",
            params![sprint_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                ))
            },
        )?;
        Ok(Sprint {
            id: parse_uuid(&id)?,
            session_id: parse_uuid(&session_id)?,
            intended_duration: parse_duration(&duration)
                .map_err(|e| DbError::Malformed(format!("sprint duration: {e}")))?,
            wordcount: wordcount as usize,
            started_at: parse_timestamp(started_at)?,
            ended_at: ended_at.map(parse_timestamp).transpose()?,
        })
    }

    pub fn update_sprint(
        &self,
        sprint_id: Uuid,
        wordcount: usize,
        ended: bool,
    ) -> Result<(), DbError> {
        let conn = self.conn.borrow();
        if ended {
            conn.execute(
                "UPDATE sprints SET wordcount = ?2, ended_at = ?3 WHERE id = ?1",
                params![
                    sprint_id.to_string(),
                    wordcount as i64,
                    now_local().unix_timestamp()
                ],
            )?;
        } else {
            conn.execute(
                "UPDATE sprints SET wordcount = ?2 WHERE id = ?1",
                params![sprint_id.to_string(), wordcount as i64],
            )?;
        }
        Ok(())
    }
}

type RowResult = Result<Session, DbError>;

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowResult> {
    let id: String = row.get(0)?;
    let started_on: String = row.get(1)?;
    let updated_at: i64 = row.get(2)?;
    let exported_at: Option<i64> = row.get(3)?;
    let wordcount: i64 = row.get(4)?;
    Ok((|| {
        Ok(Session {
            id: parse_uuid(&id)?,
            started_on: parse_date(&started_on)
                .ok_or_else(|| DbError::Malformed(format!("session date: {started_on}")))?,
            updated_at: parse_timestamp(updated_at)?,
            exported_at: exported_at.map(parse_timestamp).transpose()?,
            wordcount: wordcount as usize,
        })
    })())
}

fn parse_uuid(s: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(s).map_err(|_| DbError::Malformed(format!("uuid: {s}")))
}

fn parse_timestamp(secs: i64) -> Result<OffsetDateTime, DbError> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|_| DbError::Malformed(format!("timestamp: {secs}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_with_one_empty_paragraph() {
        let db = Db::open_in_memory().unwrap();
        let session_id = db.new_session().unwrap();
        let paragraphs = db.load_session_paragraphs(session_id).unwrap();
        assert_eq!(paragraphs.len(), 1);
        assert_eq!(paragraphs[0].index, 0);
        assert_eq!(paragraphs[0].markdown, "");
    }

    #[test]
    fn save_session_upserts_paragraphs() {
        let db = Db::open_in_memory().unwrap();
        let session_id = db.new_session().unwrap();
        let mut paragraphs = db.load_session_paragraphs(session_id).unwrap();
        paragraphs[0].markdown = "hello world".to_string();
        paragraphs.push(Paragraph {
            id: Uuid::new_v4(),
            session_id,
            index: 1,
            sprint_id: None,
            markdown: "second".to_string(),
        });
        db.save_session(session_id, 3, &paragraphs).unwrap();
        // saving again with changed markdown updates in place
        paragraphs[1].markdown = "second, edited".to_string();
        db.save_session(session_id, 4, &paragraphs).unwrap();

        let loaded = db.load_session_paragraphs(session_id).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].markdown, "hello world");
        assert_eq!(loaded[1].markdown, "second, edited");
        let session = db.load_session(session_id).unwrap().unwrap();
        assert_eq!(session.wordcount, 4);
    }

    #[test]
    fn list_sessions_only_exportable() {
        let db = Db::open_in_memory().unwrap();
        let exported = db.new_session().unwrap();
        let unexported = db.new_session().unwrap();
        // stamp the first session as exported after its last update
        let later = now_local() + time::Duration::hours(1);
        db.set_exported_time(exported, later).unwrap();

        let all = db.list_sessions(None, false).unwrap();
        assert_eq!(all.len(), 2);
        let exportable = db.list_sessions(None, true).unwrap();
        assert_eq!(exportable.len(), 1);
        assert_eq!(exportable[0].id, unexported);
    }

    #[test]
    fn delete_session_removes_everything() {
        let db = Db::open_in_memory().unwrap();
        let session_id = db.new_session().unwrap();
        let sprint_id = db.new_sprint(session_id, Duration::from_secs(900)).unwrap();
        db.update_sprint(sprint_id, 12, true).unwrap();
        db.delete_session(session_id).unwrap();
        assert!(db.load_session(session_id).unwrap().is_none());
        assert!(db.load_session_paragraphs(session_id).unwrap().is_empty());
    }

    #[test]
    fn sprint_round_trip() {
        let db = Db::open_in_memory().unwrap();
        let session_id = db.new_session().unwrap();
        let sprint_id = db.new_sprint(session_id, Duration::from_secs(900)).unwrap();
        let sprint = db.load_sprint(sprint_id).unwrap();
        assert_eq!(sprint.intended_duration, Duration::from_secs(900));
        assert_eq!(sprint.ended_at, None);
        db.update_sprint(sprint_id, 120, true).unwrap();
        let ended = db.load_sprint(sprint_id).unwrap();
        assert_eq!(ended.wordcount, 120);
        assert!(ended.ended_at.is_some());
    }

    #[test]
    fn version_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tabula.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", 9).unwrap();
        }
        match Db::open(&path) {
            Err(DbError::Version { found, expected, .. }) => {
                assert_eq!(found, 9);
                assert_eq!(expected, DB_VERSION);
            }
            other => panic!("expected version error, got {other:?}"),
        }
    }
}
