//! Script storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::parse::{parse_datetime, parse_script, source_from_str, OptionalExt};
use crate::error::Result;
use crate::models::Script;

/// Where a stored script came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSource {
    /// Added by the user on this machine
    Local,
    /// Cached copy of a script fetched from the remote bucket
    Remote,
}

impl ScriptSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptSource::Local => "local",
            ScriptSource::Remote => "remote",
        }
    }
}

/// A script row
#[derive(Debug, Clone)]
pub struct StoredScript {
    pub title: String,
    pub script: Script,
    pub source: ScriptSource,
    pub added_at: DateTime<Utc>,
}

pub struct ScriptStore<'a> {
    conn: &'a Connection,
}

impl<'a> ScriptStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace the script stored under `title`
    pub fn upsert(&self, title: &str, script: &Script, source: ScriptSource) -> Result<()> {
        let lines = serde_json::to_string(script)?;
        self.conn.execute(
            "INSERT INTO scripts (title, lines, added_at, source) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(title) DO UPDATE SET lines = excluded.lines,
                 added_at = excluded.added_at, source = excluded.source",
            params![title, lines, Utc::now().to_rfc3339(), source.as_str()],
        )?;
        Ok(())
    }

    /// Find a script by title
    pub fn find(&self, title: &str) -> Result<Option<StoredScript>> {
        let mut stmt = self
            .conn
            .prepare("SELECT title, lines, source, added_at FROM scripts WHERE title = ?1")?;

        let script = stmt
            .query_row(params![title], |row| {
                Ok(StoredScript {
                    title: row.get(0)?,
                    script: parse_script(&row.get::<_, String>(1)?)?,
                    source: source_from_str(&row.get::<_, String>(2)?),
                    added_at: parse_datetime(&row.get::<_, String>(3)?)?,
                })
            })
            .optional()?;

        Ok(script)
    }

    /// Every stored title, alphabetically
    pub fn all_titles(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT title FROM scripts ORDER BY title")?;

        let titles = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(titles)
    }
}
