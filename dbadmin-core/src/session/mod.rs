//! Database sessions and the administrative statements the core issues.
//!
//! Sessions are opened through a [`SessionFactory`] and held in a
//! [`ScopedSession`], which closes them when dropped so no exit path leaks
//! an open connection.

pub mod errors;
pub mod shell;

use crate::units::StorageUnit;
use crate::utils::errors::Result;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;

/// Login for a database session.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// An open connection to a live database.
pub trait DatabaseSession: Send {
    /// Runs a statement that returns no rows.
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Runs a query; every row comes back as one text value per column,
    /// NULL as the empty string.
    fn query(&mut self, query: &Query) -> Result<Vec<Vec<String>>>;

    /// Enumerates the database's storage units.
    fn storage_units(&mut self) -> Result<Vec<StorageUnit>>;

    /// Closes the session. Calling it again is a no-op.
    fn close(&mut self);
}

pub trait SessionFactory: Send + Sync {
    /// Opens a session. A rejected login is a database error with code 90.
    fn connect(&self, database: &str, credentials: &Credentials) -> Result<Box<dyn DatabaseSession>>;
}

/// Closes the wrapped session when dropped.
pub struct ScopedSession {
    inner: Box<dyn DatabaseSession>,
}

impl ScopedSession {
    pub fn open(factory: &dyn SessionFactory, database: &str, credentials: &Credentials) -> Result<Self> {
        Ok(Self {
            inner: factory.connect(database, credentials)?,
        })
    }
}

impl Deref for ScopedSession {
    type Target = dyn DatabaseSession;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for ScopedSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// Prefix of every row line a rendered [`Query`] prints.
pub const ROW_TAG: &str = "ROW|";

/// A row-returning select over text columns.
///
/// Rendered so that each row prints as a single line
/// `ROW|<col1>|<col2>|...`, which keeps rows apart from headers, echoed
/// input and engine messages in line-oriented output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    columns: Vec<String>,
    from: String,
}

impl Query {
    /// `from` is everything after the select list, starting with `FROM`.
    pub fn new(columns: &[&str], from: impl Into<String>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            from: from.into(),
        }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn from_clause(&self) -> &str {
        &self.from
    }

    pub fn render(&self) -> String {
        let row = self
            .columns
            .iter()
            .map(|c| format!("COALESCE(CAST({} AS VARCHAR(1024)), '')", c))
            .collect::<Vec<_>>()
            .join(" || '|' || ");
        format!("SELECT '{}' || {} AS row_data {}", ROW_TAG, row, self.from)
    }

    /// The columns of one output line, or `None` if it is not a row.
    /// The last column keeps any separators it contains.
    pub fn parse_row(&self, line: &str) -> Option<Vec<String>> {
        let line = line.trim_start();
        let line = line.strip_prefix("SQL>").unwrap_or(line).trim_start();
        let rest = line.strip_prefix(ROW_TAG)?;
        let fields: Vec<String> = rest
            .splitn(self.width(), '|')
            .map(|f| f.trim().to_string())
            .collect();
        (fields.len() == self.width()).then_some(fields)
    }
}

/// Online backup protocol and log recovery statements.
pub mod statements {
    use super::*;

    pub const START_BACKUP: &str = "start backup";
    pub const COMMIT_BACKUP: &str = "commit backup";
    pub const ROLLBACK_BACKUP: &str = "rollback backup";

    /// Copies one unit into `target` while a backup is open.
    pub fn backup_unit(target: &Path, unit_name: &str) -> String {
        format!(
            "create backup in '{}' for databank {}",
            escape_literal(&target.to_string_lossy()),
            unit_name
        )
    }

    /// Replays the recovery log onto one restored unit.
    pub fn restore_unit_from_log(unit_name: &str) -> String {
        format!("alter databank {} restore using log", unit_name)
    }

    /// Every databank with its file and the time of its last backup.
    pub fn unit_query() -> Query {
        Query::new(
            &["databank_name", "file_name", "backup_date"],
            "FROM information_schema.ext_databanks",
        )
    }

    /// Doubles single quotes for use inside a string literal.
    pub fn escape_literal(value: &str) -> String {
        value.replace('\'', "''")
    }
}
