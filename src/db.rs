// SQLite identity store

use anyhow::{Context, Result};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::auth::Identity;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    username      TEXT PRIMARY KEY NOT NULL,
    password_hash TEXT NOT NULL,
    email         TEXT,
    name          TEXT
);
";

/// Identity store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// A user with this username already exists
    #[error("username already taken: {0}")]
    UsernameTaken(String),

    /// Underlying SQLite failure
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Fields for a new identity; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Thread-safe handle to the users table
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file and ensure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::init(conn)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create users table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Statements are atomic, so a poisoned lock is still consistent
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up an identity by username
    pub fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        let conn = self.conn();
        let identity = conn
            .query_row(
                "SELECT username, password_hash, email, name FROM users WHERE username = ?1",
                [username],
                |row| {
                    Ok(Identity {
                        username: row.get(0)?,
                        password_hash: row.get(1)?,
                        email: row.get(2)?,
                        name: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(identity)
    }

    /// Persist a new identity, failing if the username is taken
    pub fn store_new_identity(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO users (username, password_hash, email, name) VALUES (?1, ?2, ?3, ?4)",
            params![new.username, new.password_hash, new.email, new.name],
        );

        match inserted {
            Ok(_) => {
                tracing::info!("Stored new identity: {}", new.username);
                Ok(Identity {
                    username: new.username,
                    password_hash: new.password_hash,
                    email: new.email,
                    name: new.name,
                })
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::UsernameTaken(new.username))
            }
            Err(e) => Err(e.into()),
        }
    }
}
