//! Durable session record: the only state that survives a restart.
//!
//! The store is an explicit interface injected into the bootstrap glue, so
//! tests substitute an in-memory store and nothing else in the crate reads
//! ambient global state.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::error::{Error, Result};

/// Identifiers persisted after the first successful guest registration and
/// read at every startup to decide the initial screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub contact_identifier: String,
    pub conversation_id: i64,
    pub pubsub_token: String,
    pub contact_id: i64,
}

pub trait SessionStore: Send + Sync {
    fn get(&self) -> Result<Option<Session>>;
    fn set(&self, session: &Session) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Volatile store for tests and embedders that manage persistence themselves.
#[derive(Debug, Default)]
pub struct MemorySessionStore(Mutex<Option<Session>>);

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Result<Option<Session>> {
        Ok(self.0.lock().map_err(|_| poisoned())?.clone())
    }

    fn set(&self, session: &Session) -> Result<()> {
        *self.0.lock().map_err(|_| poisoned())? = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.0.lock().map_err(|_| poisoned())? = None;
        Ok(())
    }
}

fn poisoned() -> Error {
    Error::Session("session store lock poisoned".to_string())
}

/// SQLite-backed store holding a single-row session table.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS session (
                id INTEGER PRIMARY KEY CHECK(id = 1),
                contact_identifier TEXT NOT NULL,
                conversation_id INTEGER NOT NULL,
                pubsub_token TEXT NOT NULL,
                contact_id INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| poisoned())
    }
}

impl SessionStore for SqliteSessionStore {
    fn get(&self) -> Result<Option<Session>> {
        let conn = self.lock()?;
        let session = conn
            .query_row(
                "SELECT contact_identifier, conversation_id, pubsub_token, contact_id
                 FROM session WHERE id = 1",
                [],
                |row| {
                    Ok(Session {
                        contact_identifier: row.get(0)?,
                        conversation_id: row.get(1)?,
                        pubsub_token: row.get(2)?,
                        contact_id: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    fn set(&self, session: &Session) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO session (id, contact_identifier, conversation_id, pubsub_token, contact_id)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 contact_identifier = excluded.contact_identifier,
                 conversation_id = excluded.conversation_id,
                 pubsub_token = excluded.pubsub_token,
                 contact_id = excluded.contact_id",
            (
                &session.contact_identifier,
                session.conversation_id,
                &session.pubsub_token,
                session.contact_id,
            ),
        )?;
        info!(conversation = session.conversation_id, "session persisted");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM session", [])?;
        Ok(())
    }
}
