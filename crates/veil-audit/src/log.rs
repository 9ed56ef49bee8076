use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Serialize;
use tracing::{instrument, warn};

use veil_core::types::Role;

use crate::db::init_db;
use crate::error::{AuditError, Result};

/// Append-only conversation log backing the review/training workflow.
///
/// SQLite writes are blocking, so the async entry points hop onto the
/// blocking pool; the stream handler never stalls on a disk write. Record
/// failures are logged and swallowed — auditing must not break the live
/// conversation.
pub struct AuditLog {
    db: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub id: String,
    pub created_at: String,
    pub notes: Option<String>,
    pub messages: Vec<MessageRow>,
}

impl AuditLog {
    /// Open (or create) the store at `path` and run migrations.
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self::new(conn))
    }

    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    /// Persist a user message. Awaiting this before starting the model
    /// stream keeps the user row ahead of the assistant row of the same
    /// turn.
    pub async fn record_user(&self, session_id: &str, content: &str) {
        self.record(session_id, Role::User, content).await;
    }

    /// Persist the assistant reply as the user saw it (re-personalized).
    pub async fn record_assistant(&self, session_id: &str, content: &str) {
        self.record(session_id, Role::Assistant, content).await;
    }

    #[instrument(skip(self, content), fields(session = session_id, role = %role))]
    async fn record(&self, session_id: &str, role: Role, content: &str) {
        let db = Arc::clone(&self.db);
        let session = session_id.to_string();
        let content = content.to_string();

        let result =
            tokio::task::spawn_blocking(move || insert_message(&db, &session, role, &content))
                .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "audit write failed"),
            Err(e) => warn!(error = %e, "audit worker failed"),
        }
    }

    /// List sessions, newest first.
    pub async fn list_sessions(&self, skip: usize, limit: usize) -> Result<Vec<SessionSummary>> {
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            let db = db.lock().unwrap();
            let mut stmt = db.prepare(
                "SELECT id, created_at, notes FROM chat_sessions
                 ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(
                rusqlite::params![limit as i64, skip as i64],
                |row| {
                    Ok(SessionSummary {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                        notes: row.get(2)?,
                    })
                },
            )?;
            Ok(rows.filter_map(|r| r.ok()).collect())
        })
        .await
    }

    /// Session with its messages in time order, or `None` if unknown.
    pub async fn session_detail(&self, session_id: &str) -> Result<Option<SessionDetail>> {
        let db = Arc::clone(&self.db);
        let id = session_id.to_string();
        run_blocking(move || {
            let db = db.lock().unwrap();
            let session = match db.query_row(
                "SELECT id, created_at, notes FROM chat_sessions WHERE id = ?1",
                rusqlite::params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            ) {
                Ok(s) => s,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(AuditError::Database(e)),
            };

            let mut stmt = db.prepare(
                "SELECT id, role, content, timestamp FROM chat_messages
                 WHERE session_id = ?1 ORDER BY id",
            )?;
            let messages = stmt
                .query_map(rusqlite::params![session.0], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        role: row.get(1)?,
                        content: row.get(2)?,
                        timestamp: row.get(3)?,
                    })
                })?
                .filter_map(|r| r.ok())
                .collect();

            Ok(Some(SessionDetail {
                id: session.0,
                created_at: session.1,
                notes: session.2,
                messages,
            }))
        })
        .await
    }

    /// Update the review notes of a session.
    pub async fn update_note(&self, session_id: &str, notes: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = session_id.to_string();
        let notes = notes.to_string();
        run_blocking(move || {
            let db = db.lock().unwrap();
            let changed = db.execute(
                "UPDATE chat_sessions SET notes = ?1 WHERE id = ?2",
                rusqlite::params![notes, id],
            )?;
            if changed == 0 {
                return Err(AuditError::NotFound { id });
            }
            Ok(())
        })
        .await
    }

    /// Export every session and message as CSV for the training workflow.
    pub async fn export_csv(&self) -> Result<String> {
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            let db = db.lock().unwrap();
            let mut out = String::from(
                "session_id,session_created_at,session_notes,message_role,message_time,message_content\n",
            );

            let mut stmt = db.prepare(
                "SELECT s.id, s.created_at, s.notes, m.role, m.timestamp, m.content
                 FROM chat_sessions s JOIN chat_messages m ON m.session_id = s.id
                 ORDER BY s.created_at, m.id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?;

            for row in rows.filter_map(|r| r.ok()) {
                let (id, created, notes, role, time, content) = row;
                out.push_str(&format!(
                    "{},{},{},{},{},{}\n",
                    csv_field(&id),
                    csv_field(&created),
                    csv_field(notes.as_deref().unwrap_or("")),
                    csv_field(&role),
                    csv_field(&time),
                    csv_field(&content),
                ));
            }
            Ok(out)
        })
        .await
    }
}

/// Run a rusqlite closure on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AuditError::Worker(e.to_string()))?
}

fn insert_message(
    db: &Mutex<Connection>,
    session_id: &str,
    role: Role,
    content: &str,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let db = db.lock().unwrap();
    db.execute(
        "INSERT OR IGNORE INTO chat_sessions (id, created_at) VALUES (?1, ?2)",
        rusqlite::params![session_id, now],
    )?;
    db.execute(
        "INSERT INTO chat_messages (session_id, role, content, timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![session_id, role.as_str(), content, now],
    )?;
    Ok(())
}

/// Minimal CSV quoting: wrap and double-quote when the field needs it.
fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
