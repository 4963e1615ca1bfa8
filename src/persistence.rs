//! # Persistent Store
//!
//! Durable `ContactStore` backed by SQLite. Transactions run with
//! `BEGIN IMMEDIATE` so write intent is declared up front; a busy or locked
//! database maps to the retryable conflict error and the engine's retry
//! loop re-runs the whole unit of work.

use crate::error::{Phase, PhaseError, StoreError};
use crate::model::{
    now_millis, Contact, ContactId, IdentityView, LinkPrecedence, Timestamp,
};
use crate::store::{ContactPatch, ContactStore, ContactTx, MatchPredicate, NewContact};
use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Schema mirrors the upstream contact table: nullable match keys, nullable
/// link, soft-delete marker the engine never touches.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS contact (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    phoneNumber TEXT,
    email TEXT,
    linkedId INTEGER REFERENCES contact(id),
    linkPrecedence TEXT NOT NULL CHECK (linkPrecedence IN ('primary', 'secondary')),
    createdAt INTEGER NOT NULL,
    updatedAt INTEGER NOT NULL,
    deletedAt INTEGER
);
CREATE INDEX IF NOT EXISTS idx_contact_email ON contact(email);
CREATE INDEX IF NOT EXISTS idx_contact_phone ON contact(phoneNumber);
CREATE INDEX IF NOT EXISTS idx_contact_linked ON contact(linkedId);
";

const CONTACT_COLUMNS: &str =
    "id, email, phoneNumber, linkedId, linkPrecedence, createdAt, updatedAt, deletedAt";

/// SQLite-backed contact store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at `path`, bootstrapping the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a private in-memory store. Useful for tests and benches.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "wal")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// All stored contacts in id order.
    pub fn snapshot(&self) -> Result<Vec<Contact>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {CONTACT_COLUMNS} FROM contact ORDER BY id"))?;
        let contacts = stmt
            .query_map([], read_contact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(contacts)
    }
}

impl ContactStore for SqliteStore {
    fn with_transaction(
        &self,
        f: &mut dyn FnMut(&mut dyn ContactTx) -> Result<IdentityView, PhaseError>,
    ) -> Result<IdentityView, PhaseError> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| PhaseError::new(Phase::Commit, map_sqlite(e)))?;
        let view = f(&mut SqliteTx { tx: &tx })?;
        tx.commit()
            .map_err(|e| PhaseError::new(Phase::Commit, map_sqlite(e)))?;
        Ok(view)
    }
}

struct SqliteTx<'conn> {
    tx: &'conn rusqlite::Transaction<'conn>,
}

impl ContactTx for SqliteTx<'_> {
    fn find_by_predicate(
        &mut self,
        predicate: &MatchPredicate,
    ) -> Result<Vec<Contact>, StoreError> {
        let mut clauses = Vec::with_capacity(2);
        let mut params: Vec<Value> = Vec::with_capacity(2);
        if let Some(email) = &predicate.email {
            params.push(Value::Text(email.clone()));
            clauses.push(format!("email = ?{}", params.len()));
        }
        if let Some(phone) = &predicate.phone {
            params.push(Value::Text(phone.clone()));
            clauses.push(format!("phoneNumber = ?{}", params.len()));
        }
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contact WHERE {}",
            clauses.join(" OR ")
        );
        self.query_contacts(&sql, params)
    }

    fn find_by_ids_or_linked_id(
        &mut self,
        ids: &BTreeSet<ContactId>,
    ) -> Result<Vec<Contact>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_slots = placeholders(ids.len(), 0);
        let linked_slots = placeholders(ids.len(), ids.len());
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contact WHERE id IN ({id_slots}) OR linkedId IN ({linked_slots})"
        );
        let params: Vec<Value> = ids
            .iter()
            .chain(ids.iter())
            .map(|id| Value::Integer(id.0))
            .collect();
        self.query_contacts(&sql, params)
    }

    fn insert(&mut self, new: NewContact) -> Result<Contact, StoreError> {
        let now = now_millis();
        self.tx
            .execute(
                "INSERT INTO contact (email, phoneNumber, linkedId, linkPrecedence, createdAt, updatedAt)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    new.email,
                    new.phone_number,
                    new.linked_id.map(|id| id.0),
                    new.link_precedence.as_str(),
                    now,
                    now
                ],
            )
            .map_err(map_sqlite)?;
        Ok(Contact {
            id: ContactId(self.tx.last_insert_rowid()),
            email: new.email,
            phone_number: new.phone_number,
            linked_id: new.linked_id,
            link_precedence: new.link_precedence,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    fn update_many(
        &mut self,
        ids: &BTreeSet<ContactId>,
        patch: ContactPatch,
    ) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut sql = String::from("UPDATE contact SET updatedAt = ?1");
        let mut params: Vec<Value> = vec![Value::Integer(now_millis())];
        if let Some(precedence) = patch.link_precedence {
            params.push(Value::Text(precedence.as_str().to_string()));
            sql.push_str(&format!(", linkPrecedence = ?{}", params.len()));
        }
        if let Some(linked) = patch.linked_id {
            params.push(match linked {
                Some(id) => Value::Integer(id.0),
                None => Value::Null,
            });
            sql.push_str(&format!(", linkedId = ?{}", params.len()));
        }
        sql.push_str(&format!(
            " WHERE id IN ({})",
            placeholders(ids.len(), params.len())
        ));
        params.extend(ids.iter().map(|id| Value::Integer(id.0)));

        self.tx
            .execute(&sql, params_from_iter(params))
            .map_err(map_sqlite)?;
        Ok(())
    }
}

impl SqliteTx<'_> {
    fn query_contacts(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Contact>, StoreError> {
        let mut stmt = self.tx.prepare(sql).map_err(map_sqlite)?;
        let contacts = stmt
            .query_map(params_from_iter(params), read_contact)
            .map_err(map_sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(map_sqlite)?;
        Ok(contacts)
    }
}

/// Numbered placeholders `?{offset+1}, ?{offset+2}, ...`.
fn placeholders(count: usize, offset: usize) -> String {
    (0..count)
        .map(|i| format!("?{}", offset + i + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_contact(row: &Row<'_>) -> rusqlite::Result<Contact> {
    let precedence: String = row.get(4)?;
    let link_precedence = match precedence.as_str() {
        "primary" => LinkPrecedence::Primary,
        "secondary" => LinkPrecedence::Secondary,
        other => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("unknown linkPrecedence {other:?}").into(),
            ))
        }
    };
    Ok(Contact {
        id: ContactId(row.get(0)?),
        email: row.get(1)?,
        phone_number: row.get(2)?,
        linked_id: row.get::<_, Option<i64>>(3)?.map(ContactId),
        link_precedence,
        created_at: row.get::<_, Timestamp>(5)?,
        updated_at: row.get::<_, Timestamp>(6)?,
        deleted_at: row.get::<_, Option<Timestamp>>(7)?,
    })
}

/// Busy and locked databases are serialization conflicts; everything else
/// is hard unavailability.
fn map_sqlite(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(
                failure.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            StoreError::Conflict
        }
        _ => StoreError::Unavailable(err.into()),
    }
}
