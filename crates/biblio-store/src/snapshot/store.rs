//! The snapshot store: one table of versioned records
//!
//! Invariants kept per record id:
//! - at most one current snapshot (`valid_until IS NULL`), backed by a
//!   partial unique index
//! - `[valid_from, valid_until)` intervals are contiguous and ordered
//! - `version_id` is unique across the table and doubles as the
//!   optimistic-concurrency token

use biblio_core::errors::{ConflictInfo, ExError, ExErrorKind};
use biblio_core::{Context, ValidationErrors};
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::errors::{from_rusqlite, Result};
use crate::listener::append_event;
use crate::snapshot::iter::{PageKey, SnapshotIter};
use crate::snapshot::model::{from_micros, to_micros, EventName, Snapshot};
use crate::snapshot::SqlValue;

const COLUMNS: &str = "seq, id, version_id, payload, valid_from, valid_until, date_created";

/// Table names the store must never claim
const RESERVED_NAMES: &[&str] = &["notifications", "schema_version"];

/// Proof that history rewriting was allowed by configuration.
///
/// Only `RepoConfig::rewrite_grant` hands these out.
#[derive(Debug)]
pub struct RewriteGrant {
    _private: (),
}

impl RewriteGrant {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

/// Which rows a lazy read walks
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Current snapshot of every id
    Current,
    /// Current snapshots of the given ids
    CurrentIds(Vec<String>),
    /// Every snapshot of one id
    History(String),
    /// Every snapshot of every id
    All,
    /// Current snapshots matching an SQL boolean fragment with `?` placeholders
    Predicate {
        predicate: String,
        args: Vec<SqlValue>,
    },
    /// Current snapshots with `from <= valid_from <= to`
    CurrentBetween(DateTime<Utc>, DateTime<Utc>),
}

impl Filter {
    pub fn predicate(predicate: impl Into<String>, args: Vec<SqlValue>) -> Self {
        Filter::Predicate {
            predicate: predicate.into(),
            args,
        }
    }

    /// True when the filter only yields current rows, one per id
    fn current_only(&self) -> bool {
        !matches!(self, Filter::History(_) | Filter::All)
    }

    fn clause(&self) -> (String, Vec<SqlValue>) {
        match self {
            Filter::Current => ("valid_until IS NULL".to_string(), Vec::new()),
            Filter::CurrentIds(ids) => (
                format!(
                    "valid_until IS NULL AND id IN ({})",
                    vec!["?"; ids.len()].join(", ")
                ),
                ids.iter().map(|id| SqlValue::Text(id.clone())).collect(),
            ),
            Filter::History(id) => ("id = ?".to_string(), vec![SqlValue::Text(id.clone())]),
            Filter::All => ("1 = 1".to_string(), Vec::new()),
            Filter::Predicate { predicate, args } => (
                format!("valid_until IS NULL AND ({})", predicate_or_all(predicate)),
                args.clone(),
            ),
            Filter::CurrentBetween(from, to) => (
                "valid_until IS NULL AND valid_from >= ? AND valid_from <= ?".to_string(),
                vec![
                    SqlValue::Integer(to_micros(*from)),
                    SqlValue::Integer(to_micros(*to)),
                ],
            ),
        }
    }
}

fn predicate_or_all(predicate: &str) -> &str {
    if predicate.trim().is_empty() {
        "1 = 1"
    } else {
        predicate
    }
}

/// True for names usable as a store table: `[a-z_][a-z0-9_]*`, not reserved
pub fn is_valid_store_name(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    first_ok
        && name.len() <= 63
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.starts_with("sqlite_")
        && !RESERVED_NAMES.contains(&name)
}

struct RawRow {
    seq: i64,
    id: String,
    version_id: String,
    payload: String,
    valid_from: i64,
    valid_until: Option<i64>,
    date_created: i64,
}

impl RawRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            id: row.get(1)?,
            version_id: row.get(2)?,
            payload: row.get(3)?,
            valid_from: row.get(4)?,
            valid_until: row.get(5)?,
            date_created: row.get(6)?,
        })
    }

    fn into_keyed(self) -> Result<(PageKey, Snapshot)> {
        let key = PageKey {
            id: self.id.clone(),
            valid_from: self.valid_from,
            seq: self.seq,
        };
        let snapshot = Snapshot {
            id: self.id,
            version_id: self.version_id,
            payload: self.payload.into_bytes(),
            valid_from: from_micros(self.valid_from)?,
            valid_until: self.valid_until.map(from_micros).transpose()?,
            date_created: from_micros(self.date_created)?,
        };
        Ok((key, snapshot))
    }
}

fn db_err(op: &'static str, id: &str) -> impl FnOnce(rusqlite::Error) -> ExError {
    let id = id.to_string();
    move |e| from_rusqlite(e).wrap(op, id)
}

fn payload_text<'p>(op: &str, id: &str, payload: &'p [u8]) -> Result<&'p str> {
    std::str::from_utf8(payload).map_err(|e| {
        ExError::new(ExErrorKind::Serialization)
            .with_op(op.to_string())
            .with_entity_id(id)
            .with_message(format!("payload is not valid UTF-8: {}", e))
    })
}

fn single_violation(op: &str, id: &str, field: &str, rule: &str) -> ExError {
    let mut errors = ValidationErrors::new();
    errors.push(field, rule);
    ExError::validation(op, id, errors)
}

/// Stateless accessor for one snapshot table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotStore {
    name: String,
    page_size: usize,
}

impl SnapshotStore {
    /// # Errors
    ///
    /// `Argument` when `name` is not a valid store name.
    pub fn new(name: &str, page_size: usize) -> Result<Self> {
        if !is_valid_store_name(name) {
            return Err(ExError::new(ExErrorKind::Argument)
                .with_op("snapshot_store")
                .with_message(format!("invalid store name \"{}\"", name)));
        }
        Ok(Self {
            name: name.to_string(),
            page_size: page_size.max(1),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Create the table and its indexes if missing
    ///
    /// # Errors
    ///
    /// `Persistence` when the DDL fails.
    pub fn install(&self, conn: &Connection) -> Result<()> {
        let t = &self.name;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL,
                version_id TEXT NOT NULL UNIQUE,
                payload TEXT NOT NULL,
                valid_from INTEGER NOT NULL,
                valid_until INTEGER,
                date_created INTEGER NOT NULL,
                CHECK (valid_until IS NULL OR valid_until >= valid_from)
            );
            CREATE UNIQUE INDEX IF NOT EXISTS {t}_current ON {t}(id) WHERE valid_until IS NULL;
            CREATE INDEX IF NOT EXISTS {t}_history ON {t}(id, valid_from, seq);"
        ))
        .map_err(db_err("install", t))
    }

    /// Current snapshot of `id`, if any
    ///
    /// # Errors
    ///
    /// `Persistence` on database failure.
    pub fn find_current(&self, conn: &Connection, id: &str) -> Result<Option<Snapshot>> {
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM {} WHERE id = ? AND valid_until IS NULL",
                    self.name
                ),
                [id],
                RawRow::read,
            )
            .optional()
            .map_err(db_err("get_current", id))?;
        raw.map(|r| r.into_keyed().map(|(_, s)| s)).transpose()
    }

    /// # Errors
    ///
    /// `NotFound` when `id` has no current snapshot.
    pub fn get_current(&self, conn: &Connection, id: &str) -> Result<Snapshot> {
        self.find_current(conn, id)?
            .ok_or_else(|| ExError::not_found("get_current", id))
    }

    fn version_exists(&self, conn: &Connection, version_id: &str) -> Result<bool> {
        conn.query_row(
            &format!("SELECT 1 FROM {} WHERE version_id = ?", self.name),
            [version_id],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(db_err("version_exists", version_id))
    }

    fn close_current(&self, conn: &Connection, id: &str, at: DateTime<Utc>) -> Result<()> {
        conn.execute(
            &format!(
                "UPDATE {} SET valid_until = ? WHERE id = ? AND valid_until IS NULL",
                self.name
            ),
            params![to_micros(at), id],
        )
        .map_err(db_err("close_current", id))?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_current(
        &self,
        conn: &Connection,
        op: &'static str,
        id: &str,
        version_id: &str,
        payload: &str,
        valid_from: DateTime<Utc>,
        date_created: DateTime<Utc>,
    ) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO {} (id, version_id, payload, valid_from, valid_until, date_created)
                 VALUES (?, ?, ?, ?, NULL, ?)",
                self.name
            ),
            params![
                id,
                version_id,
                payload,
                to_micros(valid_from),
                to_micros(date_created)
            ],
        )
        .map_err(db_err(op, id))?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn append(
        &self,
        conn: &Connection,
        op: &'static str,
        previous: Option<&Snapshot>,
        id: &str,
        version_id: &str,
        payload: &[u8],
        now: DateTime<Utc>,
        event: EventName,
    ) -> Result<Snapshot> {
        let text = payload_text(op, id, payload)?;
        let now = now.trunc_subsecs(6);
        // never start before the snapshot being closed, even if the clock went back
        let valid_from = previous.map_or(now, |p| now.max(p.valid_from));

        if previous.is_some() {
            self.close_current(conn, id, valid_from)?;
        }
        self.insert_current(conn, op, id, version_id, text, valid_from, now)?;
        append_event(conn, event, &self.name, id, Some(version_id), now)?;

        tracing::debug!(
            store = %self.name,
            record_id = id,
            version_id,
            event = event.as_str(),
            "Appended snapshot"
        );

        Ok(Snapshot {
            id: id.to_string(),
            version_id: version_id.to_string(),
            payload: payload.to_vec(),
            valid_from,
            valid_until: None,
            date_created: now,
        })
    }

    /// Unconditional write: close any current snapshot and open a new one
    ///
    /// # Errors
    ///
    /// `Serialization` for a non-UTF-8 payload, `Persistence` on database
    /// failure.
    pub fn add(
        &self,
        conn: &Connection,
        id: &str,
        version_id: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Snapshot> {
        let previous = self.find_current(conn, id)?;
        let event = if previous.is_some() {
            EventName::Update
        } else {
            EventName::Create
        };
        self.append(conn, "add", previous.as_ref(), id, version_id, payload, now, event)
    }

    /// Checked write: succeeds only while `expected_version_id` is current
    ///
    /// # Errors
    ///
    /// `NotFound` when `id` has no current snapshot, `Conflict` (with both
    /// tokens) when another version is current.
    pub fn add_after(
        &self,
        conn: &Connection,
        expected_version_id: &str,
        id: &str,
        version_id: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Snapshot> {
        let current = self
            .find_current(conn, id)?
            .ok_or_else(|| ExError::not_found("add_after", id))?;

        if current.version_id != expected_version_id {
            return Err(ExError::conflict(
                "add_after",
                ConflictInfo {
                    record_id: id.to_string(),
                    expected_version_id: expected_version_id.to_string(),
                    current_version_id: Some(current.version_id),
                },
            ));
        }

        self.append(
            conn,
            "add_after",
            Some(&current),
            id,
            version_id,
            payload,
            now,
            EventName::Update,
        )
    }

    /// Rewrite the payload of one existing snapshot in place
    ///
    /// # Errors
    ///
    /// `NotFound` when no snapshot of `id` has `version_id`.
    pub fn update(
        &self,
        conn: &Connection,
        _grant: &RewriteGrant,
        version_id: &str,
        id: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let text = payload_text("update", id, payload)?;
        let changed = conn
            .execute(
                &format!(
                    "UPDATE {} SET payload = ? WHERE id = ? AND version_id = ?",
                    self.name
                ),
                params![text, id, version_id],
            )
            .map_err(db_err("update", id))?;

        if changed == 0 {
            return Err(ExError::not_found("update", id).with_message(format!(
                "no snapshot with version {}",
                version_id
            )));
        }

        append_event(conn, EventName::Correct, &self.name, id, Some(version_id), now)?;

        tracing::warn!(
            op = "correct",
            store = %self.name,
            record_id = id,
            version_id,
            "Rewrote snapshot payload in place"
        );
        Ok(())
    }

    /// Insert a snapshot with caller-supplied timestamps as the new current.
    ///
    /// An existing current snapshot is closed at the import's `valid_from`,
    /// which must be strictly later than the current one's.
    ///
    /// # Errors
    ///
    /// `Validation` for a duplicate `version_id` or an import that would
    /// overlap existing history.
    pub fn import(
        &self,
        conn: &Connection,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> Result<Snapshot> {
        let id = snapshot.id.as_str();
        let text = payload_text("import", id, &snapshot.payload)?;
        let valid_from = snapshot.valid_from.trunc_subsecs(6);
        let date_created = snapshot.date_created.trunc_subsecs(6);

        if self.version_exists(conn, &snapshot.version_id)? {
            return Err(single_violation("import", id, "version_id", "duplicate"));
        }

        if let Some(current) = self.find_current(conn, id)? {
            if valid_from <= current.valid_from {
                return Err(single_violation(
                    "import",
                    id,
                    "valid_from",
                    "overlaps_history",
                ));
            }
            self.close_current(conn, id, valid_from)?;
        }

        self.insert_current(
            conn,
            "import",
            id,
            &snapshot.version_id,
            text,
            valid_from,
            date_created,
        )?;
        append_event(
            conn,
            EventName::Import,
            &self.name,
            id,
            Some(&snapshot.version_id),
            now.trunc_subsecs(6),
        )?;

        Ok(Snapshot {
            id: id.to_string(),
            version_id: snapshot.version_id.clone(),
            payload: snapshot.payload.clone(),
            valid_from,
            valid_until: None,
            date_created,
        })
    }

    /// The snapshot of `id` whose interval contains `t`
    ///
    /// # Errors
    ///
    /// `NotFound` when `t` precedes the first snapshot or `id` is unknown.
    pub fn get_as_of(&self, conn: &Connection, id: &str, t: DateTime<Utc>) -> Result<Snapshot> {
        let micros = to_micros(t);
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM {} \
                     WHERE id = ? AND valid_from <= ? AND (valid_until IS NULL OR valid_until > ?) \
                     ORDER BY valid_from DESC, seq DESC LIMIT 1",
                    self.name
                ),
                params![id, micros, micros],
                RawRow::read,
            )
            .optional()
            .map_err(db_err("get_as_of", id))?
            .ok_or_else(|| ExError::not_found("get_as_of", id))?;
        raw.into_keyed().map(|(_, s)| s)
    }

    /// One page of `filter` in `(id, valid_from, seq)` order, after `after`
    ///
    /// Filters over current rows resume strictly after the last id, so a
    /// record rewritten between pages is not yielded a second time.
    ///
    /// # Errors
    ///
    /// `Argument` when a predicate's placeholders do not match its
    /// arguments, `Persistence` on database failure.
    pub fn page(
        &self,
        conn: &Connection,
        filter: &Filter,
        after: Option<&PageKey>,
        limit: usize,
    ) -> Result<Vec<(PageKey, Snapshot)>> {
        let (clause, mut args) = filter.clause();
        let mut sql = format!("SELECT {COLUMNS} FROM {} WHERE ({})", self.name, clause);
        match after {
            Some(key) if filter.current_only() => {
                sql.push_str(" AND id > ?");
                args.push(SqlValue::Text(key.id.clone()));
            }
            Some(key) => {
                sql.push_str(" AND (id, valid_from, seq) > (?, ?, ?)");
                args.push(SqlValue::Text(key.id.clone()));
                args.push(SqlValue::Integer(key.valid_from));
                args.push(SqlValue::Integer(key.seq));
            }
            None => {}
        }
        sql.push_str(" ORDER BY id, valid_from, seq LIMIT ?");
        args.push(SqlValue::Integer(limit as i64));

        self.collect_rows(conn, "page", &sql, &args)?
            .into_iter()
            .map(RawRow::into_keyed)
            .collect()
    }

    fn collect_rows(
        &self,
        conn: &Connection,
        op: &'static str,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<Vec<RawRow>> {
        let mut stmt = conn.prepare(sql).map_err(db_err(op, &self.name))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), RawRow::read)
            .map_err(db_err(op, &self.name))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err(op, &self.name))?;
        Ok(rows)
    }

    /// Lazy walk of `filter` on `conn`
    pub fn iter<'c>(&self, conn: &'c Connection, ctx: &Context, filter: Filter) -> SnapshotIter<'c> {
        let store = self.clone();
        SnapshotIter::new(ctx, self.page_size, move |after, limit| {
            store.page(conn, &filter, after, limit)
        })
    }

    /// Number of current snapshots matching `predicate`
    ///
    /// # Errors
    ///
    /// `Argument` for mismatched placeholders, `Persistence` otherwise.
    pub fn count(&self, conn: &Connection, predicate: &str, args: &[SqlValue]) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE valid_until IS NULL AND ({})",
            self.name,
            predicate_or_all(predicate)
        );
        let n: i64 = conn
            .query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))
            .map_err(db_err("count", &self.name))?;
        Ok(n.max(0) as u64)
    }

    /// Current snapshots matching `predicate`, ordered by `valid_from`
    ///
    /// # Errors
    ///
    /// `Argument` for mismatched placeholders, `Persistence` otherwise.
    pub fn query_page(
        &self,
        conn: &Connection,
        predicate: &str,
        args: &[SqlValue],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Snapshot>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE valid_until IS NULL AND ({}) \
             ORDER BY valid_from, seq LIMIT ? OFFSET ?",
            self.name,
            predicate_or_all(predicate)
        );
        let mut all_args = args.to_vec();
        all_args.push(SqlValue::Integer(limit as i64));
        all_args.push(SqlValue::Integer(offset as i64));

        self.collect_rows(conn, "query_page", &sql, &all_args)?
            .into_iter()
            .map(|r| r.into_keyed().map(|(_, s)| s))
            .collect()
    }

    /// Delete every snapshot of `id`; returns the number of rows removed
    ///
    /// # Errors
    ///
    /// `Persistence` on database failure.
    pub fn purge(&self, conn: &Connection, id: &str, now: DateTime<Utc>) -> Result<usize> {
        let removed = conn
            .execute(&format!("DELETE FROM {} WHERE id = ?", self.name), [id])
            .map_err(db_err("purge", id))?;
        if removed > 0 {
            append_event(conn, EventName::Purge, &self.name, id, None, now.trunc_subsecs(6))?;
        }
        Ok(removed)
    }

    /// Delete every snapshot in the store; returns the number of ids removed
    ///
    /// # Errors
    ///
    /// `Persistence` on database failure.
    pub fn purge_all(&self, conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
        let mut stmt = conn
            .prepare(&format!("SELECT DISTINCT id FROM {} ORDER BY id", self.name))
            .map_err(db_err("purge_all", &self.name))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err("purge_all", &self.name))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err("purge_all", &self.name))?;
        drop(stmt);

        conn.execute(&format!("DELETE FROM {}", self.name), [])
            .map_err(db_err("purge_all", &self.name))?;

        let now = now.trunc_subsecs(6);
        for id in &ids {
            append_event(conn, EventName::Purge, &self.name, id, None, now)?;
        }
        Ok(ids.len())
    }

    /// Number of snapshots (all versions) held for `id`
    ///
    /// # Errors
    ///
    /// `Persistence` on database failure.
    pub fn version_count(&self, conn: &Connection, id: &str) -> Result<u64> {
        let n: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE id = ?", self.name),
                [id],
                |row| row.get(0),
            )
            .map_err(db_err("version_count", id))?;
        Ok(n.max(0) as u64)
    }
}
