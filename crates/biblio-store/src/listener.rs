//! Change notifications for committed writes
//!
//! Every snapshot write appends a row to the `notifications` outbox inside
//! the same transaction, so an event exists iff its write committed. After
//! a commit the client bumps the in-process `NotificationHub`, which wakes
//! listeners blocked in `listen`. Listeners also re-poll on a fixed
//! interval so writes made by other processes are picked up.

use biblio_core::errors::ExError;
use biblio_core::Context;
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use rusqlite::{params, Connection, OptionalExtension};
use std::time::Duration;

use crate::client::{bounded, Client};
use crate::errors::{from_rusqlite, Result};
use crate::snapshot::model::{from_micros, to_micros};
use crate::snapshot::EventName;

/// One committed change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Position in the channel; strictly increasing
    pub seq: i64,
    pub name: EventName,
    /// Store the record lives in (`publications`, `datasets`, ...)
    pub record_type: String,
    pub record_id: String,
    /// Version written; `None` for purges
    pub version_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn append_event(
    conn: &Connection,
    name: EventName,
    record_type: &str,
    record_id: &str,
    version_id: Option<&str>,
    at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO notifications (name, record_type, record_id, version_id, created_at)
         VALUES (?, ?, ?, ?, ?)",
        params![name.as_str(), record_type, record_id, version_id, to_micros(at)],
    )
    .map_err(|e| from_rusqlite(e).wrap("notify", record_id))?;
    Ok(())
}

/// Next event after `cursor`, if any
pub(crate) fn next_event(conn: &Connection, cursor: i64) -> Result<Option<Event>> {
    let row = conn
        .query_row(
            "SELECT seq, name, record_type, record_id, version_id, created_at
             FROM notifications WHERE seq > ? ORDER BY seq LIMIT 1",
            [cursor],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()
        .map_err(|e| from_rusqlite(e).wrap("next_event", cursor.to_string()))?;

    row.map(|(seq, name, record_type, record_id, version_id, created_at)| {
        Ok(Event {
            seq,
            name: name.parse()?,
            record_type,
            record_id,
            version_id,
            created_at: from_micros(created_at)?,
        })
    })
    .transpose()
}

/// Highest sequence number in the channel, 0 when empty
pub(crate) fn last_seq(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM notifications", [], |row| {
        row.get(0)
    })
    .map_err(|e| from_rusqlite(e).wrap("last_seq", "notifications"))
}

/// Delete channel rows created before `before`; returns the number removed
pub(crate) fn prune(conn: &Connection, before: DateTime<Utc>) -> Result<usize> {
    conn.execute(
        "DELETE FROM notifications WHERE created_at < ?",
        [to_micros(before)],
    )
    .map_err(|e| from_rusqlite(e).wrap("prune_notifications", "notifications"))
}

/// In-process wake-up for listeners: a generation counter behind a condvar
#[derive(Debug, Default)]
pub struct NotificationHub {
    generation: Mutex<u64>,
    changed: Condvar,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Record that a commit happened and wake every waiter
    pub fn notify(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.changed.notify_all();
    }

    /// Block until the generation moves past `seen` or `timeout` elapses.
    ///
    /// Returns the generation observed on wake-up.
    pub fn wait(&self, seen: u64, timeout: Duration) -> u64 {
        let mut generation = self.generation.lock();
        if *generation == seen {
            let _ = self.changed.wait_for(&mut generation, timeout);
        }
        *generation
    }
}

/// A cursor over the notification channel
pub struct Listener {
    client: Client,
    cursor: i64,
}

impl Listener {
    pub(crate) fn new(client: Client, cursor: i64) -> Self {
        Self { client, cursor }
    }

    /// Sequence number of the last event returned
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// The next pending event, without waiting
    ///
    /// # Errors
    ///
    /// `Persistence` on database failure, or the context's interruption.
    pub fn try_next(&mut self, ctx: &Context) -> Result<Option<Event>> {
        let cursor = self.cursor;
        let event = self.client.read(ctx, |tx| next_event(tx.connection(), cursor))?;
        if let Some(e) = &event {
            self.cursor = e.seq;
        }
        Ok(event)
    }

    /// Wait for the next event after the cursor.
    ///
    /// # Errors
    ///
    /// `Cancelled` / `DeadlineExceeded` when `ctx` ends first; database
    /// failures otherwise.
    pub fn listen(&mut self, ctx: &Context) -> Result<Event> {
        let client = self.client.clone();
        let hub = client.hub();
        let poll = client.config().listener_poll();
        loop {
            let seen = hub.generation();
            if let Some(event) = self.try_next(ctx)? {
                return Ok(event);
            }
            if let Some(interrupt) = ctx.interrupted() {
                return Err(ExError::interrupted("listen", interrupt));
            }
            hub.wait(seen, bounded(ctx, poll));
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("cursor", &self.cursor)
            .finish()
    }
}
