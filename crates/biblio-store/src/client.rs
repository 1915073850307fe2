//! Client: connection pool, named stores and explicit transactions
//!
//! `Client::with_transaction` runs a closure against one pooled connection
//! inside an IMMEDIATE transaction; every store reached through the `Tx`
//! handle shares it. Commit happens when the closure returns `Ok`,
//! rollback otherwise. After commit the connection returns to the pool,
//! then the notification hub is bumped and the queued after-commit
//! callbacks run.

use biblio_core::errors::{ExError, ExErrorKind};
use biblio_core::{log_op_result, log_op_start, Context};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::StoreConfig;
use crate::db::{build_pool, PooledConnection, SqlitePool};
use crate::errors::{from_rusqlite, pool_error, Result};
use crate::listener::{self, Listener, NotificationHub};
use crate::migrations::{applied_migrations, apply_migrations};
use crate::snapshot::{Filter, RewriteGrant, Snapshot, SnapshotIter, SnapshotStore, SqlValue};

/// Store names every client registers
pub const DEFAULT_STORES: &[&str] = &["publications", "datasets"];

/// Statements between two cancellation checks by the progress handler
const PROGRESS_OPS: i32 = 1_000;

struct ClientInner {
    pool: SqlitePool,
    config: StoreConfig,
    stores: BTreeMap<String, SnapshotStore>,
    hub: NotificationHub,
}

/// Shared handle to the database; cheap to clone
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("database", &self.inner.config.database)
            .field("stores", &self.inner.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct ClientBuilder {
    config: StoreConfig,
    stores: Vec<String>,
}

impl ClientBuilder {
    /// Register an additional named store
    pub fn store(mut self, name: impl Into<String>) -> Self {
        self.stores.push(name.into());
        self
    }

    /// Open the pool, apply migrations and install every registered store
    ///
    /// # Errors
    ///
    /// `Config` for an invalid configuration, `Argument` for an invalid
    /// store name, `Timeout`/`Persistence` when the database cannot be
    /// opened or migrated.
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;

        let mut stores = BTreeMap::new();
        for name in DEFAULT_STORES.iter().map(|s| s.to_string()).chain(self.stores) {
            let store = SnapshotStore::new(&name, self.config.page_size)?;
            stores.insert(name, store);
        }

        let pool = build_pool(&self.config)?;
        {
            let mut conn = pool.get().map_err(pool_error)?;
            apply_migrations(&mut conn)?;
            for store in stores.values() {
                store.install(&conn)?;
            }
        }

        tracing::info!(
            database = %self.config.database,
            stores = stores.len(),
            "Opened store client"
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                pool,
                config: self.config,
                stores,
                hub: NotificationHub::new(),
            }),
        })
    }
}

impl Client {
    pub fn builder(config: StoreConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            stores: Vec::new(),
        }
    }

    /// Open a client with the default stores
    ///
    /// # Errors
    ///
    /// See [`ClientBuilder::build`].
    pub fn open(config: &StoreConfig) -> Result<Client> {
        Self::builder(config.clone()).build()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn store_names(&self) -> Vec<&str> {
        self.inner.stores.keys().map(String::as_str).collect()
    }

    pub(crate) fn hub(&self) -> &NotificationHub {
        &self.inner.hub
    }

    /// A fresh version token: a UUIDv7, so tokens sort by creation time
    pub fn new_version_id(&self) -> String {
        uuid::Uuid::now_v7().to_string()
    }

    fn store_def(&self, name: &str) -> Result<&SnapshotStore> {
        self.inner.stores.get(name).ok_or_else(|| {
            ExError::new(ExErrorKind::Argument)
                .with_op("store")
                .with_message(format!("unknown store \"{}\"", name))
        })
    }

    fn checkout(&self, ctx: &Context) -> Result<PooledConnection> {
        let wait = bounded(ctx, self.inner.config.connection_timeout());
        self.inner.pool.get_timeout(wait).map_err(|e| match ctx.interrupted() {
            Some(interrupt) => ExError::interrupted("pool_checkout", interrupt),
            None => pool_error(e),
        })
    }

    /// Run `f` in a write transaction
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, `Cancelled`/`DeadlineExceeded` when `ctx` ends
    /// first, `Timeout` when no connection frees up in time.
    pub fn with_transaction<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        self.run(ctx, TransactionBehavior::Immediate, f)
    }

    /// Run `f` in a read transaction
    ///
    /// # Errors
    ///
    /// As for [`Client::with_transaction`].
    pub fn read<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        self.run(ctx, TransactionBehavior::Deferred, f)
    }

    fn run<T, F>(&self, ctx: &Context, behavior: TransactionBehavior, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        if let Some(interrupt) = ctx.interrupted() {
            return Err(ExError::interrupted("transaction", interrupt));
        }

        let mut conn = self.checkout(ctx)?;
        let watched = ctx.clone();
        conn.progress_handler(PROGRESS_OPS, Some(move || watched.is_done()));

        let result = self.run_on(&mut conn, ctx, behavior, f);

        conn.progress_handler(0, None::<fn() -> bool>);
        drop(conn);

        let (value, committed) = result.map_err(|e| resolve_interrupt(e, ctx))?;
        if committed.wrote {
            self.inner.hub.notify();
        }
        for callback in committed.callbacks {
            callback();
        }
        Ok(value)
    }

    fn run_on<T, F>(
        &self,
        conn: &mut Connection,
        ctx: &Context,
        behavior: TransactionBehavior,
        f: F,
    ) -> Result<(T, Committed)>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        let sql_tx = conn
            .transaction_with_behavior(behavior)
            .map_err(|e| from_rusqlite(e).wrap("begin", "transaction"))?;

        let tx = Tx {
            conn: &sql_tx,
            client: self,
            ctx,
            wrote: Cell::new(false),
            after_commit: RefCell::new(Vec::new()),
        };
        let value = f(&tx)?;
        let wrote = tx.wrote.get();
        let callbacks = tx.after_commit.take();
        drop(tx);

        if let Some(interrupt) = ctx.interrupted() {
            return Err(ExError::interrupted("commit", interrupt));
        }
        sql_tx
            .commit()
            .map_err(|e| from_rusqlite(e).wrap("commit", "transaction"))?;

        Ok((value, Committed { wrote, callbacks }))
    }

    /// Auto-commit handle on one store: each call is its own transaction
    ///
    /// # Errors
    ///
    /// `Argument` for an unregistered store name.
    pub fn store(&self, ctx: &Context, name: &str) -> Result<StoreRef> {
        Ok(StoreRef {
            client: self.clone(),
            ctx: ctx.clone(),
            store: self.store_def(name)?.clone(),
        })
    }

    /// Listener positioned at the current end of the channel
    ///
    /// # Errors
    ///
    /// `Persistence` when the channel cannot be read.
    pub fn listener(&self, ctx: &Context) -> Result<Listener> {
        let cursor = self.read(ctx, |tx| listener::last_seq(tx.connection()))?;
        Ok(Listener::new(self.clone(), cursor))
    }

    /// Listener replaying every event after `seq`
    pub fn listener_from(&self, seq: i64) -> Listener {
        Listener::new(self.clone(), seq)
    }

    /// Ids of the schema migrations recorded in the database
    ///
    /// # Errors
    ///
    /// `Persistence` when `schema_version` cannot be read.
    pub fn applied_migrations(&self, ctx: &Context) -> Result<Vec<String>> {
        self.read(ctx, |tx| applied_migrations(tx.connection()))
    }

    /// Drop channel rows older than `before`
    ///
    /// # Errors
    ///
    /// `Persistence` on database failure.
    pub fn prune_notifications(&self, ctx: &Context, before: DateTime<Utc>) -> Result<usize> {
        self.with_transaction(ctx, |tx| listener::prune(tx.connection(), before))
    }
}

/// A progress-handler interrupt surfaces as a generic cancellation; report
/// what actually happened to the context instead.
fn resolve_interrupt(err: ExError, ctx: &Context) -> ExError {
    match (err.kind(), ctx.interrupted()) {
        (ExErrorKind::Cancelled, Some(interrupt)) => {
            ExError::interrupted("transaction", interrupt).with_source(err)
        }
        _ => err,
    }
}

/// What a committed transaction leaves to do once its connection is back
/// in the pool
struct Committed {
    wrote: bool,
    callbacks: Vec<Box<dyn FnOnce()>>,
}

/// Handle on an open transaction
pub struct Tx<'a> {
    conn: &'a Connection,
    client: &'a Client,
    ctx: &'a Context,
    wrote: Cell<bool>,
    after_commit: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl<'a> Tx<'a> {
    pub fn context(&self) -> &'a Context {
        self.ctx
    }

    pub fn client(&self) -> &'a Client {
        self.client
    }

    pub(crate) fn connection(&self) -> &'a Connection {
        self.conn
    }

    /// Fail fast when the context has been cancelled or timed out
    ///
    /// # Errors
    ///
    /// `Cancelled` or `DeadlineExceeded`.
    pub fn check(&self, op: &str) -> Result<()> {
        match self.ctx.interrupted() {
            Some(interrupt) => Err(ExError::interrupted(op.to_string(), interrupt)),
            None => Ok(()),
        }
    }

    /// Queue `f` to run once this transaction has committed
    pub fn after_commit<F: FnOnce() + 'static>(&self, f: F) {
        self.after_commit.borrow_mut().push(Box::new(f));
    }

    /// Bind a registered store to this transaction
    ///
    /// # Errors
    ///
    /// `Argument` for an unregistered store name.
    pub fn store(&self, name: &str) -> Result<TxStore<'_>> {
        Ok(TxStore {
            tx: self,
            store: self.client.store_def(name)?,
        })
    }
}

/// A snapshot store bound to one transaction
pub struct TxStore<'t> {
    tx: &'t Tx<'t>,
    store: &'t SnapshotStore,
}

macro_rules! logged_write {
    ($self:ident, $op:expr, $id:expr, $body:expr) => {{
        $self.tx.check($op)?;
        let started = Instant::now();
        log_op_start!($op, store = $self.store.name(), record_id = $id);
        let result = $body;
        log_op_result!($op, &result, started, store = $self.store.name(), record_id = $id);
        if result.is_ok() {
            $self.tx.wrote.set(true);
        }
        result
    }};
}

impl<'t> TxStore<'t> {
    pub fn name(&self) -> &str {
        self.store.name()
    }

    fn conn(&self) -> &'t Connection {
        self.tx.conn
    }

    /// # Errors
    ///
    /// `NotFound` when `id` has no current snapshot.
    pub fn get_current(&self, id: &str) -> Result<Snapshot> {
        self.tx.check("get_current")?;
        self.store.get_current(self.conn(), id)
    }

    /// # Errors
    ///
    /// `Persistence` on database failure.
    pub fn find_current(&self, id: &str) -> Result<Option<Snapshot>> {
        self.tx.check("get_current")?;
        self.store.find_current(self.conn(), id)
    }

    pub fn get_many(&self, ids: &[String]) -> SnapshotIter<'t> {
        self.iter(Filter::CurrentIds(ids.to_vec()))
    }

    /// # Errors
    ///
    /// See [`SnapshotStore::add`].
    pub fn add(&self, id: &str, payload: &[u8]) -> Result<Snapshot> {
        let version_id = self.tx.client.new_version_id();
        logged_write!(
            self,
            "add",
            id,
            self.store.add(self.conn(), id, &version_id, payload, Utc::now())
        )
    }

    /// # Errors
    ///
    /// See [`SnapshotStore::add_after`].
    pub fn add_after(&self, expected_version_id: &str, id: &str, payload: &[u8]) -> Result<Snapshot> {
        let version_id = self.tx.client.new_version_id();
        logged_write!(
            self,
            "add_after",
            id,
            self.store.add_after(
                self.conn(),
                expected_version_id,
                id,
                &version_id,
                payload,
                Utc::now()
            )
        )
    }

    /// In-place rewrite of one snapshot; needs a grant from configuration
    ///
    /// # Errors
    ///
    /// See [`SnapshotStore::update`].
    pub fn update(
        &self,
        grant: &RewriteGrant,
        version_id: &str,
        id: &str,
        payload: &[u8],
    ) -> Result<()> {
        logged_write!(
            self,
            "correct",
            id,
            self.store
                .update(self.conn(), grant, version_id, id, payload, Utc::now())
        )
    }

    /// # Errors
    ///
    /// See [`SnapshotStore::import`].
    pub fn import(&self, snapshot: &Snapshot) -> Result<Snapshot> {
        logged_write!(
            self,
            "import",
            snapshot.id.as_str(),
            self.store.import(self.conn(), snapshot, Utc::now())
        )
    }

    pub fn get_history(&self, id: &str) -> SnapshotIter<'t> {
        self.iter(Filter::History(id.to_string()))
    }

    pub fn get_all_current(&self) -> SnapshotIter<'t> {
        self.iter(Filter::Current)
    }

    pub fn get_all_snapshots(&self) -> SnapshotIter<'t> {
        self.iter(Filter::All)
    }

    /// # Errors
    ///
    /// `NotFound` when no snapshot of `id` covers `t`.
    pub fn get_as_of(&self, id: &str, t: DateTime<Utc>) -> Result<Snapshot> {
        self.tx.check("get_as_of")?;
        self.store.get_as_of(self.conn(), id, t)
    }

    /// Lazy walk over current snapshots matching `predicate`
    pub fn query(&self, predicate: &str, args: Vec<SqlValue>) -> SnapshotIter<'t> {
        self.iter(Filter::predicate(predicate, args))
    }

    pub fn iter(&self, filter: Filter) -> SnapshotIter<'t> {
        self.store.iter(self.conn(), self.tx.ctx, filter)
    }

    /// # Errors
    ///
    /// See [`SnapshotStore::count`].
    pub fn count(&self, predicate: &str, args: &[SqlValue]) -> Result<u64> {
        self.tx.check("count")?;
        self.store.count(self.conn(), predicate, args)
    }

    /// # Errors
    ///
    /// See [`SnapshotStore::query_page`].
    pub fn query_page(
        &self,
        predicate: &str,
        args: &[SqlValue],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Snapshot>> {
        self.tx.check("query_page")?;
        self.store
            .query_page(self.conn(), predicate, args, limit, offset)
    }

    /// # Errors
    ///
    /// `Persistence` on database failure.
    pub fn version_count(&self, id: &str) -> Result<u64> {
        self.tx.check("version_count")?;
        self.store.version_count(self.conn(), id)
    }

    /// # Errors
    ///
    /// `Persistence` on database failure.
    pub fn purge(&self, id: &str) -> Result<usize> {
        logged_write!(self, "purge", id, self.store.purge(self.conn(), id, Utc::now()))
    }

    /// # Errors
    ///
    /// `Persistence` on database failure.
    pub fn purge_all(&self) -> Result<usize> {
        logged_write!(
            self,
            "purge_all",
            "*",
            self.store.purge_all(self.conn(), Utc::now())
        )
    }
}

/// Auto-commit handle on one store
///
/// Every call opens its own transaction; lazy reads fetch each page in a
/// separate read transaction, so callers may write between items.
#[derive(Debug, Clone)]
pub struct StoreRef {
    client: Client,
    ctx: Context,
    store: SnapshotStore,
}

impl StoreRef {
    pub fn name(&self) -> &str {
        self.store.name()
    }

    fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TxStore<'_>) -> Result<T>,
    {
        self.client.with_transaction(&self.ctx, |tx| {
            let bound = TxStore {
                tx,
                store: &self.store,
            };
            f(&bound)
        })
    }

    fn read_one<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TxStore<'_>) -> Result<T>,
    {
        self.client.read(&self.ctx, |tx| {
            let bound = TxStore {
                tx,
                store: &self.store,
            };
            f(&bound)
        })
    }

    /// # Errors
    ///
    /// `NotFound` when `id` has no current snapshot.
    pub fn get_current(&self, id: &str) -> Result<Snapshot> {
        self.read_one(|s| s.get_current(id))
    }

    pub fn get_many(&self, ids: &[String]) -> SnapshotIter<'static> {
        self.iter(Filter::CurrentIds(ids.to_vec()))
    }

    /// # Errors
    ///
    /// See [`SnapshotStore::add`].
    pub fn add(&self, id: &str, payload: &[u8]) -> Result<Snapshot> {
        self.write(|s| s.add(id, payload))
    }

    /// # Errors
    ///
    /// See [`SnapshotStore::add_after`].
    pub fn add_after(&self, expected_version_id: &str, id: &str, payload: &[u8]) -> Result<Snapshot> {
        self.write(|s| s.add_after(expected_version_id, id, payload))
    }

    /// # Errors
    ///
    /// See [`SnapshotStore::update`].
    pub fn update(
        &self,
        grant: &RewriteGrant,
        version_id: &str,
        id: &str,
        payload: &[u8],
    ) -> Result<()> {
        self.write(|s| s.update(grant, version_id, id, payload))
    }

    /// # Errors
    ///
    /// See [`SnapshotStore::import`].
    pub fn import(&self, snapshot: &Snapshot) -> Result<Snapshot> {
        self.write(|s| s.import(snapshot))
    }

    pub fn get_history(&self, id: &str) -> SnapshotIter<'static> {
        self.iter(Filter::History(id.to_string()))
    }

    pub fn get_all_current(&self) -> SnapshotIter<'static> {
        self.iter(Filter::Current)
    }

    pub fn get_all_snapshots(&self) -> SnapshotIter<'static> {
        self.iter(Filter::All)
    }

    /// # Errors
    ///
    /// `NotFound` when no snapshot of `id` covers `t`.
    pub fn get_as_of(&self, id: &str, t: DateTime<Utc>) -> Result<Snapshot> {
        self.read_one(|s| s.get_as_of(id, t))
    }

    pub fn query(&self, predicate: &str, args: Vec<SqlValue>) -> SnapshotIter<'static> {
        self.iter(Filter::predicate(predicate, args))
    }

    /// Lazy walk of `filter`, one read transaction per page
    pub fn iter(&self, filter: Filter) -> SnapshotIter<'static> {
        let client = self.client.clone();
        let ctx = self.ctx.clone();
        let store = self.store.clone();
        SnapshotIter::new(&self.ctx, self.store.page_size(), move |after, limit| {
            client.read(&ctx, |tx| store.page(tx.connection(), &filter, after, limit))
        })
    }

    /// # Errors
    ///
    /// See [`SnapshotStore::count`].
    pub fn count(&self, predicate: &str, args: &[SqlValue]) -> Result<u64> {
        self.read_one(|s| s.count(predicate, args))
    }

    /// # Errors
    ///
    /// See [`SnapshotStore::query_page`].
    pub fn query_page(
        &self,
        predicate: &str,
        args: &[SqlValue],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Snapshot>> {
        self.read_one(|s| s.query_page(predicate, args, limit, offset))
    }

    /// # Errors
    ///
    /// `Persistence` on database failure.
    pub fn purge(&self, id: &str) -> Result<usize> {
        self.write(|s| s.purge(id))
    }

    /// # Errors
    ///
    /// `Persistence` on database failure.
    pub fn purge_all(&self) -> Result<usize> {
        self.write(|s| s.purge_all())
    }

    /// Run several operations on this store atomically
    ///
    /// # Errors
    ///
    /// Whatever `f` returns; nothing is committed in that case.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TxStore<'_>) -> Result<T>,
    {
        self.write(f)
    }
}

/// Upper bound for a single blocking wait inside the client
pub(crate) fn bounded(ctx: &Context, limit: Duration) -> Duration {
    ctx.remaining().map_or(limit, |left| left.min(limit))
}
