//! The save / update / mutate pipeline, written once for every record type

use biblio_core::errors::ExError;
use biblio_core::{
    log_op_result, log_op_start, Context, Dataset, Mutation, Publication, Record, Status, User,
};
use chrono::{DateTime, SubsecRound, Utc};
use std::time::Instant;

use crate::client::TxStore;
use crate::errors::Result;
use crate::repo::config::{RecordConfig, RepoConfig};
use crate::repo::{Repo, TxRepo};
use crate::snapshot::model::to_micros;
use crate::snapshot::{Filter, Snapshot, SqlValue};

/// A record type the repository knows how to configure
pub trait RepoRecord: Record {
    fn record_config(config: &RepoConfig) -> &RecordConfig<Self>;
}

impl RepoRecord for Publication {
    fn record_config(config: &RepoConfig) -> &RecordConfig<Self> {
        &config.publications
    }
}

impl RepoRecord for Dataset {
    fn record_config(config: &RepoConfig) -> &RecordConfig<Self> {
        &config.datasets
    }
}

fn op_name<R: Record>(verb: &str) -> String {
    format!("{}_{}", verb, R::RECORD_TYPE.as_str())
}

fn logged<R: Record, T>(op: &str, id: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let started = Instant::now();
    log_op_start!(op, record_type = R::RECORD_TYPE.as_str(), record_id = id);
    let result = f().map_err(|e| e.wrap(op, id));
    log_op_result!(
        op,
        &result,
        started,
        record_type = R::RECORD_TYPE.as_str(),
        record_id = id
    );
    result
}

/// Decode a snapshot into a record and run the configured loaders
pub(crate) fn hydrate<R: RepoRecord>(config: &RepoConfig, snapshot: Snapshot) -> Result<R> {
    let id = snapshot.id.clone();
    let mut record: R = snapshot.into_record()?;
    R::record_config(config)
        .load(&mut record)
        .map_err(|e| e.wrap("load", id))?;
    Ok(record)
}

/// True when saving `next` over `prev` would not change anything but the
/// audit stamp
fn unchanged<R: Record>(prev: &R, next: &R) -> bool {
    let mut candidate = next.clone();
    *candidate.audit_mut() = prev.audit().clone();
    if prev.has_been_public() {
        candidate.mark_has_been_public();
    }
    prev.same_content(&candidate)
}

fn stamp<R: Record>(record: &mut R, previous: Option<&R>, user: &User, now: DateTime<Utc>) {
    if previous.is_some_and(R::has_been_public) || record.status() == Status::Public {
        record.mark_has_been_public();
    }

    let created = previous.and_then(|p| p.audit().date_created);
    let creator = previous.and_then(|p| p.audit().creator_id.clone());
    let last_user = previous.and_then(|p| p.audit().user_id.clone());

    let audit = record.audit_mut();
    let own_creator = audit.creator_id.take();
    audit.date_created = created.or(audit.date_created).or(Some(now));
    audit.creator_id = creator
        .or(own_creator)
        .or_else(|| Some(user.id.clone()));
    audit.date_updated = Some(now);
    audit.last_user_id = last_user;
    audit.user_id = Some(user.id.clone());
}

impl<'t> TxRepo<'t> {
    fn store_of<R: Record>(&self) -> Result<TxStore<'t>> {
        self.tx.store(R::RECORD_TYPE.store_name())
    }

    fn each_in<R, F>(&self, filter: Filter, mut f: F) -> Result<()>
    where
        R: RepoRecord,
        F: FnMut(R) -> bool,
    {
        for snapshot in self.store_of::<R>()?.iter(filter) {
            self.tx.check("each")?;
            if !f(hydrate(self.config, snapshot?)?) {
                break;
            }
        }
        Ok(())
    }

    /// The current version of `id`, loaders applied
    ///
    /// # Errors
    ///
    /// `NotFound` when `id` has no current version.
    pub fn get<R: RepoRecord>(&self, id: &str) -> Result<R> {
        let snapshot = self
            .store_of::<R>()?
            .get_current(id)
            .map_err(|e| e.wrap(op_name::<R>("get"), id))?;
        hydrate(self.config, snapshot)
    }

    /// Current versions of the ids that exist, ordered by id
    ///
    /// # Errors
    ///
    /// Database or decode failures.
    pub fn get_many<R: RepoRecord>(&self, ids: &[String]) -> Result<Vec<R>> {
        self.store_of::<R>()?
            .get_many(ids)
            .map(|s| s.and_then(|s| hydrate(self.config, s)))
            .collect()
    }

    /// Write `record` as the new current version, without a version check.
    ///
    /// Saving content equal to the current version is a no-op that returns
    /// the stored record.
    ///
    /// # Errors
    ///
    /// `Validation` with every failing field; nothing is written then.
    pub fn save<R: RepoRecord>(&self, record: R, user: &User) -> Result<R> {
        let op = op_name::<R>("save");
        let id = record.id().to_string();
        logged::<R, _>(&op, &id, || self.persist(record, user, None))
    }

    /// Write `record` only while `version_id` is still current
    ///
    /// # Errors
    ///
    /// `Conflict` when another version was written in between, `NotFound`,
    /// `Validation`.
    pub fn update<R: RepoRecord>(&self, version_id: &str, record: R, user: &User) -> Result<R> {
        let op = op_name::<R>("update");
        let id = record.id().to_string();
        logged::<R, _>(&op, &id, || self.persist(record, user, Some(version_id)))
    }

    /// Load `id`, apply `mutations` in order and write the result as a
    /// checked update. Nothing is written unless every step succeeds.
    ///
    /// # Errors
    ///
    /// `Argument` for an unknown mutation or bad arguments, then as for
    /// [`TxRepo::update`].
    pub fn mutate<R: RepoRecord>(
        &self,
        id: &str,
        user: &User,
        mutations: &[Mutation],
    ) -> Result<R> {
        let op = op_name::<R>("mutate");
        logged::<R, _>(&op, id, || {
            let mut record: R = self.get(id)?;
            let version_id = record.version_id().unwrap_or_default().to_string();
            R::record_config(self.config)
                .mutations
                .apply(&mut record, mutations)
                .map_err(ExError::from)?;
            self.persist(record, user, Some(&version_id))
        })
    }

    fn persist<R: RepoRecord>(
        &self,
        mut record: R,
        user: &User,
        expected_version_id: Option<&str>,
    ) -> Result<R> {
        let store = self.store_of::<R>()?;
        // Compare and stamp against the stored payload, not a loaded view
        let current = store.find_current(record.id())?;
        let previous: Option<R> = current
            .as_ref()
            .map(|s| s.clone().into_record())
            .transpose()?;

        if expected_version_id.is_none() {
            if let (Some(prev), Some(snapshot)) = (previous.as_ref(), current) {
                if unchanged(prev, &record) {
                    tracing::debug!(
                        record_type = R::RECORD_TYPE.as_str(),
                        record_id = record.id(),
                        "Content unchanged, no new version"
                    );
                    return hydrate(self.config, snapshot);
                }
            }
        }

        stamp(&mut record, previous.as_ref(), user, Utc::now().trunc_subsecs(6));
        if let Err(errors) = record.validate() {
            return Err(ExError::validation("validate", record.id(), errors));
        }

        let payload = record.encode()?;
        let snapshot = match expected_version_id {
            Some(expected) => store.add_after(expected, record.id(), &payload)?,
            None => store.add(record.id(), &payload)?,
        };
        let saved: R = hydrate(self.config, snapshot)?;

        let listeners = R::record_config(self.config).listeners.clone();
        if !listeners.is_empty() {
            let committed = saved.clone();
            self.tx.after_commit(move || {
                for listener in &listeners {
                    listener(&committed);
                }
            });
        }
        Ok(saved)
    }

    /// Visit the current version of every record until `f` returns false
    ///
    /// # Errors
    ///
    /// Database failures, decode failures, or the context's interruption.
    pub fn each<R: RepoRecord, F: FnMut(R) -> bool>(&self, f: F) -> Result<()> {
        self.each_in(Filter::Current, f)
    }

    /// Visit every version of every record, ordered by id then `valid_from`
    ///
    /// # Errors
    ///
    /// As for [`TxRepo::each`].
    pub fn each_history<R: RepoRecord, F: FnMut(R) -> bool>(&self, f: F) -> Result<()> {
        self.each_in(Filter::All, f)
    }

    /// Visit current versions that became current within `[from, to]`
    ///
    /// # Errors
    ///
    /// As for [`TxRepo::each`].
    pub fn between<R: RepoRecord, F: FnMut(R) -> bool>(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        f: F,
    ) -> Result<()> {
        self.each_in(Filter::CurrentBetween(from, to), f)
    }

    /// One page of current versions that became current after `t`, plus
    /// the total number of such versions
    ///
    /// # Errors
    ///
    /// Database or decode failures.
    pub fn after<R: RepoRecord>(
        &self,
        t: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<(u64, Vec<R>)> {
        let store = self.store_of::<R>()?;
        let args = [SqlValue::Integer(to_micros(t))];
        let total = store.count("valid_from > ?", &args)?;
        let records = store
            .query_page("valid_from > ?", &args, limit, offset)?
            .into_iter()
            .map(|s| hydrate(self.config, s))
            .collect::<Result<Vec<R>>>()?;
        Ok((total, records))
    }

    /// Every version of `id`, oldest first
    ///
    /// # Errors
    ///
    /// `NotFound` when `id` has no versions at all.
    pub fn history<R: RepoRecord>(&self, id: &str) -> Result<Vec<R>> {
        let versions = self
            .store_of::<R>()?
            .get_history(id)
            .map(|s| s.and_then(|s| hydrate(self.config, s)))
            .collect::<Result<Vec<R>>>()?;
        if versions.is_empty() {
            return Err(ExError::not_found(op_name::<R>("history"), id));
        }
        Ok(versions)
    }

    /// The version of `id` that was current at `t`
    ///
    /// # Errors
    ///
    /// `NotFound` when `t` precedes the first version.
    pub fn as_of<R: RepoRecord>(&self, id: &str, t: DateTime<Utc>) -> Result<R> {
        let snapshot = self
            .store_of::<R>()?
            .get_as_of(id, t)
            .map_err(|e| e.wrap(op_name::<R>("as_of"), id))?;
        hydrate(self.config, snapshot)
    }

    /// Delete every version of `id`; returns the number of versions removed
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn purge<R: RepoRecord>(&self, id: &str) -> Result<usize> {
        self.store_of::<R>()?.purge(id)
    }

    /// Delete every record of this type; returns the number of ids removed
    ///
    /// # Errors
    ///
    /// Database failures.
    pub fn purge_all<R: RepoRecord>(&self) -> Result<usize> {
        self.store_of::<R>()?.purge_all()
    }

    /// Number of current versions matching an SQL predicate
    ///
    /// # Errors
    ///
    /// `Argument` for mismatched placeholders, database failures.
    pub fn count<R: RepoRecord>(&self, predicate: &str, args: &[SqlValue]) -> Result<u64> {
        self.store_of::<R>()?.count(predicate, args)
    }
}

impl Repo {
    /// Lazy walk outside any long-lived transaction: each page is read in
    /// its own read transaction, so `f` may write through the repository.
    fn each_paged<R, F>(&self, ctx: &Context, filter: Filter, mut f: F) -> Result<()>
    where
        R: RepoRecord,
        F: FnMut(R) -> bool,
    {
        let store = self.client().store(ctx, R::RECORD_TYPE.store_name())?;
        for snapshot in store.iter(filter) {
            if let Some(interrupt) = ctx.interrupted() {
                return Err(ExError::interrupted("each", interrupt));
            }
            if !f(hydrate(self.config(), snapshot?)?) {
                break;
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// See [`TxRepo::get`].
    pub fn get<R: RepoRecord>(&self, ctx: &Context, id: &str) -> Result<R> {
        self.read(ctx, |r| r.get(id))
    }

    /// # Errors
    ///
    /// See [`TxRepo::get_many`].
    pub fn get_many<R: RepoRecord>(&self, ctx: &Context, ids: &[String]) -> Result<Vec<R>> {
        self.read(ctx, |r| r.get_many(ids))
    }

    /// # Errors
    ///
    /// See [`TxRepo::save`].
    pub fn save<R: RepoRecord>(&self, ctx: &Context, record: R, user: &User) -> Result<R> {
        self.transaction(ctx, |r| r.save(record, user))
    }

    /// # Errors
    ///
    /// See [`TxRepo::update`].
    pub fn update<R: RepoRecord>(
        &self,
        ctx: &Context,
        version_id: &str,
        record: R,
        user: &User,
    ) -> Result<R> {
        self.transaction(ctx, |r| r.update(version_id, record, user))
    }

    /// # Errors
    ///
    /// See [`TxRepo::mutate`].
    pub fn mutate<R: RepoRecord>(
        &self,
        ctx: &Context,
        id: &str,
        user: &User,
        mutations: &[Mutation],
    ) -> Result<R> {
        self.transaction(ctx, |r| r.mutate(id, user, mutations))
    }

    /// # Errors
    ///
    /// See [`TxRepo::each`].
    pub fn each<R: RepoRecord, F: FnMut(R) -> bool>(&self, ctx: &Context, f: F) -> Result<()> {
        self.each_paged(ctx, Filter::Current, f)
    }

    /// # Errors
    ///
    /// See [`TxRepo::each_history`].
    pub fn each_history<R: RepoRecord, F: FnMut(R) -> bool>(
        &self,
        ctx: &Context,
        f: F,
    ) -> Result<()> {
        self.each_paged(ctx, Filter::All, f)
    }

    /// # Errors
    ///
    /// See [`TxRepo::between`].
    pub fn between<R: RepoRecord, F: FnMut(R) -> bool>(
        &self,
        ctx: &Context,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        f: F,
    ) -> Result<()> {
        self.each_paged(ctx, Filter::CurrentBetween(from, to), f)
    }

    /// # Errors
    ///
    /// See [`TxRepo::after`].
    pub fn after<R: RepoRecord>(
        &self,
        ctx: &Context,
        t: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<(u64, Vec<R>)> {
        self.read(ctx, |r| r.after(t, limit, offset))
    }

    /// # Errors
    ///
    /// See [`TxRepo::history`].
    pub fn history<R: RepoRecord>(&self, ctx: &Context, id: &str) -> Result<Vec<R>> {
        self.read(ctx, |r| r.history(id))
    }

    /// # Errors
    ///
    /// See [`TxRepo::as_of`].
    pub fn as_of<R: RepoRecord>(&self, ctx: &Context, id: &str, t: DateTime<Utc>) -> Result<R> {
        self.read(ctx, |r| r.as_of(id, t))
    }

    /// # Errors
    ///
    /// See [`TxRepo::purge`].
    pub fn purge<R: RepoRecord>(&self, ctx: &Context, id: &str) -> Result<usize> {
        self.transaction(ctx, |r| r.purge::<R>(id))
    }

    /// # Errors
    ///
    /// See [`TxRepo::purge_all`].
    pub fn purge_all<R: RepoRecord>(&self, ctx: &Context) -> Result<usize> {
        self.transaction(ctx, |r| r.purge_all::<R>())
    }

    /// # Errors
    ///
    /// See [`TxRepo::count`].
    pub fn count<R: RepoRecord>(
        &self,
        ctx: &Context,
        predicate: &str,
        args: &[SqlValue],
    ) -> Result<u64> {
        self.read(ctx, |r| r.count::<R>(predicate, args))
    }
}

/// Named, typed forms of the generic operations for one record type
macro_rules! typed_record_ops {
    (
        $record:ty,
        get: $get:ident,
        get_many: $get_many:ident,
        save: $save:ident,
        update: $update:ident,
        mutate: $mutate:ident,
        each: $each:ident,
        each_history: $each_history:ident,
        between: $between:ident,
        after: $after:ident,
        history: $history:ident,
        as_of: $as_of:ident,
        purge: $purge:ident,
        purge_all: $purge_all:ident,
        count: $count:ident $(,)?
    ) => {
        #[allow(clippy::missing_errors_doc)]
        impl<'t> $crate::repo::TxRepo<'t> {
            pub fn $get(&self, id: &str) -> $crate::errors::Result<$record> {
                self.get(id)
            }

            pub fn $get_many(&self, ids: &[String]) -> $crate::errors::Result<Vec<$record>> {
                self.get_many(ids)
            }

            pub fn $save(
                &self,
                record: $record,
                user: &biblio_core::User,
            ) -> $crate::errors::Result<$record> {
                self.save(record, user)
            }

            pub fn $update(
                &self,
                version_id: &str,
                record: $record,
                user: &biblio_core::User,
            ) -> $crate::errors::Result<$record> {
                self.update(version_id, record, user)
            }

            pub fn $mutate(
                &self,
                id: &str,
                user: &biblio_core::User,
                mutations: &[biblio_core::Mutation],
            ) -> $crate::errors::Result<$record> {
                self.mutate(id, user, mutations)
            }

            pub fn $each<F: FnMut($record) -> bool>(&self, f: F) -> $crate::errors::Result<()> {
                self.each(f)
            }

            pub fn $each_history<F: FnMut($record) -> bool>(
                &self,
                f: F,
            ) -> $crate::errors::Result<()> {
                self.each_history(f)
            }

            pub fn $between<F: FnMut($record) -> bool>(
                &self,
                from: chrono::DateTime<chrono::Utc>,
                to: chrono::DateTime<chrono::Utc>,
                f: F,
            ) -> $crate::errors::Result<()> {
                self.between(from, to, f)
            }

            pub fn $after(
                &self,
                t: chrono::DateTime<chrono::Utc>,
                limit: usize,
                offset: usize,
            ) -> $crate::errors::Result<(u64, Vec<$record>)> {
                self.after(t, limit, offset)
            }

            pub fn $history(&self, id: &str) -> $crate::errors::Result<Vec<$record>> {
                self.history(id)
            }

            pub fn $as_of(
                &self,
                id: &str,
                t: chrono::DateTime<chrono::Utc>,
            ) -> $crate::errors::Result<$record> {
                self.as_of(id, t)
            }

            pub fn $purge(&self, id: &str) -> $crate::errors::Result<usize> {
                self.purge::<$record>(id)
            }

            pub fn $purge_all(&self) -> $crate::errors::Result<usize> {
                self.purge_all::<$record>()
            }

            pub fn $count(
                &self,
                predicate: &str,
                args: &[$crate::snapshot::SqlValue],
            ) -> $crate::errors::Result<u64> {
                self.count::<$record>(predicate, args)
            }
        }

        #[allow(clippy::missing_errors_doc)]
        impl $crate::repo::Repo {
            pub fn $get(
                &self,
                ctx: &biblio_core::Context,
                id: &str,
            ) -> $crate::errors::Result<$record> {
                self.get(ctx, id)
            }

            pub fn $get_many(
                &self,
                ctx: &biblio_core::Context,
                ids: &[String],
            ) -> $crate::errors::Result<Vec<$record>> {
                self.get_many(ctx, ids)
            }

            pub fn $save(
                &self,
                ctx: &biblio_core::Context,
                record: $record,
                user: &biblio_core::User,
            ) -> $crate::errors::Result<$record> {
                self.save(ctx, record, user)
            }

            pub fn $update(
                &self,
                ctx: &biblio_core::Context,
                version_id: &str,
                record: $record,
                user: &biblio_core::User,
            ) -> $crate::errors::Result<$record> {
                self.update(ctx, version_id, record, user)
            }

            pub fn $mutate(
                &self,
                ctx: &biblio_core::Context,
                id: &str,
                user: &biblio_core::User,
                mutations: &[biblio_core::Mutation],
            ) -> $crate::errors::Result<$record> {
                self.mutate(ctx, id, user, mutations)
            }

            pub fn $each<F: FnMut($record) -> bool>(
                &self,
                ctx: &biblio_core::Context,
                f: F,
            ) -> $crate::errors::Result<()> {
                self.each(ctx, f)
            }

            pub fn $each_history<F: FnMut($record) -> bool>(
                &self,
                ctx: &biblio_core::Context,
                f: F,
            ) -> $crate::errors::Result<()> {
                self.each_history(ctx, f)
            }

            pub fn $between<F: FnMut($record) -> bool>(
                &self,
                ctx: &biblio_core::Context,
                from: chrono::DateTime<chrono::Utc>,
                to: chrono::DateTime<chrono::Utc>,
                f: F,
            ) -> $crate::errors::Result<()> {
                self.between(ctx, from, to, f)
            }

            pub fn $after(
                &self,
                ctx: &biblio_core::Context,
                t: chrono::DateTime<chrono::Utc>,
                limit: usize,
                offset: usize,
            ) -> $crate::errors::Result<(u64, Vec<$record>)> {
                self.after(ctx, t, limit, offset)
            }

            pub fn $history(
                &self,
                ctx: &biblio_core::Context,
                id: &str,
            ) -> $crate::errors::Result<Vec<$record>> {
                self.history(ctx, id)
            }

            pub fn $as_of(
                &self,
                ctx: &biblio_core::Context,
                id: &str,
                t: chrono::DateTime<chrono::Utc>,
            ) -> $crate::errors::Result<$record> {
                self.as_of(ctx, id, t)
            }

            pub fn $purge(
                &self,
                ctx: &biblio_core::Context,
                id: &str,
            ) -> $crate::errors::Result<usize> {
                self.purge::<$record>(ctx, id)
            }

            pub fn $purge_all(&self, ctx: &biblio_core::Context) -> $crate::errors::Result<usize> {
                self.purge_all::<$record>(ctx)
            }

            pub fn $count(
                &self,
                ctx: &biblio_core::Context,
                predicate: &str,
                args: &[$crate::snapshot::SqlValue],
            ) -> $crate::errors::Result<u64> {
                self.count::<$record>(ctx, predicate, args)
            }
        }
    };
}

pub(crate) use typed_record_ops;
