//! Maintenance jobs: embargo expiry and contributor transfer

use biblio_core::model::dataset::ACCESS_LEVEL_EMBARGO;
use biblio_core::{Context, Contributor, Dataset, ExError, Publication, Record, User};
use chrono::NaiveDate;

use crate::errors::Result;
use crate::repo::records::hydrate;
use crate::repo::{Repo, TxRepo};
use crate::snapshot::{RewriteGrant, Snapshot, SqlValue};

const EMBARGOED: &str = "json_extract(payload, '$.access_level') = ?";

fn embargoed_args() -> Vec<SqlValue> {
    vec![SqlValue::Text(ACCESS_LEVEL_EMBARGO.to_string())]
}

impl TxRepo<'_> {
    /// Current datasets whose embargo ended before `today`
    ///
    /// # Errors
    ///
    /// Database or decode failures.
    pub fn datasets_with_expired_embargo(&self, today: NaiveDate) -> Result<Vec<Dataset>> {
        let store = self.tx().store(Dataset::RECORD_TYPE.store_name())?;
        let mut expired = Vec::new();
        for snapshot in store.query(EMBARGOED, embargoed_args()) {
            let dataset: Dataset = hydrate(self.config(), snapshot?)?;
            if dataset.embargo_expired(today) {
                expired.push(dataset);
            }
        }
        Ok(expired)
    }

    /// Lift every expired embargo as a normal checked update
    ///
    /// # Errors
    ///
    /// The first failing update; earlier ones roll back with the
    /// transaction.
    pub fn lift_expired_embargoes(&self, today: NaiveDate, user: &User) -> Result<usize> {
        let mut lifted = 0;
        for mut dataset in self.datasets_with_expired_embargo(today)? {
            let version_id = dataset.version_id().unwrap_or_default().to_string();
            dataset.lift_embargo();
            self.update_dataset(&version_id, dataset, user)?;
            lifted += 1;
        }
        Ok(lifted)
    }

    /// Point every contributor linked to `from_person_id` at `to`, in every
    /// stored version of every publication and dataset.
    ///
    /// This rewrites history in place and needs `allow_history_rewrite`.
    /// Returns the number of snapshots rewritten.
    ///
    /// # Errors
    ///
    /// `Forbidden` when history rewriting is disabled; database or decode
    /// failures otherwise.
    pub fn transfer_contributor(&self, from_person_id: &str, to: &Contributor) -> Result<usize> {
        let grant = self.config().rewrite_grant("transfer_contributor")?;
        let publications = self.transfer_in::<Publication>(&grant, from_person_id, to)?;
        let datasets = self.transfer_in::<Dataset>(&grant, from_person_id, to)?;

        tracing::warn!(
            op = "transfer_contributor",
            from = from_person_id,
            to = to.person_id.as_deref().unwrap_or_default(),
            publications,
            datasets,
            "Transferred contributor across history"
        );
        Ok(publications + datasets)
    }

    fn transfer_in<R: Record>(
        &self,
        grant: &RewriteGrant,
        from_person_id: &str,
        to: &Contributor,
    ) -> Result<usize> {
        let store = self.tx().store(R::RECORD_TYPE.store_name())?;

        // Rewrites keep each row's position, so the page cursor stays valid
        let mut rewritten = 0;
        for snapshot in store.get_all_snapshots() {
            let snapshot: Snapshot = snapshot?;
            self.tx().check("transfer_contributor")?;
            let mut record = R::decode(&snapshot.payload)
                .map_err(|e| e.wrap("transfer_contributor", snapshot.id.as_str()))?;
            let mut changed = false;
            for contributor in record.contributors_mut() {
                changed |= contributor.transfer(from_person_id, to);
            }
            if changed {
                store.update(grant, &snapshot.version_id, &snapshot.id, &record.encode()?)?;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }
}

impl Repo {
    /// # Errors
    ///
    /// See [`TxRepo::datasets_with_expired_embargo`].
    pub fn datasets_with_expired_embargo(
        &self,
        ctx: &Context,
        today: NaiveDate,
    ) -> Result<Vec<Dataset>> {
        self.read(ctx, |r| r.datasets_with_expired_embargo(today))
    }

    /// Lift expired embargoes, one transaction per dataset.
    ///
    /// A dataset changed concurrently is skipped and picked up by the next
    /// run.
    ///
    /// # Errors
    ///
    /// Any failure other than a version conflict, or the context's
    /// interruption.
    pub fn lift_expired_embargoes(
        &self,
        ctx: &Context,
        today: NaiveDate,
        user: &User,
    ) -> Result<usize> {
        let mut lifted = 0;
        for mut dataset in self.datasets_with_expired_embargo(ctx, today)? {
            if let Some(interrupt) = ctx.interrupted() {
                return Err(ExError::interrupted("lift_expired_embargoes", interrupt));
            }
            let version_id = dataset.version_id().unwrap_or_default().to_string();
            let id = dataset.id.clone();
            dataset.lift_embargo();
            match self.update_dataset(ctx, &version_id, dataset, user) {
                Ok(_) => lifted += 1,
                Err(e) if e.is_conflict() => {
                    tracing::warn!(record_id = %id, "Skipped embargo lift, dataset changed concurrently");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(lifted, %today, "Lifted expired embargoes");
        Ok(lifted)
    }

    /// # Errors
    ///
    /// See [`TxRepo::transfer_contributor`].
    pub fn transfer_contributor(
        &self,
        ctx: &Context,
        from_person_id: &str,
        to: &Contributor,
    ) -> Result<usize> {
        self.transaction(ctx, |r| r.transfer_contributor(from_person_id, to))
    }
}
