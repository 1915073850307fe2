//! Publication ↔ dataset links
//!
//! A link is stored on both sides; both saves happen in one transaction.

use biblio_core::{Context, Dataset, Publication, User};

use crate::errors::Result;
use crate::repo::{Repo, TxRepo};

impl TxRepo<'_> {
    /// Link a publication and a dataset; saving an existing link is a no-op
    ///
    /// # Errors
    ///
    /// `NotFound` when either side does not exist, `Validation` when either
    /// side fails to save.
    pub fn add_publication_dataset(
        &self,
        publication_id: &str,
        dataset_id: &str,
        user: &User,
    ) -> Result<()> {
        let mut publication: Publication = self.get(publication_id)?;
        let mut dataset: Dataset = self.get(dataset_id)?;
        publication.add_related_dataset(dataset_id);
        dataset.add_related_publication(publication_id);
        self.save(publication, user)?;
        self.save(dataset, user)?;
        Ok(())
    }

    /// Remove the link between a publication and a dataset on both sides
    ///
    /// # Errors
    ///
    /// As for [`TxRepo::add_publication_dataset`].
    pub fn remove_publication_dataset(
        &self,
        publication_id: &str,
        dataset_id: &str,
        user: &User,
    ) -> Result<()> {
        let mut publication: Publication = self.get(publication_id)?;
        let mut dataset: Dataset = self.get(dataset_id)?;
        publication.remove_related_dataset(dataset_id);
        dataset.remove_related_publication(publication_id);
        self.save(publication, user)?;
        self.save(dataset, user)?;
        Ok(())
    }
}

impl Repo {
    /// # Errors
    ///
    /// See [`TxRepo::add_publication_dataset`].
    pub fn add_publication_dataset(
        &self,
        ctx: &Context,
        publication_id: &str,
        dataset_id: &str,
        user: &User,
    ) -> Result<()> {
        self.transaction(ctx, |r| {
            r.add_publication_dataset(publication_id, dataset_id, user)
        })
    }

    /// # Errors
    ///
    /// See [`TxRepo::remove_publication_dataset`].
    pub fn remove_publication_dataset(
        &self,
        ctx: &Context,
        publication_id: &str,
        dataset_id: &str,
        user: &User,
    ) -> Result<()> {
        self.transaction(ctx, |r| {
            r.remove_publication_dataset(publication_id, dataset_id, user)
        })
    }
}
