//! Lazy, paged snapshot sequences

use biblio_core::errors::ExError;
use biblio_core::{Context, Record};
use std::collections::VecDeque;

use crate::errors::Result;
use crate::snapshot::Snapshot;

/// Position of a row in `(id, valid_from, seq)` order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageKey {
    pub id: String,
    pub valid_from: i64,
    pub seq: i64,
}

type FetchPage<'a> = Box<dyn FnMut(Option<&PageKey>, usize) -> Result<Vec<(PageKey, Snapshot)>> + 'a>;

/// A finite, forward-only sequence of snapshots fetched one page at a time.
///
/// The context is checked before every page fetch; the first error ends the
/// sequence.
pub struct SnapshotIter<'a> {
    fetch: FetchPage<'a>,
    ctx: Context,
    page_size: usize,
    buffer: VecDeque<Snapshot>,
    last: Option<PageKey>,
    done: bool,
}

impl<'a> SnapshotIter<'a> {
    pub(crate) fn new<F>(ctx: &Context, page_size: usize, fetch: F) -> Self
    where
        F: FnMut(Option<&PageKey>, usize) -> Result<Vec<(PageKey, Snapshot)>> + 'a,
    {
        Self {
            fetch: Box::new(fetch),
            ctx: ctx.clone(),
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            last: None,
            done: false,
        }
    }

    pub fn empty(ctx: &Context) -> Self {
        let mut iter = Self::new(ctx, 1, |_, _| Ok(Vec::new()));
        iter.done = true;
        iter
    }

    /// Decode each snapshot into a record
    pub fn records<R: Record>(self) -> impl Iterator<Item = Result<R>> + 'a {
        self.map(|s| s.and_then(Snapshot::into_record))
    }

    fn fill(&mut self) -> Result<()> {
        if let Some(interrupt) = self.ctx.interrupted() {
            return Err(ExError::interrupted("iterate", interrupt));
        }
        let rows = (self.fetch)(self.last.as_ref(), self.page_size)?;
        if rows.len() < self.page_size {
            self.done = true;
        }
        for (key, snapshot) in rows {
            self.last = Some(key);
            self.buffer.push_back(snapshot);
        }
        Ok(())
    }
}

impl Iterator for SnapshotIter<'_> {
    type Item = Result<Snapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(s) = self.buffer.pop_front() {
            return Some(Ok(s));
        }
        if self.done {
            return None;
        }
        if let Err(e) = self.fill() {
            self.done = true;
            return Some(Err(e));
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblio_core::ExErrorKind;
    use chrono::Utc;

    fn rows(n: usize) -> Vec<(PageKey, Snapshot)> {
        let t = Utc::now();
        (0..n)
            .map(|i| {
                let id = format!("r{:03}", i);
                (
                    PageKey {
                        id: id.clone(),
                        valid_from: 0,
                        seq: i as i64,
                    },
                    Snapshot::for_import(id, format!("v{}", i), b"{}".to_vec(), t, t),
                )
            })
            .collect()
    }

    fn paged(ctx: &Context, all: Vec<(PageKey, Snapshot)>, page: usize) -> SnapshotIter<'static> {
        SnapshotIter::new(ctx, page, move |after, limit| {
            let start = match after {
                Some(k) => all.iter().position(|(key, _)| key == k).map_or(0, |p| p + 1),
                None => 0,
            };
            Ok(all.iter().skip(start).take(limit).cloned().collect())
        })
    }

    #[test]
    fn test_pages_through_everything() {
        let ctx = Context::new();
        let ids: Vec<String> = paged(&ctx, rows(7), 3)
            .map(|s| s.unwrap().id)
            .collect();
        assert_eq!(ids.len(), 7);
        assert_eq!(ids[6], "r006");
    }

    #[test]
    fn test_stops_after_first_error() {
        let ctx = Context::new();
        let mut calls = 0;
        let mut iter = SnapshotIter::new(&ctx, 2, move |_, _| {
            calls += 1;
            Err(ExError::new(ExErrorKind::Persistence).with_message(format!("call {}", calls)))
        });
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_cancelled_before_page_fetch() {
        let ctx = Context::new();
        let mut iter = paged(&ctx, rows(4), 2);
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().unwrap().is_ok());
        ctx.cancel();
        let err = iter.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Cancelled);
        assert!(iter.next().is_none());
    }
}
