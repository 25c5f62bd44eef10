//! Read side for viewers: tree listing, snapshots, long-poll, catch-up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use grimoire_core::{HierarchyStore, PathPrefix, PlotPath, PlotSnapshot, StoreError, Tree};

use crate::error::SyncError;
use crate::hub::{ChangeEvent, SubscriptionHub};

/// Answer to [`ReadApi::updates_after`].
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// A version newer than the caller's is available.
    Updated(Arc<PlotSnapshot>),
    /// Nothing newer arrived before the deadline.
    Unchanged { version: u64 },
}

#[derive(Clone)]
pub struct ReadApi {
    store: Arc<HierarchyStore>,
    hub: SubscriptionHub,
}

impl ReadApi {
    pub fn new(store: Arc<HierarchyStore>, hub: SubscriptionHub) -> Self {
        Self { store, hub }
    }

    pub fn tree(&self) -> Tree {
        self.store.list_tree()
    }

    pub fn snapshot(&self, path: &PlotPath) -> Result<Arc<PlotSnapshot>, SyncError> {
        Ok(self.store.read_snapshot(path)?)
    }

    /// Long-poll: return as soon as `path` has a version greater than
    /// `after`, or after `max_wait` with the current version.
    ///
    /// A plot that does not exist yet is waited for like any other; it is
    /// reported as not found only if it is still missing at the deadline.
    pub async fn updates_after(
        &self,
        path: &PlotPath,
        after: u64,
        max_wait: Duration,
    ) -> Result<PollOutcome, SyncError> {
        path.validate()?;
        // Register before the first read so a commit in between still wakes us.
        let mut subscription = self.hub.subscribe(PathPrefix::Plot(path.clone()));

        if let Some(snapshot) = self.newer_than(path, after)? {
            return Ok(PollOutcome::Updated(snapshot));
        }

        let deadline = tokio::time::sleep(max_wait);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = subscription.recv() => {
                    if event.is_none() {
                        break;
                    }
                    if let Some(snapshot) = self.newer_than(path, after)? {
                        return Ok(PollOutcome::Updated(snapshot));
                    }
                }
            }
        }

        let snapshot = self.store.read_snapshot(path)?;
        if snapshot.version > after {
            Ok(PollOutcome::Updated(snapshot))
        } else {
            Ok(PollOutcome::Unchanged {
                version: snapshot.version,
            })
        }
    }

    fn newer_than(
        &self,
        path: &PlotPath,
        after: u64,
    ) -> Result<Option<Arc<PlotSnapshot>>, SyncError> {
        match self.store.read_snapshot(path) {
            Ok(snapshot) if snapshot.version > after => Ok(Some(snapshot)),
            Ok(_) | Err(StoreError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Plots under `prefix` whose current version differs from what the
    /// viewer reports in `known`. Plots missing from `known` count as new.
    pub fn changed_since(
        &self,
        prefix: &PathPrefix,
        known: &HashMap<PlotPath, u64>,
    ) -> Vec<ChangeEvent> {
        self.store
            .versions_under(prefix)
            .into_iter()
            .filter(|(path, version)| known.get(path) != Some(version))
            .map(|(path, version)| ChangeEvent { path, version })
            .collect()
    }
}
