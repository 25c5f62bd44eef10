//! The live-sync facade tying the gate, store, coordinator and hub together.

use std::sync::Arc;

use serde_json::Value;

use grimoire_core::{FigureSpec, HierarchyStore, PathPrefix, PlotMode, PlotPath};

use crate::auth::SecretGate;
use crate::coordinator::{PushOutcome, UpdateCoordinator};
use crate::error::SyncError;
use crate::hub::{Subscription, SubscriptionHub};
use crate::read::ReadApi;

/// One running chart-sync engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct LiveSync {
    gate: SecretGate,
    store: Arc<HierarchyStore>,
    hub: SubscriptionHub,
    coordinator: UpdateCoordinator,
    read: ReadApi,
}

impl LiveSync {
    pub fn new(secret: &str, queue_capacity: usize) -> Self {
        let gate = SecretGate::new(secret);
        let store = Arc::new(HierarchyStore::new());
        let hub = SubscriptionHub::new(queue_capacity);
        tracing::info!(
            secret_fingerprint = %gate.fingerprint(),
            queue_capacity,
            "live sync engine ready"
        );
        Self {
            coordinator: UpdateCoordinator::new(store.clone(), hub.clone()),
            read: ReadApi::new(store.clone(), hub.clone()),
            gate,
            store,
            hub,
        }
    }

    /// Check a push credential.
    pub fn authorize(&self, token: Option<&str>) -> Result<(), SyncError> {
        self.gate.check(token).map_err(|failure| {
            tracing::warn!(%failure, "push rejected");
            SyncError::Unauthorized(failure)
        })
    }

    /// Authenticate, validate and apply one push.
    ///
    /// The credential is checked before the payload is even looked at, and
    /// the payload is validated before any node is created.
    pub async fn push(
        &self,
        token: Option<&str>,
        path: PlotPath,
        payload: Value,
        mode: PlotMode,
    ) -> Result<PushOutcome, SyncError> {
        self.authorize(token)?;
        self.push_authorized(path, payload, mode).await
    }

    /// Validate and apply a push whose credential was already checked with
    /// [`LiveSync::authorize`].
    pub async fn push_authorized(
        &self,
        path: PlotPath,
        payload: Value,
        mode: PlotMode,
    ) -> Result<PushOutcome, SyncError> {
        let result = match FigureSpec::from_value(payload).and_then(|figure| {
            path.validate()?;
            Ok(figure)
        }) {
            Ok(figure) => self.coordinator.push(path.clone(), figure, mode).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = &result {
            tracing::warn!(plot = %path, code = err.code(), error = %err, "push failed");
        }
        result
    }

    /// Authenticate and remove the subtree at `prefix`.
    pub fn remove(
        &self,
        token: Option<&str>,
        prefix: &PathPrefix,
    ) -> Result<Vec<PlotPath>, SyncError> {
        self.authorize(token)?;
        self.remove_authorized(prefix)
    }

    /// Remove a subtree whose credential was already checked. Viewers
    /// watching any part of it are told to resync.
    pub fn remove_authorized(&self, prefix: &PathPrefix) -> Result<Vec<PlotPath>, SyncError> {
        match self.store.remove(prefix) {
            Ok(removed) => {
                self.hub.removed(prefix);
                tracing::info!(%prefix, plots = removed.len(), "subtree removed");
                Ok(removed)
            }
            Err(err) => {
                tracing::warn!(%prefix, code = err.code(), error = %err, "remove failed");
                Err(err.into())
            }
        }
    }

    /// Subscribe to `prefix`, seeded with the current version of every plot
    /// under it so a new viewer converges without a separate fetch.
    pub fn subscribe(&self, prefix: PathPrefix) -> Subscription {
        let subscription = self.hub.subscribe(prefix);
        subscription.seed(self.store.versions_under(subscription.prefix()));
        subscription
    }

    pub fn read(&self) -> &ReadApi {
        &self.read
    }

    pub fn store(&self) -> &HierarchyStore {
        &self.store
    }

    pub fn hub(&self) -> &SubscriptionHub {
        &self.hub
    }

    /// Stop fan-out. Open subscriptions drain and finish.
    pub fn shutdown(&self) {
        self.hub.close();
    }
}
