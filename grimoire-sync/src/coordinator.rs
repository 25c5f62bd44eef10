//! Serialized application of pushes to plots.

use std::sync::Arc;

use serde::Serialize;

use grimoire_core::{FigureSpec, HierarchyStore, PlotMode, PlotPath, StoreError};

use crate::error::SyncError;
use crate::hub::SubscriptionHub;

/// Result of an accepted push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushOutcome {
    pub path: PlotPath,
    pub version: u64,
    pub mode: PlotMode,
}

/// Applies pushes under each plot's writer lock and notifies the hub
/// before releasing it, so notifications for one plot leave in commit order.
#[derive(Clone)]
pub struct UpdateCoordinator {
    store: Arc<HierarchyStore>,
    hub: SubscriptionHub,
}

impl UpdateCoordinator {
    pub fn new(store: Arc<HierarchyStore>, hub: SubscriptionHub) -> Self {
        Self { store, hub }
    }

    /// Apply `payload` to the plot at `path`, creating any missing nodes.
    ///
    /// A failed push leaves the plot exactly as it was. If the future is
    /// dropped while waiting for the writer lock, nothing is applied.
    pub async fn push(
        &self,
        path: PlotPath,
        payload: FigureSpec,
        mode: PlotMode,
    ) -> Result<PushOutcome, SyncError> {
        let mut handle = self.store.get_or_create_path(&path)?;
        let mut writer = loop {
            let writer = handle.lock().await;
            if !writer.is_removed() {
                break writer;
            }
            // Removed while we waited; the next lookup creates a fresh slot.
            drop(writer);
            handle = self.store.get_or_create_path(&path)?;
        };

        let figure = match writer.current() {
            Some(current) if current.mode != mode => {
                return Err(StoreError::ModeConflict {
                    path: path.to_string(),
                    existing: current.mode,
                    requested: mode,
                }
                .into());
            }
            Some(current) if mode == PlotMode::Append => current.figure.append(&payload)?,
            _ => payload,
        };

        let snapshot = writer.commit(figure, mode)?;
        self.hub.notify(&path, snapshot.version);
        drop(writer);

        tracing::debug!(plot = %path, version = snapshot.version, %mode, "push committed");
        Ok(PushOutcome {
            path,
            version: snapshot.version,
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use grimoire_core::PathPrefix;

    use super::*;
    use crate::hub::{ChangeEvent, HubEvent};

    fn fig(value: serde_json::Value) -> FigureSpec {
        FigureSpec::from_value(value).unwrap()
    }

    fn coordinator() -> (UpdateCoordinator, Arc<HierarchyStore>, SubscriptionHub) {
        let store = Arc::new(HierarchyStore::new());
        let hub = SubscriptionHub::default();
        (UpdateCoordinator::new(store.clone(), hub.clone()), store, hub)
    }

    #[tokio::test]
    async fn replace_then_append_is_a_mode_conflict() {
        let (coord, store, _) = coordinator();
        let path = PlotPath::new("g", "c", "p");
        coord
            .push(path.clone(), fig(json!({"y": [1]})), PlotMode::Replace)
            .await
            .unwrap();

        let err = coord
            .push(path.clone(), fig(json!({"y": [2]})), PlotMode::Append)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "mode_conflict");
        let snap = store.read_snapshot(&path).unwrap();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.figure.as_value(), &json!({"y": [1]}));
    }

    #[tokio::test]
    async fn first_append_stores_payload_as_is() {
        let (coord, store, _) = coordinator();
        let path = PlotPath::new("g", "c", "p");
        let out = coord
            .push(path.clone(), fig(json!({"y": [1]})), PlotMode::Append)
            .await
            .unwrap();
        assert_eq!(out.version, 1);
        assert_eq!(out.mode, PlotMode::Append);
        assert_eq!(store.read_snapshot(&path).unwrap().mode, PlotMode::Append);
    }

    #[tokio::test]
    async fn rejected_append_does_not_notify() {
        let (coord, _, hub) = coordinator();
        let path = PlotPath::new("g", "c", "p");
        coord
            .push(path.clone(), fig(json!({"y": [1]})), PlotMode::Append)
            .await
            .unwrap();

        let mut sub = hub.subscribe(PathPrefix::All);
        let err = coord
            .push(path.clone(), fig(json!({"y": {"bad": 1}})), PlotMode::Append)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "incompatible_append");
        assert_eq!(sub.try_recv(), None);

        coord
            .push(path.clone(), fig(json!({"y": [2]})), PlotMode::Append)
            .await
            .unwrap();
        assert_eq!(
            sub.try_recv(),
            Some(HubEvent::Changed(ChangeEvent { path, version: 2 }))
        );
    }
}
