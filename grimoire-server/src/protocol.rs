//! JSON bodies exchanged over HTTP. Shared with the command-line client.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use grimoire_core::{PathPrefix, PlotMode, PlotPath, PlotSnapshot, StoreError};
use grimoire_sync::ChangeEvent;

/// `POST /add_plot` envelope. The figure arrives either as a JSON object in
/// `figure` or as JSON text in `json_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub grimoire_name: String,
    pub chapter_name: String,
    pub plot_name: String,
    #[serde(default)]
    pub mode: PlotMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figure: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_data: Option<String>,
}

impl PushRequest {
    pub fn path(&self) -> PlotPath {
        PlotPath::new(
            self.grimoire_name.as_str(),
            self.chapter_name.as_str(),
            self.plot_name.as_str(),
        )
    }

    /// Split into target path, raw figure value and mode.
    pub fn into_parts(self) -> Result<(PlotPath, Value, PlotMode), StoreError> {
        let path = self.path();
        let figure = match (self.figure, self.json_data) {
            (Some(figure), None) => figure,
            (None, Some(text)) => serde_json::from_str(&text).map_err(|e| {
                StoreError::InvalidPayload(format!("json_data is not valid JSON: {e}"))
            })?,
            (Some(_), Some(_)) => {
                return Err(StoreError::InvalidPayload(
                    "send either `figure` or `json_data`, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(StoreError::InvalidPayload(
                    "missing `figure` or `json_data`".to_string(),
                ))
            }
        };
        Ok((path, figure, self.mode))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    pub status: String,
    pub plot_name: String,
    pub version: u64,
    pub mode: PlotMode,
}

/// Answer to a `DELETE` under `/grimoire`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub status: String,
    /// Name of the removed node (grimoire, chapter or plot).
    pub deleted: String,
    /// Committed plots that went with it.
    pub plots: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Wire form of a committed plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBody {
    pub grimoire: String,
    pub chapter: String,
    pub plot: String,
    pub version: u64,
    pub mode: PlotMode,
    pub figure: Value,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl From<&PlotSnapshot> for SnapshotBody {
    fn from(snapshot: &PlotSnapshot) -> Self {
        Self {
            grimoire: snapshot.path.grimoire.to_string(),
            chapter: snapshot.path.chapter.to_string(),
            plot: snapshot.path.plot.to_string(),
            version: snapshot.version,
            mode: snapshot.mode,
            figure: snapshot.figure.as_value().clone(),
            created_at: snapshot.created_at,
            last_updated: snapshot.last_updated,
        }
    }
}

/// Data of an SSE `change` event and one entry of a catch-up answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBody {
    pub grimoire: String,
    pub chapter: String,
    pub plot: String,
    pub version: u64,
}

impl From<&ChangeEvent> for ChangeBody {
    fn from(change: &ChangeEvent) -> Self {
        Self {
            grimoire: change.path.grimoire.to_string(),
            chapter: change.path.chapter.to_string(),
            plot: change.path.plot.to_string(),
            version: change.version,
        }
    }
}

impl ChangeBody {
    pub fn path(&self) -> PlotPath {
        PlotPath::new(self.grimoire.as_str(), self.chapter.as_str(), self.plot.as_str())
    }
}

/// Optional `?grimoire=&chapter=&plot=` prefix selector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrefixQuery {
    pub grimoire: Option<String>,
    pub chapter: Option<String>,
    pub plot: Option<String>,
}

impl PrefixQuery {
    pub fn to_prefix(&self) -> Result<PathPrefix, StoreError> {
        PathPrefix::from_parts(self.grimoire.clone(), self.chapter.clone(), self.plot.clone())
    }
}

/// `?after=V&wait=S` on the snapshot route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollQuery {
    pub after: Option<u64>,
    pub wait: Option<u64>,
}

/// `POST /api/changes` body: the versions a viewer already holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangesRequest {
    #[serde(flatten)]
    pub prefix: PrefixQuery,
    #[serde(default)]
    pub known: Vec<ChangeBody>,
}

impl ChangesRequest {
    pub fn known_versions(&self) -> HashMap<PlotPath, u64> {
        self.known.iter().map(|k| (k.path(), k.version)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesResponse {
    pub changes: Vec<ChangeBody>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub plots: usize,
    pub subscribers: usize,
}
