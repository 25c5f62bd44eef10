//! In-memory Grimoire → Chapter → Plot tree.
//!
//! # Locking layout
//!
//! ```text
//! HierarchyStore
//!   grimoires: RwLock<HashMap<name, Arc<GrimoireNode>>>
//!     chapters: RwLock<HashMap<name, Arc<ChapterNode>>>
//!       plots: RwLock<HashMap<name, PlotHandle>>
//!         writer:    tokio Mutex<()>               (one per plot, FIFO)
//!         committed: RwLock<Option<Arc<PlotSnapshot>>>
//!   clocks: RwLock<HashMap<PlotPath, Arc<AtomicU64>>>
//! ```
//!
//! A plot's version clock outlives its slot. Removing a plot detaches the
//! slot from the tree but keeps the clock, so a plot recreated under the
//! same path continues numbering above the versions viewers already saw.
//!
//! Structural creation takes only the write lock of the parent map, after a
//! read-locked fast path. Value mutations take only the plot's own writer
//! mutex, so pushes to different plots never contend. Readers clone the
//! committed `Arc` and never hold a lock while using it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::figure::FigureSpec;
use crate::types::{
    ChapterEntry, ChapterName, GrimoireEntry, GrimoireName, PathPrefix, PlotEntry, PlotMode,
    PlotName, PlotPath, PlotSnapshot, Tree,
};

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

struct GrimoireNode {
    name: GrimoireName,
    seq: u64,
    created_at: DateTime<Utc>,
    chapters: RwLock<HashMap<ChapterName, Arc<ChapterNode>>>,
}

struct ChapterNode {
    name: ChapterName,
    seq: u64,
    plots: RwLock<HashMap<PlotName, PlotHandle>>,
}

struct PlotSlot {
    path: PlotPath,
    seq: u64,
    created_at: DateTime<Utc>,
    writer: Mutex<()>,
    committed: RwLock<Option<Arc<PlotSnapshot>>>,
    /// Last version issued for this path, shared with later slots.
    clock: Arc<AtomicU64>,
    removed: AtomicBool,
}

/// Stable reference to one plot slot.
///
/// Obtained once from [`HierarchyStore::get_or_create_path`]; mutations go
/// through [`PlotHandle::lock`] without walking the tree again.
#[derive(Clone)]
pub struct PlotHandle(Arc<PlotSlot>);

impl std::fmt::Debug for PlotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlotHandle")
            .field("path", &self.0.path)
            .field("version", &self.current().map(|s| s.version))
            .finish()
    }
}

impl PlotHandle {
    pub fn path(&self) -> &PlotPath {
        &self.0.path
    }

    /// Latest committed snapshot, or `None` before the first commit.
    pub fn current(&self) -> Option<Arc<PlotSnapshot>> {
        self.0
            .committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait for exclusive write access to this plot.
    ///
    /// Waiters are served in arrival order.
    pub async fn lock(&self) -> PlotWriter<'_> {
        let guard = self.0.writer.lock().await;
        PlotWriter {
            slot: &self.0,
            _guard: guard,
        }
    }

    /// Non-blocking variant of [`lock`](Self::lock).
    pub fn try_lock(&self) -> Option<PlotWriter<'_>> {
        let guard = self.0.writer.try_lock().ok()?;
        Some(PlotWriter {
            slot: &self.0,
            _guard: guard,
        })
    }
}

/// Exclusive write access to one plot. The only way to publish a new snapshot.
pub struct PlotWriter<'a> {
    slot: &'a PlotSlot,
    _guard: MutexGuard<'a, ()>,
}

impl PlotWriter<'_> {
    pub fn path(&self) -> &PlotPath {
        &self.slot.path
    }

    /// Whether the slot was detached by [`HierarchyStore::remove`]. A removed
    /// slot accepts no further commits.
    pub fn is_removed(&self) -> bool {
        self.slot.removed.load(Ordering::Acquire)
    }

    /// Latest committed snapshot. Stable for as long as this writer is held.
    pub fn current(&self) -> Option<Arc<PlotSnapshot>> {
        self.slot
            .committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish `figure` as the next version.
    ///
    /// The first commit fixes `mode`; later commits with another mode fail
    /// with [`StoreError::ModeConflict`] and publish nothing. A removed slot
    /// answers [`StoreError::NotFound`].
    pub fn commit(
        &mut self,
        figure: FigureSpec,
        mode: PlotMode,
    ) -> Result<Arc<PlotSnapshot>, StoreError> {
        if self.is_removed() {
            return Err(StoreError::NotFound {
                path: self.slot.path.to_string(),
            });
        }
        if let Some(prev) = self.current() {
            if prev.mode != mode {
                return Err(StoreError::ModeConflict {
                    path: self.slot.path.to_string(),
                    existing: prev.mode,
                    requested: mode,
                });
            }
        }
        let version = self.slot.clock.fetch_add(1, Ordering::AcqRel) + 1;

        let snapshot = Arc::new(PlotSnapshot {
            path: self.slot.path.clone(),
            figure: Arc::new(figure),
            version,
            mode,
            created_at: self.slot.created_at,
            last_updated: Utc::now(),
        });

        *self
            .slot
            .committed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The authoritative in-memory chart tree.
pub struct HierarchyStore {
    grimoires: RwLock<HashMap<GrimoireName, Arc<GrimoireNode>>>,
    clocks: RwLock<HashMap<PlotPath, Arc<AtomicU64>>>,
    sequence: AtomicU64,
}

impl Default for HierarchyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchyStore {
    pub fn new() -> Self {
        Self {
            grimoires: RwLock::new(HashMap::new()),
            clocks: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Materialize every node on `path` and return the plot's handle.
    ///
    /// Idempotent: concurrent callers for the same path receive handles to
    /// the same slot. A new plot has no committed state until its first
    /// [`PlotWriter::commit`].
    pub fn get_or_create_path(&self, path: &PlotPath) -> Result<PlotHandle, StoreError> {
        path.validate()?;

        let grimoire = get_or_insert(&self.grimoires, &path.grimoire, || {
            Arc::new(GrimoireNode {
                name: path.grimoire.clone(),
                seq: self.next_seq(),
                created_at: Utc::now(),
                chapters: RwLock::new(HashMap::new()),
            })
        });
        let chapter = get_or_insert(&grimoire.chapters, &path.chapter, || {
            Arc::new(ChapterNode {
                name: path.chapter.clone(),
                seq: self.next_seq(),
                plots: RwLock::new(HashMap::new()),
            })
        });
        let handle = get_or_insert(&chapter.plots, &path.plot, || {
            PlotHandle(Arc::new(PlotSlot {
                path: path.clone(),
                seq: self.next_seq(),
                created_at: Utc::now(),
                writer: Mutex::new(()),
                committed: RwLock::new(None),
                clock: get_or_insert(&self.clocks, path, || Arc::new(AtomicU64::new(0))),
                removed: AtomicBool::new(false),
            }))
        });
        Ok(handle)
    }

    /// Handle of an existing plot slot (committed or not).
    pub fn plot(&self, path: &PlotPath) -> Option<PlotHandle> {
        let grimoire = read(&self.grimoires).get(&path.grimoire).cloned()?;
        let chapter = read(&grimoire.chapters).get(&path.chapter).cloned()?;
        let handle = read(&chapter.plots).get(&path.plot).cloned();
        handle
    }

    /// Latest committed state of a plot.
    pub fn read_snapshot(&self, path: &PlotPath) -> Result<Arc<PlotSnapshot>, StoreError> {
        self.plot(path)
            .and_then(|handle| handle.current())
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }

    /// Detach the subtree at `prefix` and return the committed plots it held.
    ///
    /// Fails with [`StoreError::NotFound`] when nothing committed lives
    /// there. Detached slots refuse later commits; writers holding an old
    /// handle must look the path up again.
    pub fn remove(&self, prefix: &PathPrefix) -> Result<Vec<PlotPath>, StoreError> {
        let not_found = || StoreError::NotFound {
            path: prefix.to_string(),
        };
        let removed: Vec<PlotPath> = self
            .versions_under(prefix)
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        if removed.is_empty() {
            return Err(not_found());
        }

        let detached: Vec<PlotHandle> = match prefix {
            PathPrefix::All => {
                return Err(StoreError::InvalidPayload(
                    "refusing to remove the whole tree".to_string(),
                ))
            }
            PathPrefix::Grimoire(g) => {
                let node = write(&self.grimoires).remove(g).ok_or_else(not_found)?;
                let chapters: Vec<Arc<ChapterNode>> =
                    read(&node.chapters).values().cloned().collect();
                chapters
                    .iter()
                    .flat_map(|chapter| read(&chapter.plots).values().cloned().collect::<Vec<_>>())
                    .collect()
            }
            PathPrefix::Chapter(g, c) => {
                let grimoire = read(&self.grimoires).get(g).cloned().ok_or_else(not_found)?;
                let node = write(&grimoire.chapters).remove(c).ok_or_else(not_found)?;
                let plots = read(&node.plots).values().cloned().collect();
                plots
            }
            PathPrefix::Plot(path) => {
                let grimoire = read(&self.grimoires)
                    .get(&path.grimoire)
                    .cloned()
                    .ok_or_else(not_found)?;
                let chapter = read(&grimoire.chapters)
                    .get(&path.chapter)
                    .cloned()
                    .ok_or_else(not_found)?;
                let handle = write(&chapter.plots).remove(&path.plot).ok_or_else(not_found)?;
                vec![handle]
            }
        };
        for handle in &detached {
            handle.0.removed.store(true, Ordering::Release);
        }
        Ok(removed)
    }

    /// Navigation listing in creation order. Nodes without any committed
    /// plot underneath are left out.
    pub fn list_tree(&self) -> Tree {
        let grimoires = self.select(&PathPrefix::All);
        Tree {
            grimoires: grimoires
                .into_iter()
                .filter_map(|(grimoire, chapters)| {
                    let chapters: Vec<ChapterEntry> = chapters
                        .into_iter()
                        .filter_map(|(chapter, plots)| {
                            let plots: Vec<PlotEntry> = plots
                                .iter()
                                .map(|snapshot| PlotEntry {
                                    name: snapshot.path.plot.clone(),
                                    version: snapshot.version,
                                    mode: snapshot.mode,
                                    last_updated: snapshot.last_updated,
                                })
                                .collect();
                            (!plots.is_empty()).then(|| ChapterEntry {
                                name: chapter.name.clone(),
                                plots,
                            })
                        })
                        .collect();
                    (!chapters.is_empty()).then(|| GrimoireEntry {
                        name: grimoire.name.clone(),
                        created_at: grimoire.created_at,
                        chapters,
                    })
                })
                .collect(),
        }
    }

    /// Every committed snapshot under `prefix`, in creation order.
    pub fn snapshots_under(&self, prefix: &PathPrefix) -> Vec<Arc<PlotSnapshot>> {
        self.select(prefix)
            .into_iter()
            .flat_map(|(_, chapters)| chapters.into_iter().flat_map(|(_, plots)| plots))
            .collect()
    }

    /// `(path, version)` of every committed plot under `prefix`.
    pub fn versions_under(&self, prefix: &PathPrefix) -> Vec<(PlotPath, u64)> {
        self.snapshots_under(prefix)
            .into_iter()
            .map(|snapshot| (snapshot.path.clone(), snapshot.version))
            .collect()
    }

    /// Number of committed plots.
    pub fn plot_count(&self) -> usize {
        self.snapshots_under(&PathPrefix::All).len()
    }

    /// Walk the tree under `prefix`, cloning node `Arc`s level by level so no
    /// two levels are locked at once.
    #[allow(clippy::type_complexity)]
    fn select(
        &self,
        prefix: &PathPrefix,
    ) -> Vec<(
        Arc<GrimoireNode>,
        Vec<(Arc<ChapterNode>, Vec<Arc<PlotSnapshot>>)>,
    )> {
        let grimoires = sorted_children(&self.grimoires, prefix.grimoire(), |g| g.seq);
        grimoires
            .into_iter()
            .map(|grimoire| {
                let chapters = sorted_children(&grimoire.chapters, prefix.chapter(), |c| c.seq)
                    .into_iter()
                    .map(|chapter| {
                        let plots = sorted_children(&chapter.plots, prefix.plot(), |p| p.0.seq)
                            .into_iter()
                            .filter_map(|handle| handle.current())
                            .collect();
                        (chapter, plots)
                    })
                    .collect();
                (grimoire, chapters)
            })
            .collect()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Double-checked get-or-insert: read-locked lookup first, then the write
/// lock re-checks before inserting so two racing creators share one node.
fn get_or_insert<K, V>(
    map: &RwLock<HashMap<K, V>>,
    key: &K,
    make: impl FnOnce() -> V,
) -> V
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    if let Some(existing) = read(map).get(key) {
        return existing.clone();
    }
    let mut guard = write(map);
    guard.entry(key.clone()).or_insert_with(make).clone()
}

/// Children of `map` (all, or only `only` when given) ordered by creation.
fn sorted_children<K, V>(
    map: &RwLock<HashMap<K, V>>,
    only: Option<&K>,
    seq: impl Fn(&V) -> u64,
) -> Vec<V>
where
    K: Eq + Hash,
    V: Clone,
{
    let guard = read(map);
    let mut children: Vec<V> = match only {
        Some(key) => guard.get(key).cloned().into_iter().collect(),
        None => guard.values().cloned().collect(),
    };
    drop(guard);
    children.sort_by_key(|child| seq(child));
    children
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn figure(value: serde_json::Value) -> FigureSpec {
        FigureSpec::from_value(value).expect("figure")
    }

    #[tokio::test]
    async fn uncommitted_plot_is_not_found() {
        let store = HierarchyStore::new();
        let path = PlotPath::new("g", "c", "p");
        store.get_or_create_path(&path).expect("create");
        let err = store.read_snapshot(&path).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(store.list_tree().grimoires.is_empty());
    }

    #[tokio::test]
    async fn commit_bumps_version_and_fixes_mode() {
        let store = HierarchyStore::new();
        let path = PlotPath::new("g", "c", "p");
        let handle = store.get_or_create_path(&path).expect("create");

        let mut writer = handle.lock().await;
        let first = writer.commit(figure(json!({"y": [1]})), PlotMode::Append).unwrap();
        let second = writer.commit(figure(json!({"y": [1, 2]})), PlotMode::Append).unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);

        let err = writer
            .commit(figure(json!({"y": []})), PlotMode::Replace)
            .unwrap_err();
        assert!(matches!(err, StoreError::ModeConflict { .. }), "got: {err}");
        drop(writer);

        let snapshot = store.read_snapshot(&path).unwrap();
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.figure.as_value(), &json!({"y": [1, 2]}));
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = HierarchyStore::new();
        let path = PlotPath::new("g", "c", "p");
        let a = store.get_or_create_path(&path).unwrap();
        let b = store.get_or_create_path(&path).unwrap();
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }

    #[tokio::test]
    async fn tree_lists_in_creation_order() {
        let store = HierarchyStore::new();
        for (g, c, p) in [("zeta", "b", "1"), ("alpha", "a", "2"), ("zeta", "a", "3")] {
            let handle = store.get_or_create_path(&PlotPath::new(g, c, p)).unwrap();
            handle
                .lock()
                .await
                .commit(figure(json!({})), PlotMode::Replace)
                .unwrap();
        }
        let tree = store.list_tree();
        let names: Vec<_> = tree.grimoires.iter().map(|g| g.name.0.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha"]);
        let zeta_chapters: Vec<_> = tree.grimoires[0]
            .chapters
            .iter()
            .map(|c| c.name.0.as_str())
            .collect();
        assert_eq!(zeta_chapters, ["b", "a"]);
        assert_eq!(tree.plot_count(), 3);
    }

    #[tokio::test]
    async fn versions_under_respects_prefix() {
        let store = HierarchyStore::new();
        for (g, c, p) in [("g", "a", "1"), ("g", "b", "2"), ("h", "a", "3")] {
            let handle = store.get_or_create_path(&PlotPath::new(g, c, p)).unwrap();
            handle
                .lock()
                .await
                .commit(figure(json!({})), PlotMode::Replace)
                .unwrap();
        }
        let under_g = store.versions_under(&PathPrefix::Grimoire("g".into()));
        assert_eq!(under_g.len(), 2);
        let under_ga = store.versions_under(&PathPrefix::Chapter("g".into(), "a".into()));
        assert_eq!(under_ga, vec![(PlotPath::new("g", "a", "1"), 1)]);
        assert!(store
            .versions_under(&PathPrefix::Grimoire("missing".into()))
            .is_empty());
    }

    async fn commit(store: &HierarchyStore, path: &PlotPath) -> u64 {
        let handle = store.get_or_create_path(path).unwrap();
        let mut writer = handle.lock().await;
        writer.commit(figure(json!({})), PlotMode::Replace).unwrap().version
    }

    #[tokio::test]
    async fn remove_detaches_each_level() {
        let store = HierarchyStore::new();
        for (g, c, p) in [("g", "a", "1"), ("g", "a", "2"), ("g", "b", "3"), ("h", "a", "4")] {
            commit(&store, &PlotPath::new(g, c, p)).await;
        }

        let gone = store
            .remove(&PathPrefix::Plot(PlotPath::new("g", "a", "1")))
            .unwrap();
        assert_eq!(gone, vec![PlotPath::new("g", "a", "1")]);
        assert_eq!(store.plot_count(), 3);

        let gone = store
            .remove(&PathPrefix::Chapter("g".into(), "b".into()))
            .unwrap();
        assert_eq!(gone, vec![PlotPath::new("g", "b", "3")]);

        let gone = store.remove(&PathPrefix::Grimoire("g".into())).unwrap();
        assert_eq!(gone, vec![PlotPath::new("g", "a", "2")]);

        let names: Vec<_> = store
            .list_tree()
            .grimoires
            .iter()
            .map(|g| g.name.0.clone())
            .collect();
        assert_eq!(names, ["h"]);
    }

    #[tokio::test]
    async fn removing_nothing_is_not_found() {
        let store = HierarchyStore::new();
        let err = store
            .remove(&PathPrefix::Grimoire("ghost".into()))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        store.get_or_create_path(&PlotPath::new("g", "c", "p")).unwrap();
        let err = store
            .remove(&PathPrefix::Plot(PlotPath::new("g", "c", "p")))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }), "uncommitted slot: {err}");
        assert!(store.remove(&PathPrefix::All).is_err());
    }

    #[tokio::test]
    async fn recreated_plot_never_reuses_versions() {
        let store = HierarchyStore::new();
        let path = PlotPath::new("g", "c", "p");
        for _ in 0..3 {
            commit(&store, &path).await;
        }
        let old = store.plot(&path).unwrap();
        store.remove(&PathPrefix::Plot(path.clone())).unwrap();
        assert!(store.read_snapshot(&path).is_err());

        let mut stale = old.lock().await;
        assert!(stale.is_removed());
        let err = stale.commit(figure(json!({})), PlotMode::Replace).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        drop(stale);

        assert_eq!(commit(&store, &path).await, 4);
        assert_eq!(store.read_snapshot(&path).unwrap().version, 4);
    }

    #[test]
    fn invalid_names_create_nothing() {
        let store = HierarchyStore::new();
        assert!(store.get_or_create_path(&PlotPath::new("", "c", "p")).is_err());
        assert!(read(&store.grimoires).is_empty());
    }
}
