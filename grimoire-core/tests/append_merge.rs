//! Append-merge compatibility table and store concurrency checks.
//!
//! Each `#[case]` is isolated; no shared state.

use std::sync::Arc;

use grimoire_core::{FigureSpec, HierarchyStore, PlotMode, PlotPath, StoreError};
use rstest::rstest;
use serde_json::{json, Value};

fn fig(value: Value) -> FigureSpec {
    FigureSpec::from_value(value).expect("valid figure")
}

// ---------------------------------------------------------------------------
// 1. Compatible shapes
// ---------------------------------------------------------------------------

#[rstest]
#[case::series(json!({"y": [1]}), json!({"y": [2, 3]}), json!({"y": [1, 2, 3]}))]
#[case::empty_existing(json!({"y": []}), json!({"y": [5]}), json!({"y": [5]}))]
#[case::empty_incoming(json!({"y": [5]}), json!({"y": []}), json!({"y": [5]}))]
#[case::new_key_added(json!({"y": [1]}), json!({"x": [0]}), json!({"y": [1], "x": [0]}))]
#[case::scalar_same_kind(json!({"name": "a"}), json!({"name": "b"}), json!({"name": "b"}))]
#[case::null_replaced(json!({"name": null}), json!({"name": 3}), json!({"name": 3}))]
#[case::mixed_scalar_series(json!({"x": ["a", 1]}), json!({"x": [true]}), json!({"x": ["a", 1, true]}))]
#[case::heatmap_rows(
    json!({"z": [[1, 2], [3, 4]]}),
    json!({"z": [[5], [6]]}),
    json!({"z": [[1, 2, 5], [3, 4, 6]]})
)]
fn compatible_shapes_merge(#[case] existing: Value, #[case] incoming: Value, #[case] expected: Value) {
    let merged = fig(existing).append(&fig(incoming)).expect("merge");
    assert_eq!(merged.as_value(), &expected);
}

// ---------------------------------------------------------------------------
// 2. Incompatible shapes
// ---------------------------------------------------------------------------

#[rstest]
#[case::array_vs_object(json!({"y": [1]}), json!({"y": {"v": 1}}), "/y")]
#[case::scalar_vs_array(json!({"y": 1}), json!({"y": [1]}), "/y")]
#[case::number_vs_string(json!({"data": [{"y": [1]}], "t": 1}), json!({"t": "x"}), "/t")]
#[case::trace_count(json!({"data": [{"y": [1]}]}), json!({"data": [{}, {}]}), "/data")]
#[case::series_vs_traces(json!({"data": [1, 2]}), json!({"data": [{"y": [3]}]}), "/data")]
#[case::nested_pointer(
    json!({"data": [{"marker": {"size": 4}}]}),
    json!({"data": [{"marker": {"size": [4]}}]}),
    "/data/0/marker/size"
)]
fn incompatible_shapes_are_rejected(
    #[case] existing: Value,
    #[case] incoming: Value,
    #[case] pointer: &str,
) {
    let err = fig(existing).append(&fig(incoming)).unwrap_err();
    match err {
        StoreError::IncompatibleAppend { pointer: got, .. } => assert_eq!(got, pointer),
        other => panic!("expected IncompatibleAppend, got: {other}"),
    }
}

// ---------------------------------------------------------------------------
// 3. Associativity
// ---------------------------------------------------------------------------

#[test]
fn split_pushes_equal_single_push() {
    let start = fig(json!({"data": [{"x": [0], "y": [0.0]}]}));
    let split = start
        .append(&fig(json!({"data": [{"x": [1, 2], "y": [0.5, 0.7]}]})))
        .and_then(|f| f.append(&fig(json!({"data": [{"x": [3, 4], "y": [0.6, 0.9]}]}))))
        .expect("split merge");
    let single = start
        .append(&fig(json!({"data": [{"x": [1, 2, 3, 4], "y": [0.5, 0.7, 0.6, 0.9]}]})))
        .expect("single merge");
    assert_eq!(split, single);
}

// ---------------------------------------------------------------------------
// 4. Store concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creators_share_one_slot_and_versions_are_gap_free() {
    let store = Arc::new(HierarchyStore::new());
    let path = PlotPath::new("race", "chapter", "plot");

    let mut tasks = Vec::new();
    for i in 0..32 {
        let store = store.clone();
        let path = path.clone();
        tasks.push(tokio::spawn(async move {
            let handle = store.get_or_create_path(&path).expect("create");
            let mut writer = handle.lock().await;
            writer
                .commit(fig(json!({ "i": i })), PlotMode::Replace)
                .expect("commit")
                .version
        }));
    }

    let mut versions = Vec::new();
    for task in tasks {
        versions.push(task.await.expect("join"));
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=32).collect::<Vec<u64>>());

    let tree = store.list_tree();
    assert_eq!(tree.grimoires.len(), 1, "racing creators must not duplicate nodes");
    assert_eq!(tree.version_of(&path), Some(32));
}

#[tokio::test]
async fn holding_one_plot_does_not_block_another() {
    let store = HierarchyStore::new();
    let a = store.get_or_create_path(&PlotPath::new("g", "c", "a")).unwrap();
    let b = store.get_or_create_path(&PlotPath::new("g", "c", "b")).unwrap();

    let _held = a.lock().await;
    let mut writer = b.try_lock().expect("plot b must be free while a is held");
    assert_eq!(writer.commit(fig(json!({})), PlotMode::Replace).unwrap().version, 1);
    assert!(a.try_lock().is_none());
}
