//! GrimoirePlot core library: names, figure documents, the hierarchy store.
//!
//! Public API surface:
//! - [`types`]: name newtypes, plot paths, modes, tree listing structs
//! - [`figure`]: [`FigureSpec`] validation and append merging
//! - [`store`]: [`HierarchyStore`], the in-memory Grimoire → Chapter → Plot tree
//! - [`error`]: [`StoreError`]

pub mod error;
pub mod figure;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use figure::FigureSpec;
pub use store::{HierarchyStore, PlotHandle, PlotWriter};
pub use types::{
    ChapterEntry, ChapterName, GrimoireEntry, GrimoireName, PathPrefix, PlotEntry, PlotMode,
    PlotName, PlotPath, PlotSnapshot, Tree,
};
