//! # grimoire-renderer
//!
//! Tera-based renderer for the dashboard shell page. The page lists the
//! chart tree as grimoire tabs, chapter sections and a grid of plot cards;
//! the browser fills each card with Plotly.js and follows `/api/events`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use grimoire_core::HierarchyStore;
//! use grimoire_renderer::DashboardRenderer;
//!
//! fn page(store: &HierarchyStore) -> Option<String> {
//!     let renderer = DashboardRenderer::new().ok()?;
//!     renderer.render(&store.list_tree()).ok()
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::DashboardContext;
pub use engine::DashboardRenderer;
pub use error::RenderError;
