//! Template context built from a [`Tree`] listing.

use chrono::{DateTime, Utc};
use serde::Serialize;

use grimoire_core::{PlotMode, Tree};

use crate::error::RenderError;

/// Everything the dashboard template needs.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardContext {
    pub title: String,
    pub grimoires: Vec<GrimoireCtx>,
    pub plot_count: usize,
    pub events_url: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrimoireCtx {
    pub name: String,
    /// DOM-safe id for the tab panel.
    pub anchor: String,
    pub chapters: Vec<ChapterCtx>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterCtx {
    pub name: String,
    pub plots: Vec<PlotCtx>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlotCtx {
    pub grimoire: String,
    pub chapter: String,
    pub name: String,
    pub version: u64,
    pub mode: PlotMode,
    pub last_updated: DateTime<Utc>,
}

impl DashboardContext {
    pub fn from_tree(tree: &Tree) -> Self {
        let grimoires = tree
            .grimoires
            .iter()
            .enumerate()
            .map(|(index, grimoire)| GrimoireCtx {
                name: grimoire.name.to_string(),
                anchor: format!("grimoire-{index}"),
                chapters: grimoire
                    .chapters
                    .iter()
                    .map(|chapter| ChapterCtx {
                        name: chapter.name.to_string(),
                        plots: chapter
                            .plots
                            .iter()
                            .map(|plot| PlotCtx {
                                grimoire: grimoire.name.to_string(),
                                chapter: chapter.name.to_string(),
                                name: plot.name.to_string(),
                                version: plot.version,
                                mode: plot.mode,
                                last_updated: plot.last_updated,
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        DashboardContext {
            title: "GrimoirePlot".to_string(),
            grimoires,
            plot_count: tree.plot_count(),
            events_url: "/api/events".to_string(),
            generated_at: Utc::now(),
        }
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        Ok(tera::Context::from_serialize(self)?)
    }
}
