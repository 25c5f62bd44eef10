//! Dashboard rendering engine.

use tera::Tera;

use grimoire_core::Tree;

use crate::context::DashboardContext;
use crate::error::RenderError;

// Registered with an `.html` suffix so Tera autoescapes grimoire, chapter
// and plot names.
const TPLS: &[(&str, &str)] = &[
    ("base.html", include_str!("templates/base.html.tera")),
    ("plot_card.html", include_str!("templates/plot_card.html.tera")),
    ("dashboard.html", include_str!("templates/dashboard.html.tera")),
];

fn build_tera() -> Result<Tera, RenderError> {
    let mut tera = Tera::default();
    tera.add_raw_templates(TPLS.iter().copied())?;
    Ok(tera)
}

/// Renders the dashboard shell. Create once and reuse.
pub struct DashboardRenderer {
    tera: Tera,
}

impl DashboardRenderer {
    pub fn new() -> Result<Self, RenderError> {
        Ok(DashboardRenderer { tera: build_tera()? })
    }

    pub fn render(&self, tree: &Tree) -> Result<String, RenderError> {
        self.render_with_context(&DashboardContext::from_tree(tree))
    }

    pub fn render_with_context(&self, ctx: &DashboardContext) -> Result<String, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        Ok(self.tera.render("dashboard.html", &tera_ctx)?)
    }
}
