//! Domain types for the GrimoirePlot hierarchy.
//!
//! Names are newtypes so a chapter name can never be passed where a plot
//! name is expected. All listing types serialize with serde for the wire.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::figure::FigureSpec;

/// Longest accepted name segment, in characters.
pub const MAX_NAME_CHARS: usize = 256;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of a top-level grimoire (unique process-wide).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrimoireName(pub String);

impl fmt::Display for GrimoireName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for GrimoireName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GrimoireName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Name of a chapter, unique within its grimoire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterName(pub String);

impl fmt::Display for ChapterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ChapterName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChapterName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Name of a plot, unique within its chapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlotName(pub String);

impl fmt::Display for PlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PlotName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PlotName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Check one name segment. Empty names, `/` and control characters are rejected.
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), StoreError> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name.chars().count() > MAX_NAME_CHARS {
        Some("longer than 256 characters")
    } else if name.contains('/') {
        Some("must not contain '/'")
    } else if name.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(StoreError::InvalidName {
            kind,
            name: name.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Fully-qualified identifier of a plot: `(grimoire, chapter, plot)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlotPath {
    pub grimoire: GrimoireName,
    pub chapter: ChapterName,
    pub plot: PlotName,
}

impl PlotPath {
    pub fn new(
        grimoire: impl Into<GrimoireName>,
        chapter: impl Into<ChapterName>,
        plot: impl Into<PlotName>,
    ) -> Self {
        Self {
            grimoire: grimoire.into(),
            chapter: chapter.into(),
            plot: plot.into(),
        }
    }

    /// Validate all three segments.
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_name("grimoire", &self.grimoire.0)?;
        validate_name("chapter", &self.chapter.0)?;
        validate_name("plot", &self.plot.0)
    }
}

impl fmt::Display for PlotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.grimoire, self.chapter, self.plot)
    }
}

/// A subtree of the hierarchy a viewer can watch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum PathPrefix {
    #[default]
    All,
    Grimoire(GrimoireName),
    Chapter(GrimoireName, ChapterName),
    Plot(PlotPath),
}

impl PathPrefix {
    /// Build a prefix from optional query segments.
    ///
    /// A chapter without a grimoire, or a plot without a chapter, is rejected.
    pub fn from_parts(
        grimoire: Option<String>,
        chapter: Option<String>,
        plot: Option<String>,
    ) -> Result<Self, StoreError> {
        let prefix = match (grimoire, chapter, plot) {
            (None, None, None) => PathPrefix::All,
            (Some(g), None, None) => PathPrefix::Grimoire(GrimoireName(g)),
            (Some(g), Some(c), None) => PathPrefix::Chapter(GrimoireName(g), ChapterName(c)),
            (Some(g), Some(c), Some(p)) => PathPrefix::Plot(PlotPath::new(g, c, p)),
            _ => {
                return Err(StoreError::InvalidPayload(
                    "path prefix segments must be given outermost first".to_string(),
                ))
            }
        };
        prefix.validate()?;
        Ok(prefix)
    }

    fn validate(&self) -> Result<(), StoreError> {
        match self {
            PathPrefix::All => Ok(()),
            PathPrefix::Grimoire(g) => validate_name("grimoire", &g.0),
            PathPrefix::Chapter(g, c) => {
                validate_name("grimoire", &g.0)?;
                validate_name("chapter", &c.0)
            }
            PathPrefix::Plot(path) => path.validate(),
        }
    }

    /// Whether `path` lies inside this prefix.
    pub fn matches(&self, path: &PlotPath) -> bool {
        match self {
            PathPrefix::All => true,
            PathPrefix::Grimoire(g) => path.grimoire == *g,
            PathPrefix::Chapter(g, c) => path.grimoire == *g && path.chapter == *c,
            PathPrefix::Plot(p) => path == p,
        }
    }

    /// Whether the two subtrees share at least one plot path.
    pub fn overlaps(&self, other: &PathPrefix) -> bool {
        fn same<T: PartialEq>(a: Option<&T>, b: Option<&T>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }
        same(self.grimoire(), other.grimoire())
            && same(self.chapter(), other.chapter())
            && same(self.plot(), other.plot())
    }

    pub fn grimoire(&self) -> Option<&GrimoireName> {
        match self {
            PathPrefix::All => None,
            PathPrefix::Grimoire(g) | PathPrefix::Chapter(g, _) => Some(g),
            PathPrefix::Plot(p) => Some(&p.grimoire),
        }
    }

    pub fn chapter(&self) -> Option<&ChapterName> {
        match self {
            PathPrefix::All | PathPrefix::Grimoire(_) => None,
            PathPrefix::Chapter(_, c) => Some(c),
            PathPrefix::Plot(p) => Some(&p.chapter),
        }
    }

    pub fn plot(&self) -> Option<&PlotName> {
        match self {
            PathPrefix::Plot(p) => Some(&p.plot),
            _ => None,
        }
    }
}

impl fmt::Display for PathPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPrefix::All => write!(f, "all"),
            PathPrefix::Grimoire(g) => write!(f, "{g}"),
            PathPrefix::Chapter(g, c) => write!(f, "{g}/{c}"),
            PathPrefix::Plot(p) => p.fmt(f),
        }
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How pushes to a plot are applied. Fixed by the first push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlotMode {
    /// Each push carries the full figure.
    #[default]
    Replace,
    /// Each push carries new points merged into the existing series.
    Append,
}

impl fmt::Display for PlotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlotMode::Replace => write!(f, "replace"),
            PlotMode::Append => write!(f, "append"),
        }
    }
}

impl FromStr for PlotMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(PlotMode::Replace),
            "append" => Ok(PlotMode::Append),
            other => Err(format!(
                "unknown plot mode '{other}'; expected: replace, append"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots and listings
// ---------------------------------------------------------------------------

/// One committed state of a plot. Published whole, so `figure` and
/// `version` are always observed together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSnapshot {
    pub path: PlotPath,
    pub figure: Arc<FigureSpec>,
    pub version: u64,
    pub mode: PlotMode,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Full navigation tree, in creation order at every level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Tree {
    pub grimoires: Vec<GrimoireEntry>,
}

impl Tree {
    /// Total number of committed plots in the listing.
    pub fn plot_count(&self) -> usize {
        self.grimoires
            .iter()
            .flat_map(|g| g.chapters.iter())
            .map(|c| c.plots.len())
            .sum()
    }

    /// Latest version of a plot, if listed.
    pub fn version_of(&self, path: &PlotPath) -> Option<u64> {
        self.grimoires
            .iter()
            .find(|g| g.name == path.grimoire)?
            .chapters
            .iter()
            .find(|c| c.name == path.chapter)?
            .plots
            .iter()
            .find(|p| p.name == path.plot)
            .map(|p| p.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrimoireEntry {
    pub name: GrimoireName,
    pub created_at: DateTime<Utc>,
    pub chapters: Vec<ChapterEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub name: ChapterName,
    pub plots: Vec<PlotEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotEntry {
    pub name: PlotName,
    pub version: u64,
    pub mode: PlotMode,
    pub last_updated: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(GrimoireName::from("exp1").to_string(), "exp1");
        assert_eq!(ChapterName::from("metrics").to_string(), "metrics");
        assert_eq!(PlotName::from("loss").to_string(), "loss");
    }

    #[test]
    fn plot_path_display_joins_segments() {
        let path = PlotPath::new("exp1", "metrics", "loss");
        assert_eq!(path.to_string(), "exp1/metrics/loss");
    }

    #[test]
    fn names_with_slash_or_empty_are_rejected() {
        assert!(PlotPath::new("a/b", "c", "d").validate().is_err());
        assert!(PlotPath::new("a", "", "d").validate().is_err());
        assert!(PlotPath::new("a", "c", "line\nbreak").validate().is_err());
        assert!(PlotPath::new("Sine Wave", "Live Test", "p").validate().is_ok());
    }

    #[test]
    fn prefix_matching() {
        let path = PlotPath::new("g", "c", "p");
        assert!(PathPrefix::All.matches(&path));
        assert!(PathPrefix::Grimoire("g".into()).matches(&path));
        assert!(!PathPrefix::Grimoire("h".into()).matches(&path));
        assert!(PathPrefix::Chapter("g".into(), "c".into()).matches(&path));
        assert!(!PathPrefix::Chapter("g".into(), "d".into()).matches(&path));
        assert!(PathPrefix::Plot(path.clone()).matches(&path));
    }

    #[test]
    fn prefix_overlap_is_containment_either_way() {
        let plot = PathPrefix::Plot(PlotPath::new("g", "c", "p"));
        let chapter = PathPrefix::Chapter("g".into(), "c".into());
        assert!(PathPrefix::All.overlaps(&plot));
        assert!(plot.overlaps(&PathPrefix::Grimoire("g".into())));
        assert!(chapter.overlaps(&plot));
        assert!(!chapter.overlaps(&PathPrefix::Chapter("g".into(), "d".into())));
        assert!(!plot.overlaps(&PathPrefix::Plot(PlotPath::new("g", "c", "q"))));
    }

    #[test]
    fn prefix_from_parts_requires_outer_segments() {
        assert_eq!(
            PathPrefix::from_parts(None, None, None).unwrap(),
            PathPrefix::All
        );
        assert!(PathPrefix::from_parts(None, Some("c".into()), None).is_err());
        assert!(PathPrefix::from_parts(Some("g".into()), None, Some("p".into())).is_err());
        assert_eq!(
            PathPrefix::from_parts(Some("g".into()), Some("c".into()), None)
                .unwrap()
                .to_string(),
            "g/c"
        );
    }

    #[test]
    fn plot_mode_parse_and_display() {
        assert_eq!("Append".parse::<PlotMode>().unwrap(), PlotMode::Append);
        assert_eq!(PlotMode::Replace.to_string(), "replace");
        assert!("merge".parse::<PlotMode>().is_err());
        let json = serde_json::to_string(&PlotMode::Append).unwrap();
        assert_eq!(json, "\"append\"");
    }
}
