use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::schema::GeometryKind;

/// Structural problems in the input graph. These abort a run before any
/// block is visited.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("malformed block graph: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("block registry key {key:?} holds a block named {name:?}")]
    NameMismatch { key: String, name: String },

    #[error("empty block name in {0}")]
    EmptyName(String),

    #[error("non-finite {field} in {location}")]
    NonFinite {
        location: String,
        field: &'static str,
    },

    #[error("negative circle radius {radius} in block {block:?}")]
    NegativeRadius { block: String, radius: f64 },
}

/// Recoverable findings recorded during a walk. None of these stop the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum WalkWarning {
    /// Reference nested deeper than the configured bound; its subtree was dropped.
    DepthExceeded { block: String, depth: usize },
    /// Reference to a block already on the current ancestor path.
    CycleDetected { block: String, path: Vec<String> },
    /// Reference to a block the registry does not define.
    MissingBlock { block: String },
    /// Shape with too few vertices or no area.
    Degenerate {
        block: String,
        kind: GeometryKind,
        vertex_count: usize,
        area: f64,
    },
}

impl fmt::Display for WalkWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DepthExceeded { block, depth } => {
                write!(f, "depth {} exceeds limit at block {}", depth, block)
            }
            Self::CycleDetected { block, path } => {
                write!(f, "cycle: {} -> {}", path.join(" -> "), block)
            }
            Self::MissingBlock { block } => write!(f, "no definition for block {}", block),
            Self::Degenerate {
                block,
                kind,
                vertex_count,
                area,
            } => write!(
                f,
                "degenerate {} in block {} ({} vertices, area {})",
                kind.as_str(),
                block,
                vertex_count,
                area
            ),
        }
    }
}
