use geometry::Point;
use serde::{Deserialize, Serialize};

pub const FALLBACK_CATEGORY: &str = "other";
pub const FALLBACK_TYPE: &str = "unclassified";

/// Source representation the entity's outline was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    ClosedPolyline,
    LegacyPolyline,
    CircleApproximation,
}

impl GeometryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClosedPolyline => "closed_polyline",
            Self::LegacyPolyline => "legacy_polyline",
            Self::CircleApproximation => "circle_approximation",
        }
    }
}

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMethod {
    /// Served from the cache store, no new classifier call.
    Cached,
    /// Fresh classifier response.
    Classified,
    /// Classifier unavailable or its answer was unusable.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f64,
    pub reasoning: String,
    pub method: ClassificationMethod,
}

impl Classification {
    /// The deterministic label used whenever a classification cannot be obtained.
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            category: FALLBACK_CATEGORY.to_string(),
            kind: FALLBACK_TYPE.to_string(),
            confidence: 0.0,
            reasoning: reason.into(),
            method: ClassificationMethod::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.method == ClassificationMethod::Fallback
    }
}

/// One block instance with its world-space outline.
///
/// `insertion`, `rotation` and the scale factors are the values written on
/// the instance's own reference; `vertices` and `area` already include every
/// ancestor transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub block_name: String,
    pub geometry_kind: GeometryKind,
    pub vertices: Vec<Point>,
    pub area: f64,
    pub insertion: Point,
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
}

impl ExtractedEntity {
    pub fn center(&self) -> Point {
        geometry::centroid(&self.vertices).unwrap_or(self.insertion)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }
}
