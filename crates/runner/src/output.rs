use std::path::Path;

use anyhow::{Context, Result};
use classify::{CacheStats, RunContext, StatsSnapshot};
use extract::{ExtractedEntity, WalkWarning};
use geometry::Point;
use serde::Serialize;
use uuid::Uuid;

use crate::layers::LayerSchema;

#[derive(Serialize)]
pub struct ClassifiedBlock<'a> {
    #[serde(flatten)]
    pub entity: &'a ExtractedEntity,
    pub center: Point,
    pub layer: String,
    pub color: u8,
}

#[derive(Serialize)]
pub struct RunReport<'a> {
    pub run_id: Uuid,
    pub cancelled: bool,
    pub entities: Vec<ClassifiedBlock<'a>>,
    pub warnings: &'a [WalkWarning],
    pub stats: StatsSnapshot,
    pub cache: CacheStats,
}

impl<'a> RunReport<'a> {
    pub fn new(
        ctx: &RunContext,
        entities: &'a [ExtractedEntity],
        warnings: &'a [WalkWarning],
        layers: &LayerSchema,
    ) -> Self {
        let entities = entities
            .iter()
            .map(|entity| {
                let style = layers.style_for(entity.classification.as_ref());
                ClassifiedBlock {
                    entity,
                    center: entity.center(),
                    layer: style.name,
                    color: style.color,
                }
            })
            .collect();

        Self {
            run_id: ctx.run_id,
            cancelled: ctx.is_cancelled(),
            entities,
            warnings,
            stats: ctx.stats.snapshot(),
            cache: ctx.cache.stats(),
        }
    }
}

/// Shift every entity so the lowest vertex coordinates become the origin.
/// Insertion points move by the same offset. Returns the offset, if any.
pub fn normalize_entities(entities: &mut [ExtractedEntity]) -> Option<Point> {
    let sets: Vec<Vec<Point>> = entities.iter().map(|e| e.vertices.clone()).collect();
    let normalized = geometry::normalize(&sets);

    let offset = sets
        .iter()
        .zip(&normalized)
        .find_map(|(before, after)| {
            let (b, a) = (before.first()?, after.first()?);
            Some(Point::new(b.x - a.x, b.y - a.y))
        })?;

    for (entity, vertices) in entities.iter_mut().zip(normalized) {
        entity.vertices = vertices;
        let insertion = entity.insertion;
        entity.insertion = Point::new(insertion.x - offset.x, insertion.y - offset.y);
    }
    Some(offset)
}

pub async fn write_report(path: &Path, report: &RunReport<'_>) -> Result<()> {
    let json = serde_json::to_vec_pretty(report).context("Failed to encode report")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use classify::CacheStore;
    use extract::{Classification, ClassificationMethod, GeometryKind};

    fn parked() -> ExtractedEntity {
        ExtractedEntity {
            block_name: "PARK_일반".to_string(),
            geometry_kind: GeometryKind::ClosedPolyline,
            vertices: vec![
                Point::new(1000.0, 2000.0),
                Point::new(3500.0, 2000.0),
                Point::new(3500.0, 7000.0),
                Point::new(1000.0, 7000.0),
            ],
            area: 12_500_000.0,
            insertion: Point::new(1000.0, 2000.0),
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            depth: 0,
            classification: Some(Classification {
                category: "parking".to_string(),
                kind: "basic".to_string(),
                confidence: 0.9,
                reasoning: "rule".to_string(),
                method: ClassificationMethod::Classified,
            }),
        }
    }

    #[tokio::test]
    async fn test_report_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let ctx = RunContext::new(Arc::new(CacheStore::in_memory()));
        let entities = vec![parked()];

        let report = RunReport::new(&ctx, &entities, &[], &LayerSchema::default());
        write_report(&path, &report).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let block = &written["entities"][0];
        assert_eq!(block["block_name"], "PARK_일반");
        assert_eq!(block["layer"], "p-parking-basic");
        assert_eq!(block["color"], 7);
        assert_eq!(block["classification"]["type"], "basic");
        assert_eq!(block["center"]["x"], 2250.0);
        assert_eq!(written["cancelled"], false);
        assert_eq!(written["warnings"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_report_lists_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let ctx = RunContext::new(Arc::new(CacheStore::in_memory()));
        let warnings = vec![
            WalkWarning::Degenerate {
                block: "COL".to_string(),
                kind: GeometryKind::CircleApproximation,
                vertex_count: 2,
                area: 0.0,
            },
            WalkWarning::MissingBlock {
                block: "GHOST".to_string(),
            },
        ];

        let report = RunReport::new(&ctx, &[], &warnings, &LayerSchema::default());
        write_report(&path, &report).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let first = &written["warnings"][0];
        assert_eq!(first["warning"], "degenerate");
        assert_eq!(first["kind"], "circle_approximation");
        assert_eq!(first["block"], "COL");
        assert_eq!(written["warnings"][1]["warning"], "missing_block");
        assert_eq!(written["warnings"][1]["block"], "GHOST");
    }

    #[test]
    fn test_normalize_entities() {
        let mut shifted = parked();
        shifted.vertices = shifted
            .vertices
            .iter()
            .map(|p| Point::new(p.x + 500.0, p.y - 1500.0))
            .collect();
        shifted.insertion = Point::new(1500.0, 500.0);
        let mut entities = vec![parked(), shifted];

        let offset = normalize_entities(&mut entities).unwrap();
        assert_eq!(offset, Point::new(1000.0, 500.0));
        assert_eq!(entities[0].vertices[0], Point::new(0.0, 1500.0));
        assert_eq!(entities[0].insertion, Point::new(0.0, 1500.0));
        assert_eq!(entities[1].vertices[0], Point::new(500.0, 0.0));
        assert_eq!(entities[1].insertion, Point::new(500.0, 0.0));
        assert_eq!(entities[0].area, 12_500_000.0);
    }

    #[test]
    fn test_normalize_without_vertices() {
        let mut entities: Vec<ExtractedEntity> = Vec::new();
        assert!(normalize_entities(&mut entities).is_none());
    }
}
