use std::collections::HashMap;

use geometry::{Affine, Point, DEFAULT_CIRCLE_SEGMENTS, MIN_AREA};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{GraphError, WalkWarning};
use crate::graph::{Block, BlockEntity, BlockGraph, BlockReference};
use crate::schema::{ExtractedEntity, GeometryKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// Deepest nesting level that still produces entities. Model space is 0.
    pub max_depth: usize,
    pub circle_segments: usize,
    /// Shapes with a smaller area are treated as degenerate.
    pub min_area: f64,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            circle_segments: DEFAULT_CIRCLE_SEGMENTS,
            min_area: MIN_AREA,
        }
    }
}

/// Result of one walk: the entities in depth-first order plus everything
/// that was skipped along the way.
#[derive(Debug, Default)]
pub struct Traversal {
    pub entities: Vec<ExtractedEntity>,
    pub warnings: Vec<WalkWarning>,
}

#[derive(Debug, Clone)]
struct Candidate {
    kind: GeometryKind,
    vertices: Vec<Point>,
}

struct WalkState<'g> {
    graph: &'g BlockGraph,
    entities: Vec<ExtractedEntity>,
    warnings: Vec<WalkWarning>,
    /// Representative local outline per block name.
    representatives: HashMap<&'g str, Option<Candidate>>,
    /// Block names from model space down to the current reference.
    path: Vec<&'g str>,
}

/// Depth-first walker over block references.
pub struct BlockWalker {
    config: WalkerConfig,
}

impl Default for BlockWalker {
    fn default() -> Self {
        Self::new(WalkerConfig::default())
    }
}

impl BlockWalker {
    pub fn new(config: WalkerConfig) -> Self {
        Self { config }
    }

    /// Validate the graph, then emit one entity per block instance that has
    /// usable geometry.
    pub fn traverse(&self, graph: &BlockGraph) -> Result<Traversal, GraphError> {
        graph.validate()?;

        info!(
            references = graph.model_space.len(),
            blocks = graph.blocks.len(),
            max_depth = self.config.max_depth,
            "Walking block graph"
        );

        let mut state = WalkState {
            graph,
            entities: Vec::new(),
            warnings: Vec::new(),
            representatives: HashMap::new(),
            path: Vec::new(),
        };

        for reference in &graph.model_space {
            self.visit(&mut state, reference, &Affine::IDENTITY, 0);
        }

        info!(
            entities = state.entities.len(),
            warnings = state.warnings.len(),
            "Block graph walk finished"
        );

        Ok(Traversal {
            entities: state.entities,
            warnings: state.warnings,
        })
    }

    fn visit<'g>(
        &self,
        state: &mut WalkState<'g>,
        reference: &'g BlockReference,
        parent: &Affine,
        depth: usize,
    ) {
        let name = reference.block_name.as_str();

        if depth > self.config.max_depth {
            warn!(block = name, depth, "Maximum nesting depth exceeded, subtree dropped");
            state.warnings.push(WalkWarning::DepthExceeded {
                block: name.to_string(),
                depth,
            });
            return;
        }

        if state.path.contains(&name) {
            warn!(block = name, depth, "Block references itself through its ancestors");
            state.warnings.push(WalkWarning::CycleDetected {
                block: name.to_string(),
                path: state.path.iter().map(|s| s.to_string()).collect(),
            });
            return;
        }

        let graph = state.graph;
        let Some(block) = graph.block(name) else {
            warn!(block = name, "Block definition not found");
            state.warnings.push(WalkWarning::MissingBlock {
                block: name.to_string(),
            });
            return;
        };

        let world = parent.compose(&Affine::from_insert(
            reference.insertion,
            reference.rotation,
            reference.scale_x,
            reference.scale_y,
        ));

        if let Some(candidate) = self.representative(state, block) {
            let vertices = world.apply_all(&candidate.vertices);
            let area = geometry::area(&vertices);

            if area < self.config.min_area {
                // e.g. a zero scale factor collapses the outline
                warn!(block = name, area, "Instance geometry collapsed, skipped");
                state.warnings.push(WalkWarning::Degenerate {
                    block: name.to_string(),
                    kind: candidate.kind,
                    vertex_count: vertices.len(),
                    area,
                });
            } else {
                state.entities.push(ExtractedEntity {
                    block_name: name.to_string(),
                    geometry_kind: candidate.kind,
                    vertices,
                    area,
                    insertion: reference.insertion,
                    rotation: reference.rotation,
                    scale_x: reference.scale_x,
                    scale_y: reference.scale_y,
                    depth,
                    classification: None,
                });
            }
        }

        state.path.push(name);
        for nested in block.references() {
            self.visit(state, nested, &world, depth + 1);
        }
        state.path.pop();
    }

    /// Largest valid shape defined directly in `block`, computed once per block.
    fn representative<'g>(&self, state: &mut WalkState<'g>, block: &'g Block) -> Option<Candidate> {
        if let Some(cached) = state.representatives.get(block.name.as_str()) {
            return cached.clone();
        }

        let mut best: Option<(Candidate, f64)> = None;

        for entity in &block.entities {
            let (kind, vertices) = match entity {
                BlockEntity::LwPolyline { vertices } => {
                    (GeometryKind::ClosedPolyline, vertices.clone())
                }
                BlockEntity::Polyline { vertices } => {
                    (GeometryKind::LegacyPolyline, vertices.clone())
                }
                BlockEntity::Circle { center, radius } => (
                    GeometryKind::CircleApproximation,
                    geometry::circle_to_polygon(*center, *radius, self.config.circle_segments),
                ),
                BlockEntity::Insert(_) => continue,
            };

            let area = geometry::area(&vertices);
            if vertices.len() < 3 || area < self.config.min_area {
                warn!(
                    block = %block.name,
                    kind = kind.as_str(),
                    vertices = vertices.len(),
                    area,
                    "Degenerate shape skipped"
                );
                state.warnings.push(WalkWarning::Degenerate {
                    block: block.name.clone(),
                    kind,
                    vertex_count: vertices.len(),
                    area,
                });
                continue;
            }

            // strict comparison keeps the first of equal-area shapes
            if best.as_ref().is_none_or(|(_, best_area)| area > *best_area) {
                best = Some((Candidate { kind, vertices }, area));
            }
        }

        let chosen = best.map(|(candidate, area)| {
            debug!(block = %block.name, kind = candidate.kind.as_str(), area, "Representative outline");
            candidate
        });

        state.representatives.insert(block.name.as_str(), chosen.clone());
        chosen
    }
}
