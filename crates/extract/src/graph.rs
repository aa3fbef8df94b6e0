use std::collections::HashMap;

use geometry::Point;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

fn unit_scale() -> f64 {
    1.0
}

/// A placement of a named block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockReference {
    pub block_name: String,
    pub insertion: Point,
    /// Degrees, counter-clockwise.
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "unit_scale")]
    pub scale_x: f64,
    #[serde(default = "unit_scale")]
    pub scale_y: f64,
}

impl BlockReference {
    pub fn new(block_name: impl Into<String>, insertion: Point) -> Self {
        Self {
            block_name: block_name.into(),
            insertion,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale_x: f64, scale_y: f64) -> Self {
        self.scale_x = scale_x;
        self.scale_y = scale_y;
        self
    }

    fn validate(&self, location: &str) -> Result<(), GraphError> {
        if self.block_name.is_empty() {
            return Err(GraphError::EmptyName(location.to_string()));
        }
        let checks = [
            ("insertion", self.insertion.is_finite()),
            ("rotation", self.rotation.is_finite()),
            ("scale_x", self.scale_x.is_finite()),
            ("scale_y", self.scale_y.is_finite()),
        ];
        for (field, ok) in checks {
            if !ok {
                return Err(GraphError::NonFinite {
                    location: format!("{} reference to {}", location, self.block_name),
                    field,
                });
            }
        }
        Ok(())
    }
}

/// Something defined directly inside a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockEntity {
    /// Lightweight polyline, the usual outline representation.
    LwPolyline { vertices: Vec<Point> },
    /// Older heavyweight polyline with per-vertex records.
    Polyline { vertices: Vec<Point> },
    Circle { center: Point, radius: f64 },
    Insert(BlockReference),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    #[serde(default)]
    pub entities: Vec<BlockEntity>,
}

impl Block {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: Vec::new(),
        }
    }

    pub fn with(mut self, entity: BlockEntity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn references(&self) -> impl Iterator<Item = &BlockReference> {
        self.entities.iter().filter_map(|e| match e {
            BlockEntity::Insert(r) => Some(r),
            _ => None,
        })
    }
}

/// Decoded drawing: model-space references plus the block registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockGraph {
    pub model_space: Vec<BlockReference>,
    #[serde(default)]
    pub blocks: HashMap<String, Block>,
}

impl BlockGraph {
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Register a block under its own name.
    pub fn insert_block(&mut self, block: Block) {
        self.blocks.insert(block.name.clone(), block);
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.get(name)
    }

    /// Reject graphs that cannot be walked meaningfully.
    pub fn validate(&self) -> Result<(), GraphError> {
        for reference in &self.model_space {
            reference.validate("model space")?;
        }

        for (key, block) in &self.blocks {
            if block.name.is_empty() {
                return Err(GraphError::EmptyName(format!("registry entry {:?}", key)));
            }
            if key != &block.name {
                return Err(GraphError::NameMismatch {
                    key: key.clone(),
                    name: block.name.clone(),
                });
            }

            let location = format!("block {}", block.name);
            for entity in &block.entities {
                match entity {
                    BlockEntity::LwPolyline { vertices } | BlockEntity::Polyline { vertices } => {
                        if !vertices.iter().all(Point::is_finite) {
                            return Err(GraphError::NonFinite {
                                location,
                                field: "vertex",
                            });
                        }
                    }
                    BlockEntity::Circle { center, radius } => {
                        if !center.is_finite() {
                            return Err(GraphError::NonFinite {
                                location,
                                field: "center",
                            });
                        }
                        if !radius.is_finite() {
                            return Err(GraphError::NonFinite {
                                location,
                                field: "radius",
                            });
                        }
                        if *radius < 0.0 {
                            return Err(GraphError::NegativeRadius {
                                block: block.name.clone(),
                                radius: *radius,
                            });
                        }
                    }
                    BlockEntity::Insert(reference) => reference.validate(&location)?,
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let json = r#"{
            "model_space": [
                {"block_name": "PARK", "insertion": {"x": 1000.0, "y": 2000.0}}
            ],
            "blocks": {
                "PARK": {
                    "name": "PARK",
                    "entities": [
                        {"type": "lw_polyline", "vertices": [
                            {"x": 0.0, "y": 0.0}, {"x": 1.0, "y": 0.0}, {"x": 1.0, "y": 1.0}
                        ]},
                        {"type": "circle", "center": {"x": 0.0, "y": 0.0}, "radius": 2.0},
                        {"type": "insert", "block_name": "COL", "insertion": {"x": 0.0, "y": 0.0}, "rotation": 90.0}
                    ]
                }
            }
        }"#;

        let graph = BlockGraph::from_json(json).unwrap();
        let reference = &graph.model_space[0];
        assert_eq!(reference.scale_x, 1.0);
        assert_eq!(reference.rotation, 0.0);

        let block = graph.block("PARK").unwrap();
        assert_eq!(block.entities.len(), 3);
        let nested: Vec<_> = block.references().collect();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].rotation, 90.0);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_unreadable_json_is_malformed() {
        let err = BlockGraph::from_json("{\"model_space\": 3}").unwrap_err();
        assert!(matches!(err, GraphError::Malformed(_)));
    }

    #[test]
    fn test_validate_rejects_name_mismatch() {
        let mut graph = BlockGraph::default();
        graph.blocks.insert("A".to_string(), Block::new("B"));
        assert!(matches!(
            graph.validate(),
            Err(GraphError::NameMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_non_finite_scale() {
        let mut graph = BlockGraph::default();
        graph
            .model_space
            .push(BlockReference::new("A", Point::ORIGIN).with_scale(f64::NAN, 1.0));
        assert!(matches!(
            graph.validate(),
            Err(GraphError::NonFinite { field: "scale_x", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_negative_radius() {
        let mut graph = BlockGraph::default();
        graph.insert_block(Block::new("C").with(BlockEntity::Circle {
            center: Point::ORIGIN,
            radius: -1.0,
        }));
        assert!(matches!(
            graph.validate(),
            Err(GraphError::NegativeRadius { .. })
        ));
    }
}
