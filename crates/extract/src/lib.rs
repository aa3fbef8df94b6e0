pub mod error;
pub mod graph;
pub mod schema;
pub mod walker;

pub use error::{GraphError, WalkWarning};
pub use graph::{Block, BlockEntity, BlockGraph, BlockReference};
pub use schema::{
    Classification, ClassificationMethod, ExtractedEntity, GeometryKind, FALLBACK_CATEGORY,
    FALLBACK_TYPE,
};
pub use walker::{BlockWalker, Traversal, WalkerConfig};

