//! Pure 2D geometry used to place block geometry in world space.
//!
//! Everything here is stateless and reentrant.

pub mod point;
pub mod polygon;
pub mod transform;

pub use point::Point;
pub use polygon::{area, centroid, circle_to_polygon, normalize, DEFAULT_CIRCLE_SEGMENTS, MIN_AREA};
pub use transform::{transform, Affine};
