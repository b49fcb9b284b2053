//! GPU resources owned by the overlay: quad geometry and the design texture.

pub mod geometry;
pub mod texture;

pub use geometry::{quad_positions, triangulate_fan, GeometryBufferSet, QUAD_FAN_INDICES, QUAD_TEX_COORDS};
pub use texture::{mip_level_count, DesignBitmap, DesignTexture, MipLevel};
