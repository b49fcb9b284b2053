//! Quad geometry for the overlay.
//!
//! The overlay is a single quad, centered on the tracked target and scaled by
//! [`QUAD_SCALE`]. Its topology and texture coordinates never change and are
//! uploaded once. Positions depend on the target size and are rewritten every
//! frame into a buffer that is allocated once.

use crate::backend::*;
use crate::error::{OverlayError, OverlayResult};
use crate::pipeline::blend::QUAD_SCALE;
use crate::tracking::TargetSize;

/// The quad as a triangle fan around vertex 0.
pub const QUAD_FAN_INDICES: [u16; 4] = [0, 1, 2, 3];

/// Texture coordinates per quad vertex.
pub const QUAD_TEX_COORDS: [[f32; 2]; 4] = [[1.0, 1.0], [1.0, 0.0], [0.0, 0.0], [0.0, 1.0]];

/// Number of indices drawn per frame once the fan is triangulated.
pub const QUAD_INDEX_COUNT: u32 = 6;

const POSITION_BUFFER_SIZE: u64 = std::mem::size_of::<[[f32; 4]; 4]>() as u64;

/// Expand a four-vertex triangle fan into a triangle list.
pub fn triangulate_fan(fan: &[u16; 4]) -> [u16; 6] {
    [fan[0], fan[1], fan[2], fan[0], fan[2], fan[3]]
}

/// Homogeneous corner positions for a target of `size`.
///
/// Axis-aligned, centered at the origin, on the z = 0 plane with w = 1.
pub fn quad_positions(size: TargetSize) -> [[f32; 4]; 4] {
    let hw = QUAD_SCALE * size.width / 2.0;
    let hh = QUAD_SCALE * size.height / 2.0;
    [
        [-hw, -hh, 0.0, 1.0],
        [-hw, hh, 0.0, 1.0],
        [hw, hh, 0.0, 1.0],
        [hw, -hh, 0.0, 1.0],
    ]
}

/// Index, texture-coordinate and position buffers of the overlay quad.
pub struct GeometryBufferSet {
    pub index_buffer: BufferHandle,
    pub tex_coord_buffer: BufferHandle,
    pub position_buffer: BufferHandle,
}

impl GeometryBufferSet {
    /// Upload the static buffers and allocate the position buffer.
    ///
    /// Anything created before a failure is destroyed again.
    pub fn create_static<B: GraphicsBackend>(backend: &mut B, label: &str) -> OverlayResult<Self> {
        let indices = triangulate_fan(&QUAD_FAN_INDICES);
        let mut created = Vec::with_capacity(3);

        let result = (|| -> BackendResult<Self> {
            let index_buffer = backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some("Overlay Indices".into()),
                    size: std::mem::size_of_val(&indices) as u64,
                    usage: BufferUsage::INDEX,
                },
                bytemuck::cast_slice(&indices),
            )?;
            created.push(GpuResource::Buffer(index_buffer));

            let tex_coord_buffer = backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some("Overlay Tex Coords".into()),
                    size: std::mem::size_of_val(&QUAD_TEX_COORDS) as u64,
                    usage: BufferUsage::VERTEX,
                },
                bytemuck::cast_slice(&QUAD_TEX_COORDS),
            )?;
            created.push(GpuResource::Buffer(tex_coord_buffer));

            let position_buffer = backend.create_buffer(&BufferDescriptor {
                label: Some("Overlay Positions".into()),
                size: POSITION_BUFFER_SIZE,
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            })?;
            created.push(GpuResource::Buffer(position_buffer));

            Ok(Self {
                index_buffer,
                tex_coord_buffer,
                position_buffer,
            })
        })();

        match result {
            Ok(set) => Ok(set),
            Err(error) => {
                for resource in created.iter().rev() {
                    resource.destroy(backend);
                }
                Err(OverlayError::from_backend(label, &error))
            }
        }
    }

    /// Rewrite the position buffer for a target of `size`.
    pub fn update_dynamic<B: GraphicsBackend>(&self, backend: &mut B, size: TargetSize) {
        let positions = quad_positions(size);
        backend.write_buffer(self.position_buffer, 0, bytemuck::cast_slice(&positions));
    }

    pub fn resources(&self) -> [GpuResource; 3] {
        [
            GpuResource::Buffer(self.index_buffer),
            GpuResource::Buffer(self.tex_coord_buffer),
            GpuResource::Buffer(self.position_buffer),
        ]
    }
}
