//! CPU-side staging of the overlay uniform block.

use super::UniformLayout;

/// Bytes of the uniform buffer, written at offsets resolved from the shader.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    layout: UniformLayout,
    data: Vec<u8>,
}

impl UniformBlock {
    pub fn new(layout: UniformLayout) -> Self {
        Self {
            data: vec![0; layout.size as usize],
            layout,
        }
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn write_mat4(&mut self, offset: u32, columns: &[f32; 16]) {
        self.write(offset, bytemuck::cast_slice(columns));
    }

    pub fn write_vec3(&mut self, offset: u32, value: &[f32; 3]) {
        self.write(offset, bytemuck::cast_slice(value));
    }

    pub fn write_f32(&mut self, offset: u32, value: f32) {
        self.write(offset, bytemuck::bytes_of(&value));
    }

    /// Member offsets and types are checked when the program is resolved,
    /// so a write outside the block is a caller bug.
    fn write(&mut self, offset: u32, bytes: &[u8]) {
        let start = offset as usize;
        let end = start + bytes.len();
        debug_assert!(
            end <= self.data.len(),
            "uniform write of {} bytes at {} exceeds block size {}",
            bytes.len(),
            offset,
            self.layout.size
        );
        if let Some(dst) = self.data.get_mut(start..end) {
            dst.copy_from_slice(bytes);
        }
    }
}
