//! Per-frame inputs supplied by the AR tracker.

use glam::Mat4;

/// A 4x4 matrix in the tracker's element order.
///
/// The tracker hands out sixteen floats whose order is the transpose of what
/// the GPU expects for a column-major `mat4x4<f32>`. Convert with
/// [`Matrix44::to_gpu_layout`] right before upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix44(pub [f32; 16]);

impl Matrix44 {
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    pub fn new(elements: [f32; 16]) -> Self {
        Self(elements)
    }

    pub fn elements(&self) -> &[f32; 16] {
        &self.0
    }

    /// Swap rows and columns.
    pub fn transposed(&self) -> Self {
        Self(Mat4::from_cols_array(&self.0).transpose().to_cols_array())
    }

    /// The sixteen floats to write into a column-major GPU matrix.
    ///
    /// Element `i` of the result is the tracker's element `(i % 4) * 4 + i / 4`.
    pub fn to_gpu_layout(&self) -> [f32; 16] {
        self.transposed().0
    }

    /// The matrix as the GPU will interpret it.
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols_array(&self.to_gpu_layout())
    }
}

impl Default for Matrix44 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<[f32; 16]> for Matrix44 {
    fn from(elements: [f32; 16]) -> Self {
        Self(elements)
    }
}

/// Physical size of the tracked target, in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TargetSize {
    pub width: f32,
    pub height: f32,
}

impl TargetSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl From<(f32, f32)> for TargetSize {
    fn from((width, height): (f32, f32)) -> Self {
        Self { width, height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequential() -> Matrix44 {
        let mut elements = [0.0; 16];
        for (i, e) in elements.iter_mut().enumerate() {
            *e = i as f32;
        }
        Matrix44(elements)
    }

    #[test]
    fn test_transpose_twice_is_identity() {
        let m = sequential();
        assert_eq!(m.transposed().transposed(), m);
    }

    #[test]
    fn test_gpu_layout_swaps_rows_and_columns() {
        let gpu = sequential().to_gpu_layout();
        assert_eq!(&gpu[..4], &[0.0, 4.0, 8.0, 12.0]);
        assert_eq!(&gpu[4..8], &[1.0, 5.0, 9.0, 13.0]);
        assert_eq!(gpu[15], 15.0);
    }

    #[test]
    fn test_translation_lands_in_last_column() {
        // Row-major storage keeps the translation at 3, 7 and 11
        let mut elements = Matrix44::IDENTITY.0;
        elements[3] = 2.0;
        elements[7] = -1.0;
        elements[11] = 0.5;
        let m = Matrix44(elements).to_mat4();
        assert_eq!(m.w_axis.truncate(), glam::Vec3::new(2.0, -1.0, 0.5));
    }

    #[test]
    fn test_identity_is_layout_invariant() {
        assert_eq!(Matrix44::IDENTITY.to_gpu_layout(), Matrix44::IDENTITY.0);
    }
}
