//! Plain-data descriptions of the GPU objects the overlay creates.
//!
//! Only what the compositor needs is modelled here. Each backend maps these
//! onto its own API.

/// Declares a set of combinable usage bits.
macro_rules! usage_flags {
    ($(#[$meta:meta])* $name:ident { $($flag:ident = $bit:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            $(pub const $flag: Self = Self(1 << $bit);)+

            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

/// Formats of design textures, render targets and depth buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }
}

usage_flags!(
    /// How a texture may be used
    TextureUsage {
        COPY_SRC = 0,
        COPY_DST = 1,
        TEXTURE_BINDING = 2,
        RENDER_ATTACHMENT = 3,
    }
);

usage_flags!(
    /// How a buffer may be used
    BufferUsage {
        COPY_DST = 0,
        INDEX = 1,
        VERTEX = 2,
        UNIFORM = 3,
    }
);

usage_flags!(
    /// Stages a binding is visible to
    ShaderStageFlags {
        VERTEX = 0,
        FRAGMENT = 1,
    }
);

impl ShaderStageFlags {
    pub const VERTEX_FRAGMENT: Self = Self(0b11);
}

/// A 2D texture with `mip_levels` levels
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

/// Attribute formats a shader input can be declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn size(self) -> u64 {
        match self {
            VertexFormat::Float32 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

/// A per-vertex buffer and the attributes read from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexBufferLayout {
    /// Layout of a buffer holding a single tightly packed attribute.
    pub fn single(location: u32, format: VertexFormat) -> Self {
        Self {
            array_stride: format.size(),
            attributes: vec![VertexAttribute {
                location,
                format,
                offset: 0,
            }],
        }
    }
}

/// Sampler for a design texture.
///
/// Filtering is linear within and between mip levels, and coordinates
/// repeat in both directions.
#[derive(Debug, Clone)]
pub struct SamplerDescriptor {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_flags_combine() {
        let usage = BufferUsage::VERTEX | BufferUsage::COPY_DST;
        assert!(usage.contains(BufferUsage::VERTEX));
        assert!(usage.contains(BufferUsage::COPY_DST));
        assert!(!usage.contains(BufferUsage::UNIFORM));
        assert!(!BufferUsage::VERTEX.contains(usage));
    }

    #[test]
    fn test_both_stages() {
        let both = ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT;
        assert_eq!(both, ShaderStageFlags::VERTEX_FRAGMENT);
    }

    #[test]
    fn test_depth_formats() {
        assert!(TextureFormat::Depth32Float.is_depth());
        assert!(!TextureFormat::Rgba8Unorm.is_depth());
    }
}
