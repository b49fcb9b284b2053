//! Tattoo Overlay - a real-time AR compositor for tattoo designs
//!
//! Draws a tattoo design onto a flat target tracked by an external AR engine.
//! Every tracked frame the engine supplies a projection, a pose and the
//! target's physical size; [`OverlayRenderer`] turns them into one blended
//! draw call.
//!
//! # Features
//! - Backend abstraction with a wgpu implementation and a recording dummy
//! - WGSL shaders introspected with naga for locations and uniform offsets
//! - Mipmapped design textures decoded with the `image` crate
//! - Radial fade and skin-tone tint of the stencil background
//! - Context-aware teardown that skips deletion after context loss

pub mod backend;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod pipeline;
pub mod resources;
pub mod shader;
pub mod tracking;

pub use backend::{DummyBackend, GraphicsBackend, TextureFormat};
pub use error::{OverlayError, OverlayResult};
pub use lifecycle::ResourceLifecycleGuard;
pub use logging::{init_logging, LoggingConfig};
pub use pipeline::{OverlayRenderer, OverlayTarget};
pub use resources::DesignBitmap;
pub use tracking::{Matrix44, TargetSize};

// Re-export wgpu backend for direct access
pub use backend::wgpu_backend::WgpuBackend;

/// Configuration for creating an overlay renderer
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Label used for the pipeline, render pass and log lines
    pub label: String,
    /// Format of the color target the overlay is drawn into
    pub color_format: TextureFormat,
    /// Depth format of the target, `None` to draw without depth testing
    pub depth_format: Option<TextureFormat>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            label: "Tattoo Overlay".to_string(),
            color_format: TextureFormat::Rgba8Unorm,
            depth_format: Some(TextureFormat::Depth32Float),
        }
    }
}
