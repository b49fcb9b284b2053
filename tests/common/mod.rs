//! Common utilities for overlay integration tests.
//!
//! Tests are written once against [`TestBackend`] and run on every backend
//! through [`with_backend!`]. Backends that cannot be created on the current
//! machine are skipped.

#![allow(dead_code)]

use tattoo_overlay::backend::{
    TextureDescriptor, TextureFormat, TextureHandle, TextureUsage, TextureViewHandle,
};
use tattoo_overlay::{
    init_logging, DesignBitmap, DummyBackend, GraphicsBackend, LoggingConfig, OverlayTarget,
    WgpuBackend,
};

/// Available backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Recording backend, always available.
    Dummy,
    /// wgpu on whatever adapter the machine offers.
    Wgpu,
}

/// A backend whose context can be lost on demand.
pub trait TestBackend: GraphicsBackend {
    fn lose_context(&mut self);
}

impl TestBackend for DummyBackend {
    fn lose_context(&mut self) {
        DummyBackend::lose_context(self);
    }
}

impl TestBackend for WgpuBackend {
    fn lose_context(&mut self) {
        self.mark_context_lost();
    }
}

pub fn init_test_logging() {
    init_logging(LoggingConfig {
        is_test: true,
        ..Default::default()
    });
}

/// A headless wgpu backend, or `None` when no adapter is available.
pub fn wgpu_backend() -> Option<WgpuBackend> {
    init_test_logging();
    match WgpuBackend::new_headless() {
        Ok(backend) => Some(backend),
        Err(e) => {
            eprintln!("wgpu not available: {}", e);
            None
        }
    }
}

/// Run `$body` with `$b` bound to a `&mut` backend of the given kind.
macro_rules! with_backend {
    ($backend:expr, |$b:ident| $body:block) => {
        match $backend {
            $crate::common::Backend::Dummy => {
                $crate::common::init_test_logging();
                let mut backend = tattoo_overlay::DummyBackend::new();
                let $b = &mut backend;
                $body
            }
            $crate::common::Backend::Wgpu => {
                let Some(mut backend) = $crate::common::wgpu_backend() else {
                    eprintln!("Backend {:?} not available, skipping", $backend);
                    return;
                };
                let $b = &mut backend;
                $body
            }
        }
    };
}

/// Color and depth attachments of an offscreen frame.
pub struct TestTarget {
    pub color_texture: TextureHandle,
    pub color: TextureViewHandle,
    pub depth_texture: Option<TextureHandle>,
    pub depth: Option<TextureViewHandle>,
}

impl TestTarget {
    pub fn create<B: GraphicsBackend>(
        backend: &mut B,
        width: u32,
        height: u32,
        depth: Option<TextureFormat>,
    ) -> Self {
        let color_texture = backend
            .create_texture(&TextureDescriptor {
                label: Some("Test Color".into()),
                width,
                height,
                mip_levels: 1,
                format: TextureFormat::Rgba8Unorm,
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
            })
            .expect("color target");
        let color = backend
            .create_texture_view(color_texture)
            .expect("color view");

        let (depth_texture, depth) = match depth {
            Some(format) => {
                let texture = backend
                    .create_texture(&TextureDescriptor {
                        label: Some("Test Depth".into()),
                        width,
                        height,
                        mip_levels: 1,
                        format,
                        usage: TextureUsage::RENDER_ATTACHMENT,
                    })
                    .expect("depth target");
                let view = backend.create_texture_view(texture).expect("depth view");
                (Some(texture), Some(view))
            }
            None => (None, None),
        };

        Self {
            color_texture,
            color,
            depth_texture,
            depth,
        }
    }

    pub fn overlay_target(&self) -> OverlayTarget {
        OverlayTarget {
            color: self.color,
            depth: self.depth,
            clear: None,
        }
    }
}

pub fn solid_design(color: [u8; 4]) -> DesignBitmap {
    DesignBitmap::solid_color(16, 16, color).expect("solid design")
}

/// RGBA of pixel `(x, y)` in tightly packed RGBA8 rows.
pub fn get_pixel(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
}

/// Assert every channel is within `tolerance` of `expected`.
pub fn assert_pixel(actual: [u8; 4], expected: [u8; 4], tolerance: u8) {
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert!(
            a.abs_diff(*e) <= tolerance,
            "pixel {:?} differs from {:?} by more than {}",
            actual,
            expected,
            tolerance
        );
    }
}
