//! Scoped render pass recording

use std::ops::{Deref, DerefMut};

use crate::backend::{GraphicsBackend, RenderPassDescriptor};

/// An open render pass that is ended when the scope is dropped.
///
/// Dereferences to the backend so pass commands can be recorded directly.
/// Every exit path (including an early return) closes the pass, so no
/// pipeline, buffer or bind group binding outlives the overlay draw.
pub struct RenderPassScope<'a, B: GraphicsBackend> {
    backend: &'a mut B,
}

impl<'a, B: GraphicsBackend> RenderPassScope<'a, B> {
    pub fn begin(backend: &'a mut B, desc: &RenderPassDescriptor) -> Self {
        backend.begin_render_pass(desc);
        Self { backend }
    }
}

impl<B: GraphicsBackend> Deref for RenderPassScope<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<B: GraphicsBackend> DerefMut for RenderPassScope<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.backend
    }
}

impl<B: GraphicsBackend> Drop for RenderPassScope<'_, B> {
    fn drop(&mut self) {
        self.backend.end_render_pass();
    }
}
