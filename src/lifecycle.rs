//! Context-aware release of GPU resources.
//!
//! GPU objects belong to the context they were created on. When the host
//! loses that context (backgrounding, surface or device loss) the objects
//! are already gone, and deleting them through the new context would hit
//! unrelated objects or raise errors. [`ResourceLifecycleGuard`] remembers
//! the creating context and only lets deletion through while it is current.

use crate::backend::{ContextId, GpuResource, GraphicsBackend};

/// Records the context identity at creation and gates teardown on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLifecycleGuard {
    context: ContextId,
}

impl ResourceLifecycleGuard {
    /// Capture the backend's current context as the baseline.
    pub fn capture<B: GraphicsBackend>(backend: &B) -> Self {
        Self {
            context: backend.current_context(),
        }
    }

    /// The context the guarded resources were created on.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Whether the creating context is still the backend's current one.
    pub fn is_current<B: GraphicsBackend>(&self, backend: &B) -> bool {
        backend.current_context() == self.context
    }

    /// Destroy `resources` if the creating context is still current.
    ///
    /// On a mismatch no GPU call is issued. Returns whether deletion ran.
    pub fn release<B: GraphicsBackend>(&self, backend: &mut B, resources: &[GpuResource]) -> bool {
        if !self.is_current(backend) {
            log::debug!(
                "Skipping release of {} resources: created on {:?}, current is {:?}",
                resources.len(),
                self.context,
                backend.current_context()
            );
            return false;
        }

        // Dependents first
        for resource in resources.iter().rev() {
            resource.destroy(backend);
        }
        true
    }
}
