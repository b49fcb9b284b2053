//! Error types for the overlay compositor.

use thiserror::Error;

use crate::backend::{BackendError, GpuErrorCode, GraphicsBackend};

/// Errors that can occur while building or drawing the overlay.
///
/// `ShaderCompile` aborts construction. `Gpu` is fatal for the cycle that
/// raised it: a caller may skip the frame and try again on the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayError {
    /// Compiling, linking or introspecting the overlay program failed.
    #[error("{label}: shader error {code}: {detail}")]
    ShaderCompile {
        label: String,
        code: GpuErrorCode,
        detail: String,
    },

    /// A labeled batch of GPU work left entries in the error queue.
    #[error("{label}: gpu error {code}")]
    Gpu { label: String, code: GpuErrorCode },

    /// Input that can never be rendered (malformed bitmap, mismatched target).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl OverlayError {
    /// Wrap a backend failure raised while running the step named `label`.
    pub fn from_backend(label: &str, error: &BackendError) -> Self {
        log::error!("{}: {}", label, error);
        OverlayError::Gpu {
            label: label.to_string(),
            code: error.code(),
        }
    }

    /// The label of the step that failed, if any.
    pub fn label(&self) -> Option<&str> {
        match self {
            OverlayError::ShaderCompile { label, .. } | OverlayError::Gpu { label, .. } => {
                Some(label)
            }
            OverlayError::InvalidInput(_) => None,
        }
    }
}

/// Result type for overlay operations.
pub type OverlayResult<T> = Result<T, OverlayError>;

/// Drain the backend's error queue, logging every entry under `label`.
///
/// Returns the last code seen.
pub fn drain_gpu_errors<B: GraphicsBackend>(backend: &mut B, label: &str) -> Option<GpuErrorCode> {
    let mut last = None;
    while let Some(code) = backend.next_error() {
        log::error!("{}: gpu error {}", label, code);
        last = Some(code);
    }
    last
}

/// Fail with [`OverlayError::Gpu`] if the work labeled `label` raised any GPU error.
pub fn check_gpu_error<B: GraphicsBackend>(backend: &mut B, label: &str) -> OverlayResult<()> {
    match drain_gpu_errors(backend, label) {
        Some(code) => Err(OverlayError::Gpu {
            label: label.to_string(),
            code,
        }),
        None => Ok(()),
    }
}
