//! GPU access for the compositor.
//!
//! [`GraphicsBackend`] is implemented by [`wgpu_backend::WgpuBackend`] for
//! real rendering and by [`DummyBackend`], which records calls so the
//! compositor can be tested without a GPU.

pub mod dummy;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use dummy::{DummyBackend, RecordedCall};
pub use traits::*;
pub use types::*;
