//! Overlay rendering pipeline
//!
//! The overlay is drawn in a single pass:
//! 1. Rewrite the quad positions for the target size
//! 2. Upload pose, projection and the fixed blend parameters
//! 3. Draw the textured quad inside a scoped render pass
//!
//! [`blend`] holds the blend constants and a CPU mirror of the fragment math.

pub mod blend;
pub mod overlay_pass;
pub mod scope;

pub use overlay_pass::{OverlayRenderer, OverlayTarget, OVERLAY_FRAGMENT_SHADER, OVERLAY_VERTEX_SHADER};
pub use scope::RenderPassScope;
