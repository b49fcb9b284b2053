//! Overlay blend constants and a CPU reference of the fragment stage.
//!
//! The fragment shader classifies every design texel. Any texel brighter than
//! [`STENCIL_THRESHOLD`] is skin-toned with [`SKIN_TINT`] and faded out
//! radially: fully opaque inside [`MARKER_RADIUS`], fully transparent beyond
//! [`FADE_RADIUS`] and blended in between. Darker texels pass through
//! untouched. The functions here mirror the WGSL so the math can be tested
//! without a GPU.

use std::f32::consts::SQRT_2;

/// Quad half-extent multiplier relative to the tracked target.
pub const QUAD_SCALE: f32 = 2.0;

/// Texels whose stencil value exceeds this are tinted and faded.
pub const STENCIL_THRESHOLD: f32 = 0.8;

/// Skin tone multiplied into tinted texels, (254, 227, 212) / 255.
pub const SKIN_TINT: [f32; 3] = [254.0 / 255.0, 227.0 / 255.0, 212.0 / 255.0];

/// Texture-space radius inside which tinted texels stay opaque.
pub const MARKER_RADIUS: f32 = SQRT_2 / (2.0 * QUAD_SCALE);

/// Texture-space radius beyond which tinted texels vanish.
pub const FADE_RADIUS: f32 = SQRT_2 * (0.25 + 1.0 / (4.0 * QUAD_SCALE));

/// Center of the design in texture coordinates.
pub const DESIGN_CENTER: [f32; 2] = [0.5, 0.5];

/// Stencil value of a texel: `1.0` for any non-black color, `0.0` for black.
///
/// This is the scalar normalisation of the color's length, which collapses
/// every non-zero length to one.
pub fn stencil_value(rgb: [f32; 3]) -> f32 {
    let length = (rgb[0] * rgb[0] + rgb[1] * rgb[1] + rgb[2] * rgb[2]).sqrt();
    if length > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Alpha of a tinted texel at distance `dist` from the design center.
pub fn fade_alpha(dist: f32, value: f32, marker_radius: f32, fade_radius: f32) -> f32 {
    if dist < marker_radius {
        1.0
    } else if dist > fade_radius {
        0.0
    } else {
        let t = (dist - fade_radius) / (marker_radius - fade_radius);
        1.0 - value * (1.0 - t)
    }
}

/// Distance of a texture coordinate from [`DESIGN_CENTER`].
pub fn center_distance(uv: [f32; 2]) -> f32 {
    let dx = uv[0] - DESIGN_CENTER[0];
    let dy = uv[1] - DESIGN_CENTER[1];
    (dx * dx + dy * dy).sqrt()
}

/// The color the fragment stage outputs for `sample` at `uv`.
pub fn shade(sample: [f32; 4], uv: [f32; 2]) -> [f32; 4] {
    let value = stencil_value([sample[0], sample[1], sample[2]]);
    if value <= STENCIL_THRESHOLD {
        return sample;
    }

    let alpha = fade_alpha(center_distance(uv), value, MARKER_RADIUS, FADE_RADIUS);
    [
        sample[0] * SKIN_TINT[0],
        sample[1] * SKIN_TINT[1],
        sample[2] * SKIN_TINT[2],
        alpha,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_radii() {
        assert!((MARKER_RADIUS - 0.353_553_4).abs() < EPS);
        assert!((FADE_RADIUS - 0.530_330_1).abs() < EPS);
        assert!((MARKER_RADIUS - SQRT_2 / 4.0).abs() < EPS);
        assert!((FADE_RADIUS - SQRT_2 * 0.375).abs() < EPS);
    }

    #[rstest]
    #[case::center(0.0)]
    #[case::just_inside(MARKER_RADIUS - 0.001)]
    fn test_opaque_inside_marker(#[case] dist: f32) {
        assert_eq!(fade_alpha(dist, 1.0, MARKER_RADIUS, FADE_RADIUS), 1.0);
    }

    #[rstest]
    #[case::just_outside(FADE_RADIUS + 0.001)]
    #[case::corner(SQRT_2 / 2.0)]
    fn test_transparent_beyond_fade(#[case] dist: f32) {
        assert_eq!(fade_alpha(dist, 1.0, MARKER_RADIUS, FADE_RADIUS), 0.0);
    }

    #[test]
    fn test_band_endpoints() {
        let value = 0.9;
        let at_marker = fade_alpha(MARKER_RADIUS, value, MARKER_RADIUS, FADE_RADIUS);
        let at_fade = fade_alpha(FADE_RADIUS, value, MARKER_RADIUS, FADE_RADIUS);
        assert!((at_marker - 1.0).abs() < EPS);
        assert!((at_fade - (1.0 - value)).abs() < EPS);
    }

    #[test]
    fn test_band_is_monotonic() {
        let mut previous = 1.0;
        for step in 0..=20 {
            let dist = MARKER_RADIUS + (FADE_RADIUS - MARKER_RADIUS) * step as f32 / 20.0;
            let alpha = fade_alpha(dist, 1.0, MARKER_RADIUS, FADE_RADIUS);
            assert!(alpha <= previous + EPS);
            previous = alpha;
        }
    }

    #[test]
    fn test_stencil_value_is_binary() {
        assert_eq!(stencil_value([0.0, 0.0, 0.0]), 0.0);
        assert_eq!(stencil_value([0.01, 0.0, 0.0]), 1.0);
        assert_eq!(stencil_value([1.0, 1.0, 1.0]), 1.0);
    }

    #[test]
    fn test_black_passes_through() {
        let sample = [0.0, 0.0, 0.0, 0.4];
        assert_eq!(shade(sample, [0.5, 0.5]), sample);
        assert_eq!(shade(sample, [0.0, 0.0]), sample);
    }

    #[test]
    fn test_white_center_is_tinted_and_opaque() {
        let out = shade([1.0, 1.0, 1.0, 0.2], [0.5, 0.5]);
        assert_eq!(out, [SKIN_TINT[0], SKIN_TINT[1], SKIN_TINT[2], 1.0]);
    }

    #[test]
    fn test_white_corner_is_transparent() {
        let out = shade([1.0, 1.0, 1.0, 1.0], [0.0, 0.0]);
        assert_eq!(out[3], 0.0);
    }
}
