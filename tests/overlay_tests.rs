//! Integration tests for the overlay renderer.
//!
//! Tests are parameterized using `rstest` to run against every backend. The
//! wgpu cases are skipped on machines without an adapter.
//!
//! ```bash
//! cargo test --test overlay_tests
//! ```

#[macro_use]
mod common;

use rstest::rstest;

use common::{assert_pixel, get_pixel, solid_design, Backend, TestBackend, TestTarget};
use tattoo_overlay::backend::{GpuErrorCode, RecordedCall, TextureFormat};
use tattoo_overlay::pipeline::overlay_pass::{
    DRAW_LABEL, OVERLAY_FRAGMENT_SHADER, OVERLAY_VERTEX_SHADER, UPDATE_GEOMETRY_LABEL,
    UPLOAD_UNIFORMS_LABEL,
};
use tattoo_overlay::shader::{COMPILE_VERTEX_LABEL, RESOLVE_LABEL};
use tattoo_overlay::{
    DummyBackend, GraphicsBackend, Matrix44, OverlayError, OverlayRenderer, RendererConfig,
    TargetSize, WgpuBackend,
};

const WHITE: [u8; 4] = [255, 255, 255, 255];

fn sequential_matrix(start: f32) -> Matrix44 {
    let mut elements = [0.0; 16];
    for (i, e) in elements.iter_mut().enumerate() {
        *e = start + i as f32;
    }
    Matrix44::new(elements)
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Rendering and disposing on a healthy context leaves no errors behind.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_render_then_dispose(#[case] backend: Backend) {
    with_backend!(backend, |b| {
        let target = TestTarget::create(b, 32, 32, Some(TextureFormat::Depth32Float));
        let mut overlay =
            OverlayRenderer::new(b, &solid_design(WHITE), RendererConfig::default()).unwrap();

        for _ in 0..3 {
            overlay
                .render(
                    b,
                    &target.overlay_target(),
                    &Matrix44::IDENTITY,
                    &Matrix44::IDENTITY,
                    TargetSize::new(0.5, 0.5),
                )
                .unwrap();
        }

        assert!(overlay.dispose(b));
        assert_eq!(b.next_error(), None);
    });
}

/// After the context is lost, dispose issues no GPU calls and does not fail.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_dispose_after_context_loss(#[case] backend: Backend) {
    with_backend!(backend, |b| {
        let overlay =
            OverlayRenderer::new(b, &solid_design(WHITE), RendererConfig::default()).unwrap();
        let created_on = overlay.guard().context();

        b.lose_context();
        assert_ne!(b.current_context(), created_on);
        assert!(!overlay.dispose(b));
        assert_eq!(b.next_error(), None);
    });
}

#[test]
fn test_dispose_after_context_loss_issues_no_destroys() {
    let mut backend = DummyBackend::new();
    let overlay =
        OverlayRenderer::new(&mut backend, &solid_design(WHITE), RendererConfig::default())
            .unwrap();

    backend.lose_context();
    backend.clear_calls();
    overlay.dispose(&mut backend);

    assert_eq!(backend.destroy_count(), 0);
    assert!(backend.calls().is_empty());
}

// ============================================================================
// Construction failures
// ============================================================================

/// A vertex stage that does not compile aborts construction before any
/// backend object exists.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_bad_vertex_shader(#[case] backend: Backend) {
    with_backend!(backend, |b| {
        let err = OverlayRenderer::with_shaders(
            b,
            &solid_design(WHITE),
            RendererConfig::default(),
            "fn vs_main( {",
            OVERLAY_FRAGMENT_SHADER,
        )
        .err()
        .unwrap();

        match err {
            OverlayError::ShaderCompile { label, code, .. } => {
                assert_eq!(label, COMPILE_VERTEX_LABEL);
                assert_eq!(code, GpuErrorCode::Validation);
            }
            other => panic!("expected a shader error, got {:?}", other),
        }
        assert_eq!(b.next_error(), None);
    });
}

#[test]
fn test_bad_shader_allocates_nothing() {
    let mut backend = DummyBackend::new();
    let result = OverlayRenderer::with_shaders(
        &mut backend,
        &solid_design(WHITE),
        RendererConfig::default(),
        "fn vs_main( {",
        OVERLAY_FRAGMENT_SHADER,
    );

    assert!(result.is_err());
    assert!(backend.calls().iter().all(|call| !call.is_create()));
    assert!(backend.live_resources().is_empty());
}

/// A fragment stage without the design sampler cannot be resolved.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_fragment_without_sampler(#[case] backend: Backend) {
    const FRAGMENT: &str = r#"
@fragment
fn fs_main(@location(0) tex_coord: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(tex_coord, 0.0, 1.0);
}
"#;

    with_backend!(backend, |b| {
        let err = OverlayRenderer::with_shaders(
            b,
            &solid_design(WHITE),
            RendererConfig::default(),
            OVERLAY_VERTEX_SHADER,
            FRAGMENT,
        )
        .err()
        .unwrap();
        assert_eq!(err.label(), Some(RESOLVE_LABEL));
    });
}

#[test]
fn test_failed_pipeline_leaves_nothing_alive() {
    let mut backend = DummyBackend::new();
    backend.fail_next_pipeline(GpuErrorCode::OutOfMemory);

    let err = OverlayRenderer::new(&mut backend, &solid_design(WHITE), RendererConfig::default())
        .err()
        .unwrap();

    assert!(matches!(
        err,
        OverlayError::ShaderCompile {
            code: GpuErrorCode::OutOfMemory,
            ..
        }
    ));
    assert!(backend.live_resources().is_empty());
    assert_eq!(backend.next_error(), None);
}

// ============================================================================
// Per-frame behavior
// ============================================================================

#[test]
fn test_identical_frames_upload_identical_payloads() {
    let mut backend = DummyBackend::new();
    let target = TestTarget::create(&mut backend, 8, 8, Some(TextureFormat::Depth32Float));
    let mut overlay =
        OverlayRenderer::new(&mut backend, &solid_design(WHITE), RendererConfig::default())
            .unwrap();
    let projection = sequential_matrix(1.0);
    let pose = sequential_matrix(-8.0);
    let size = TargetSize::new(0.21, 0.297);

    backend.clear_calls();
    overlay
        .render(&mut backend, &target.overlay_target(), &projection, &pose, size)
        .unwrap();
    let first = backend.buffer_writes();

    backend.clear_calls();
    overlay
        .render(&mut backend, &target.overlay_target(), &projection, &pose, size)
        .unwrap();
    let second = backend.buffer_writes();

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
}

#[test]
fn test_frames_reuse_buffers() {
    let mut backend = DummyBackend::new();
    let target = TestTarget::create(&mut backend, 8, 8, Some(TextureFormat::Depth32Float));
    let mut overlay =
        OverlayRenderer::new(&mut backend, &solid_design(WHITE), RendererConfig::default())
            .unwrap();
    let live_before = backend.live_resources().len();

    backend.clear_calls();
    for i in 1..=4 {
        overlay
            .render(
                &mut backend,
                &target.overlay_target(),
                &Matrix44::IDENTITY,
                &Matrix44::IDENTITY,
                TargetSize::new(i as f32, i as f32),
            )
            .unwrap();
    }

    assert!(backend.calls().iter().all(|call| !call.is_create()));
    assert_eq!(backend.live_resources().len(), live_before);
    let draws = backend
        .calls()
        .iter()
        .filter(|call| matches!(call, RecordedCall::DrawIndexed { .. }))
        .count();
    assert_eq!(draws, 4);
}

#[rstest]
#[case::geometry(0, UPDATE_GEOMETRY_LABEL)]
#[case::submit(1, DRAW_LABEL)]
fn test_gpu_error_aborts_frame(#[case] stage: usize, #[case] label: &str) {
    let mut backend = DummyBackend::new();
    let target = TestTarget::create(&mut backend, 8, 8, Some(TextureFormat::Depth32Float));
    let mut overlay =
        OverlayRenderer::new(&mut backend, &solid_design(WHITE), RendererConfig::default())
            .unwrap();

    match stage {
        0 => backend.inject_error(GpuErrorCode::Validation),
        _ => backend.fail_next_submit(GpuErrorCode::Validation),
    }

    let err = overlay
        .render(
            &mut backend,
            &target.overlay_target(),
            &Matrix44::IDENTITY,
            &Matrix44::IDENTITY,
            TargetSize::new(1.0, 1.0),
        )
        .unwrap_err();
    assert_eq!(
        err,
        OverlayError::Gpu {
            label: label.to_string(),
            code: GpuErrorCode::Validation,
        }
    );

    // The next frame starts from a clean queue and a closed pass
    overlay
        .render(
            &mut backend,
            &target.overlay_target(),
            &Matrix44::IDENTITY,
            &Matrix44::IDENTITY,
            TargetSize::new(1.0, 1.0),
        )
        .unwrap();
}

#[test]
fn test_error_after_geometry_is_labeled_uniform_upload() {
    let mut backend = DummyBackend::new();
    let target = TestTarget::create(&mut backend, 8, 8, Some(TextureFormat::Depth32Float));
    let mut overlay =
        OverlayRenderer::new(&mut backend, &solid_design(WHITE), RendererConfig::default())
            .unwrap();

    // Uploads into a destroyed uniform buffer fail while geometry stays valid
    let uniform_buffer = overlay.resources()[1];
    uniform_buffer.destroy(&mut backend);
    assert_eq!(backend.next_error(), None);

    let err = overlay
        .render(
            &mut backend,
            &target.overlay_target(),
            &Matrix44::IDENTITY,
            &Matrix44::IDENTITY,
            TargetSize::new(1.0, 1.0),
        )
        .unwrap_err();
    assert_eq!(err.label(), Some(UPLOAD_UNIFORMS_LABEL));
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_depthless_configuration(#[case] backend: Backend) {
    with_backend!(backend, |b| {
        let config = RendererConfig {
            depth_format: None,
            ..Default::default()
        };
        let target = TestTarget::create(b, 16, 16, None);
        let mut overlay = OverlayRenderer::new(b, &solid_design(WHITE), config).unwrap();

        overlay
            .render(
                b,
                &target.overlay_target(),
                &Matrix44::IDENTITY,
                &Matrix44::IDENTITY,
                TargetSize::new(1.0, 1.0),
            )
            .unwrap();
        assert!(overlay.dispose(b));
    });
}

#[test]
fn test_non_finite_size_is_rejected() {
    let mut backend = DummyBackend::new();
    let target = TestTarget::create(&mut backend, 8, 8, Some(TextureFormat::Depth32Float));
    let mut overlay =
        OverlayRenderer::new(&mut backend, &solid_design(WHITE), RendererConfig::default())
            .unwrap();

    let err = overlay
        .render(
            &mut backend,
            &target.overlay_target(),
            &Matrix44::IDENTITY,
            &Matrix44::IDENTITY,
            TargetSize::new(f32::NAN, 1.0),
        )
        .unwrap_err();
    assert!(matches!(err, OverlayError::InvalidInput(_)));
}

// ============================================================================
// Pixel output
// ============================================================================

fn render_pixels(
    backend: &mut WgpuBackend,
    design: [u8; 4],
    clear: [f32; 4],
) -> Vec<u8> {
    const SIZE: u32 = 64;
    let target = TestTarget::create(backend, SIZE, SIZE, Some(TextureFormat::Depth32Float));
    let mut overlay =
        OverlayRenderer::new(backend, &solid_design(design), RendererConfig::default()).unwrap();

    overlay
        .render(
            backend,
            &target.overlay_target().with_clear(clear),
            &Matrix44::IDENTITY,
            &Matrix44::IDENTITY,
            TargetSize::new(1.0, 1.0),
        )
        .unwrap();

    let pixels = backend
        .read_texture_rgba8(target.color_texture, SIZE, SIZE)
        .unwrap();
    overlay.dispose(backend);
    pixels
}

/// The quad fills the target; its center is tinted skin, its corners faded out.
#[test]
fn test_stencil_is_tinted_and_faded() {
    let Some(mut backend) = common::wgpu_backend() else {
        return;
    };
    let pixels = render_pixels(&mut backend, WHITE, [0.0, 0.0, 0.0, 1.0]);

    assert_pixel(get_pixel(&pixels, 64, 32, 32), [254, 227, 212, 255], 2);
    assert_pixel(get_pixel(&pixels, 64, 0, 0), [0, 0, 0, 255], 2);
    assert_pixel(get_pixel(&pixels, 64, 63, 63), [0, 0, 0, 255], 2);
}

/// Ink passes through untouched everywhere, including the corners.
#[test]
fn test_ink_is_not_faded() {
    let Some(mut backend) = common::wgpu_backend() else {
        return;
    };
    let pixels = render_pixels(&mut backend, [0, 0, 0, 255], [0.0, 0.0, 1.0, 1.0]);

    assert_pixel(get_pixel(&pixels, 64, 32, 32), [0, 0, 0, 255], 2);
    assert_pixel(get_pixel(&pixels, 64, 0, 0), [0, 0, 0, 255], 2);
}
