//! # Overlay Preview
//!
//! Renders one overlay frame offscreen and saves it as a PNG.
//!
//! Stands in for the AR engine: the pose looks at the target from a fixed
//! distance and the projection is a GL-style perspective, both handed over in
//! the tracker's element order.
//!
//! ```text
//! cargo run --example overlay_preview -- --design ink.png --output frame.png
//! ```

use std::path::PathBuf;

use clap::Parser;
use glam::{Mat4, Vec3};
use tattoo_overlay::backend::{TextureDescriptor, TextureUsage};
use tattoo_overlay::{
    init_logging, DesignBitmap, GraphicsBackend, LoggingConfig, Matrix44, OverlayRenderer,
    OverlayTarget, RendererConfig, TargetSize, TextureFormat, WgpuBackend,
};

/// Offscreen preview of the tattoo overlay
#[derive(Debug, Parser)]
#[command(name = "overlay_preview", about = "Render one tattoo overlay frame to a PNG")]
struct Args {
    /// Design image; a generated ring stencil is used when omitted
    #[arg(long)]
    design: Option<PathBuf>,

    /// Where to write the rendered frame
    #[arg(long, default_value = "overlay_preview.png")]
    output: PathBuf,

    /// Output width in pixels
    #[arg(long, default_value_t = 512)]
    width: u32,

    /// Output height in pixels
    #[arg(long, default_value_t = 512)]
    height: u32,

    /// Physical width of the tracked target
    #[arg(long, default_value_t = 0.2)]
    target_width: f32,

    /// Physical height of the tracked target
    #[arg(long, default_value_t = 0.2)]
    target_height: f32,

    /// Camera distance from the target
    #[arg(long, default_value_t = 0.6)]
    distance: f32,

    /// Log filter, e.g. `debug` or `tattoo_overlay=trace`
    #[arg(long)]
    log: Option<String>,
}

/// Dark ink ring on a white stencil background.
fn ring_design(size: u32) -> tattoo_overlay::OverlayResult<DesignBitmap> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    let center = size as f32 / 2.0;
    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 + 0.5 - center;
            let dy = y as f32 + 0.5 - center;
            let r = (dx * dx + dy * dy).sqrt() / center;
            let color: [u8; 4] = if (0.35..0.5).contains(&r) {
                [20, 20, 30, 255]
            } else {
                [255, 255, 255, 255]
            };
            pixels.extend_from_slice(&color);
        }
    }
    DesignBitmap::from_rgba8(size, size, pixels)
}

/// Hand a glam matrix over the way the tracker stores it.
fn tracker_order(matrix: Mat4) -> Matrix44 {
    Matrix44::new(matrix.transpose().to_cols_array())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(LoggingConfig {
        filter: args.log.clone(),
        ..Default::default()
    });

    let design = match &args.design {
        Some(path) => DesignBitmap::from_file(path)?,
        None => ring_design(256)?,
    };

    let mut backend = WgpuBackend::new_headless()?;
    let config = RendererConfig::default();
    let (color_texture, color_view) =
        backend.create_render_target(args.width, args.height, config.color_format)?;
    let depth_texture = backend.create_texture(&TextureDescriptor {
        label: Some("Preview Depth".into()),
        width: args.width,
        height: args.height,
        mip_levels: 1,
        format: TextureFormat::Depth32Float,
        usage: TextureUsage::RENDER_ATTACHMENT,
    })?;
    let depth_view = backend.create_texture_view(depth_texture)?;

    let mut overlay = OverlayRenderer::new(&mut backend, &design, config)?;

    let aspect = args.width as f32 / args.height as f32;
    let projection = tracker_order(Mat4::perspective_rh_gl(50f32.to_radians(), aspect, 0.01, 10.0));
    let pose = tracker_order(Mat4::look_at_rh(
        Vec3::new(0.0, 0.0, args.distance),
        Vec3::ZERO,
        Vec3::Y,
    ));
    let target = OverlayTarget::new(color_view)
        .with_depth(depth_view)
        .with_clear([0.35, 0.45, 0.55, 1.0]);

    overlay.render(
        &mut backend,
        &target,
        &projection,
        &pose,
        TargetSize::new(args.target_width, args.target_height),
    )?;

    let pixels = backend.read_texture_rgba8(color_texture, args.width, args.height)?;
    image::save_buffer(
        &args.output,
        &pixels,
        args.width,
        args.height,
        image::ColorType::Rgba8,
    )?;
    log::info!("Wrote {}", args.output.display());

    overlay.dispose(&mut backend);
    backend.destroy_texture_view(depth_view);
    backend.destroy_texture(depth_texture);
    backend.destroy_texture_view(color_view);
    backend.destroy_texture(color_texture);
    Ok(())
}
