//! # Spinning Shapes
//!
//! Opens a window and drives the frame loop: a ring of textured primitives
//! lit by a directional light, plus an orthographic HUD pass.
//!
//! Shaders are read from `shaders/vertex.spv` and `shaders/fragment.spv`
//! unless overridden on the command line.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use glam::{Vec2, Vec3};
use lilium_frame::{
    CameraSettings, DirectionalLight, GeometryHandle, Material, PresentMode, RenderDevice,
    Renderable, RendererConfig, SamplerKind, TextureData, Transform, ValidationLevel,
};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::window::WindowBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliPresentMode {
    /// Vsync.
    Fifo,
    /// Uncapped, no tearing. Falls back to FIFO when unsupported.
    #[default]
    Mailbox,
    /// Uncapped, may tear. Falls back to FIFO when unsupported.
    Immediate,
}

impl From<CliPresentMode> for PresentMode {
    fn from(mode: CliPresentMode) -> Self {
        match mode {
            CliPresentMode::Fifo => PresentMode::Fifo,
            CliPresentMode::Mailbox => PresentMode::Mailbox,
            CliPresentMode::Immediate => PresentMode::Immediate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliValidationLevel {
    Verbose,
    Info,
    Warning,
    Error,
}

impl From<CliValidationLevel> for ValidationLevel {
    fn from(level: CliValidationLevel) -> Self {
        match level {
            CliValidationLevel::Verbose => ValidationLevel::Verbose,
            CliValidationLevel::Info => ValidationLevel::Info,
            CliValidationLevel::Warning => ValidationLevel::Warning,
            CliValidationLevel::Error => ValidationLevel::Error,
        }
    }
}

/// Spinning primitives rendered through lilium-frame.
#[derive(Parser, Debug)]
#[command(name = "spinning_shapes", version)]
struct Args {
    /// Window width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Window height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Swapchain present mode.
    #[arg(long, default_value = "mailbox", value_enum)]
    present_mode: CliPresentMode,

    /// Enable the Khronos validation layer.
    #[arg(long)]
    validation: bool,

    /// Least severe validation message to log.
    #[arg(long, default_value = "error", value_enum)]
    validation_level: CliValidationLevel,

    /// Compiled SPIR-V vertex shader.
    #[arg(long, default_value = "shaders/vertex.spv")]
    vertex_shader: PathBuf,

    /// Compiled SPIR-V fragment shader.
    #[arg(long, default_value = "shaders/fragment.spv")]
    fragment_shader: PathBuf,

    /// Texture applied to the shapes. A checkerboard is used when omitted.
    #[arg(long)]
    texture: Option<PathBuf>,

    /// Exit after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

struct Scene {
    shapes: Vec<Renderable>,
    /// Leading entries of `shapes` that rotate.
    spinning: usize,
    hud: Vec<Renderable>,
    light: DirectionalLight,
    camera: CameraSettings,
    hud_camera: CameraSettings,
}

fn load_scene(device: &mut RenderDevice, args: &Args) -> lilium_frame::RendererResult<Scene> {
    let texture_data = match &args.texture {
        Some(path) => TextureData::from_file(path)?,
        None => TextureData::checkerboard(256, [230, 230, 230, 255], [40, 40, 40, 255]),
    };
    let texture = device.load_texture_data(&texture_data, true)?;
    let overlay = device.load_texture_data(
        &TextureData::solid_color([255, 200, 0, 160], "hud overlay"),
        false,
    )?;

    let geometries: Vec<GeometryHandle> = vec![
        device.load_cube(1.0)?,
        device.load_sphere(0.6, 32, 16)?,
        device.load_cylinder(0.5, 0.5, 1.2, 24, 1)?,
        device.load_cone(0.6, 1.2, 24, 1)?,
    ];
    let floor = device.load_plane(12.0)?;
    let hud_quad = device.load_plane(0.2)?;

    // Every texture is loaded, so the descriptor array can be written once
    device.refresh_descriptor_sets()?;

    let spinning = geometries.len();
    let count = spinning as f32;
    let mut shapes: Vec<Renderable> = geometries
        .into_iter()
        .enumerate()
        .map(|(i, geometry)| {
            let angle = i as f32 / count * std::f32::consts::TAU;
            let material = Material {
                alpha_blended: i % 2 == 1,
                sampler: if i % 2 == 0 {
                    SamplerKind::Linear
                } else {
                    SamplerKind::Nearest
                },
                texture,
                texture_scale: Vec2::ONE,
            };
            Renderable::new(
                geometry,
                Transform::from_position(Vec3::new(angle.cos() * 3.0, 0.0, angle.sin() * 3.0)),
                material,
            )
        })
        .collect();

    shapes.push(Renderable::new(
        floor,
        Transform::from_position(Vec3::new(0.0, -1.0, 0.0)),
        Material {
            texture,
            texture_scale: Vec2::splat(6.0),
            ..Default::default()
        },
    ));

    let hud = vec![Renderable::new(
        hud_quad,
        Transform::new(
            Vec3::new(-1.4, 0.8, 1.0),
            Vec3::new(-90.0, 0.0, 0.0),
            Vec3::ONE,
        ),
        Material {
            alpha_blended: true,
            texture: overlay,
            ..Default::default()
        },
    )];

    Ok(Scene {
        shapes,
        spinning,
        hud,
        light: DirectionalLight::default(),
        camera: CameraSettings::perspective(60.0, 0.1, 100.0),
        hud_camera: CameraSettings::orthographic(1.0, 0.0, 10.0),
    })
}

fn render(
    device: &mut RenderDevice,
    scene: &mut Scene,
    delta: f32,
) -> lilium_frame::RendererResult<()> {
    for shape in &mut scene.shapes[..scene.spinning] {
        shape.transform.rotate(Vec3::new(20.0, 45.0, 0.0) * delta);
    }

    device.begin_frame(&scene.light)?;

    device.begin_render_pass(
        Vec3::new(0.0, 2.5, -7.0),
        Vec3::new(20.0, 0.0, 0.0),
        &scene.camera,
    )?;
    device.submit_renderables(&scene.shapes)?;

    device.begin_render_pass(Vec3::ZERO, Vec3::ZERO, &scene.hud_camera)?;
    device.submit_renderables(&scene.hud)?;

    device.end_frame()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!("Starting spinning shapes demo ({}x{})", args.width, args.height);

    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title("lilium-frame: spinning shapes")
        .with_inner_size(PhysicalSize::new(args.width, args.height))
        .with_resizable(false)
        .build(&event_loop)?;

    let size = window.inner_size();
    let config = RendererConfig {
        present_mode: args.present_mode.into(),
        validation: args.validation || cfg!(debug_assertions),
        validation_level: args.validation_level.into(),
        ..RendererConfig::default()
    }
    .with_shaders(args.vertex_shader.clone(), args.fragment_shader.clone());

    let mut render_device = RenderDevice::new(&window, size.width, size.height, config)?;
    let mut scene = load_scene(&mut render_device, &args)?;
    let mut device = Some(render_device);

    let start = Instant::now();
    let mut last_frame = start;
    let mut frames: u64 = 0;

    event_loop.run(move |event, elwt: &EventLoopWindowTarget<()>| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::Resized(new_size) if new_size != size => {
                    log::warn!(
                        "Window resized to {}x{}; swapchain recreation is not supported",
                        new_size.width,
                        new_size.height
                    );
                }
                _ => {}
            },
            Event::AboutToWait => {
                let Some(device) = device.as_mut() else {
                    return;
                };
                let now = Instant::now();
                let delta = now.duration_since(last_frame).as_secs_f32();
                last_frame = now;
                if let Err(e) = render(device, &mut scene, delta) {
                    log::error!("Frame {} failed: {}", frames, e);
                    elwt.exit();
                    return;
                }

                frames += 1;
                if args.max_frames.is_some_and(|max| frames >= max) {
                    elwt.exit();
                }
            }
            Event::LoopExiting => {
                // Release GPU objects while the window still exists
                if let Some(mut device) = device.take() {
                    if let Err(e) = device.wait_for_idle() {
                        log::error!("Failed to wait for idle: {}", e);
                    }
                }
                log::info!(
                    "Rendered {} frames in {:.1}s",
                    frames,
                    start.elapsed().as_secs_f32()
                );
            }
            _ => {}
        }
    })?;

    Ok(())
}
