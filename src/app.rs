use glam::{Mat4, Vec3};
use glow::HasContext;
use glutin::{
    config::ConfigTemplateBuilder,
    context::{ContextApi, ContextAttributesBuilder, GlProfile, PossiblyCurrentContext, Version},
    display::{Display, DisplayApiPreference},
    prelude::*,
    surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface},
};
use hardpoly::config::{self, Config};
use hardpoly::core::gfx::gpu::Gl;
use hardpoly::core::gfx::hardpoly::{
    BlendMode, ClipPlane, DrawBatcher, HardpolyRenderer, Palette, PaletteTexture, PolyDrawArgs,
    PolyDrawMode, RectDrawArgs, TextureSource, TriVertex,
    args::{COLORMAP_SIZE, NUMCOLORMAPS},
};
use log::{debug, error, info, warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::{
    error::Error,
    ffi::CStr,
    num::NonZeroU32,
    rc::Rc,
    sync::Arc,
    time::{Duration, Instant},
};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

const RAMPS: usize = 16;
const RAMP_SHADES: usize = 16;
const GRID: i32 = 24;
const TILE_SIZE: f32 = 64.0;
const TEXTURE_SIZE: i32 = 64;

/// Base color of each 16-shade palette ramp.
const RAMP_COLORS: [[u8; 3]; RAMPS] = [
    [255, 255, 255],
    [255, 80, 64],
    [255, 160, 64],
    [255, 232, 96],
    [128, 224, 80],
    [64, 192, 160],
    [80, 160, 255],
    [144, 96, 255],
    [232, 96, 200],
    [176, 136, 96],
    [120, 120, 96],
    [96, 128, 144],
    [200, 176, 152],
    [160, 64, 48],
    [64, 96, 48],
    [48, 48, 96],
];

// --- Synthetic scene ---

/// A column-major palette texture built in memory.
struct DemoTexture {
    width: i32,
    height: i32,
    pixels: Vec<u8>,
    pixels_bgra: Vec<u32>,
}

impl DemoTexture {
    /// Two-ramp checkerboard. `holes` punches index-0 texels into every
    /// other dark square for the masked modes.
    fn checker(palette: &Palette, ramp: usize, size: i32, holes: bool) -> Self {
        let cell = (size / 8).max(1);
        let mut pixels = Vec::with_capacity((size * size) as usize);
        for x in 0..size {
            for y in 0..size {
                let (cx, cy) = (x / cell, y / cell);
                let light = (cx + cy) % 2 == 0;
                let index = if holes && !light && cx % 2 == 0 {
                    0
                } else {
                    let shade = if light { 14 } else { 8 } + ((x ^ y) & 1) as usize;
                    palette_index(ramp, shade)
                };
                pixels.push(index);
            }
        }
        let pixels_bgra = pixels
            .iter()
            .map(|&i| {
                let [r, g, b] = palette.rgb(i);
                let alpha = if i == 0 { 0 } else { 0xFF };
                alpha << 24 | u32::from(r) << 16 | u32::from(g) << 8 | u32::from(b)
            })
            .collect();
        Self {
            width: size,
            height: size,
            pixels,
            pixels_bgra,
        }
    }
}

impl PaletteTexture for DemoTexture {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn pixels_bgra(&self) -> &[u32] {
        &self.pixels_bgra
    }
}

#[inline(always)]
fn palette_index(ramp: usize, shade: usize) -> u8 {
    (ramp * RAMP_SHADES + shade.min(RAMP_SHADES - 1)) as u8
}

/// Sixteen ramps, each from black up to its base color.
fn demo_palette() -> Palette {
    let mut colors = [[0; 3]; 256];
    for (i, color) in colors.iter_mut().enumerate() {
        let base = RAMP_COLORS[i / RAMP_SHADES];
        let shade = (i % RAMP_SHADES) as u32;
        *color = base.map(|c| (u32::from(c) * shade / (RAMP_SHADES as u32 - 1)) as u8);
    }
    Palette::new(colors)
}

/// Row `r` darkens every index `r / 31` of the way to the bottom of its ramp.
fn demo_colormap() -> Arc<[u8]> {
    let last_row = NUMCOLORMAPS - 1;
    let mut colormap = vec![0u8; COLORMAP_SIZE];
    for (row, entries) in colormap.chunks_exact_mut(256).enumerate() {
        for (index, entry) in entries.iter_mut().enumerate() {
            let (ramp, shade) = (index / RAMP_SHADES, index % RAMP_SHADES);
            *entry = palette_index(ramp, shade * (last_row - row) / last_row);
        }
    }
    Arc::from(colormap)
}

/// Shifts every ramp by `offset` ramps, keeping the shade.
fn ramp_translation(offset: usize) -> Arc<[u8]> {
    (0..256usize)
        .map(|i| palette_index((i / RAMP_SHADES + offset) % RAMPS, i % RAMP_SHADES))
        .collect()
}

struct DemoScene {
    palette: Palette,
    colormap: Arc<[u8]>,
    translation: Arc<[u8]>,
    floor: [Arc<dyn PaletteTexture>; 3],
    grate: Arc<dyn PaletteTexture>,
    /// Runtime pixels, as a generated canvas texture would be.
    canvas: Arc<[u8]>,
}

impl DemoScene {
    fn new() -> Self {
        let palette = demo_palette();
        let floor = [1, 9, 11].map(|ramp| {
            Arc::new(DemoTexture::checker(&palette, ramp, TEXTURE_SIZE, false))
                as Arc<dyn PaletteTexture>
        });
        let grate: Arc<dyn PaletteTexture> =
            Arc::new(DemoTexture::checker(&palette, 6, TEXTURE_SIZE, true));
        let canvas = (0..TEXTURE_SIZE * TEXTURE_SIZE)
            .map(|i| palette_index(((i / TEXTURE_SIZE) / 4) as usize % RAMPS, 15))
            .collect();
        Self {
            colormap: demo_colormap(),
            translation: ramp_translation(4),
            floor,
            grate,
            canvas,
            palette,
        }
    }

    fn world_to_view(time: f32) -> Mat4 {
        let angle = time * 0.2;
        let radius = GRID as f32 * TILE_SIZE * 0.45;
        let eye = Vec3::new(angle.cos() * radius, 160.0, angle.sin() * radius);
        Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y)
    }

    /// Fills every producer's batcher in parallel; tile `i` belongs to
    /// producer `i % producers`.
    fn produce(&self, batchers: &mut [DrawBatcher], time: f32) {
        let producers = batchers.len();
        std::thread::scope(|s| {
            for (index, batcher) in batchers.iter_mut().enumerate() {
                s.spawn(move || self.fill(batcher, index, producers, time));
            }
        });
    }

    fn fill(&self, batcher: &mut DrawBatcher, producer: usize, producers: usize, time: f32) {
        let tiles = (GRID * GRID) as usize;
        for tile in (producer..tiles).step_by(producers.max(1)) {
            let (tx, tz) = (tile as i32 % GRID, tile as i32 / GRID);
            let vertices = tile_vertices(tx, tz, time);
            let mut args = PolyDrawArgs::new(&vertices, Arc::clone(&self.colormap));
            args.draw_mode = PolyDrawMode::TriangleFan;
            args.texture = TextureSource::Engine(Arc::clone(&self.floor[tile % 3]));
            args.light = 96 + ((tx * 7 + tz * 13) % 160);

            match tile % 11 {
                0 => {
                    args.blend_mode = BlendMode::TranslatedOpaque;
                    args.translation = Some(Arc::clone(&self.translation));
                }
                3 => args.blend_mode = BlendMode::Shaded,
                5 => {
                    args.blend_mode = BlendMode::FillOpaque;
                    args.color = u32::from(palette_index(7, 12));
                }
                _ => {}
            }
            // Keep the far corner of the map dark.
            if tx + tz > GRID * 3 / 2 {
                args.fixed_light = true;
                args.light = 48;
            }
            batcher.draw_array(&args);

            if tile % 5 == 0 {
                let raised = raised_quad(tx, tz, time);
                let mut args = PolyDrawArgs::new(&raised, Arc::clone(&self.colormap));
                args.draw_mode = PolyDrawMode::TriangleStrip;
                if tile % 2 == 0 {
                    args.texture = TextureSource::Engine(Arc::clone(&self.grate));
                    args.blend_mode = BlendMode::TextureMasked;
                } else {
                    args.texture = TextureSource::Pixels {
                        pixels: Arc::clone(&self.canvas),
                        width: TEXTURE_SIZE,
                        height: TEXTURE_SIZE,
                    };
                    args.blend_mode = BlendMode::TextureAdd;
                    args.src_alpha = 160;
                    args.dest_alpha = 255;
                    args.write_depth = false;
                }
                // Cut the panels off below the floor.
                args.clip_planes[0] = ClipPlane::new(0.0, 1.0, 0.0, 0.0);
                batcher.draw_array(&args);
            }
        }
    }
}

fn tile_vertices(tx: i32, tz: i32, time: f32) -> [TriVertex; 4] {
    let x0 = (tx - GRID / 2) as f32 * TILE_SIZE;
    let z0 = (tz - GRID / 2) as f32 * TILE_SIZE;
    let y = ((tx + tz) as f32 * 0.5 + time).sin() * 4.0;
    let (x1, z1) = (x0 + TILE_SIZE, z0 + TILE_SIZE);
    [
        TriVertex::new(x0, y, z0, 0.0, 0.0),
        TriVertex::new(x1, y, z0, 1.0, 0.0),
        TriVertex::new(x1, y, z1, 1.0, 1.0),
        TriVertex::new(x0, y, z1, 0.0, 1.0),
    ]
}

fn raised_quad(tx: i32, tz: i32, time: f32) -> [TriVertex; 4] {
    let x = (tx - GRID / 2) as f32 * TILE_SIZE;
    let z = (tz - GRID / 2) as f32 * TILE_SIZE + TILE_SIZE * 0.5;
    let bob = (time * 2.0 + tx as f32).sin() * 24.0;
    let (bottom, top) = (bob - 16.0, bob + TILE_SIZE);
    [
        TriVertex::new(x, top, z, 0.0, 0.0),
        TriVertex::new(x, bottom, z, 0.0, 1.0),
        TriVertex::new(x + TILE_SIZE, top, z, 1.0, 0.0),
        TriVertex::new(x + TILE_SIZE, bottom, z, 1.0, 1.0),
    ]
}

// --- Window and context ---

fn create_opengl_context(
    window: &Window,
    vsync_enabled: bool,
    gfx_debug_enabled: bool,
) -> Result<(Surface<WindowSurface>, PossiblyCurrentContext, glow::Context), Box<dyn Error>> {
    let display_handle = window.display_handle()?.as_raw();

    #[cfg(target_os = "windows")]
    let preference = {
        info!("Using WGL for OpenGL context.");
        DisplayApiPreference::Wgl(None)
    };
    #[cfg(target_os = "macos")]
    let preference = {
        info!("Using CGL for OpenGL context.");
        DisplayApiPreference::Cgl
    };
    #[cfg(all(unix, not(target_os = "macos")))]
    let preference = {
        info!("Using EGL for OpenGL context.");
        DisplayApiPreference::Egl
    };

    let display = unsafe { Display::new(display_handle, preference)? };

    let template = ConfigTemplateBuilder::new()
        .with_alpha_size(0)
        .with_depth_size(24)
        .with_stencil_size(8)
        .with_transparency(false)
        .build();
    let gl_config = unsafe { display.find_configs(template)?.next() }
        .ok_or("Failed to find a suitable GL config")?;

    let (width, height): (u32, u32) = window.inner_size().into();
    let (width, height) = NonZeroU32::new(width)
        .zip(NonZeroU32::new(height))
        .ok_or("Window has zero size")?;
    let raw_window_handle = window.window_handle()?.as_raw();
    let surface_attributes =
        SurfaceAttributesBuilder::<WindowSurface>::new().build(raw_window_handle, width, height);
    let surface = unsafe { display.create_window_surface(&gl_config, &surface_attributes)? };

    let context_attributes = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
        .with_profile(GlProfile::Core)
        .with_debug(gfx_debug_enabled)
        .build(Some(raw_window_handle));
    let context =
        unsafe { display.create_context(&gl_config, &context_attributes)? }.make_current(&surface)?;

    let interval = if vsync_enabled {
        SwapInterval::Wait(NonZeroU32::MIN)
    } else {
        SwapInterval::DontWait
    };
    match surface.set_swap_interval(&context, interval) {
        Ok(()) => info!("VSync {}.", if vsync_enabled { "on" } else { "off" }),
        Err(e) => warn!("Failed to set swap interval (VSync): {e:?}"),
    }

    let gl = unsafe { glow::Context::from_loader_function_cstr(|s: &CStr| display.get_proc_address(s)) };
    Ok((surface, context, gl))
}

/// Field order is drop order: GL objects go before the context that owns them.
struct GfxState {
    renderer: HardpolyRenderer,
    gl: Gl,
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
    window: Arc<Window>,
}

impl GfxState {
    fn present(&self) -> Result<(), Box<dyn Error>> {
        let (width, height) = self.renderer.window_size();
        if let Some(scene) = self.renderer.scene_framebuffer() {
            let gl = &self.gl;
            unsafe {
                gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(scene.raw()));
                gl.read_buffer(glow::COLOR_ATTACHMENT0);
                gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);
                gl.blit_framebuffer(
                    0,
                    0,
                    width,
                    height,
                    0,
                    0,
                    width,
                    height,
                    glow::COLOR_BUFFER_BIT,
                    glow::NEAREST,
                );
                gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
            }
        }
        self.surface.swap_buffers(&self.context)?;
        Ok(())
    }
}

struct App {
    config: Config,
    scene: DemoScene,
    batchers: Vec<DrawBatcher>,
    gfx: Option<GfxState>,
    start_time: Instant,
    fps_timer: Instant,
    frames: u32,
}

impl App {
    fn new(config: Config) -> Self {
        let producers = config.producer_threads();
        info!("Starting {producers} draw producers.");
        Self {
            config,
            scene: DemoScene::new(),
            batchers: (0..producers).map(|_| DrawBatcher::new()).collect(),
            gfx: None,
            start_time: Instant::now(),
            fps_timer: Instant::now(),
            frames: 0,
        }
    }

    fn init_graphics(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn Error>> {
        let window_attributes = Window::default_attributes()
            .with_title("hardpoly")
            .with_resizable(true)
            .with_inner_size(PhysicalSize::new(
                self.config.window_width,
                self.config.window_height,
            ));
        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let (surface, context, gl) =
            create_opengl_context(&window, self.config.vsync, self.config.gfx_debug)?;
        let gl: Gl = Rc::new(gl);

        let size = window.inner_size();
        let renderer =
            HardpolyRenderer::new(&gl, self.scene.palette.clone(), size.width, size.height);
        self.gfx = Some(GfxState {
            renderer,
            gl,
            surface,
            context,
            window: Arc::clone(&window),
        });
        window.request_redraw();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        let Some(gfx) = self.gfx.as_mut() else {
            return;
        };
        let (Some(w), Some(h)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
            warn!("Ignoring resize to zero dimensions.");
            return;
        };
        gfx.surface.resize(&gfx.context, w, h);
        gfx.renderer.set_window_size(width, height);
        debug!("Window resized to {width}x{height}.");
    }

    fn draw_frame(&mut self) -> Result<(), Box<dyn Error>> {
        let Some(gfx) = self.gfx.as_mut() else {
            return Ok(());
        };
        let time = self.start_time.elapsed().as_secs_f32();
        let (width, height) = gfx.renderer.window_size();
        let aspect = width as f32 / height as f32;

        gfx.renderer.set_view(
            DemoScene::world_to_view(time),
            Mat4::perspective_rh_gl(75f32.to_radians(), aspect, 4.0, 65536.0),
            self.config.glob_vis,
        );

        let renderer = &mut gfx.renderer;
        renderer.begin(&mut self.batchers)?;
        renderer.set_viewport(&mut self.batchers, 0, 0, width, height);
        renderer.clear_buffers(&mut self.batchers);

        self.scene.produce(&mut self.batchers, time);

        // Flushes the world before the status bar goes on top.
        renderer.set_viewport(&mut self.batchers, 0, 0, width, height);
        let bar_top = height as f32 - 48.0;
        let mut bar = RectDrawArgs::new(
            Some(Arc::clone(&self.scene.floor[2])),
            Arc::clone(&self.scene.colormap),
            0.0,
            bar_top,
            width as f32,
            height as f32,
        );
        bar.u1 = width as f32 / TEXTURE_SIZE as f32;
        bar.v1 = 48.0 / TEXTURE_SIZE as f32;
        bar.light = 200;
        renderer.draw_rect(&bar);

        renderer.end(&mut self.batchers);
        gfx.present()?;

        self.frames += 1;
        if self.fps_timer.elapsed() >= Duration::from_secs(1) {
            let stats = gfx.renderer.stats();
            info!(
                "{} fps, {} batches, {} runs, {} vertices, {} cached textures.",
                self.frames,
                stats.batches,
                stats.runs,
                stats.vertices,
                gfx.renderer.caches().len()
            );
            self.frames = 0;
            self.fps_timer = Instant::now();
        }
        Ok(())
    }

    fn handle_key_event(&mut self, event_loop: &ActiveEventLoop, key_event: KeyEvent) {
        if key_event.state != ElementState::Pressed {
            return;
        }
        if let PhysicalKey::Code(KeyCode::Escape) = key_event.physical_key {
            info!("Escape pressed. Shutting down.");
            event_loop.exit();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gfx.is_none() {
            if let Err(e) = self.init_graphics(event_loop) {
                error!("Failed to initialize graphics: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(window) = self.gfx.as_ref().map(|g| Arc::clone(&g.window)) else {
            return;
        };
        if window_id != window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested. Shutting down.");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => self.resize(size.width, size.height),
            WindowEvent::KeyboardInput {
                event: key_event, ..
            } => self.handle_key_event(event_loop, key_event),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.draw_frame() {
                    error!("Failed to draw frame: {e}");
                    event_loop.exit();
                    return;
                }
                window.request_redraw();
            }
            _ => {}
        }
    }
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let event_loop = EventLoop::new()?;
    let mut app = App::new(config::get());
    event_loop.run_app(&mut app)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardpoly::core::gfx::hardpoly::BatchSink;
    use hardpoly::core::gfx::hardpoly::DrawBatch;

    #[test]
    fn palette_ramps_start_black_and_end_at_base_color() {
        let palette = demo_palette();
        assert_eq!(palette.rgb(palette_index(1, 0)), [0, 0, 0]);
        assert_eq!(palette.rgb(palette_index(1, 15)), RAMP_COLORS[1]);
        assert_eq!(palette.rgb(255), RAMP_COLORS[15]);
    }

    #[test]
    fn colormap_darkens_within_a_ramp() {
        let colormap = demo_colormap();
        assert_eq!(colormap.len(), COLORMAP_SIZE);
        let bright = palette_index(3, 15) as usize;
        assert_eq!(colormap[bright], bright as u8, "row 0 is identity");
        assert_eq!(colormap[31 * 256 + bright], palette_index(3, 0), "row 31 is black");
        let mid = colormap[16 * 256 + bright];
        assert_eq!(usize::from(mid) / RAMP_SHADES, 3, "stays in its ramp");
    }

    #[test]
    fn translation_moves_ramps_and_keeps_shades() {
        let table = ramp_translation(4);
        assert_eq!(table.len(), 256);
        assert_eq!(table[usize::from(palette_index(1, 7))], palette_index(5, 7));
        assert_eq!(table[usize::from(palette_index(14, 2))], palette_index(2, 2));
    }

    #[test]
    fn checker_texture_is_column_major_with_holes() {
        let palette = demo_palette();
        let solid = DemoTexture::checker(&palette, 6, 16, false);
        assert_eq!(solid.pixels().len(), 256);
        assert_eq!(solid.pixels_bgra().len(), 256);
        assert!(solid.pixels().iter().all(|&i| i != 0));

        let grate = DemoTexture::checker(&palette, 6, 16, true);
        assert!(grate.pixels().contains(&0));
        // Cell (0,1) is dark and in an even column.
        let (x, y) = (0usize, 2usize);
        assert_eq!(grate.pixels()[y + x * 16], 0);
        assert_eq!(grate.pixels_bgra()[y + x * 16] >> 24, 0);
    }

    struct Counter(usize);

    impl BatchSink for Counter {
        fn render_batch(&mut self, batch: &mut DrawBatch) {
            self.0 += batch.draw_runs().len();
        }
    }

    #[test]
    fn producers_split_the_grid_without_losing_draws() {
        let scene = DemoScene::new();
        let tiles = (GRID * GRID) as usize;
        let panels = tiles.div_ceil(5);

        for producers in [1, 3, 8] {
            let mut batchers: Vec<DrawBatcher> = (0..producers).map(|_| DrawBatcher::new()).collect();
            scene.produce(&mut batchers, 1.5);
            let mut sink = Counter(0);
            for batcher in &mut batchers {
                batcher.draw_batches(&mut sink);
            }
            assert_eq!(sink.0, tiles + panels, "{producers} producers");
        }
    }
}
