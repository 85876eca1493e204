use super::args::{Palette, PolyDrawArgs, RectDrawArgs, TextureSource, TriVertex};
use super::batcher::{BatchSink, DrawBatch, DrawBatcher, FaceUniforms, MAX_FACES, MAX_VERTICES};
use super::blend::blend_setter;
use super::caches::ResourceCaches;
use super::uniforms::{FrameUniforms, RectUniforms, TripleBuffer, pixel_to_ndc};
use crate::core::gfx::gpu::{
    DrawMode, FrameBuffer, Gl, GpuContext, GpuError, MipmapMode, PixelFormat, Program, SampleMode,
    Sampler, ShaderStage, Texture2D, UniformBuffer, VertexArray, VertexAttributeDesc,
    VertexAttributeType, VertexBuffer, WrapMode,
};
use bytemuck::Zeroable;
use glam::Mat4;
use log::{debug, trace, warn};
use std::mem::{offset_of, size_of};

const SCENE_VERT: &str = include_str!("../shaders/scene.vert");
const SCENE_FRAG: &str = include_str!("../shaders/scene.frag");
const RECT_VERT: &str = include_str!("../shaders/rect.vert");
const RECT_FRAG: &str = include_str!("../shaders/rect.frag");
const STENCIL_VERT: &str = include_str!("../shaders/stencil.vert");
const STENCIL_FRAG: &str = include_str!("../shaders/stencil.frag");

const FRAME_UNIFORMS_BINDING: u32 = 0;
const FACE_UNIFORMS_BINDING: u32 = 1;
const RECT_UNIFORMS_BINDING: u32 = 1;

const DIFFUSE_UNIT: u32 = 0;
const COLORMAP_UNIT: u32 = 1;
const TRANSLATION_UNIT: u32 = 2;

const CLIP_PLANES: u32 = 3;

const CLEAR_ALBEDO: [f32; 4] = [0.5, 0.5, 0.2, 1.0];
const CLEAR_NORMAL: [f32; 4] = [0.0; 4];
const CLEAR_SPRITE_DEPTH: [f32; 4] = [1.0, 0.0, 0.0, 0.0];

/// Counters for the frame in progress; reset by `begin`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub batches: usize,
    pub runs: usize,
    pub vertices: usize,
}

struct SceneTargets {
    scene: FrameBuffer,
    translucent: FrameBuffer,
    albedo: Texture2D,
    _normal: Texture2D,
    _sprite_depth: Texture2D,
    _depth_stencil: Texture2D,
}

impl SceneTargets {
    fn new(gl: &Gl, width: i32, height: i32) -> Result<Self, GpuError> {
        let albedo = Texture2D::new(gl, width, height, false, 1, PixelFormat::Rgba16F, None)?;
        let normal = Texture2D::new(gl, width, height, false, 1, PixelFormat::Rgba16F, None)?;
        let depth_stencil =
            Texture2D::new(gl, width, height, false, 1, PixelFormat::Depth24Stencil8, None)?;
        let sprite_depth = Texture2D::new(gl, width, height, false, 1, PixelFormat::R32F, None)?;

        let scene = FrameBuffer::new(gl, &[&albedo, &normal, &sprite_depth], Some(&depth_stencil))?;
        let translucent = FrameBuffer::new(gl, &[&albedo, &normal], Some(&depth_stencil))?;
        Ok(Self {
            scene,
            translucent,
            albedo,
            _normal: normal,
            _sprite_depth: sprite_depth,
            _depth_stencil: depth_stencil,
        })
    }
}

struct Programs {
    opaque: Program,
    rect: Program,
    _stencil: Program,
}

impl Programs {
    fn new(gl: &Gl) -> Result<Self, GpuError> {
        let mut opaque = Program::new(gl)?;
        opaque.set_define("MAX_FACES", MAX_FACES);
        opaque.compile(ShaderStage::Vertex, "vertex", SCENE_VERT)?;
        opaque.compile(ShaderStage::Fragment, "fragment", SCENE_FRAG)?;
        opaque.set_attrib_location("Position", 0);
        opaque.set_attrib_location("Texcoord", 1);
        opaque.set_frag_output("FragColor", 0);
        opaque.link("program")?;
        opaque.set_uniform_block("FrameUniforms", FRAME_UNIFORMS_BINDING);
        opaque.set_uniform_block("FaceUniforms", FACE_UNIFORMS_BINDING);
        set_sampler_units(&opaque);

        let mut rect = Program::new(gl)?;
        rect.compile(ShaderStage::Vertex, "vertex", RECT_VERT)?;
        rect.compile(ShaderStage::Fragment, "fragment", RECT_FRAG)?;
        rect.set_attrib_location("Position", 0);
        rect.set_frag_output("FragColor", 0);
        rect.link("rect program")?;
        rect.set_uniform_block("FrameUniforms", FRAME_UNIFORMS_BINDING);
        rect.set_uniform_block("RectUniforms", RECT_UNIFORMS_BINDING);
        set_sampler_units(&rect);

        let mut stencil = Program::new(gl)?;
        stencil.compile(ShaderStage::Vertex, "vertex", STENCIL_VERT)?;
        stencil.compile(ShaderStage::Fragment, "fragment", STENCIL_FRAG)?;
        stencil.set_attrib_location("Position", 0);
        stencil.set_frag_output("FragColor", 0);
        stencil.set_frag_output("FragNormal", 1);
        stencil.link("stencil program")?;
        stencil.set_uniform_block("FrameUniforms", FRAME_UNIFORMS_BINDING);

        Ok(Self {
            opaque,
            rect,
            _stencil: stencil,
        })
    }
}

fn set_sampler_units(program: &Program) {
    program.set_sampler_unit("DiffuseTexture", DIFFUSE_UNIT as i32);
    program.set_sampler_unit("BasecolormapTexture", COLORMAP_UNIT as i32);
    program.set_sampler_unit("TranslationTexture", TRANSLATION_UNIT as i32);
}

struct Samplers {
    _linear: Sampler,
    nearest: Sampler,
}

impl Samplers {
    fn new(gl: &Gl) -> Result<Self, GpuError> {
        let repeat = WrapMode::Repeat;
        Ok(Self {
            _linear: Sampler::new(
                gl,
                SampleMode::Linear,
                SampleMode::Nearest,
                MipmapMode::None,
                repeat,
                repeat,
            )?,
            nearest: Sampler::new(
                gl,
                SampleMode::Nearest,
                SampleMode::Nearest,
                MipmapMode::None,
                repeat,
                repeat,
            )?,
        })
    }
}

/// GPU objects of one batch, created the first time the batch is drawn.
struct BatchBuffers {
    vertex_array: VertexArray,
    vertices: VertexBuffer,
    faces: UniformBuffer,
}

impl BatchBuffers {
    fn new(gl: &Gl) -> Result<Self, GpuError> {
        let vertices = VertexBuffer::new(gl, None, MAX_VERTICES * size_of::<TriVertex>())?;
        let stride = size_of::<TriVertex>() as i32;
        let vertex_array = VertexArray::new(
            gl,
            &[
                VertexAttributeDesc {
                    index: 0,
                    size: 4,
                    ty: VertexAttributeType::Float,
                    normalized: false,
                    stride,
                    offset: offset_of!(TriVertex, x) as i32,
                    buffer: &vertices,
                },
                VertexAttributeDesc {
                    index: 1,
                    size: 2,
                    ty: VertexAttributeType::Float,
                    normalized: false,
                    stride,
                    offset: offset_of!(TriVertex, u) as i32,
                    buffer: &vertices,
                },
            ],
        )?;
        let faces = UniformBuffer::new(gl, None, MAX_FACES * size_of::<FaceUniforms>())?;
        Ok(Self {
            vertex_array,
            vertices,
            faces,
        })
    }

    fn upload_vertices(&mut self, vertices: &[TriVertex]) {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        if let Some(mut mapped) = self.vertices.map_write_only()
            && copy_into_mapping(&mut mapped, bytes)
        {
            return;
        }
        self.vertices.upload(bytes);
    }
}

/// Copies `bytes` to the front of a mapped range. False when the mapping is
/// shorter, which happens after a fallback upload shrank the storage.
fn copy_into_mapping(mapped: &mut [u8], bytes: &[u8]) -> bool {
    let Some(front) = mapped.get_mut(..bytes.len()) else {
        return false;
    };
    front.copy_from_slice(bytes);
    true
}

struct ScreenQuad {
    vertex_array: VertexArray,
    _vertices: VertexBuffer,
    uniforms: UniformBuffer,
}

impl ScreenQuad {
    fn new(gl: &Gl) -> Result<Self, GpuError> {
        let quad: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let bytes: &[u8] = bytemuck::cast_slice(&quad);
        let vertices = VertexBuffer::new(gl, Some(bytes), bytes.len())?;
        let vertex_array = VertexArray::new(
            gl,
            &[VertexAttributeDesc {
                index: 0,
                size: 2,
                ty: VertexAttributeType::Float,
                normalized: false,
                stride: 0,
                offset: 0,
                buffer: &vertices,
            }],
        )?;
        let uniforms = UniformBuffer::new(gl, None, size_of::<RectUniforms>())?;
        Ok(Self {
            vertex_array,
            _vertices: vertices,
            uniforms,
        })
    }
}

/// Draws batched palette triangles into an off-screen scene framebuffer.
///
/// Lives on the render thread. Producers fill their own [`DrawBatcher`]s;
/// every frame-level call takes the batchers and drains them in slice order.
pub struct HardpolyRenderer {
    gl: Gl,
    context: GpuContext,
    caches: ResourceCaches,
    targets: Option<SceneTargets>,
    programs: Option<Programs>,
    samplers: Option<Samplers>,
    frame_uniforms: TripleBuffer<UniformBuffer>,
    batch_buffers: Vec<BatchBuffers>,
    face_scratch: Vec<FaceUniforms>,
    screen_quad: Option<ScreenQuad>,
    window_width: i32,
    window_height: i32,
    world_to_view: Mat4,
    view_to_clip: Mat4,
    glob_vis: f32,
    stats: FrameStats,
}

impl HardpolyRenderer {
    pub fn new(gl: &Gl, palette: Palette, window_width: u32, window_height: u32) -> Self {
        Self {
            gl: gl.clone(),
            context: GpuContext::new(gl),
            caches: ResourceCaches::new(gl, palette),
            targets: None,
            programs: None,
            samplers: None,
            frame_uniforms: TripleBuffer::new(),
            batch_buffers: Vec::new(),
            face_scratch: Vec::with_capacity(MAX_FACES),
            screen_quad: None,
            window_width: window_width.max(1) as i32,
            window_height: window_height.max(1) as i32,
            world_to_view: Mat4::IDENTITY,
            view_to_clip: Mat4::IDENTITY,
            glob_vis: 0.0,
            stats: FrameStats::default(),
        }
    }

    /// Camera for the frame. Takes effect at the next batch or rect.
    pub fn set_view(&mut self, world_to_view: Mat4, view_to_clip: Mat4, glob_vis: f32) {
        self.world_to_view = world_to_view;
        self.view_to_clip = view_to_clip;
        self.glob_vis = glob_vis;
        self.frame_uniforms.mark_dirty();
    }

    /// Presenter size; the scene targets follow it at the next `begin`.
    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_width = width.max(1) as i32;
        self.window_height = height.max(1) as i32;
    }

    pub fn window_size(&self) -> (i32, i32) {
        (self.window_width, self.window_height)
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn caches(&self) -> &ResourceCaches {
        &self.caches
    }

    /// The framebuffer the frame was drawn into.
    pub fn scene_framebuffer(&self) -> Option<&FrameBuffer> {
        self.targets.as_ref().map(|t| &t.scene)
    }

    /// Scene framebuffer without the sprite-depth attachment.
    pub fn translucent_framebuffer(&self) -> Option<&FrameBuffer> {
        self.targets.as_ref().map(|t| &t.translucent)
    }

    /// Opens a frame. Errors are fatal: the scene targets or programs could
    /// not be built.
    pub fn begin(&mut self, batchers: &mut [DrawBatcher]) -> Result<(), GpuError> {
        self.frame_uniforms.mark_dirty();
        self.stats = FrameStats::default();
        self.context.begin();
        self.setup_framebuffer()?;
        self.compile_shaders()?;
        self.create_samplers()?;
        for batcher in batchers {
            batcher.next_frame();
        }
        Ok(())
    }

    pub fn end(&mut self, batchers: &mut [DrawBatcher]) {
        for batcher in batchers.iter_mut() {
            batcher.draw_batches(self);
            batcher.next_frame();
        }
        self.context
            .set_viewport(0, 0, self.window_width, self.window_height);
        self.context.end();
        trace!(
            "Frame: {} batches, {} runs, {} vertices.",
            self.stats.batches, self.stats.runs, self.stats.vertices
        );
    }

    pub fn clear_buffers(&mut self, batchers: &mut [DrawBatcher]) {
        for batcher in batchers.iter_mut() {
            batcher.draw_batches(self);
        }
        self.context.clear_color_buffer(0, CLEAR_ALBEDO);
        self.context.clear_color_buffer(1, CLEAR_NORMAL);
        self.context.clear_color_buffer(2, CLEAR_SPRITE_DEPTH);
        self.context.clear_depth_stencil_buffer(1.0, 0);
    }

    /// Draws everything queued so far with the old viewport, then switches.
    pub fn set_viewport(
        &mut self,
        batchers: &mut [DrawBatcher],
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) {
        for batcher in batchers.iter_mut() {
            batcher.draw_batches(self);
        }
        self.context.set_viewport(x, y, width, height);
    }

    /// Queues a draw on a producer's batcher. Same as
    /// [`DrawBatcher::draw_array`], which producer threads call directly.
    pub fn draw_array(batcher: &mut DrawBatcher, args: &PolyDrawArgs<'_>) -> bool {
        batcher.draw_array(args)
    }

    /// Draws one palette quad immediately, in window pixels.
    pub fn draw_rect(&mut self, args: &RectDrawArgs) {
        self.update_frame_uniforms();

        if self.screen_quad.is_none() {
            match ScreenQuad::new(&self.gl) {
                Ok(quad) => self.screen_quad = Some(quad),
                Err(e) => {
                    warn!("Failed to create screen quad: {e}");
                    return;
                }
            }
        }
        let (Some(quad), Some(programs), Some(samplers)) = (
            self.screen_quad.as_mut(),
            self.programs.as_ref(),
            self.samplers.as_ref(),
        ) else {
            return;
        };

        let (w, h) = (self.window_width as f32, self.window_height as f32);
        let uniforms = RectUniforms {
            x0: pixel_to_ndc(args.x0, w),
            y0: pixel_to_ndc(args.y0, h),
            u0: args.u0,
            v0: args.v0,
            x1: pixel_to_ndc(args.x1, w),
            y1: pixel_to_ndc(args.y1, h),
            u1: args.u1,
            v1: args.v1,
            light: args.light as f32,
            padding: [0.0; 3],
        };
        quad.uniforms.upload(bytemuck::bytes_of(&uniforms));

        let ctx = &self.context;
        ctx.set_vertex_array(Some(&quad.vertex_array));
        ctx.set_program(Some(&programs.rect));
        ctx.set_uniforms(FRAME_UNIFORMS_BINDING, self.frame_uniforms.current());
        ctx.set_uniforms(RECT_UNIFORMS_BINDING, Some(&quad.uniforms));
        ctx.set_sampler(DIFFUSE_UNIT, Some(&samplers.nearest));
        ctx.set_sampler(COLORMAP_UNIT, Some(&samplers.nearest));
        ctx.set_texture(DIFFUSE_UNIT, self.caches.texture_pal(args.texture.as_ref()));
        ctx.set_texture(COLORMAP_UNIT, self.caches.colormap_texture(&args.base_colormap));

        ctx.draw(DrawMode::TriangleStrip, 0, 4);

        ctx.set_texture(DIFFUSE_UNIT, None);
        ctx.set_texture(COLORMAP_UNIT, None);
        ctx.set_sampler(DIFFUSE_UNIT, None);
        ctx.set_sampler(COLORMAP_UNIT, None);
        ctx.set_uniforms(FRAME_UNIFORMS_BINDING, None);
        ctx.set_uniforms(RECT_UNIFORMS_BINDING, None);
        ctx.set_vertex_array(None);
        ctx.set_program(None);
    }

    fn update_frame_uniforms(&mut self) {
        let gl = &self.gl;
        let data = FrameUniforms::new(self.world_to_view, self.view_to_clip, self.glob_vis);
        match self
            .frame_uniforms
            .rotate(|| UniformBuffer::new(gl, None, size_of::<FrameUniforms>()))
        {
            Ok(Some(buffer)) => buffer.upload(bytemuck::bytes_of(&data)),
            Ok(None) => {}
            Err(e) => warn!("Failed to create frame uniforms: {e}"),
        }
    }

    /// Rebuilds the scene targets when the window size changed, then binds
    /// the scene framebuffer with all three color outputs.
    fn setup_framebuffer(&mut self) -> Result<(), GpuError> {
        let (width, height) = (self.window_width, self.window_height);
        let stale = self
            .targets
            .as_ref()
            .is_none_or(|t| t.albedo.width() != width || t.albedo.height() != height);
        if stale {
            self.targets = None;
            debug!("Building {width}x{height} scene framebuffer.");
            self.targets = Some(SceneTargets::new(&self.gl, width, height)?);
        }
        if let Some(targets) = &self.targets {
            self.context.set_frame_buffer(Some(&targets.scene));
            self.context.set_draw_buffers(targets.scene.draw_buffers());
        }
        Ok(())
    }

    fn compile_shaders(&mut self) -> Result<(), GpuError> {
        if self.programs.is_none() {
            self.programs = Some(Programs::new(&self.gl)?);
        }
        Ok(())
    }

    fn create_samplers(&mut self) -> Result<(), GpuError> {
        if self.samplers.is_none() {
            self.samplers = Some(Samplers::new(&self.gl)?);
        }
        Ok(())
    }

    /// Pool slot of the batch's GPU objects, creating them on first use.
    fn batch_slot(&mut self, batch: &mut DrawBatch) -> Option<usize> {
        if let Some(slot) = batch.gpu_slot().filter(|&s| s < self.batch_buffers.len()) {
            return Some(slot);
        }
        match BatchBuffers::new(&self.gl) {
            Ok(buffers) => {
                self.batch_buffers.push(buffers);
                let slot = self.batch_buffers.len() - 1;
                batch.set_gpu_slot(slot);
                debug!("Allocated GPU buffers for batch slot {slot}.");
                Some(slot)
            }
            Err(e) => {
                warn!("Failed to create batch buffers: {e}");
                None
            }
        }
    }
}

impl BatchSink for HardpolyRenderer {
    fn render_batch(&mut self, batch: &mut DrawBatch) {
        let Some(slot) = self.batch_slot(batch) else {
            return;
        };
        self.update_frame_uniforms();

        let buffers = &mut self.batch_buffers[slot];
        buffers.upload_vertices(batch.vertices());

        // The block always holds MAX_FACES records.
        self.face_scratch.clear();
        self.face_scratch.extend_from_slice(batch.face_uniforms());
        self.face_scratch.resize(MAX_FACES, FaceUniforms::zeroed());
        buffers.faces.upload(bytemuck::cast_slice(&self.face_scratch));

        let (Some(programs), Some(samplers)) = (self.programs.as_ref(), self.samplers.as_ref())
        else {
            return;
        };

        self.stats.batches += 1;
        self.stats.runs += batch.draw_runs().len();
        self.stats.vertices += batch.vertices().len();

        let buffers = &self.batch_buffers[slot];
        self.context.set_vertex_array(Some(&buffers.vertex_array));
        self.context.set_program(Some(&programs.opaque));
        self.context
            .set_uniforms(FRAME_UNIFORMS_BINDING, self.frame_uniforms.current());
        self.context
            .set_uniforms(FACE_UNIFORMS_BINDING, Some(&buffers.faces));
        self.context.enable_clip_distances(CLIP_PLANES);
        for unit in [DIFFUSE_UNIT, COLORMAP_UNIT, TRANSLATION_UNIT] {
            self.context.set_sampler(unit, Some(&samplers.nearest));
        }

        for run in batch.draw_runs() {
            let ctx = &self.context;
            ctx.set_depth(run.depth_test, run.write_depth);
            ctx.set_blend(&blend_setter(run.blend_mode).state(run.src_alpha, run.dest_alpha));

            let diffuse = match &run.texture {
                TextureSource::Engine(texture) => self.caches.texture_pal(Some(texture)),
                TextureSource::Pixels {
                    pixels,
                    width,
                    height,
                } => self.caches.engine_texture_pal(pixels, *width, *height),
                TextureSource::Missing => self.caches.texture_pal(None),
            };
            ctx.set_texture(DIFFUSE_UNIT, diffuse);
            ctx.set_texture(
                COLORMAP_UNIT,
                self.caches.colormap_texture(&run.base_colormap),
            );
            if let Some(translation) = &run.translation {
                ctx.set_texture(
                    TRANSLATION_UNIT,
                    self.caches.translation_texture(translation),
                );
            }

            ctx.draw(
                run.draw_mode.draw_mode(),
                run.start as i32,
                run.num_vertices as i32,
            );
        }

        let ctx = &mut self.context;
        for unit in [DIFFUSE_UNIT, COLORMAP_UNIT, TRANSLATION_UNIT] {
            ctx.set_texture(unit, None);
            ctx.set_sampler(unit, None);
        }
        ctx.disable_clip_distances();
        ctx.set_depth(true, true);
        ctx.set_uniforms(FRAME_UNIFORMS_BINDING, None);
        ctx.set_uniforms(FACE_UNIFORMS_BINDING, None);
        ctx.set_vertex_array(None);
        ctx.set_program(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_attributes_match_the_shader_layout() {
        assert_eq!(size_of::<TriVertex>(), 24);
        assert_eq!(offset_of!(TriVertex, x), 0);
        assert_eq!(offset_of!(TriVertex, u), 16);
    }

    #[test]
    fn mapped_copy_fills_the_front_of_the_range() {
        let vertices = [TriVertex::new(1.0, 2.0, 3.0, 0.5, 0.25); 2];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let mut mapped = vec![0xAAu8; 3 * size_of::<TriVertex>()];
        assert!(copy_into_mapping(&mut mapped, bytes));
        assert_eq!(&mapped[..bytes.len()], bytes);
        assert!(mapped[bytes.len()..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn short_mapping_is_left_alone() {
        let vertices = [TriVertex::default(); 4];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let mut mapped = vec![0xAAu8; bytes.len() - 1];
        assert!(!copy_into_mapping(&mut mapped, bytes));
        assert!(mapped.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn face_block_fills_the_declared_array() {
        assert_eq!(MAX_FACES * size_of::<FaceUniforms>(), 200 * 80);
    }
}
