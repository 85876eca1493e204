use super::{
    DrawMode, FrameBuffer, Gl, IndexBuffer, IndexFormat, Program, Sampler, StorageBuffer, Texture2D,
    UniformBuffer, VertexArray, current_binding,
};
use glow::HasContext;
use log::warn;

/// Texture units whose 2D binding is saved across a frame.
const SAVED_TEXTURE_UNITS: usize = 2;

/// Fixed-function blend configuration applied by [`GpuContext::set_blend`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendState {
    pub enabled: bool,
    pub equation: u32,
    pub src: u32,
    pub dst: u32,
    /// Constant blend color; `None` leaves the current one in place.
    pub color: Option<[f32; 4]>,
}

impl BlendState {
    pub const DISABLED: Self = Self {
        enabled: false,
        equation: glow::FUNC_ADD,
        src: glow::ONE,
        dst: glow::ZERO,
        color: None,
    };
}

impl Default for BlendState {
    /// Straight alpha blending, which is what the host expects outside a frame.
    fn default() -> Self {
        Self {
            enabled: true,
            equation: glow::FUNC_ADD,
            src: glow::SRC_ALPHA,
            dst: glow::ONE_MINUS_SRC_ALPHA,
            color: Some([1.0; 4]),
        }
    }
}

struct SavedState {
    draw_framebuffer: Option<glow::Framebuffer>,
    read_framebuffer: Option<glow::Framebuffer>,
    program: Option<glow::Program>,
    active_texture: u32,
    textures: [Option<glow::Texture>; SAVED_TEXTURE_UNITS],
}

/// Per-frame binding scope. Bindings take effect immediately; the context
/// only remembers what it needs to restore the host's state in `end`.
pub struct GpuContext {
    gl: Gl,
    index_format: IndexFormat,
    clip_distances: u32,
    saved: Option<SavedState>,
}

impl GpuContext {
    pub fn new(gl: &Gl) -> Self {
        Self {
            gl: gl.clone(),
            index_format: IndexFormat::default(),
            clip_distances: 0,
            saved: None,
        }
    }

    #[inline(always)]
    pub fn gl(&self) -> &Gl {
        &self.gl
    }

    pub fn begin(&mut self) {
        let gl = &self.gl;
        unsafe {
            while gl.get_error() != glow::NO_ERROR {}

            let active_texture = gl.get_parameter_i32(glow::ACTIVE_TEXTURE) as u32;
            let mut textures = [None; SAVED_TEXTURE_UNITS];
            for (unit, slot) in textures.iter_mut().enumerate() {
                gl.active_texture(glow::TEXTURE0 + unit as u32);
                *slot = current_binding(gl, glow::TEXTURE_BINDING_2D, glow::NativeTexture);
            }
            gl.active_texture(active_texture);

            self.saved = Some(SavedState {
                draw_framebuffer: current_binding(
                    gl,
                    glow::DRAW_FRAMEBUFFER_BINDING,
                    glow::NativeFramebuffer,
                ),
                read_framebuffer: current_binding(
                    gl,
                    glow::READ_FRAMEBUFFER_BINDING,
                    glow::NativeFramebuffer,
                ),
                program: current_binding(gl, glow::CURRENT_PROGRAM, glow::NativeProgram),
                active_texture,
                textures,
            });

            gl.enable(glow::DEPTH_TEST);
            gl.disable(glow::CULL_FACE);
            gl.disable(glow::BLEND);
        }
        self.index_format = IndexFormat::default();
    }

    pub fn end(&mut self) {
        self.disable_clip_distances();
        self.set_depth(true, true);
        self.set_blend(&BlendState::default());

        let gl = &self.gl;
        unsafe {
            if let Some(saved) = self.saved.take() {
                gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, saved.draw_framebuffer);
                gl.bind_framebuffer(glow::READ_FRAMEBUFFER, saved.read_framebuffer);
                gl.use_program(saved.program);
                for (unit, texture) in saved.textures.iter().enumerate() {
                    gl.active_texture(glow::TEXTURE0 + unit as u32);
                    gl.bind_texture(glow::TEXTURE_2D, *texture);
                }
                gl.active_texture(saved.active_texture);
            }

            let error = gl.get_error();
            if error != glow::NO_ERROR {
                warn!("OpenGL error detected during frame: 0x{error:04X}");
            }
        }
    }

    // --- Bindings ---

    pub fn set_frame_buffer(&self, framebuffer: Option<&FrameBuffer>) {
        unsafe {
            self.gl
                .bind_framebuffer(glow::DRAW_FRAMEBUFFER, framebuffer.map(FrameBuffer::raw));
        }
    }

    /// Routes fragment outputs to the bound framebuffer's attachments.
    pub fn set_draw_buffers(&self, attachments: &[u32]) {
        unsafe { self.gl.draw_buffers(attachments) };
    }

    pub fn set_viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) };
    }

    pub fn set_program(&self, program: Option<&Program>) {
        unsafe { self.gl.use_program(program.map(Program::raw)) };
    }

    pub fn set_sampler(&self, unit: u32, sampler: Option<&Sampler>) {
        unsafe { self.gl.bind_sampler(unit, sampler.map(Sampler::raw)) };
    }

    /// Leaves `unit` as the active texture unit.
    pub fn set_texture(&self, unit: u32, texture: Option<&Texture2D>) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl
                .bind_texture(glow::TEXTURE_2D, texture.map(Texture2D::raw));
        }
    }

    pub fn set_uniforms(&self, index: u32, buffer: Option<&UniformBuffer>) {
        unsafe {
            self.gl
                .bind_buffer_base(glow::UNIFORM_BUFFER, index, buffer.map(UniformBuffer::raw));
        }
    }

    pub fn set_uniforms_range(
        &self,
        index: u32,
        buffer: Option<&UniformBuffer>,
        offset: usize,
        size: usize,
    ) {
        let gl = &self.gl;
        unsafe {
            match buffer {
                Some(buffer) => gl.bind_buffer_range(
                    glow::UNIFORM_BUFFER,
                    index,
                    Some(buffer.raw()),
                    offset as i32,
                    size as i32,
                ),
                None => gl.bind_buffer_base(glow::UNIFORM_BUFFER, index, None),
            }
        }
    }

    pub fn set_storage(&self, index: u32, buffer: Option<&StorageBuffer>) {
        unsafe {
            self.gl.bind_buffer_base(
                glow::SHADER_STORAGE_BUFFER,
                index,
                buffer.map(StorageBuffer::raw),
            );
        }
    }

    pub fn set_vertex_array(&self, vertex_array: Option<&VertexArray>) {
        unsafe { self.gl.bind_vertex_array(vertex_array.map(VertexArray::raw)) };
    }

    /// Records `format` for later indexed draws.
    pub fn set_index_buffer(&mut self, buffer: Option<&IndexBuffer>, format: IndexFormat) {
        unsafe {
            self.gl
                .bind_buffer(glow::ELEMENT_ARRAY_BUFFER, buffer.map(IndexBuffer::raw));
        }
        self.index_format = format;
    }

    // --- Fixed-function state ---

    pub fn set_blend(&self, state: &BlendState) {
        let gl = &self.gl;
        unsafe {
            if !state.enabled {
                gl.disable(glow::BLEND);
                return;
            }
            gl.enable(glow::BLEND);
            gl.blend_equation(state.equation);
            gl.blend_func(state.src, state.dst);
            if let Some([r, g, b, a]) = state.color {
                gl.blend_color(r, g, b, a);
            }
        }
    }

    /// `test` false keeps the depth test enabled but lets every fragment
    /// pass, so depth writes still work.
    pub fn set_depth(&self, test: bool, write: bool) {
        unsafe {
            self.gl
                .depth_func(if test { glow::LESS } else { glow::ALWAYS });
            self.gl.depth_mask(write);
        }
    }

    pub fn enable_clip_distances(&mut self, count: u32) {
        let gl = &self.gl;
        unsafe {
            for i in count..self.clip_distances {
                gl.disable(glow::CLIP_DISTANCE0 + i);
            }
            for i in 0..count {
                gl.enable(glow::CLIP_DISTANCE0 + i);
            }
        }
        self.clip_distances = count;
    }

    pub fn disable_clip_distances(&mut self) {
        self.enable_clip_distances(0);
    }

    // --- Clears ---

    pub fn clear_color_buffer(&self, index: u32, rgba: [f32; 4]) {
        unsafe { self.gl.clear_buffer_f32_slice(glow::COLOR, index, &rgba) };
    }

    pub fn clear_depth_buffer(&self, depth: f32) {
        unsafe { self.gl.clear_buffer_f32_slice(glow::DEPTH, 0, &[depth]) };
    }

    pub fn clear_stencil_buffer(&self, stencil: i32) {
        unsafe { self.gl.clear_buffer_i32_slice(glow::STENCIL, 0, &[stencil]) };
    }

    pub fn clear_depth_stencil_buffer(&self, depth: f32, stencil: i32) {
        unsafe {
            self.gl
                .clear_buffer_depth_stencil(glow::DEPTH_STENCIL, 0, depth, stencil);
        }
    }

    // --- Draws ---

    pub fn draw(&self, mode: DrawMode, vertex_start: i32, vertex_count: i32) {
        unsafe { self.gl.draw_arrays(mode.gl_mode(), vertex_start, vertex_count) };
    }

    pub fn draw_indexed(&self, mode: DrawMode, index_start: i32, index_count: i32) {
        let format = self.index_format;
        unsafe {
            self.gl.draw_elements(
                mode.gl_mode(),
                index_count,
                format.gl_type(),
                index_start * format.size(),
            );
        }
    }

    pub fn draw_instanced(
        &self,
        mode: DrawMode,
        vertex_start: i32,
        vertex_count: i32,
        instance_count: i32,
    ) {
        unsafe {
            self.gl
                .draw_arrays_instanced(mode.gl_mode(), vertex_start, vertex_count, instance_count);
        }
    }

    pub fn draw_indexed_instanced(
        &self,
        mode: DrawMode,
        index_start: i32,
        index_count: i32,
        instance_count: i32,
    ) {
        let format = self.index_format;
        unsafe {
            self.gl.draw_elements_instanced(
                mode.gl_mode(),
                index_count,
                format.gl_type(),
                index_start * format.size(),
                instance_count,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BlendState;

    #[test]
    fn default_blend_is_straight_alpha() {
        let state = BlendState::default();
        assert!(state.enabled);
        assert_eq!(state.equation, glow::FUNC_ADD);
        assert_eq!((state.src, state.dst), (glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA));
        assert_eq!(state.color, Some([1.0; 4]));
    }

    #[test]
    fn disabled_blend_keeps_blend_color() {
        assert!(!BlendState::DISABLED.enabled);
        assert_eq!(BlendState::DISABLED.color, None);
    }
}
