use super::{Gl, GpuError, Texture2D, current_binding};
use glow::HasContext;
use log::info;
use smallvec::SmallVec;

pub struct FrameBuffer {
    gl: Gl,
    handle: glow::Framebuffer,
    draw_buffers: SmallVec<[u32; 4]>,
}

impl FrameBuffer {
    /// Attaches `color` in order (attachment i = `COLOR_ATTACHMENT0 + i`) and
    /// the optional depth-stencil texture. An incomplete framebuffer is fatal.
    pub fn new(
        gl: &Gl,
        color: &[&Texture2D],
        depth_stencil: Option<&Texture2D>,
    ) -> Result<Self, GpuError> {
        unsafe {
            let old = current_binding(gl, glow::DRAW_FRAMEBUFFER_BINDING, glow::NativeFramebuffer);
            let handle = gl.create_framebuffer()?;
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(handle));

            let mut draw_buffers = SmallVec::new();
            for (i, texture) in color.iter().enumerate() {
                let attachment = glow::COLOR_ATTACHMENT0 + i as u32;
                gl.framebuffer_texture_2d(
                    glow::DRAW_FRAMEBUFFER,
                    attachment,
                    texture_target(texture),
                    Some(texture.raw()),
                    0,
                );
                draw_buffers.push(attachment);
            }

            if let Some(ds) = depth_stencil {
                gl.framebuffer_texture_2d(
                    glow::DRAW_FRAMEBUFFER,
                    glow::DEPTH_STENCIL_ATTACHMENT,
                    texture_target(ds),
                    Some(ds.raw()),
                    0,
                );
            }

            let status = gl.check_framebuffer_status(glow::DRAW_FRAMEBUFFER);
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, old);
            if status != glow::FRAMEBUFFER_COMPLETE {
                gl.delete_framebuffer(handle);
                return Err(GpuError::FramebufferIncomplete(status));
            }

            info!(
                "Created framebuffer with {} color attachment(s){}.",
                color.len(),
                if depth_stencil.is_some() { " and depth-stencil" } else { "" }
            );
            Ok(Self {
                gl: gl.clone(),
                handle,
                draw_buffers,
            })
        }
    }

    #[inline(always)]
    pub fn raw(&self) -> glow::Framebuffer {
        self.handle
    }

    #[inline(always)]
    pub fn handle(&self) -> u32 {
        self.handle.0.get()
    }

    /// `COLOR_ATTACHMENTi` for every color attachment, in attachment order.
    pub fn draw_buffers(&self) -> &[u32] {
        &self.draw_buffers
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        unsafe { self.gl.delete_framebuffer(self.handle) };
    }
}

#[inline(always)]
fn texture_target(texture: &Texture2D) -> u32 {
    if texture.sample_count() > 1 {
        glow::TEXTURE_2D_MULTISAMPLE
    } else {
        glow::TEXTURE_2D
    }
}
