use super::{Gl, GpuError, MipmapMode, SampleMode, WrapMode};
use glow::HasContext;

/// Immutable sampler state object.
pub struct Sampler {
    gl: Gl,
    handle: glow::Sampler,
    min_filter: SampleMode,
    mag_filter: SampleMode,
    mipmap: MipmapMode,
    wrap_u: WrapMode,
    wrap_v: WrapMode,
}

impl Sampler {
    pub fn new(
        gl: &Gl,
        min_filter: SampleMode,
        mag_filter: SampleMode,
        mipmap: MipmapMode,
        wrap_u: WrapMode,
        wrap_v: WrapMode,
    ) -> Result<Self, GpuError> {
        unsafe {
            let handle = gl.create_sampler()?;
            gl.sampler_parameter_i32(
                handle,
                glow::TEXTURE_MIN_FILTER,
                min_filter_enum(min_filter, mipmap) as i32,
            );
            gl.sampler_parameter_i32(
                handle,
                glow::TEXTURE_MAG_FILTER,
                mag_filter_enum(mag_filter) as i32,
            );
            gl.sampler_parameter_i32(handle, glow::TEXTURE_WRAP_S, wrap_u.gl_wrap() as i32);
            gl.sampler_parameter_i32(handle, glow::TEXTURE_WRAP_T, wrap_v.gl_wrap() as i32);
            Ok(Self {
                gl: gl.clone(),
                handle,
                min_filter,
                mag_filter,
                mipmap,
                wrap_u,
                wrap_v,
            })
        }
    }

    #[inline(always)]
    pub fn raw(&self) -> glow::Sampler {
        self.handle
    }

    #[inline(always)]
    pub fn handle(&self) -> u32 {
        self.handle.0.get()
    }

    pub const fn filters(&self) -> (SampleMode, SampleMode, MipmapMode) {
        (self.min_filter, self.mag_filter, self.mipmap)
    }

    pub const fn wrap(&self) -> (WrapMode, WrapMode) {
        (self.wrap_u, self.wrap_v)
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.gl.delete_sampler(self.handle) };
    }
}

/// Minification filter; the mipmap mode picks how levels are selected.
pub const fn min_filter_enum(filter: SampleMode, mipmap: MipmapMode) -> u32 {
    match (mipmap, filter) {
        (MipmapMode::None, SampleMode::Linear) => glow::LINEAR,
        (MipmapMode::None, SampleMode::Nearest) => glow::NEAREST,
        (MipmapMode::Nearest, SampleMode::Linear) => glow::LINEAR_MIPMAP_NEAREST,
        (MipmapMode::Nearest, SampleMode::Nearest) => glow::NEAREST_MIPMAP_NEAREST,
        (MipmapMode::Linear, SampleMode::Linear) => glow::LINEAR_MIPMAP_LINEAR,
        (MipmapMode::Linear, SampleMode::Nearest) => glow::NEAREST_MIPMAP_LINEAR,
    }
}

/// Magnification never uses mip levels.
pub const fn mag_filter_enum(filter: SampleMode) -> u32 {
    match filter {
        SampleMode::Linear => glow::LINEAR,
        SampleMode::Nearest => glow::NEAREST,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_filter_combines_texel_and_level_selection() {
        assert_eq!(min_filter_enum(SampleMode::Nearest, MipmapMode::None), glow::NEAREST);
        assert_eq!(min_filter_enum(SampleMode::Linear, MipmapMode::None), glow::LINEAR);
        assert_eq!(
            min_filter_enum(SampleMode::Linear, MipmapMode::Linear),
            glow::LINEAR_MIPMAP_LINEAR
        );
        assert_eq!(
            min_filter_enum(SampleMode::Nearest, MipmapMode::Linear),
            glow::NEAREST_MIPMAP_LINEAR
        );
        assert_eq!(
            min_filter_enum(SampleMode::Linear, MipmapMode::Nearest),
            glow::LINEAR_MIPMAP_NEAREST
        );
    }

    #[test]
    fn mag_filter_ignores_mipmaps() {
        assert_eq!(mag_filter_enum(SampleMode::Linear), glow::LINEAR);
        assert_eq!(mag_filter_enum(SampleMode::Nearest), glow::NEAREST);
    }

    #[test]
    fn wrap_modes_map_to_gl() {
        assert_eq!(WrapMode::Repeat.gl_wrap(), glow::REPEAT);
        assert_eq!(WrapMode::Mirror.gl_wrap(), glow::MIRRORED_REPEAT);
        assert_eq!(WrapMode::ClampToEdge.gl_wrap(), glow::CLAMP_TO_EDGE);
    }
}
