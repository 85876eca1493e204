use super::{Gl, GpuError, PixelFormat, current_binding};
use glow::{HasContext, PixelUnpackData};
use log::{debug, warn};

pub struct Texture2D {
    gl: Gl,
    handle: glow::Texture,
    width: i32,
    height: i32,
    mipmap: bool,
    sample_count: i32,
    format: PixelFormat,
}

impl Texture2D {
    /// Creates the texture and fills level 0 from `pixels` when given.
    ///
    /// A `sample_count` above 1 creates a multisample texture; pixels are
    /// ignored in that case. Mipmapped textures get a generated chain when
    /// pixels are supplied and pre-allocated empty levels otherwise.
    pub fn new(
        gl: &Gl,
        width: i32,
        height: i32,
        mipmap: bool,
        sample_count: i32,
        format: PixelFormat,
        pixels: Option<&[u8]>,
    ) -> Result<Self, GpuError> {
        let multisample = sample_count > 1;
        if !multisample
            && let Some(data) = pixels
        {
            let needed = pixel_data_len(format, width, height);
            if data.len() < needed {
                return Err(GpuError::CreateObject(format!(
                    "{width}x{height} {format:?} texture needs {needed} bytes, got {}",
                    data.len()
                )));
            }
        }
        let (target, binding) = if multisample {
            (glow::TEXTURE_2D_MULTISAMPLE, glow::TEXTURE_BINDING_2D_MULTISAMPLE)
        } else {
            (glow::TEXTURE_2D, glow::TEXTURE_BINDING_2D)
        };

        unsafe {
            let handle = gl.create_texture()?;
            let old = current_binding(gl, binding, glow::NativeTexture);
            gl.bind_texture(target, Some(handle));

            let internal = format.internal_format() as i32;
            if multisample {
                gl.tex_image_2d_multisample(target, sample_count, internal, width, height, false);
            } else {
                gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
                gl.tex_image_2d(
                    target,
                    0,
                    internal,
                    width,
                    height,
                    0,
                    format.upload_format(),
                    format.upload_type(),
                    PixelUnpackData::Slice(pixels),
                );
            }

            if mipmap && !multisample {
                if pixels.is_some() {
                    gl.generate_mipmap(target);
                } else {
                    let (mut w, mut h) = (width, height);
                    for level in 1..num_levels(width, height) {
                        w = (w / 2).max(1);
                        h = (h / 2).max(1);
                        gl.tex_image_2d(
                            target,
                            level,
                            internal,
                            w,
                            h,
                            0,
                            format.upload_format(),
                            format.upload_type(),
                            PixelUnpackData::Slice(None),
                        );
                    }
                }
            }

            gl.bind_texture(target, old);
            debug!("Created {width}x{height} {format:?} texture (mipmap={mipmap}, samples={sample_count}).");

            Ok(Self {
                gl: gl.clone(),
                handle,
                width,
                height,
                mipmap,
                sample_count,
                format,
            })
        }
    }

    /// Replaces a sub-rectangle of one mip level. Multisample textures are
    /// left untouched.
    pub fn upload(&self, x: i32, y: i32, width: i32, height: i32, level: i32, pixels: &[u8]) {
        if self.sample_count > 1 {
            return;
        }
        let needed = pixel_data_len(self.format, width, height);
        if pixels.len() < needed {
            warn!(
                "Skipping {width}x{height} texture upload: needs {needed} bytes, got {}.",
                pixels.len()
            );
            return;
        }
        let gl = &self.gl;
        unsafe {
            let old = current_binding(gl, glow::TEXTURE_BINDING_2D, glow::NativeTexture);
            let old_unpack =
                current_binding(gl, glow::PIXEL_UNPACK_BUFFER_BINDING, glow::NativeBuffer);
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, None);
            gl.bind_texture(glow::TEXTURE_2D, Some(self.handle));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                level,
                x,
                y,
                width,
                height,
                self.format.upload_format(),
                self.format.upload_type(),
                PixelUnpackData::Slice(Some(pixels)),
            );
            gl.bind_texture(glow::TEXTURE_2D, old);
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, old_unpack);
        }
    }

    #[inline(always)]
    pub fn raw(&self) -> glow::Texture {
        self.handle
    }

    #[inline(always)]
    pub fn handle(&self) -> u32 {
        self.handle.0.get()
    }

    #[inline(always)]
    pub const fn width(&self) -> i32 {
        self.width
    }

    #[inline(always)]
    pub const fn height(&self) -> i32 {
        self.height
    }

    #[inline(always)]
    pub const fn mipmapped(&self) -> bool {
        self.mipmap
    }

    #[inline(always)]
    pub const fn sample_count(&self) -> i32 {
        self.sample_count
    }

    #[inline(always)]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }
}

impl Drop for Texture2D {
    fn drop(&mut self) {
        unsafe { self.gl.delete_texture(self.handle) };
    }
}

/// Number of mip levels down to and including 1x1.
pub const fn num_levels(mut width: i32, mut height: i32) -> i32 {
    let mut levels = 1;
    while width > 1 || height > 1 {
        levels += 1;
        width /= 2;
        height /= 2;
    }
    levels
}

/// Bytes a tightly packed `width` x `height` upload of `format` reads.
pub(crate) const fn pixel_data_len(format: PixelFormat, width: i32, height: i32) -> usize {
    let width = if width > 0 { width as usize } else { 0 };
    let height = if height > 0 { height as usize } else { 0 };
    width * height * format.bytes_per_pixel()
}

#[cfg(test)]
mod tests {
    use super::{PixelFormat, num_levels, pixel_data_len};

    #[test]
    fn pixel_data_len_scales_with_texel_size() {
        assert_eq!(pixel_data_len(PixelFormat::R8, 8, 4), 32);
        assert_eq!(pixel_data_len(PixelFormat::Rgba8, 2, 2), 16);
        assert_eq!(pixel_data_len(PixelFormat::Rgba32F, 3, 1), 48);
    }

    #[test]
    fn pixel_data_len_treats_negative_sizes_as_empty() {
        assert_eq!(pixel_data_len(PixelFormat::R8, -1, 4), 0);
        assert_eq!(pixel_data_len(PixelFormat::Rgba8, 4, 0), 0);
    }

    #[test]
    fn mip_chain_reaches_one_by_one() {
        assert_eq!(num_levels(1, 1), 1);
        assert_eq!(num_levels(2, 1), 2);
        assert_eq!(num_levels(256, 256), 9);
        assert_eq!(num_levels(64, 8), 7);
        assert_eq!(num_levels(320, 200), 9);
    }
}
