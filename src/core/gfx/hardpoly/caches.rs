use super::args::{COLORMAP_SIZE, NUMCOLORMAPS, Palette, PaletteTexture};
use crate::core::gfx::gpu::{Gl, GpuError, PixelFormat, Texture2D};
use log::{debug, warn};
use rustc_hash::FxHashMap;
use std::{collections::hash_map::Entry, sync::Arc};

/// Texel bound for engine textures that could not be resolved.
pub const PINK_SENTINEL: u32 = 0xFF00_FFFF;

/// Keeps the engine allocation alive so its address cannot be reused by a
/// different resource while the entry exists.
struct CacheEntry<T: ?Sized> {
    _owner: Arc<T>,
    texture: Texture2D,
}

/// GPU textures built lazily from engine-side resources, keyed by the
/// address of the engine allocation. Entries live as long as the cache.
pub struct ResourceCaches {
    gl: Gl,
    palette: Palette,
    textures: FxHashMap<usize, CacheEntry<dyn PaletteTexture>>,
    textures_bgra: FxHashMap<usize, CacheEntry<dyn PaletteTexture>>,
    colormaps: FxHashMap<usize, CacheEntry<[u8]>>,
    translations: FxHashMap<usize, CacheEntry<[u8]>>,
    engine_textures: FxHashMap<usize, CacheEntry<[u8]>>,
    null_pal: Option<Texture2D>,
    null_bgra: Option<Texture2D>,
}

impl ResourceCaches {
    pub fn new(gl: &Gl, palette: Palette) -> Self {
        Self {
            gl: gl.clone(),
            palette,
            textures: FxHashMap::default(),
            textures_bgra: FxHashMap::default(),
            colormaps: FxHashMap::default(),
            translations: FxHashMap::default(),
            engine_textures: FxHashMap::default(),
            null_pal: None,
            null_bgra: None,
        }
    }

    /// Palette indices of an engine texture as R8. `None` gives a single
    /// index-0 texel, which every palette sampler treats as transparent.
    pub fn texture_pal(&mut self, texture: Option<&Arc<dyn PaletteTexture>>) -> Option<&Texture2D> {
        let gl = &self.gl;
        let Some(texture) = texture else {
            return lazy(&mut self.null_pal, || {
                Texture2D::new(gl, 1, 1, false, 1, PixelFormat::R8, Some(&[0]))
            });
        };
        cached(&mut self.textures, texture, "palette texture", |t| {
            let (w, h) = (t.width(), t.height());
            let pixels = transpose_columns(t.pixels(), w, h);
            Texture2D::new(gl, w, h, false, 1, PixelFormat::R8, Some(&pixels))
        })
    }

    /// True-color version of an engine texture as mipmapped RGBA8. `None`
    /// gives a 1×1 pink texel.
    pub fn texture_bgra(
        &mut self,
        texture: Option<&Arc<dyn PaletteTexture>>,
    ) -> Option<&Texture2D> {
        let gl = &self.gl;
        let Some(texture) = texture else {
            return lazy(&mut self.null_bgra, || {
                let pixels = [PINK_SENTINEL];
                Texture2D::new(
                    gl,
                    1,
                    1,
                    false,
                    1,
                    PixelFormat::Rgba8,
                    Some(bytemuck::cast_slice(&pixels)),
                )
            });
        };
        cached(&mut self.textures_bgra, texture, "bgra texture", |t| {
            let (w, h) = (t.width(), t.height());
            let pixels = bgra_to_rgba_transposed(t.pixels_bgra(), w, h);
            Texture2D::new(
                gl,
                w,
                h,
                true,
                1,
                PixelFormat::Rgba8,
                Some(bytemuck::cast_slice(&pixels)),
            )
        })
    }

    /// A colormap resolved through the palette as a 256 × 32 RGBA8 table.
    pub fn colormap_texture(&mut self, colormap: &Arc<[u8]>) -> Option<&Texture2D> {
        let gl = &self.gl;
        let palette = &self.palette;
        cached(&mut self.colormaps, colormap, "colormap", |c| {
            let texels = colormap_rgba(c, palette);
            Texture2D::new(
                gl,
                256,
                NUMCOLORMAPS as i32,
                false,
                1,
                PixelFormat::Rgba8,
                Some(bytemuck::cast_slice(&texels)),
            )
        })
    }

    /// A 256-entry translation table as a 256 × 1 R8 texture.
    pub fn translation_texture(&mut self, translation: &Arc<[u8]>) -> Option<&Texture2D> {
        let gl = &self.gl;
        cached(&mut self.translations, translation, "translation", |t| {
            let table = translation_table(t);
            Texture2D::new(gl, 256, 1, false, 1, PixelFormat::R8, Some(&table))
        })
    }

    /// Runtime-generated column-major palette pixels as R8.
    pub fn engine_texture_pal(
        &mut self,
        pixels: &Arc<[u8]>,
        width: i32,
        height: i32,
    ) -> Option<&Texture2D> {
        let gl = &self.gl;
        cached(&mut self.engine_textures, pixels, "engine texture", |p| {
            if width <= 0 || height <= 0 {
                return Texture2D::new(gl, 1, 1, false, 1, PixelFormat::R8, Some(&[0]));
            }
            let rows = transpose_columns(p, width, height);
            Texture2D::new(gl, width, height, false, 1, PixelFormat::R8, Some(&rows))
        })
    }

    pub fn len(&self) -> usize {
        self.textures.len()
            + self.textures_bgra.len()
            + self.colormaps.len()
            + self.translations.len()
            + self.engine_textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[inline(always)]
fn address<T: ?Sized>(resource: &Arc<T>) -> usize {
    Arc::as_ptr(resource).cast::<()>() as usize
}

fn cached<'a, T: ?Sized>(
    map: &'a mut FxHashMap<usize, CacheEntry<T>>,
    resource: &Arc<T>,
    what: &str,
    build: impl FnOnce(&T) -> Result<Texture2D, GpuError>,
) -> Option<&'a Texture2D> {
    match map.entry(address(resource)) {
        Entry::Occupied(e) => Some(&e.into_mut().texture),
        Entry::Vacant(e) => match build(&**resource) {
            Ok(texture) => {
                debug!(
                    "Cached {what} {}x{}.",
                    texture.width(),
                    texture.height()
                );
                Some(
                    &e.insert(CacheEntry {
                        _owner: Arc::clone(resource),
                        texture,
                    })
                    .texture,
                )
            }
            Err(err) => {
                warn!("Failed to create {what}: {err}");
                None
            }
        },
    }
}

fn lazy(
    slot: &mut Option<Texture2D>,
    build: impl FnOnce() -> Result<Texture2D, GpuError>,
) -> Option<&Texture2D> {
    if slot.is_none() {
        match build() {
            Ok(texture) => *slot = Some(texture),
            Err(err) => {
                warn!("Failed to create placeholder texture: {err}");
                return None;
            }
        }
    }
    slot.as_ref()
}

// --- Pixel conversions ---

/// Column-major (`src[y + x * height]`) to row-major (`dst[x + y * width]`).
/// Missing source bytes read as index 0.
pub fn transpose_columns(src: &[u8], width: i32, height: i32) -> Vec<u8> {
    let (w, h) = (width.max(0) as usize, height.max(0) as usize);
    let mut dst = vec![0; w * h];
    for y in 0..h {
        for x in 0..w {
            dst[x + y * w] = src.get(y + x * h).copied().unwrap_or(0);
        }
    }
    dst
}

/// Transposes column-major `0xAARRGGBB` texels into row-major RGBA8 words
/// (R in the low byte).
pub fn bgra_to_rgba_transposed(src: &[u32], width: i32, height: i32) -> Vec<u32> {
    let (w, h) = (width.max(0) as usize, height.max(0) as usize);
    let mut dst = vec![0; w * h];
    for y in 0..h {
        for x in 0..w {
            let pixel = src.get(y + x * h).copied().unwrap_or(0);
            let red = (pixel >> 16) & 0xFF;
            let green = (pixel >> 8) & 0xFF;
            let blue = pixel & 0xFF;
            let alpha = pixel >> 24;
            dst[x + y * w] = red | (green << 8) | (blue << 16) | (alpha << 24);
        }
    }
    dst
}

/// Resolves every palette index of a colormap to opaque RGBA8.
pub fn colormap_rgba(colormap: &[u8], palette: &Palette) -> Vec<u32> {
    (0..COLORMAP_SIZE)
        .map(|i| {
            let [r, g, b] = palette.rgb(colormap.get(i).copied().unwrap_or(0));
            u32::from(r) | (u32::from(g) << 8) | (u32::from(b) << 16) | (0xFF << 24)
        })
        .collect()
}

/// First 256 bytes of a translation; a short table maps the rest to itself.
pub fn translation_table(translation: &[u8]) -> [u8; 256] {
    std::array::from_fn(|i| translation.get(i).copied().unwrap_or(i as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gfx::hardpoly::shading::unpack_rgba;

    #[test]
    fn columns_become_rows() {
        // 8 wide, 4 tall, column x holds x * 10 + y.
        let src: Vec<u8> = (0..8u8).flat_map(|x| (0..4u8).map(move |y| x * 10 + y)).collect();
        let rows = transpose_columns(&src, 8, 4);
        assert_eq!(rows.len(), 32);
        assert_eq!(&rows[0..8], &[0, 10, 20, 30, 40, 50, 60, 70]);
        assert_eq!(rows[3 * 8 + 5], 53);
    }

    #[test]
    fn short_sources_pad_with_transparent_index() {
        let rows = transpose_columns(&[7, 7], 2, 2);
        assert_eq!(rows, [7, 0, 7, 0]);
        assert!(transpose_columns(&[], -3, 2).is_empty());
    }

    #[test]
    fn bgra_words_are_reordered_and_transposed() {
        // 2 wide, 1 tall.
        let src = [0x80_11_22_33, 0xFF_44_55_66];
        let dst = bgra_to_rgba_transposed(&src, 2, 1);
        assert_eq!(dst, [0x80_33_22_11, 0xFF_66_55_44]);
        assert_eq!(unpack_rgba(dst[0])[0], f32::from(0x11u8) / 255.0);
    }

    #[test]
    fn colormap_resolves_through_palette() {
        let mut palette = Palette::default();
        palette.colors[5] = [10, 20, 30];
        let mut colormap = vec![0u8; COLORMAP_SIZE];
        colormap[256 * 3 + 9] = 5;
        let texels = colormap_rgba(&colormap, &palette);
        assert_eq!(texels.len(), 256 * NUMCOLORMAPS);
        assert_eq!(texels[256 * 3 + 9], 10 | 20 << 8 | 30 << 16 | 0xFF << 24);
        assert_eq!(texels[0], 0xFF00_0000, "index 0 of the grey ramp is black");
    }

    #[test]
    fn translation_is_copied_verbatim() {
        let source: Vec<u8> = (0..=255u8).rev().collect();
        let table = translation_table(&source);
        assert_eq!(table[0], 255);
        assert_eq!(table[255], 0);
        assert_eq!(translation_table(&[9])[200], 200);
    }

    #[test]
    fn sentinel_texel_is_opaque() {
        assert_eq!(PINK_SENTINEL.to_le_bytes(), [0xFF, 0xFF, 0x00, 0xFF]);
        assert_eq!(unpack_rgba(PINK_SENTINEL)[3], 1.0);
    }
}
