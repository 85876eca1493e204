//! Contracts shared with the scene walker: vertex layout, draw arguments and
//! the engine-side resources they point at.

use crate::core::gfx::gpu::DrawMode;
use bytemuck::{Pod, Zeroable};
use std::{fmt, sync::Arc};

/// Rows in a colormap table.
pub const NUMCOLORMAPS: usize = 32;

/// Bytes in one colormap table (256 palette columns per row).
pub const COLORMAP_SIZE: usize = 256 * NUMCOLORMAPS;

/// A vertex as produced by the scene walker. `w` is free for the batcher to
/// reuse as the face index.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct TriVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
    pub u: f32,
    pub v: f32,
}

impl TriVertex {
    pub const fn new(x: f32, y: f32, z: f32, u: f32, v: f32) -> Self {
        Self { x, y, z, w: 1.0, u, v }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolyDrawMode {
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl PolyDrawMode {
    #[inline(always)]
    pub const fn draw_mode(self) -> DrawMode {
        match self {
            Self::Triangles => DrawMode::Triangles,
            Self::TriangleStrip => DrawMode::TriangleStrip,
            Self::TriangleFan => DrawMode::TriangleFan,
        }
    }
}

/// How a triangle combines its texture, fill color and the framebuffer.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    TextureOpaque,
    TextureMasked,
    TextureAdd,
    TextureSub,
    TextureRevSub,
    TextureAddSrcColor,
    TranslatedOpaque,
    TranslatedMasked,
    TranslatedAdd,
    TranslatedSub,
    TranslatedRevSub,
    TranslatedAddSrcColor,
    Shaded,
    AddShaded,
    Stencil,
    AddStencil,
    FillOpaque,
    FillAdd,
    FillSub,
    FillRevSub,
    FillAddSrcColor,
    Skycap,
    Fuzz,
    FogBoundary,
}

impl BlendMode {
    pub const COUNT: usize = 24;

    pub const ALL: [Self; Self::COUNT] = [
        Self::TextureOpaque,
        Self::TextureMasked,
        Self::TextureAdd,
        Self::TextureSub,
        Self::TextureRevSub,
        Self::TextureAddSrcColor,
        Self::TranslatedOpaque,
        Self::TranslatedMasked,
        Self::TranslatedAdd,
        Self::TranslatedSub,
        Self::TranslatedRevSub,
        Self::TranslatedAddSrcColor,
        Self::Shaded,
        Self::AddShaded,
        Self::Stencil,
        Self::AddStencil,
        Self::FillOpaque,
        Self::FillAdd,
        Self::FillSub,
        Self::FillRevSub,
        Self::FillAddSrcColor,
        Self::Skycap,
        Self::Fuzz,
        Self::FogBoundary,
    ];

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Plane `a*x + b*y + c*z + d`; points with a negative distance are clipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipPlane {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
}

impl ClipPlane {
    /// Keeps everything.
    pub const NONE: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        Self { a, b, c, d }
    }

    #[inline(always)]
    pub const fn to_array(self) -> [f32; 4] {
        [self.a, self.b, self.c, self.d]
    }
}

impl Default for ClipPlane {
    fn default() -> Self {
        Self::NONE
    }
}

/// An engine texture. Pixels are stored column by column, as the software
/// renderer walks them.
pub trait PaletteTexture: Send + Sync {
    fn width(&self) -> i32;
    fn height(&self) -> i32;
    /// `width * height` palette indices, column-major.
    fn pixels(&self) -> &[u8];
    /// `width * height` packed `0xAARRGGBB` texels, column-major.
    fn pixels_bgra(&self) -> &[u32];
}

/// The engine's 256-entry RGB palette.
#[derive(Clone, PartialEq, Eq)]
pub struct Palette {
    pub colors: [[u8; 3]; 256],
}

impl Palette {
    pub const fn new(colors: [[u8; 3]; 256]) -> Self {
        Self { colors }
    }

    #[inline(always)]
    pub const fn rgb(&self, index: u8) -> [u8; 3] {
        self.colors[index as usize]
    }
}

impl Default for Palette {
    /// Grey ramp.
    fn default() -> Self {
        let mut colors = [[0; 3]; 256];
        for (i, c) in colors.iter_mut().enumerate() {
            *c = [i as u8; 3];
        }
        Self { colors }
    }
}

impl fmt::Debug for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Palette").finish_non_exhaustive()
    }
}

/// Where a draw's diffuse palette indices come from.
#[derive(Clone, Default)]
pub enum TextureSource {
    Engine(Arc<dyn PaletteTexture>),
    /// Runtime-generated column-major pixels.
    Pixels {
        pixels: Arc<[u8]>,
        width: i32,
        height: i32,
    },
    /// Samples a single transparent texel.
    #[default]
    Missing,
}

impl PartialEq for TextureSource {
    /// Identity comparison: two sources are equal when they name the same
    /// engine allocation.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Engine(a), Self::Engine(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (
                Self::Pixels { pixels: a, width: wa, height: ha },
                Self::Pixels { pixels: b, width: wb, height: hb },
            ) => Arc::ptr_eq(a, b) && wa == wb && ha == hb,
            (Self::Missing, Self::Missing) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for TextureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine(t) => write!(f, "Engine({}x{})", t.width(), t.height()),
            Self::Pixels { width, height, .. } => write!(f, "Pixels({width}x{height})"),
            Self::Missing => f.write_str("Missing"),
        }
    }
}

/// One polygonal draw call.
#[derive(Clone, Debug)]
pub struct PolyDrawArgs<'a> {
    pub vertices: &'a [TriVertex],
    pub draw_mode: PolyDrawMode,
    pub texture: TextureSource,
    pub translation: Option<Arc<[u8]>>,
    pub base_colormap: Arc<[u8]>,
    pub blend_mode: BlendMode,
    /// 0..=255.
    pub src_alpha: u32,
    /// 0..=255.
    pub dest_alpha: u32,
    /// Sector light 0..=255.
    pub light: i32,
    pub fixed_light: bool,
    /// `0x00RRGGBB` in true-color use, a palette index in palette use.
    pub color: u32,
    pub clip_planes: [ClipPlane; 3],
    pub depth_test: bool,
    pub write_depth: bool,
    pub write_color: bool,
    pub face_cull_ccw: bool,
}

impl<'a> PolyDrawArgs<'a> {
    /// Opaque, depth-tested, unclipped triangles at full light.
    pub fn new(vertices: &'a [TriVertex], base_colormap: Arc<[u8]>) -> Self {
        Self {
            vertices,
            draw_mode: PolyDrawMode::Triangles,
            texture: TextureSource::Missing,
            translation: None,
            base_colormap,
            blend_mode: BlendMode::TextureOpaque,
            src_alpha: 255,
            dest_alpha: 0,
            light: 255,
            fixed_light: false,
            color: 0,
            clip_planes: [ClipPlane::NONE; 3],
            depth_test: true,
            write_depth: true,
            write_color: true,
            face_cull_ccw: false,
        }
    }

    #[inline(always)]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }
}

/// A screen-space quad in window pixels.
#[derive(Clone)]
pub struct RectDrawArgs {
    pub texture: Option<Arc<dyn PaletteTexture>>,
    pub base_colormap: Arc<[u8]>,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
    pub light: i32,
}

impl RectDrawArgs {
    pub fn new(
        texture: Option<Arc<dyn PaletteTexture>>,
        base_colormap: Arc<[u8]>,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
    ) -> Self {
        Self {
            texture,
            base_colormap,
            x0,
            y0,
            x1,
            y1,
            u0: 0.0,
            v0: 0.0,
            u1: 1.0,
            v1: 1.0,
            light: 255,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Solid(Vec<u8>, Vec<u32>);

    impl PaletteTexture for Solid {
        fn width(&self) -> i32 {
            2
        }
        fn height(&self) -> i32 {
            2
        }
        fn pixels(&self) -> &[u8] {
            &self.0
        }
        fn pixels_bgra(&self) -> &[u32] {
            &self.1
        }
    }

    #[test]
    fn tri_vertex_is_six_packed_floats() {
        assert_eq!(std::mem::size_of::<TriVertex>(), 24);
        assert_eq!(std::mem::offset_of!(TriVertex, u), 16);
    }

    #[test]
    fn blend_mode_indices_follow_declaration_order() {
        for (i, mode) in BlendMode::ALL.iter().enumerate() {
            assert_eq!(mode.index(), i, "{mode:?}");
        }
        assert_eq!(BlendMode::FogBoundary.index(), 23);
    }

    #[test]
    fn default_clip_plane_keeps_every_point() {
        let p = ClipPlane::default().to_array();
        let dist = p[0] * 123.0 + p[1] * -5.0 + p[2] * 9.0 + p[3];
        assert!(dist > 0.0);
    }

    #[test]
    fn texture_sources_compare_by_identity() {
        let a: Arc<dyn PaletteTexture> = Arc::new(Solid(vec![1; 4], vec![0; 4]));
        let b: Arc<dyn PaletteTexture> = Arc::new(Solid(vec![1; 4], vec![0; 4]));
        assert_eq!(TextureSource::Engine(a.clone()), TextureSource::Engine(a.clone()));
        assert_ne!(TextureSource::Engine(a), TextureSource::Engine(b));

        let pixels: Arc<[u8]> = Arc::from(vec![0u8; 32]);
        let same = TextureSource::Pixels { pixels: pixels.clone(), width: 8, height: 4 };
        assert_eq!(same, TextureSource::Pixels { pixels, width: 8, height: 4 });
        assert_eq!(TextureSource::Missing, TextureSource::default());
    }

    #[test]
    fn draw_modes_map_to_gpu_topologies() {
        assert_eq!(PolyDrawMode::Triangles.draw_mode(), DrawMode::Triangles);
        assert_eq!(PolyDrawMode::TriangleStrip.draw_mode(), DrawMode::TriangleStrip);
        assert_eq!(PolyDrawMode::TriangleFan.draw_mode(), DrawMode::TriangleFan);
    }
}
