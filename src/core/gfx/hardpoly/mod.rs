//! Palette-faithful triangle renderer.
//!
//! Producers describe software-renderer style draws with [`PolyDrawArgs`]
//! and queue them on their own [`DrawBatcher`]. The render thread drains the
//! batchers through [`HardpolyRenderer`], which reproduces the 8-bit
//! colormap lighting in the fragment stage.

pub mod args;
pub mod batcher;
pub mod blend;
pub mod caches;
pub mod renderer;
pub mod shading;
pub mod uniforms;

pub use args::{
    BlendMode, ClipPlane, Palette, PaletteTexture, PolyDrawArgs, PolyDrawMode, RectDrawArgs,
    TextureSource, TriVertex,
};
pub use batcher::{BatchSink, DrawBatch, DrawBatcher, DrawRun, FaceUniforms};
pub use caches::ResourceCaches;
pub use renderer::{FrameStats, HardpolyRenderer};
