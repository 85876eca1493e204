//! OpenGL renderer that draws software-renderer triangles with the engine's
//! palette, colormap and light-diminishing rules intact.

pub mod config;
pub mod core;
