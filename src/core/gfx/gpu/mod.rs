//! Thin ownership layer over OpenGL objects.
//!
//! Every wrapper owns exactly one GL object plus a reference to the context
//! that created it, and deletes the object on drop. Operations that need a
//! global binding point (uploads, mapping) save and restore it, so callers
//! never see their bound state disturbed.

mod buffer;
mod context;
mod framebuffer;
mod program;
mod sampler;
mod texture;
mod vertex_array;

pub use buffer::{IndexBuffer, StorageBuffer, UniformBuffer, VertexBuffer};
pub use context::{BlendState, GpuContext};
pub use framebuffer::FrameBuffer;
pub use program::Program;
pub use sampler::Sampler;
pub use texture::{Texture2D, num_levels};
pub use vertex_array::{VertexArray, VertexAttributeDesc};

use glow::HasContext;
use std::{fmt, num::NonZeroU32, rc::Rc};

/// Shared handle to the GL function table. Not `Send`: GPU objects stay on
/// the render thread.
pub type Gl = Rc<glow::Context>;

// --- Errors ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    CreateObject(String),
    ShaderCompile { name: String, log: String },
    ProgramLink { name: String, log: String },
    FramebufferIncomplete(u32),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateObject(msg) => write!(f, "failed to create GL object: {msg}"),
            Self::ShaderCompile { name, log } => write!(f, "Compile Shader '{name}':\n{log}"),
            Self::ProgramLink { name, log } => write!(f, "Link Shader '{name}':\n{log}"),
            Self::FramebufferIncomplete(status) => write!(
                f,
                "Framebuffer setup is not compatible with this graphics card or driver (status 0x{status:04X})"
            ),
        }
    }
}

impl std::error::Error for GpuError {}

impl From<String> for GpuError {
    fn from(msg: String) -> Self {
        Self::CreateObject(msg)
    }
}

// --- Enumerations ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8,
    Srgb8Alpha8,
    Rgba16,
    Rgba16F,
    Rgba32F,
    Depth24Stencil8,
    R32F,
    R8,
}

impl PixelFormat {
    pub const fn internal_format(self) -> u32 {
        match self {
            Self::Rgba8 => glow::RGBA8,
            Self::Srgb8Alpha8 => glow::SRGB8_ALPHA8,
            Self::Rgba16 => glow::RGBA16,
            Self::Rgba16F => glow::RGBA16F,
            Self::Rgba32F => glow::RGBA32F,
            Self::Depth24Stencil8 => glow::DEPTH24_STENCIL8,
            Self::R32F => glow::R32F,
            Self::R8 => glow::R8,
        }
    }

    pub const fn upload_format(self) -> u32 {
        match self {
            Self::Rgba8 | Self::Srgb8Alpha8 | Self::Rgba16 | Self::Rgba16F | Self::Rgba32F => {
                glow::RGBA
            }
            Self::Depth24Stencil8 => glow::DEPTH_STENCIL,
            Self::R32F | Self::R8 => glow::RED,
        }
    }

    pub const fn upload_type(self) -> u32 {
        match self {
            Self::Rgba8 | Self::Srgb8Alpha8 | Self::R8 => glow::UNSIGNED_BYTE,
            Self::Rgba16 => glow::UNSIGNED_SHORT,
            Self::Rgba16F => glow::HALF_FLOAT,
            Self::Rgba32F | Self::R32F => glow::FLOAT,
            Self::Depth24Stencil8 => glow::UNSIGNED_INT_24_8,
        }
    }

    /// Size of one texel in the upload format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::R8 => 1,
            Self::Rgba8 | Self::Srgb8Alpha8 | Self::Depth24Stencil8 | Self::R32F => 4,
            Self::Rgba16 | Self::Rgba16F => 8,
            Self::Rgba32F => 16,
        }
    }
}

/// Primitive topology for draw calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawMode {
    Points,
    LineStrip,
    LineLoop,
    Lines,
    TriangleStrip,
    TriangleFan,
    Triangles,
}

impl DrawMode {
    #[inline(always)]
    pub const fn gl_mode(self) -> u32 {
        match self {
            Self::Points => glow::POINTS,
            Self::LineStrip => glow::LINE_STRIP,
            Self::LineLoop => glow::LINE_LOOP,
            Self::Lines => glow::LINES,
            Self::TriangleStrip => glow::TRIANGLE_STRIP,
            Self::TriangleFan => glow::TRIANGLE_FAN,
            Self::Triangles => glow::TRIANGLES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexFormat {
    #[default]
    Uint16,
    Uint32,
}

impl IndexFormat {
    #[inline(always)]
    pub const fn gl_type(self) -> u32 {
        match self {
            Self::Uint16 => glow::UNSIGNED_SHORT,
            Self::Uint32 => glow::UNSIGNED_INT,
        }
    }

    #[inline(always)]
    pub const fn size(self) -> i32 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub const fn gl_type(self) -> u32 {
        match self {
            Self::Vertex => glow::VERTEX_SHADER,
            Self::Fragment => glow::FRAGMENT_SHADER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MipmapMode {
    None,
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    Repeat,
    Mirror,
    ClampToEdge,
}

impl WrapMode {
    pub const fn gl_wrap(self) -> u32 {
        match self {
            Self::Repeat => glow::REPEAT,
            Self::Mirror => glow::MIRRORED_REPEAT,
            Self::ClampToEdge => glow::CLAMP_TO_EDGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    HalfFloat,
    Float,
}

impl VertexAttributeType {
    pub const fn gl_type(self) -> u32 {
        match self {
            Self::Int8 => glow::BYTE,
            Self::Uint8 => glow::UNSIGNED_BYTE,
            Self::Int16 => glow::SHORT,
            Self::Uint16 => glow::UNSIGNED_SHORT,
            Self::Int32 => glow::INT,
            Self::Uint32 => glow::UNSIGNED_INT,
            Self::HalfFloat => glow::HALF_FLOAT,
            Self::Float => glow::FLOAT,
        }
    }
}

// --- Binding snapshots ---

/// Reads an object binding and rebuilds the typed handle (0 means unbound).
#[inline(always)]
pub(crate) fn current_binding<T>(
    gl: &glow::Context,
    pname: u32,
    wrap: fn(NonZeroU32) -> T,
) -> Option<T> {
    let raw = unsafe { gl.get_parameter_i32(pname) };
    NonZeroU32::new(raw as u32).map(wrap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_formats_map_to_matching_upload_triplets() {
        assert_eq!(PixelFormat::R8.internal_format(), glow::R8);
        assert_eq!(PixelFormat::R8.upload_format(), glow::RED);
        assert_eq!(PixelFormat::R8.upload_type(), glow::UNSIGNED_BYTE);
        assert_eq!(PixelFormat::Rgba16F.upload_type(), glow::HALF_FLOAT);
        assert_eq!(PixelFormat::Depth24Stencil8.upload_format(), glow::DEPTH_STENCIL);
        assert_eq!(PixelFormat::Depth24Stencil8.upload_type(), glow::UNSIGNED_INT_24_8);
        assert_eq!(PixelFormat::R32F.upload_format(), glow::RED);
        assert_eq!(PixelFormat::Srgb8Alpha8.internal_format(), glow::SRGB8_ALPHA8);
    }

    #[test]
    fn index_format_sizes_match_gl_types() {
        assert_eq!(IndexFormat::Uint16.size(), 2);
        assert_eq!(IndexFormat::Uint16.gl_type(), glow::UNSIGNED_SHORT);
        assert_eq!(IndexFormat::Uint32.size(), 4);
        assert_eq!(IndexFormat::Uint32.gl_type(), glow::UNSIGNED_INT);
        assert_eq!(IndexFormat::default(), IndexFormat::Uint16);
    }

    #[test]
    fn draw_modes_cover_all_topologies() {
        let pairs = [
            (DrawMode::Points, glow::POINTS),
            (DrawMode::LineStrip, glow::LINE_STRIP),
            (DrawMode::LineLoop, glow::LINE_LOOP),
            (DrawMode::Lines, glow::LINES),
            (DrawMode::TriangleStrip, glow::TRIANGLE_STRIP),
            (DrawMode::TriangleFan, glow::TRIANGLE_FAN),
            (DrawMode::Triangles, glow::TRIANGLES),
        ];
        for (mode, gl) in pairs {
            assert_eq!(mode.gl_mode(), gl, "{mode:?}");
        }
    }

    #[test]
    fn fatal_errors_carry_the_info_log() {
        let err = GpuError::ShaderCompile {
            name: "fragment".to_string(),
            log: "0:12: syntax error".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("fragment"));
        assert!(text.contains("0:12: syntax error"));
    }
}
