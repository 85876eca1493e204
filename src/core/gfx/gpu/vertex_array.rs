use super::{Gl, GpuError, VertexAttributeType, VertexBuffer, current_binding};
use glow::HasContext;

/// One vertex attribute sourced from a vertex buffer.
#[derive(Clone, Copy)]
pub struct VertexAttributeDesc<'a> {
    pub index: u32,
    pub size: i32,
    pub ty: VertexAttributeType,
    pub normalized: bool,
    pub stride: i32,
    pub offset: i32,
    pub buffer: &'a VertexBuffer,
}

pub struct VertexArray {
    gl: Gl,
    handle: glow::VertexArray,
    attributes: Vec<u32>,
}

impl VertexArray {
    /// Records the attributes in the given order. The buffers only need to
    /// outlive the draws that use this array, not the call.
    pub fn new(gl: &Gl, attributes: &[VertexAttributeDesc<'_>]) -> Result<Self, GpuError> {
        unsafe {
            let handle = gl.create_vertex_array()?;
            let old_vao = current_binding(gl, glow::VERTEX_ARRAY_BINDING, glow::NativeVertexArray);
            let old_array = current_binding(gl, glow::ARRAY_BUFFER_BINDING, glow::NativeBuffer);
            gl.bind_vertex_array(Some(handle));

            for attr in attributes {
                gl.bind_buffer(glow::ARRAY_BUFFER, Some(attr.buffer.raw()));
                gl.enable_vertex_attrib_array(attr.index);
                gl.vertex_attrib_pointer_f32(
                    attr.index,
                    attr.size,
                    attr.ty.gl_type(),
                    attr.normalized,
                    attr.stride,
                    attr.offset,
                );
            }

            gl.bind_buffer(glow::ARRAY_BUFFER, old_array);
            gl.bind_vertex_array(old_vao);

            Ok(Self {
                gl: gl.clone(),
                handle,
                attributes: attributes.iter().map(|a| a.index).collect(),
            })
        }
    }

    #[inline(always)]
    pub fn raw(&self) -> glow::VertexArray {
        self.handle
    }

    #[inline(always)]
    pub fn handle(&self) -> u32 {
        self.handle.0.get()
    }

    /// Attribute locations in binding order.
    pub fn attributes(&self) -> &[u32] {
        &self.attributes
    }
}

impl Drop for VertexArray {
    fn drop(&mut self) {
        unsafe { self.gl.delete_vertex_array(self.handle) };
    }
}
