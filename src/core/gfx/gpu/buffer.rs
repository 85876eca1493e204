use super::{Gl, GpuError, current_binding};
use glow::HasContext;
use std::ops::{Deref, DerefMut};

/// One GL buffer object bound to a fixed target. The public buffer types
/// are thin wrappers that pick the target and usage.
struct RawBuffer {
    gl: Gl,
    handle: glow::Buffer,
    target: u32,
    binding: u32,
    usage: u32,
    size: usize,
}

impl RawBuffer {
    fn new(
        gl: &Gl,
        target: u32,
        binding: u32,
        usage: u32,
        data: Option<&[u8]>,
        size: usize,
    ) -> Result<Self, GpuError> {
        unsafe {
            let handle = gl.create_buffer()?;
            let old = current_binding(gl, binding, glow::NativeBuffer);
            gl.bind_buffer(target, Some(handle));
            match data {
                Some(bytes) => gl.buffer_data_u8_slice(target, bytes, usage),
                None => gl.buffer_data_size(target, size as i32, usage),
            }
            gl.bind_buffer(target, old);
            Ok(Self {
                gl: gl.clone(),
                handle,
                target,
                binding,
                usage,
                size: data.map_or(size, <[u8]>::len),
            })
        }
    }

    /// Reallocates the storage with `data` as its new contents.
    fn replace(&mut self, data: &[u8]) {
        let gl = &self.gl;
        unsafe {
            let old = current_binding(gl, self.binding, glow::NativeBuffer);
            gl.bind_buffer(self.target, Some(self.handle));
            gl.buffer_data_u8_slice(self.target, data, self.usage);
            gl.bind_buffer(self.target, old);
        }
        self.size = data.len();
    }

    fn map_write_only(&mut self) -> Option<MappedWrite<'_>> {
        let gl = &self.gl;
        let ptr = unsafe {
            let old = current_binding(gl, self.binding, glow::NativeBuffer);
            gl.bind_buffer(self.target, Some(self.handle));
            let ptr = gl.map_buffer_range(
                self.target,
                0,
                self.size as i32,
                glow::MAP_WRITE_BIT | glow::MAP_INVALIDATE_BUFFER_BIT,
            );
            gl.bind_buffer(self.target, old);
            ptr
        };
        if ptr.is_null() {
            return None;
        }
        // SAFETY: the driver returned a writable mapping of `size` bytes that
        // stays valid until unmapped; the guard's lifetime ties it to `self`.
        let bytes = unsafe { std::slice::from_raw_parts_mut(ptr, self.size) };
        Some(MappedWrite { buffer: self, bytes })
    }

    fn unmap(&self) {
        let gl = &self.gl;
        unsafe {
            let old = current_binding(gl, self.binding, glow::NativeBuffer);
            gl.bind_buffer(self.target, Some(self.handle));
            gl.unmap_buffer(self.target);
            gl.bind_buffer(self.target, old);
        }
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        unsafe { self.gl.delete_buffer(self.handle) };
    }
}

/// Write-only view of a mapped buffer. The buffer is unmapped when the
/// guard goes away.
pub struct MappedWrite<'a> {
    buffer: &'a RawBuffer,
    bytes: &'a mut [u8],
}

impl MappedWrite<'_> {
    pub fn unmap(self) {}
}

impl Deref for MappedWrite<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl DerefMut for MappedWrite<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.bytes
    }
}

impl Drop for MappedWrite<'_> {
    fn drop(&mut self) {
        self.buffer.unmap();
    }
}

macro_rules! buffer_accessors {
    ($ty:ident) => {
        impl $ty {
            #[inline(always)]
            pub fn raw(&self) -> glow::Buffer {
                self.0.handle
            }

            #[inline(always)]
            pub fn handle(&self) -> u32 {
                self.0.handle.0.get()
            }

            #[inline(always)]
            pub fn size(&self) -> usize {
                self.0.size
            }
        }
    };
}

pub struct VertexBuffer(RawBuffer);

impl VertexBuffer {
    /// `data` of `None` allocates `size` uninitialized bytes.
    pub fn new(gl: &Gl, data: Option<&[u8]>, size: usize) -> Result<Self, GpuError> {
        RawBuffer::new(
            gl,
            glow::ARRAY_BUFFER,
            glow::ARRAY_BUFFER_BINDING,
            glow::STREAM_DRAW,
            data,
            size,
        )
        .map(Self)
    }

    /// Replaces the whole buffer, resizing it to `data`.
    pub fn upload(&mut self, data: &[u8]) {
        self.0.replace(data);
    }

    pub fn map_write_only(&mut self) -> Option<MappedWrite<'_>> {
        self.0.map_write_only()
    }
}

buffer_accessors!(VertexBuffer);

pub struct IndexBuffer(RawBuffer);

impl IndexBuffer {
    pub fn new(gl: &Gl, data: Option<&[u8]>, size: usize) -> Result<Self, GpuError> {
        RawBuffer::new(
            gl,
            glow::ELEMENT_ARRAY_BUFFER,
            glow::ELEMENT_ARRAY_BUFFER_BINDING,
            glow::STREAM_DRAW,
            data,
            size,
        )
        .map(Self)
    }

    /// Replaces the whole buffer, resizing it to `data`.
    pub fn upload(&mut self, data: &[u8]) {
        self.0.replace(data);
    }

    pub fn map_write_only(&mut self) -> Option<MappedWrite<'_>> {
        self.0.map_write_only()
    }
}

buffer_accessors!(IndexBuffer);

pub struct UniformBuffer(RawBuffer);

impl UniformBuffer {
    pub fn new(gl: &Gl, data: Option<&[u8]>, size: usize) -> Result<Self, GpuError> {
        RawBuffer::new(
            gl,
            glow::UNIFORM_BUFFER,
            glow::UNIFORM_BUFFER_BINDING,
            glow::STREAM_DRAW,
            data,
            size,
        )
        .map(Self)
    }

    /// Replaces the whole buffer. Orphaning the old storage keeps frames
    /// still in flight on the previous contents.
    pub fn upload(&mut self, data: &[u8]) {
        self.0.replace(data);
    }
}

buffer_accessors!(UniformBuffer);

pub struct StorageBuffer(RawBuffer);

impl StorageBuffer {
    pub fn new(gl: &Gl, data: Option<&[u8]>, size: usize) -> Result<Self, GpuError> {
        RawBuffer::new(
            gl,
            glow::SHADER_STORAGE_BUFFER,
            glow::SHADER_STORAGE_BUFFER_BINDING,
            glow::STATIC_DRAW,
            data,
            size,
        )
        .map(Self)
    }

    pub fn upload(&mut self, data: &[u8]) {
        self.0.replace(data);
    }
}

buffer_accessors!(StorageBuffer);
