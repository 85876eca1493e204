use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// std140 `FrameUniforms` block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub world_to_view: [f32; 16],
    pub view_to_projection: [f32; 16],
    pub glob_vis: f32,
    pub padding: [f32; 3],
}

impl FrameUniforms {
    pub fn new(world_to_view: Mat4, view_to_projection: Mat4, glob_vis: f32) -> Self {
        Self {
            world_to_view: world_to_view.to_cols_array(),
            view_to_projection: view_to_projection.to_cols_array(),
            glob_vis,
            padding: [0.0; 3],
        }
    }
}

/// std140 `RectUniforms` block; corners in NDC.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct RectUniforms {
    pub x0: f32,
    pub y0: f32,
    pub u0: f32,
    pub v0: f32,
    pub x1: f32,
    pub y1: f32,
    pub u1: f32,
    pub v1: f32,
    pub light: f32,
    pub padding: [f32; 3],
}

/// Window pixel coordinate to NDC along one axis.
#[inline(always)]
pub fn pixel_to_ndc(value: f32, extent: f32) -> f32 {
    value / extent * 2.0 - 1.0
}

/// Ring of three per-frame resources. The slot only advances when the
/// contents changed, so a frame still in flight keeps reading its own slot.
pub struct TripleBuffer<T> {
    slots: [Option<T>; 3],
    current: usize,
    dirty: bool,
}

impl<T> TripleBuffer<T> {
    pub const fn new() -> Self {
        Self {
            slots: [None, None, None],
            current: 0,
            dirty: true,
        }
    }

    #[inline(always)]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[inline(always)]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline(always)]
    pub const fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<&T> {
        self.slots[self.current].as_ref()
    }

    /// When dirty, advances to the next slot, creates it on first use and
    /// hands it out for refilling. Returns `Ok(None)` when nothing changed.
    /// A failed creation leaves the ring dirty so the next call retries.
    pub fn rotate<E>(
        &mut self,
        create: impl FnOnce() -> Result<T, E>,
    ) -> Result<Option<&mut T>, E> {
        if !self.dirty {
            return Ok(None);
        }
        let next = (self.current + 1) % self.slots.len();
        if self.slots[next].is_none() {
            self.slots[next] = Some(create()?);
        }
        self.current = next;
        self.dirty = false;
        Ok(self.slots[next].as_mut())
    }
}

impl<T> Default for TripleBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn std140_sizes_match_glsl_blocks() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 144);
        assert_eq!(std::mem::offset_of!(FrameUniforms, glob_vis), 128);
        assert_eq!(std::mem::size_of::<RectUniforms>(), 48);
        assert_eq!(std::mem::offset_of!(RectUniforms, x1), 16);
        assert_eq!(std::mem::offset_of!(RectUniforms, light), 32);
    }

    #[test]
    fn matrices_are_stored_column_major() {
        let m = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let u = FrameUniforms::new(m, Mat4::IDENTITY, 8.0);
        assert_eq!(&u.world_to_view[12..15], &[1.0, 2.0, 3.0]);
        assert_eq!(u.glob_vis, 8.0);
    }

    #[test]
    fn slot_cycles_when_dirtied_every_frame() {
        let mut ring = TripleBuffer::new();
        let mut created = 0;
        let mut seen = Vec::new();
        for _ in 0..6 {
            ring.mark_dirty();
            let slot = ring
                .rotate(|| {
                    created += 1;
                    Ok::<_, Infallible>(created)
                })
                .expect("infallible");
            assert!(slot.is_some());
            seen.push(ring.current_index());
        }
        assert_eq!(seen, [1, 2, 0, 1, 2, 0]);
        assert_eq!(created, 3, "slots are created once and reused");
    }

    #[test]
    fn clean_ring_does_not_advance() {
        let mut ring = TripleBuffer::<u32>::new();
        assert!(ring.rotate(|| Ok::<_, Infallible>(7)).expect("infallible").is_some());
        let index = ring.current_index();
        assert!(ring.rotate(|| Ok::<_, Infallible>(9)).expect("infallible").is_none());
        assert_eq!(ring.current_index(), index);
        assert_eq!(ring.current(), Some(&7));
    }

    #[test]
    fn failed_creation_stays_dirty() {
        let mut ring = TripleBuffer::<u32>::new();
        assert_eq!(ring.rotate(|| Err("no context")).err(), Some("no context"));
        assert!(ring.is_dirty());
        assert_eq!(ring.current_index(), 0);
        assert!(ring.current().is_none());
    }

    #[test]
    fn ndc_spans_the_window() {
        assert_eq!(pixel_to_ndc(0.0, 640.0), -1.0);
        assert_eq!(pixel_to_ndc(320.0, 640.0), 0.0);
        assert_eq!(pixel_to_ndc(640.0, 640.0), 1.0);
    }
}
