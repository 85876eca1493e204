//! Per-producer accumulation of draw calls into bounded batches.
//!
//! A batcher never touches the GPU. Each producer thread owns one, fills it
//! with `draw_array`, and the render thread later drains it through a
//! [`BatchSink`] that uploads and draws each batch.

use super::args::{BlendMode, PolyDrawArgs, PolyDrawMode, TextureSource, TriVertex};
use super::blend::sampler_mode;
use bytemuck::{Pod, Zeroable};
use log::warn;
use std::sync::Arc;

/// Vertex capacity of one batch.
pub const MAX_VERTICES: usize = 16 * 1024;

/// Face record capacity of one batch. Must match the `MAX_FACES` define of
/// the scene program.
pub const MAX_FACES: usize = 200;

/// Per-face record of the scene program's `FaceUniforms` block (std140).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct FaceUniforms {
    /// Sector light 0..=255, or `-fixed - 1` for fixed light.
    pub light: f32,
    pub alpha_test: f32,
    pub mode: i32,
    pub padding: i32,
    /// RGB normalized; alpha carries the raw engine color.
    pub fill_color: [f32; 4],
    pub clip_plane0: [f32; 4],
    pub clip_plane1: [f32; 4],
    pub clip_plane2: [f32; 4],
}

/// Face light as the shader decodes it.
#[inline(always)]
pub fn encode_light(light: i32, fixed: bool) -> f32 {
    if fixed { (-light - 1) as f32 } else { light as f32 }
}

/// Fill color from an engine color.
#[inline(always)]
pub fn fill_color(color: u32) -> [f32; 4] {
    [
        ((color >> 16) & 0xFF) as f32 / 255.0,
        ((color >> 8) & 0xFF) as f32 / 255.0,
        (color & 0xFF) as f32 / 255.0,
        color as f32,
    ]
}

/// A range of one batch's vertices drawn with the same state.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRun {
    pub texture: TextureSource,
    pub base_colormap: Arc<[u8]>,
    pub translation: Option<Arc<[u8]>>,
    pub start: usize,
    pub num_vertices: usize,
    pub draw_mode: PolyDrawMode,
    pub blend_mode: BlendMode,
    pub src_alpha: u32,
    pub dest_alpha: u32,
    pub depth_test: bool,
    pub write_depth: bool,
}

/// CPU side of one batch. `gpu_slot` names the sink-owned GPU objects
/// bound to this batch once it has been rendered.
#[derive(Default)]
pub struct DrawBatch {
    vertices: Vec<TriVertex>,
    faces: Vec<FaceUniforms>,
    runs: Vec<DrawRun>,
    gpu_slot: Option<usize>,
}

impl DrawBatch {
    fn reset(&mut self) {
        self.vertices.clear();
        self.vertices.reserve(MAX_VERTICES);
        self.faces.clear();
        self.runs.clear();
    }

    #[inline(always)]
    pub fn vertices(&self) -> &[TriVertex] {
        &self.vertices
    }

    #[inline(always)]
    pub fn face_uniforms(&self) -> &[FaceUniforms] {
        &self.faces
    }

    #[inline(always)]
    pub fn draw_runs(&self) -> &[DrawRun] {
        &self.runs
    }

    #[inline(always)]
    pub const fn gpu_slot(&self) -> Option<usize> {
        self.gpu_slot
    }

    #[inline(always)]
    pub fn set_gpu_slot(&mut self, slot: usize) {
        self.gpu_slot = Some(slot);
    }
}

/// Receives closed batches, in submission order.
pub trait BatchSink {
    fn render_batch(&mut self, batch: &mut DrawBatch);
}

/// Batch builder owned by one producer.
///
/// Batches of the current frame are kept after drawing so the next frame
/// but one can refill them, which lets their GPU buffers be reused without
/// waiting on the frame that just used them.
#[derive(Default)]
pub struct DrawBatcher {
    current_frame: Vec<DrawBatch>,
    last_frame: Vec<DrawBatch>,
    next_batch: usize,
    draw_start: usize,
    current: Option<usize>,
}

impl DrawBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes room for `count` vertices and one face record in the current
    /// batch, closing it first when either would overflow.
    pub fn get_vertices(&mut self, count: usize) {
        let full = self.current.is_some_and(|i| {
            let batch = &self.current_frame[i];
            batch.vertices.len() + count > MAX_VERTICES || batch.faces.len() >= MAX_FACES
        });
        if full {
            self.flush();
        }

        if self.current.is_none() {
            if self.next_batch == self.current_frame.len() {
                self.current_frame.push(DrawBatch::default());
            }
            self.current_frame[self.next_batch].reset();
            self.current = Some(self.next_batch);
            self.next_batch += 1;
        }
    }

    /// Closes the current batch. Nothing is drawn until `draw_batches`.
    pub fn flush(&mut self) {
        self.current = None;
    }

    /// Write cursor within the current batch.
    pub fn next_vertex(&self) -> usize {
        self.current
            .map_or(0, |i| self.current_frame[i].vertices.len())
    }

    /// Appends one draw. Returns false when it was skipped: color writes off,
    /// fewer than three vertices, or more vertices than a batch can hold.
    pub fn draw_array(&mut self, args: &PolyDrawArgs<'_>) -> bool {
        let count = args.vertex_count();
        if !args.write_color || count < 3 {
            return false;
        }
        if count > MAX_VERTICES {
            warn!("Dropping draw of {count} vertices; a batch holds at most {MAX_VERTICES}.");
            return false;
        }

        self.get_vertices(count);
        let Some(index) = self.current else {
            return false;
        };
        let batch = &mut self.current_frame[index];

        let run = DrawRun {
            texture: args.texture.clone(),
            base_colormap: Arc::clone(&args.base_colormap),
            translation: args.translation.clone(),
            start: batch.vertices.len(),
            num_vertices: count,
            draw_mode: args.draw_mode,
            blend_mode: args.blend_mode,
            src_alpha: args.src_alpha,
            dest_alpha: args.dest_alpha,
            depth_test: args.depth_test,
            write_depth: args.write_depth,
        };

        let [p0, p1, p2] = args.clip_planes.map(|p| p.to_array());
        let face = FaceUniforms {
            light: encode_light(args.light, args.fixed_light),
            alpha_test: 0.5,
            mode: sampler_mode(args.blend_mode) as i32,
            padding: 0,
            fill_color: fill_color(args.color),
            clip_plane0: p0,
            clip_plane1: p1,
            clip_plane2: p2,
        };

        let face_index = batch.faces.len() as f32;
        batch
            .vertices
            .extend(args.vertices.iter().map(|v| TriVertex { w: face_index, ..*v }));
        batch.faces.push(face);
        batch.runs.push(run);
        true
    }

    /// Closes the current batch and hands every batch not yet drawn this
    /// frame to `sink`. Empty batches are skipped.
    pub fn draw_batches(&mut self, sink: &mut impl BatchSink) {
        self.flush();
        for batch in &mut self.current_frame[self.draw_start..self.next_batch] {
            if batch.runs.is_empty() {
                continue;
            }
            sink.render_batch(batch);
        }
        self.draw_start = self.next_batch;
    }

    /// Starts a new frame, recycling the batches of the frame before last.
    pub fn next_frame(&mut self) {
        self.flush();
        std::mem::swap(&mut self.current_frame, &mut self.last_frame);
        self.next_batch = 0;
        self.draw_start = 0;
    }

    /// Batches opened so far this frame.
    pub fn batch_count(&self) -> usize {
        self.next_batch
    }

    /// The batches opened so far this frame, in order.
    pub fn batches(&self) -> &[DrawBatch] {
        &self.current_frame[..self.next_batch]
    }
}
