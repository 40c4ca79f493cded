//! Repacking of draw-order dependent buffers
//!
//! Whenever the active draw list changes, the buffers that are read by draw
//! position instead of by slot are rewritten in list order. Which buffers
//! exist depends on the submission strategy:
//!
//! | strategy                   | indices | offsets / base vertices | block records |
//! |----------------------------|---------|-------------------------|---------------|
//! | chunked multi-draw         | yes     |                         | yes           |
//! | chunked multi-draw + base  |         | yes                     | yes           |
//! | multi-draw                 | yes     |                         |               |
//! | multi-draw + base          |         | yes                     |               |
//! | per object, separate       |         |                         |               |
//!
//! Position `i` of every derived array describes slot `list[i]`. Rebuilding
//! is pure; [`RepackedBuffers::upload`] then pushes the result to the backend
//! before any draw of the frame reads it.

use crate::batch::pool::{ObjectPool, TransformRecord, VERTICES_PER_OBJECT};
use crate::batch::strategy::SubmissionStrategy;
use crate::render::backend::{BackendResult, GraphicsBackend};

/// Derived, list-ordered view of the pool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepackedBuffers {
    len: usize,
    indices: Vec<u32>,
    byte_offsets: Vec<i32>,
    base_vertices: Vec<i32>,
    transforms: Vec<TransformRecord>,
    chunk_size: usize,
}

impl RepackedBuffers {
    /// Empty buffers
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite every derived array for `list`
    ///
    /// Allocations are reused across calls.
    pub fn rebuild(&mut self, list: &[usize], pool: &ObjectPool, strategy: SubmissionStrategy) {
        self.len = list.len();
        self.chunk_size = strategy.chunk_size().unwrap_or(0);
        self.indices.clear();
        self.byte_offsets.clear();
        self.base_vertices.clear();
        self.transforms.clear();

        if strategy.remaps_indices() {
            // Output triangle i reads the vertices of slot list[i]
            self.indices.reserve(list.len() * VERTICES_PER_OBJECT);
            for &slot in list {
                self.indices.extend_from_slice(pool.slot_indices(slot));
            }
        }

        if strategy.repacks_base_vertex() {
            let metadata = pool.metadata();
            self.byte_offsets
                .extend(list.iter().map(|&slot| metadata.byte_offsets[slot]));
            self.base_vertices
                .extend(list.iter().map(|&slot| metadata.base_vertices[slot]));
        }

        if strategy.uses_uniform_blocks() {
            let records = pool.transform_records();
            self.transforms.extend(list.iter().map(|&slot| records[slot]));
        }
    }

    /// Push the derived arrays to the pool's buffers
    ///
    /// Only the index prefix `[0, 3n)` and the uniform block chunks covering
    /// `n` records are written.
    pub fn upload<B: GraphicsBackend + ?Sized>(
        &self,
        pool: &ObjectPool,
        backend: &mut B,
    ) -> BackendResult<()> {
        let Some(buffers) = pool.buffers() else {
            return Ok(());
        };

        if !self.indices.is_empty() {
            let bytes = pool.index_format().encode(&self.indices);
            backend.update_buffer(buffers.indices, 0, &bytes)?;
        }

        if !self.transforms.is_empty() && self.chunk_size > 0 {
            for (records, &buffer) in self
                .transforms
                .chunks(self.chunk_size)
                .zip(&buffers.uniform_blocks)
            {
                backend.update_buffer(buffer, 0, bytemuck::cast_slice(records))?;
            }
        }
        Ok(())
    }

    /// Number of objects in the list these buffers were built for
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list was empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remapped indices, three per list entry (remapping strategies only)
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Byte offsets in list order (base-vertex strategies only)
    pub fn byte_offsets(&self) -> &[i32] {
        &self.byte_offsets
    }

    /// Base vertices in list order (base-vertex strategies only)
    pub fn base_vertices(&self) -> &[i32] {
        &self.base_vertices
    }

    /// Uniform block records in list order (uniform block strategies only)
    pub fn transforms(&self) -> &[TransformRecord] {
        &self.transforms
    }
}
