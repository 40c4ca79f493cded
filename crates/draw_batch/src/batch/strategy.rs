//! Draw submission strategies
//!
//! One closed set of submission paths, chosen once by the resolver and
//! dispatched with a single match per frame. Every path draws triangle lists,
//! three indices per object, in the pool's index width.

use crate::batch::pool::ObjectPool;
use crate::batch::repack::RepackedBuffers;
use crate::batch::resolver::UploadMode;
use crate::batch::stats::FrameStats;
use crate::render::backend::{
    BackendResult, DrawElements, DrawElementsBaseVertex, GraphicsBackend, MultiDrawElements,
    MultiDrawElementsBaseVertex, UniformName,
};

/// Uniform block binding point of the `DrawData` block
pub const DRAW_DATA_BINDING: u32 = 0;

/// How a frame's draws reach the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionStrategy {
    /// One multi-draw with base vertex per uniform block chunk
    ChunkedMultiDrawBaseVertex {
        /// Records per uniform block
        chunk_size: usize,
    },
    /// One multi-draw per uniform block chunk over remapped indices
    ChunkedMultiDraw {
        /// Records per uniform block
        chunk_size: usize,
    },
    /// One multi-draw with base vertex for all objects, attribute uploads
    MultiDrawBaseVertex,
    /// One multi-draw for all objects over remapped indices, attribute uploads
    MultiDraw,
    /// One draw per object by slot, attribute uploads
    PerObject {
        /// Draw with the slot's base vertex
        base_vertex: bool,
    },
    /// One draw per object by slot, six uniforms pushed before each
    SeparateUniforms,
}

impl SubmissionStrategy {
    /// Transform upload mode this path needs
    pub const fn upload_mode(self) -> UploadMode {
        match self {
            Self::ChunkedMultiDrawBaseVertex { .. } | Self::ChunkedMultiDraw { .. } => {
                UploadMode::UniformBlocks
            }
            Self::MultiDrawBaseVertex | Self::MultiDraw | Self::PerObject { .. } => {
                UploadMode::Attributes
            }
            Self::SeparateUniforms => UploadMode::SeparateUniforms,
        }
    }

    /// Whether draws are batched through multi-draw
    pub const fn is_multi_draw(self) -> bool {
        matches!(
            self,
            Self::ChunkedMultiDrawBaseVertex { .. }
                | Self::ChunkedMultiDraw { .. }
                | Self::MultiDrawBaseVertex
                | Self::MultiDraw
        )
    }

    /// Whether draws carry a base vertex
    pub const fn uses_base_vertex(self) -> bool {
        matches!(
            self,
            Self::ChunkedMultiDrawBaseVertex { .. }
                | Self::MultiDrawBaseVertex
                | Self::PerObject { base_vertex: true }
        )
    }

    /// Whether transforms live in uniform block chunks
    pub const fn uses_uniform_blocks(self) -> bool {
        matches!(self.upload_mode(), UploadMode::UniformBlocks)
    }

    /// Whether the index buffer prefix is rewritten in list order
    pub const fn remaps_indices(self) -> bool {
        matches!(self, Self::ChunkedMultiDraw { .. } | Self::MultiDraw)
    }

    /// Whether base vertices and offsets are copied in list order
    pub const fn repacks_base_vertex(self) -> bool {
        matches!(self, Self::ChunkedMultiDrawBaseVertex { .. } | Self::MultiDrawBaseVertex)
    }

    /// Uniform block chunk size, for the chunked paths
    pub const fn chunk_size(self) -> Option<usize> {
        match self {
            Self::ChunkedMultiDrawBaseVertex { chunk_size }
            | Self::ChunkedMultiDraw { chunk_size } => Some(chunk_size),
            _ => None,
        }
    }

    /// Issue this frame's draws for `list`
    ///
    /// `repacked` must have been rebuilt for `list` and uploaded. Counts are
    /// added to `stats`.
    pub fn submit<B: GraphicsBackend + ?Sized>(
        self,
        backend: &mut B,
        pool: &mut ObjectPool,
        list: &[usize],
        repacked: &RepackedBuffers,
        time: f32,
        stats: &mut FrameStats,
    ) -> BackendResult<()> {
        let n = list.len();
        let format = pool.index_format();

        if self.upload_mode() != UploadMode::SeparateUniforms {
            backend.set_uniform(UniformName::Time, time)?;
            stats.uniform_writes += 1;
        }

        match self {
            Self::ChunkedMultiDrawBaseVertex { chunk_size }
            | Self::ChunkedMultiDraw { chunk_size } => {
                let chunk_size = chunk_size.max(1);
                let metadata = pool.metadata();
                let blocks = pool
                    .buffers()
                    .map(|buffers| buffers.uniform_blocks.as_slice())
                    .unwrap_or_default();

                for (chunk, start) in (0..n).step_by(chunk_size).enumerate() {
                    let Some(&block) = blocks.get(chunk) else {
                        break;
                    };
                    let draw_count = chunk_size.min(n - start);

                    backend.bind_uniform_block(DRAW_DATA_BINDING, block)?;
                    stats.uniform_block_binds += 1;

                    if self.repacks_base_vertex() {
                        backend.multi_draw_elements_base_vertex(MultiDrawElementsBaseVertex {
                            counts: &metadata.counts[start..],
                            format,
                            byte_offsets: &repacked.byte_offsets()[start..],
                            instance_counts: &metadata.instance_counts[start..],
                            base_vertices: &repacked.base_vertices()[start..],
                            base_instances: &metadata.base_instances[start..],
                            draw_count,
                        })?;
                    } else {
                        // Positional offsets: the remapped prefix is in list order
                        backend.multi_draw_elements(MultiDrawElements {
                            counts: &metadata.counts[start..],
                            format,
                            byte_offsets: &metadata.byte_offsets[start..],
                            draw_count,
                        })?;
                    }
                    stats.draw_calls += 1;
                    stats.multi_draw_calls += 1;
                    stats.objects_drawn += draw_count;
                }
            }

            Self::MultiDrawBaseVertex => {
                if n > 0 {
                    let metadata = pool.metadata();
                    backend.multi_draw_elements_base_vertex(MultiDrawElementsBaseVertex {
                        counts: &metadata.counts,
                        format,
                        byte_offsets: repacked.byte_offsets(),
                        instance_counts: &metadata.instance_counts,
                        base_vertices: repacked.base_vertices(),
                        base_instances: &metadata.base_instances,
                        draw_count: n,
                    })?;
                    stats.draw_calls += 1;
                    stats.multi_draw_calls += 1;
                    stats.objects_drawn += n;
                }
            }

            Self::MultiDraw => {
                if n > 0 {
                    let metadata = pool.metadata();
                    backend.multi_draw_elements(MultiDrawElements {
                        counts: &metadata.counts,
                        format,
                        byte_offsets: &metadata.byte_offsets,
                        draw_count: n,
                    })?;
                    stats.draw_calls += 1;
                    stats.multi_draw_calls += 1;
                    stats.objects_drawn += n;
                }
            }

            Self::PerObject { base_vertex } => {
                let metadata = pool.metadata();
                for &slot in list {
                    if base_vertex {
                        backend.draw_elements_base_vertex(DrawElementsBaseVertex {
                            count: metadata.counts[slot],
                            format,
                            byte_offset: metadata.byte_offsets[slot],
                            instance_count: 1,
                            base_vertex: metadata.base_vertices[slot],
                            base_instance: 0,
                        })?;
                    } else {
                        backend.draw_elements(DrawElements {
                            count: metadata.counts[slot],
                            format,
                            byte_offset: metadata.byte_offsets[slot],
                        })?;
                    }
                }
                stats.draw_calls += n;
                stats.objects_drawn += n;
            }

            Self::SeparateUniforms => {
                // The slow baseline: every object pays for six uniform writes
                for &slot in list {
                    let Some(record) = pool.stamp_time(slot, time) else {
                        continue;
                    };
                    for (name, value) in record.values() {
                        backend.set_uniform(name, value)?;
                    }
                    stats.uniform_writes += record.values().len();

                    let metadata = pool.metadata();
                    backend.draw_elements(DrawElements {
                        count: metadata.counts[slot],
                        format,
                        byte_offset: metadata.byte_offsets[slot],
                    })?;
                    stats.draw_calls += 1;
                    stats.objects_drawn += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::resolver::{resolve, RequestedFeatures};
    use crate::render::backend::ShaderVariant;
    use crate::render::capabilities::{ApiVersion, BackendCapabilities, Extensions};
    use crate::render::recording::{BackendCommand, RecordingBackend};

    /// Pool, repacked buffers and a backend with the strategy's program in use
    fn prepare(
        requested: RequestedFeatures,
        max_uniform_block_size: usize,
        count: usize,
        list: &[usize],
    ) -> (SubmissionStrategy, ObjectPool, RepackedBuffers, RecordingBackend) {
        let caps = BackendCapabilities {
            api_version: ApiVersion::V2,
            extensions: Extensions::all(),
            max_uniform_block_size,
        };
        let config = resolve(&requested, &caps).config;
        let mut backend = RecordingBackend::new(caps);
        let program = backend.create_program(config.shader_variant()).unwrap();
        backend.use_program(program).unwrap();

        let mut pool = ObjectPool::new(config, Some(3));
        pool.ensure_capacity(count, &mut backend).unwrap();
        let mut repacked = RepackedBuffers::new();
        repacked.rebuild(list, &pool, config.strategy);
        repacked.upload(&pool, &mut backend).unwrap();
        backend.take_commands();
        backend.reset_counters();
        (config.strategy, pool, repacked, backend)
    }

    fn blocks(base_vertex: bool) -> RequestedFeatures {
        RequestedFeatures {
            use_uniform_blocks: true,
            use_multi_draw: true,
            use_base_vertex_base_instance: base_vertex,
            api_version: ApiVersion::V2,
            ..RequestedFeatures::default()
        }
    }

    fn attributes(multi_draw: bool, base_vertex: bool) -> RequestedFeatures {
        RequestedFeatures {
            use_attributes: true,
            use_multi_draw: multi_draw,
            use_base_vertex_base_instance: base_vertex,
            api_version: ApiVersion::V2,
            ..RequestedFeatures::default()
        }
    }

    #[test]
    fn test_chunked_multi_draw_splits_by_block() {
        // 32 records per block
        let list: Vec<usize> = (0..70).collect();
        let (strategy, mut pool, repacked, mut backend) = prepare(blocks(false), 32 * 32, 70, &list);
        assert_eq!(strategy, SubmissionStrategy::ChunkedMultiDraw { chunk_size: 32 });

        let mut stats = FrameStats::default();
        strategy
            .submit(&mut backend, &mut pool, &list, &repacked, 0.5, &mut stats)
            .unwrap();

        let block_buffers = pool.buffers().unwrap().uniform_blocks.clone();
        let commands = backend.take_commands();
        assert_eq!(
            commands[0],
            BackendCommand::SetUniform {
                name: UniformName::Time,
                value: 0.5
            }
        );
        let mut draw_counts = Vec::new();
        let mut bound = Vec::new();
        for command in &commands {
            match command {
                BackendCommand::BindUniformBlock { buffer, .. } => bound.push(*buffer),
                BackendCommand::MultiDrawElements { byte_offsets, draw_count } => {
                    draw_counts.push(*draw_count);
                    // Chunk offsets are positional
                    assert_eq!(byte_offsets[0] % (32 * 6), 0);
                }
                _ => {}
            }
        }
        assert_eq!(draw_counts, vec![32, 32, 6]);
        assert_eq!(bound, block_buffers[..3].to_vec());
        assert_eq!(stats.objects_drawn, 70);
        assert_eq!(stats.multi_draw_calls, 3);
    }

    #[test]
    fn test_chunked_base_vertex_uses_repacked_arrays() {
        let list = vec![40, 3, 17];
        let (strategy, mut pool, repacked, mut backend) = prepare(blocks(true), 2 * 32, 0, &list);
        assert_eq!(
            strategy,
            SubmissionStrategy::ChunkedMultiDrawBaseVertex { chunk_size: 2 }
        );

        let mut stats = FrameStats::default();
        strategy
            .submit(&mut backend, &mut pool, &list, &repacked, 1.0, &mut stats)
            .unwrap();

        let draws: Vec<(Vec<i32>, usize)> = backend
            .commands()
            .iter()
            .filter_map(|command| match command {
                BackendCommand::MultiDrawElementsBaseVertex {
                    base_vertices,
                    draw_count,
                    ..
                } => Some((base_vertices.clone(), *draw_count)),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![(vec![120, 9], 2), (vec![51], 1)]);
        assert_eq!(stats.uniform_block_binds, 2);
    }

    #[test]
    fn test_multi_draw_single_call() {
        let list: Vec<usize> = (0..128).rev().collect();
        for base_vertex in [false, true] {
            let (strategy, mut pool, repacked, mut backend) =
                prepare(attributes(true, base_vertex), 16_384, 0, &list);
            let mut stats = FrameStats::default();
            strategy
                .submit(&mut backend, &mut pool, &list, &repacked, 0.0, &mut stats)
                .unwrap();

            assert_eq!(stats.draw_calls, 1);
            assert_eq!(stats.multi_draw_calls, 1);
            assert_eq!(stats.objects_drawn, 128);
            assert_eq!(backend.counters().objects_drawn, 128);
        }
    }

    #[test]
    fn test_per_object_draws_by_slot() {
        let list = vec![5, 60];
        for base_vertex in [false, true] {
            let (strategy, mut pool, repacked, mut backend) =
                prepare(attributes(false, base_vertex), 16_384, 0, &list);
            assert_eq!(strategy, SubmissionStrategy::PerObject { base_vertex });

            let mut stats = FrameStats::default();
            strategy
                .submit(&mut backend, &mut pool, &list, &repacked, 0.0, &mut stats)
                .unwrap();
            assert_eq!(stats.draw_calls, 2);

            let offsets: Vec<i32> = backend
                .commands()
                .iter()
                .filter_map(|command| match command {
                    BackendCommand::DrawElements(draw) => Some(draw.byte_offset),
                    BackendCommand::DrawElementsBaseVertex(draw) => {
                        assert_eq!(draw.base_vertex, draw.byte_offset / 2);
                        Some(draw.byte_offset)
                    }
                    _ => None,
                })
                .collect();
            assert_eq!(offsets, vec![5 * 6, 60 * 6]);
        }
    }

    #[test]
    fn test_separate_uniforms_push_six_values_per_object() {
        let list = vec![1, 2, 3];
        let (strategy, mut pool, repacked, mut backend) =
            prepare(RequestedFeatures::default(), 16_384, 0, &list);
        assert_eq!(strategy, SubmissionStrategy::SeparateUniforms);
        assert_eq!(backend.programs(), &[ShaderVariant::SeparateUniforms]);

        let mut stats = FrameStats::default();
        strategy
            .submit(&mut backend, &mut pool, &list, &repacked, 2.5, &mut stats)
            .unwrap();

        assert_eq!(stats.draw_calls, 3);
        assert_eq!(stats.uniform_writes, 18);
        assert_eq!(backend.counters().uniform_writes, 18);
        assert_eq!(backend.uniform(UniformName::Time), Some(2.5));
        assert_eq!(backend.uniform(UniformName::Scale), Some(pool.transforms()[3].scale));
        assert!(pool.uniform_records()[1..4].iter().all(|record| record.time == 2.5));
        assert_eq!(pool.uniform_records()[0].time, 0.0);
    }

    #[test]
    fn test_empty_list_draws_nothing() {
        let list: Vec<usize> = Vec::new();
        for requested in [blocks(true), attributes(true, false), RequestedFeatures::default()] {
            let (strategy, mut pool, repacked, mut backend) = prepare(requested, 16_384, 0, &list);
            let mut stats = FrameStats::default();
            strategy
                .submit(&mut backend, &mut pool, &list, &repacked, 0.0, &mut stats)
                .unwrap();
            assert_eq!(stats.draw_calls, 0);
            assert_eq!(backend.counters().draw_calls, 0);
        }
    }

    #[test]
    fn test_strategy_flags() {
        let chunked = SubmissionStrategy::ChunkedMultiDraw { chunk_size: 8 };
        assert!(chunked.remaps_indices());
        assert!(chunked.uses_uniform_blocks());
        assert!(!chunked.uses_base_vertex());
        assert_eq!(chunked.chunk_size(), Some(8));

        let per_object = SubmissionStrategy::PerObject { base_vertex: true };
        assert!(per_object.uses_base_vertex());
        assert!(!per_object.repacks_base_vertex());
        assert!(!per_object.is_multi_draw());
        assert_eq!(SubmissionStrategy::MultiDraw.chunk_size(), None);
    }
}
