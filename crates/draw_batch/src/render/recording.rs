//! # Recording Backend
//!
//! A headless [`GraphicsBackend`] that keeps buffer contents in memory,
//! validates every draw against what is bound, and counts (optionally
//! records) each call. It is the backend used by the test suite and by
//! headless benchmark runs, where it measures the CPU side of submission.
//!
//! Validation mirrors what a real context rejects: draws without a program or
//! index buffer, index ranges past the end of the buffer, fetched vertices past
//! the end of the position buffer, short multi-draw arrays, and calls that need
//! an extension the advertised capabilities do not include.

use std::collections::HashMap;

use crate::render::backend::{
    BackendError, BackendResult, BufferHandle, BufferTarget, BufferUsage, DrawElements,
    DrawElementsBaseVertex, GraphicsBackend, IndexFormat, MultiDrawElements,
    MultiDrawElementsBaseVertex, ProgramHandle, ShaderStage, ShaderVariant, UniformName,
    VertexAttribute,
};
use crate::render::capabilities::{BackendCapabilities, Extensions};

/// Bytes per position vertex (`vec4` of `f32`)
const POSITION_STRIDE: usize = 16;

/// A call received by the backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    /// Program built for a variant
    CreateProgram(ShaderVariant),
    /// Program made current
    UseProgram(ProgramHandle),
    /// Buffer object created
    CreateBuffer {
        /// New handle
        buffer: BufferHandle,
        /// Binding target
        target: BufferTarget,
    },
    /// Buffer object released
    DeleteBuffer(BufferHandle),
    /// Whole storage replaced
    UploadBuffer {
        /// Target buffer
        buffer: BufferHandle,
        /// Bytes written
        len: usize,
        /// Usage hint
        usage: BufferUsage,
    },
    /// Sub-range overwritten
    UpdateBuffer {
        /// Target buffer
        buffer: BufferHandle,
        /// Byte offset
        offset: usize,
        /// Bytes written
        len: usize,
    },
    /// Vertex input sourced from a buffer
    BindVertexBuffer {
        /// Vertex input
        attribute: VertexAttribute,
        /// Source buffer
        buffer: BufferHandle,
    },
    /// Index buffer bound
    BindIndexBuffer(BufferHandle),
    /// Uniform buffer bound to a block binding
    BindUniformBlock {
        /// Binding point
        binding: u32,
        /// Bound buffer
        buffer: BufferHandle,
    },
    /// Scalar uniform written
    SetUniform {
        /// Uniform
        name: UniformName,
        /// Value
        value: f32,
    },
    /// Color target cleared
    Clear,
    /// Single indexed draw
    DrawElements(DrawElements),
    /// Single indexed draw with base vertex
    DrawElementsBaseVertex(DrawElementsBaseVertex),
    /// Batched indexed draws
    MultiDrawElements {
        /// Offsets of the issued draws
        byte_offsets: Vec<i32>,
        /// Number of draws
        draw_count: usize,
    },
    /// Batched indexed draws with base vertex
    MultiDrawElementsBaseVertex {
        /// Offsets of the issued draws
        byte_offsets: Vec<i32>,
        /// Base vertices of the issued draws
        base_vertices: Vec<i32>,
        /// Number of draws
        draw_count: usize,
    },
}

/// Running totals of what the backend was asked to do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCounters {
    /// Backend draw entry points invoked (a multi-draw counts once)
    pub draw_calls: u64,
    /// Of which were multi-draw calls
    pub multi_draw_calls: u64,
    /// Individual triangle draws executed
    pub objects_drawn: u64,
    /// Scalar uniform writes
    pub uniform_writes: u64,
    /// Uniform block bindings
    pub uniform_block_binds: u64,
    /// Whole-buffer uploads
    pub buffer_uploads: u64,
    /// Sub-range updates
    pub buffer_updates: u64,
    /// Bytes transferred by uploads and updates
    pub bytes_transferred: u64,
    /// Clears
    pub clears: u64,
}

/// In-memory storage of one buffer object
#[derive(Debug, Clone)]
pub struct RecordedBuffer {
    /// Binding target given at creation
    pub target: BufferTarget,
    /// Usage hint of the last upload
    pub usage: Option<BufferUsage>,
    /// Current contents
    pub data: Vec<u8>,
}

/// Headless backend that validates, counts and optionally records calls
pub struct RecordingBackend {
    capabilities: BackendCapabilities,
    next_handle: u32,
    buffers: HashMap<BufferHandle, RecordedBuffer>,
    programs: Vec<ShaderVariant>,
    current_program: Option<ProgramHandle>,
    index_buffer: Option<BufferHandle>,
    vertex_buffers: HashMap<VertexAttribute, BufferHandle>,
    uniform_blocks: HashMap<u32, BufferHandle>,
    uniforms: HashMap<UniformName, f32>,
    clear_color: [f32; 4],
    program_failure: Option<ShaderStage>,
    buffer_limit: Option<usize>,
    retain_commands: bool,
    commands: Vec<BackendCommand>,
    counters: BackendCounters,
}

impl RecordingBackend {
    /// Create a backend advertising `capabilities`, recording every call
    pub fn new(capabilities: BackendCapabilities) -> Self {
        Self {
            capabilities,
            next_handle: 1,
            buffers: HashMap::new(),
            programs: Vec::new(),
            current_program: None,
            index_buffer: None,
            vertex_buffers: HashMap::new(),
            uniform_blocks: HashMap::new(),
            uniforms: HashMap::new(),
            clear_color: [0.0; 4],
            program_failure: None,
            buffer_limit: None,
            retain_commands: true,
            commands: Vec::new(),
            counters: BackendCounters::default(),
        }
    }

    /// Keep counters only; long runs would otherwise grow the command log forever
    pub fn without_command_log(mut self) -> Self {
        self.retain_commands = false;
        self
    }

    /// Make program creation fail at the given stage
    pub fn with_program_failure(mut self, stage: ShaderStage) -> Self {
        self.program_failure = Some(stage);
        self
    }

    /// Refuse to create buffers while `limit` of them are alive
    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = Some(limit);
        self
    }

    /// Recorded calls, oldest first
    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    /// Drain the recorded calls
    pub fn take_commands(&mut self) -> Vec<BackendCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Running totals
    pub fn counters(&self) -> BackendCounters {
        self.counters
    }

    /// Reset the running totals
    pub fn reset_counters(&mut self) {
        self.counters = BackendCounters::default();
    }

    /// Storage of a live buffer
    pub fn buffer(&self, buffer: BufferHandle) -> Option<&RecordedBuffer> {
        self.buffers.get(&buffer)
    }

    /// Number of buffers created and not yet deleted
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Currently bound index buffer
    pub fn bound_index_buffer(&self) -> Option<BufferHandle> {
        self.index_buffer
    }

    /// Buffer currently feeding a vertex input
    pub fn bound_vertex_buffer(&self, attribute: VertexAttribute) -> Option<BufferHandle> {
        self.vertex_buffers.get(&attribute).copied()
    }

    /// Buffer currently bound to a uniform block binding
    pub fn bound_uniform_block(&self, binding: u32) -> Option<BufferHandle> {
        self.uniform_blocks.get(&binding).copied()
    }

    /// Last value written to a uniform
    pub fn uniform(&self, name: UniformName) -> Option<f32> {
        self.uniforms.get(&name).copied()
    }

    /// Clear color last set
    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Variants of all programs built so far
    pub fn programs(&self) -> &[ShaderVariant] {
        &self.programs
    }

    /// Decode the contents of a buffer as element indices
    pub fn read_indices(&self, buffer: BufferHandle, format: IndexFormat) -> Option<Vec<u32>> {
        let data = &self.buffers.get(&buffer)?.data;
        Some(decode_indices(data, format))
    }

    fn record(&mut self, command: BackendCommand) {
        if self.retain_commands {
            self.commands.push(command);
        }
    }

    fn require(&self, extensions: Extensions) -> BackendResult<()> {
        if self.capabilities.supports(extensions) {
            Ok(())
        } else {
            Err(BackendError::MissingExtension(extensions.name()))
        }
    }

    fn storage_mut(&mut self, buffer: BufferHandle) -> BackendResult<&mut RecordedBuffer> {
        self.buffers
            .get_mut(&buffer)
            .ok_or(BackendError::UnknownBuffer(buffer))
    }

    /// Number of vertices in the bound position buffer
    fn vertex_count(&self) -> BackendResult<usize> {
        let buffer = self
            .vertex_buffers
            .get(&VertexAttribute::Position)
            .ok_or_else(|| BackendError::InvalidDraw("no position buffer bound".into()))?;
        let storage = self
            .buffers
            .get(buffer)
            .ok_or(BackendError::UnknownBuffer(*buffer))?;
        Ok(storage.data.len() / POSITION_STRIDE)
    }

    /// Check one draw's index range and the vertices it fetches
    fn validate_draw(
        &self,
        count: i32,
        format: IndexFormat,
        byte_offset: i32,
        base_vertex: i32,
    ) -> BackendResult<()> {
        if self.current_program.is_none() {
            return Err(BackendError::InvalidDraw("no program in use".into()));
        }
        if format == IndexFormat::Uint32 && !self.capabilities.supports_wide_indices() {
            return Err(BackendError::MissingExtension(
                Extensions::ELEMENT_INDEX_UINT.name(),
            ));
        }
        if count < 0 || byte_offset < 0 {
            return Err(BackendError::InvalidDraw(format!(
                "negative count {count} or offset {byte_offset}"
            )));
        }

        let width = format.byte_width();
        let offset = byte_offset as usize;
        if offset % width != 0 {
            return Err(BackendError::InvalidDraw(format!(
                "offset {offset} is not a multiple of the index width {width}"
            )));
        }

        let index_buffer = self
            .index_buffer
            .ok_or_else(|| BackendError::InvalidDraw("no index buffer bound".into()))?;
        let data = &self
            .buffers
            .get(&index_buffer)
            .ok_or(BackendError::UnknownBuffer(index_buffer))?
            .data;
        let end = offset + count as usize * width;
        if end > data.len() {
            return Err(BackendError::InvalidDraw(format!(
                "index range {offset}..{end} exceeds index buffer of {} bytes",
                data.len()
            )));
        }

        let vertex_count = self.vertex_count()?;
        for index in decode_indices(&data[offset..end], format) {
            let vertex = i64::from(index) + i64::from(base_vertex);
            if vertex < 0 || vertex as usize >= vertex_count {
                return Err(BackendError::InvalidDraw(format!(
                    "fetched vertex {vertex} outside of {vertex_count} vertices"
                )));
            }
        }
        Ok(())
    }
}

impl GraphicsBackend for RecordingBackend {
    fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }

    fn create_program(&mut self, variant: ShaderVariant) -> BackendResult<ProgramHandle> {
        self.record(BackendCommand::CreateProgram(variant));

        match self.program_failure {
            Some(ShaderStage::Vertex) => {
                return Err(BackendError::ShaderCompilation {
                    stage: ShaderStage::Vertex,
                    log: format!("injected failure for {variant:?}"),
                })
            }
            Some(ShaderStage::Fragment) => {
                return Err(BackendError::ProgramLink(format!(
                    "injected failure for {variant:?}"
                )))
            }
            None => {}
        }

        if matches!(variant, ShaderVariant::UniformBlocks { .. })
            && self.capabilities.api_version.major() < 2
        {
            return Err(BackendError::ShaderCompilation {
                stage: ShaderStage::Vertex,
                log: "uniform blocks need API version 2".into(),
            });
        }

        self.programs.push(variant);
        Ok(ProgramHandle(self.programs.len() as u32))
    }

    fn use_program(&mut self, program: ProgramHandle) -> BackendResult<()> {
        if program.0 == 0 || program.0 as usize > self.programs.len() {
            return Err(BackendError::InvalidDraw(format!("unknown program {program:?}")));
        }
        self.current_program = Some(program);
        self.record(BackendCommand::UseProgram(program));
        Ok(())
    }

    fn create_buffer(&mut self, target: BufferTarget) -> BackendResult<BufferHandle> {
        if let Some(limit) = self.buffer_limit {
            if self.buffers.len() >= limit {
                return Err(BackendError::OutOfMemory(format!(
                    "{limit} buffers already allocated"
                )));
            }
        }
        let buffer = BufferHandle(self.next_handle);
        self.next_handle += 1;
        self.buffers.insert(
            buffer,
            RecordedBuffer {
                target,
                usage: None,
                data: Vec::new(),
            },
        );
        self.record(BackendCommand::CreateBuffer { buffer, target });
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer).is_none() {
            return;
        }
        if self.index_buffer == Some(buffer) {
            self.index_buffer = None;
        }
        self.vertex_buffers.retain(|_, bound| *bound != buffer);
        self.uniform_blocks.retain(|_, bound| *bound != buffer);
        self.record(BackendCommand::DeleteBuffer(buffer));
    }

    fn upload_buffer(
        &mut self,
        buffer: BufferHandle,
        data: &[u8],
        usage: BufferUsage,
    ) -> BackendResult<()> {
        let storage = self.storage_mut(buffer)?;
        storage.data.clear();
        storage.data.extend_from_slice(data);
        storage.usage = Some(usage);

        self.counters.buffer_uploads += 1;
        self.counters.bytes_transferred += data.len() as u64;
        self.record(BackendCommand::UploadBuffer {
            buffer,
            len: data.len(),
            usage,
        });
        Ok(())
    }

    fn update_buffer(
        &mut self,
        buffer: BufferHandle,
        byte_offset: usize,
        data: &[u8],
    ) -> BackendResult<()> {
        let storage = self.storage_mut(buffer)?;
        let end = byte_offset + data.len();
        if end > storage.data.len() {
            return Err(BackendError::BufferOverflow {
                buffer,
                offset: byte_offset,
                len: data.len(),
                size: storage.data.len(),
            });
        }
        storage.data[byte_offset..end].copy_from_slice(data);

        self.counters.buffer_updates += 1;
        self.counters.bytes_transferred += data.len() as u64;
        self.record(BackendCommand::UpdateBuffer {
            buffer,
            offset: byte_offset,
            len: data.len(),
        });
        Ok(())
    }

    fn bind_vertex_buffer(
        &mut self,
        attribute: VertexAttribute,
        buffer: BufferHandle,
    ) -> BackendResult<()> {
        if !self.buffers.contains_key(&buffer) {
            return Err(BackendError::UnknownBuffer(buffer));
        }
        self.vertex_buffers.insert(attribute, buffer);
        self.record(BackendCommand::BindVertexBuffer { attribute, buffer });
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle) -> BackendResult<()> {
        if !self.buffers.contains_key(&buffer) {
            return Err(BackendError::UnknownBuffer(buffer));
        }
        self.index_buffer = Some(buffer);
        self.record(BackendCommand::BindIndexBuffer(buffer));
        Ok(())
    }

    fn bind_uniform_block(&mut self, binding: u32, buffer: BufferHandle) -> BackendResult<()> {
        if !self.buffers.contains_key(&buffer) {
            return Err(BackendError::UnknownBuffer(buffer));
        }
        self.uniform_blocks.insert(binding, buffer);
        self.counters.uniform_block_binds += 1;
        self.record(BackendCommand::BindUniformBlock { binding, buffer });
        Ok(())
    }

    fn set_uniform(&mut self, name: UniformName, value: f32) -> BackendResult<()> {
        if self.current_program.is_none() {
            return Err(BackendError::InvalidDraw(format!(
                "uniform {name:?} set without a program in use"
            )));
        }
        self.uniforms.insert(name, value);
        self.counters.uniform_writes += 1;
        self.record(BackendCommand::SetUniform { name, value });
        Ok(())
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    fn clear(&mut self) -> BackendResult<()> {
        self.counters.clears += 1;
        self.record(BackendCommand::Clear);
        Ok(())
    }

    fn draw_elements(&mut self, draw: DrawElements) -> BackendResult<()> {
        self.validate_draw(draw.count, draw.format, draw.byte_offset, 0)?;
        self.counters.draw_calls += 1;
        self.counters.objects_drawn += 1;
        self.record(BackendCommand::DrawElements(draw));
        Ok(())
    }

    fn draw_elements_base_vertex(&mut self, draw: DrawElementsBaseVertex) -> BackendResult<()> {
        self.require(Extensions::DRAW_BASE_VERTEX_BASE_INSTANCE)?;
        self.validate_draw(draw.count, draw.format, draw.byte_offset, draw.base_vertex)?;
        self.counters.draw_calls += 1;
        self.counters.objects_drawn += draw.instance_count.max(0) as u64;
        self.record(BackendCommand::DrawElementsBaseVertex(draw));
        Ok(())
    }

    fn multi_draw_elements(&mut self, draw: MultiDrawElements<'_>) -> BackendResult<()> {
        self.require(Extensions::MULTI_DRAW)?;
        let n = draw.draw_count;
        if draw.counts.len() < n || draw.byte_offsets.len() < n {
            return Err(BackendError::InvalidDraw(format!(
                "multi-draw of {n} with {} counts and {} offsets",
                draw.counts.len(),
                draw.byte_offsets.len()
            )));
        }
        for i in 0..n {
            self.validate_draw(draw.counts[i], draw.format, draw.byte_offsets[i], 0)?;
        }

        self.counters.draw_calls += 1;
        self.counters.multi_draw_calls += 1;
        self.counters.objects_drawn += n as u64;
        self.record(BackendCommand::MultiDrawElements {
            byte_offsets: draw.byte_offsets[..n].to_vec(),
            draw_count: n,
        });
        Ok(())
    }

    fn multi_draw_elements_base_vertex(
        &mut self,
        draw: MultiDrawElementsBaseVertex<'_>,
    ) -> BackendResult<()> {
        self.require(Extensions::MULTI_DRAW_BASE_VERTEX_BASE_INSTANCE)?;
        let n = draw.draw_count;
        let shortest = draw
            .counts
            .len()
            .min(draw.byte_offsets.len())
            .min(draw.instance_counts.len())
            .min(draw.base_vertices.len())
            .min(draw.base_instances.len());
        if shortest < n {
            return Err(BackendError::InvalidDraw(format!(
                "multi-draw of {n} with a parameter array of length {shortest}"
            )));
        }
        for i in 0..n {
            self.validate_draw(
                draw.counts[i],
                draw.format,
                draw.byte_offsets[i],
                draw.base_vertices[i],
            )?;
        }

        self.counters.draw_calls += 1;
        self.counters.multi_draw_calls += 1;
        self.counters.objects_drawn += n as u64;
        self.record(BackendCommand::MultiDrawElementsBaseVertex {
            byte_offsets: draw.byte_offsets[..n].to_vec(),
            base_vertices: draw.base_vertices[..n].to_vec(),
            draw_count: n,
        });
        Ok(())
    }
}

fn decode_indices(bytes: &[u8], format: IndexFormat) -> Vec<u32> {
    match format {
        IndexFormat::Uint16 => bytes
            .chunks_exact(2)
            .map(|pair| u32::from(u16::from_ne_bytes([pair[0], pair[1]])))
            .collect(),
        IndexFormat::Uint32 => bytes
            .chunks_exact(4)
            .map(|quad| u32::from_ne_bytes([quad[0], quad[1], quad[2], quad[3]]))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::capabilities::ApiVersion;

    fn full_caps() -> BackendCapabilities {
        BackendCapabilities {
            api_version: ApiVersion::V2,
            extensions: Extensions::all(),
            ..BackendCapabilities::default()
        }
    }

    /// Backend with one program, three vertices and indices `[0, 1, 2]`
    fn ready_backend(caps: BackendCapabilities) -> RecordingBackend {
        let mut backend = RecordingBackend::new(caps);
        let program = backend.create_program(ShaderVariant::Attributes).unwrap();
        backend.use_program(program).unwrap();

        let positions = backend.create_buffer(BufferTarget::Array).unwrap();
        backend
            .upload_buffer(positions, &[0u8; 3 * POSITION_STRIDE], BufferUsage::Static)
            .unwrap();
        backend.bind_vertex_buffer(VertexAttribute::Position, positions).unwrap();

        let indices = backend.create_buffer(BufferTarget::ElementArray).unwrap();
        backend
            .upload_buffer(indices, &IndexFormat::Uint16.encode(&[0, 1, 2]), BufferUsage::Dynamic)
            .unwrap();
        backend.bind_index_buffer(indices).unwrap();
        backend
    }

    #[test]
    fn test_update_overflow_rejected() {
        let mut backend = RecordingBackend::new(full_caps());
        let buffer = backend.create_buffer(BufferTarget::ElementArray).unwrap();
        backend.upload_buffer(buffer, &[0; 6], BufferUsage::Dynamic).unwrap();

        backend.update_buffer(buffer, 2, &[1, 2, 3, 4]).unwrap();
        assert_eq!(backend.buffer(buffer).unwrap().data, vec![0, 0, 1, 2, 3, 4]);

        let err = backend.update_buffer(buffer, 4, &[9, 9, 9]).unwrap_err();
        assert!(matches!(err, BackendError::BufferOverflow { size: 6, .. }));
    }

    #[test]
    fn test_draw_validates_vertex_range() {
        let mut backend = ready_backend(full_caps());
        let draw = DrawElements {
            count: 3,
            format: IndexFormat::Uint16,
            byte_offset: 0,
        };
        backend.draw_elements(draw).unwrap();

        let shifted = DrawElementsBaseVertex {
            count: 3,
            format: IndexFormat::Uint16,
            byte_offset: 0,
            instance_count: 1,
            base_vertex: 3,
            base_instance: 0,
        };
        assert!(matches!(
            backend.draw_elements_base_vertex(shifted),
            Err(BackendError::InvalidDraw(_))
        ));
        assert_eq!(backend.counters().draw_calls, 1);
    }

    #[test]
    fn test_missing_extension_rejected() {
        let caps = BackendCapabilities {
            api_version: ApiVersion::V2,
            ..BackendCapabilities::default()
        };
        let mut backend = ready_backend(caps);
        let result = backend.multi_draw_elements(MultiDrawElements {
            counts: &[3],
            format: IndexFormat::Uint16,
            byte_offsets: &[0],
            draw_count: 1,
        });
        assert!(matches!(result, Err(BackendError::MissingExtension("WEBGL_multi_draw"))));
    }

    #[test]
    fn test_short_multi_draw_arrays_rejected() {
        let mut backend = ready_backend(full_caps());
        let result = backend.multi_draw_elements(MultiDrawElements {
            counts: &[3, 3],
            format: IndexFormat::Uint16,
            byte_offsets: &[0],
            draw_count: 2,
        });
        assert!(matches!(result, Err(BackendError::InvalidDraw(_))));
    }

    #[test]
    fn test_delete_unbinds() {
        let mut backend = ready_backend(full_caps());
        let index_buffer = backend.bound_index_buffer().unwrap();
        backend.delete_buffer(index_buffer);
        assert_eq!(backend.bound_index_buffer(), None);
        assert_eq!(backend.live_buffer_count(), 1);
    }

    #[test]
    fn test_buffer_limit() {
        let mut backend = RecordingBackend::new(full_caps()).with_buffer_limit(1);
        let first = backend.create_buffer(BufferTarget::Array).unwrap();
        assert!(matches!(
            backend.create_buffer(BufferTarget::Array),
            Err(BackendError::OutOfMemory(_))
        ));

        backend.delete_buffer(first);
        assert!(backend.create_buffer(BufferTarget::Array).is_ok());
    }

    #[test]
    fn test_injected_program_failure() {
        let mut backend =
            RecordingBackend::new(full_caps()).with_program_failure(ShaderStage::Fragment);
        assert!(matches!(
            backend.create_program(ShaderVariant::SeparateUniforms),
            Err(BackendError::ProgramLink(_))
        ));
    }
}
