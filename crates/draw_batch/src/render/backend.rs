//! Backend abstraction traits for the rendering system
//!
//! This module defines the trait a rendering backend must implement for the
//! batching core to drive it. The surface is close to an indexed
//! immediate-mode API: buffers are created and filled from byte slices, a
//! single program is active, and every draw reads triangle lists from the bound
//! index buffer.

use crate::render::capabilities::BackendCapabilities;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors reported by a rendering backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// A shader stage did not compile
    #[error("{stage:?} shader failed to compile: {log}")]
    ShaderCompilation {
        /// Stage that failed
        stage: ShaderStage,
        /// Compiler info log
        log: String,
    },

    /// Compiled shaders did not link into a program
    #[error("Unable to link shaders into program: {0}")]
    ProgramLink(String),

    /// The backend could not allocate storage
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// A handle that this backend never created, or already deleted
    #[error("Unknown buffer {0:?}")]
    UnknownBuffer(BufferHandle),

    /// A sub-range update went past the end of the buffer storage
    #[error("Write of {len} bytes at offset {offset} overflows {buffer:?} ({size} bytes)")]
    BufferOverflow {
        /// Target buffer
        buffer: BufferHandle,
        /// Byte offset of the write
        offset: usize,
        /// Byte length of the write
        len: usize,
        /// Current size of the buffer storage
        size: usize,
    },

    /// Draw parameters are inconsistent (short arrays, nothing bound, ...)
    #[error("Invalid draw: {0}")]
    InvalidDraw(String),

    /// The call needs an extension the backend does not expose
    #[error("Extension {0} is not available")]
    MissingExtension(&'static str),
}

/// Shader stage, for compile diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
}

/// Opaque handle to a backend buffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

/// Opaque handle to a linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Binding target of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data
    Array,
    /// Element indices
    ElementArray,
    /// Uniform block storage
    Uniform,
}

/// Expected update frequency of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Written once per pool generation
    Static,
    /// Rewritten when the draw list rotates
    Dynamic,
}

/// Vertex inputs fed from buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    /// `vec4` position
    Position,
    /// `vec4` color
    Color,
    /// Five interleaved `float` transform inputs (attribute upload mode)
    Transform,
}

/// Scalar uniforms of the benchmark program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformName {
    /// Elapsed time since the first animated frame
    Time,
    /// Per-object scale
    Scale,
    /// Per-object x offset
    OffsetX,
    /// Per-object y offset
    OffsetY,
    /// Per-object animation speed
    Scalar,
    /// Per-object animation phase
    ScalarOffset,
}

/// Which program to build, one per upload mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderVariant {
    /// Transform parameters as six scalar uniforms set per draw
    SeparateUniforms,
    /// Transform parameters as per-vertex attributes
    Attributes,
    /// Transform parameters in a uniform block array indexed by draw id
    UniformBlocks {
        /// Length of the `DrawData` array in the block
        max_array_size: usize,
    },
}

/// Width of element indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit indices
    #[default]
    Uint16,
    /// 32-bit indices
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes
    pub const fn byte_width(self) -> usize {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }

    /// Encode indices to the byte layout of this format
    ///
    /// Values must fit the format; the pool picks the format from its capacity
    /// so that they always do.
    pub fn encode(self, indices: &[u32]) -> Vec<u8> {
        match self {
            Self::Uint16 => {
                let narrow: Vec<u16> = indices.iter().map(|&index| index as u16).collect();
                bytemuck::cast_slice::<u16, u8>(&narrow).to_vec()
            }
            Self::Uint32 => bytemuck::cast_slice::<u32, u8>(indices).to_vec(),
        }
    }
}

/// One indexed triangle-list draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawElements {
    /// Number of indices to read
    pub count: i32,
    /// Index width
    pub format: IndexFormat,
    /// Byte offset into the bound index buffer
    pub byte_offset: i32,
}

/// One indexed draw with base vertex / base instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawElementsBaseVertex {
    /// Number of indices to read
    pub count: i32,
    /// Index width
    pub format: IndexFormat,
    /// Byte offset into the bound index buffer
    pub byte_offset: i32,
    /// Number of instances
    pub instance_count: i32,
    /// Value added to every fetched index
    pub base_vertex: i32,
    /// First instance id
    pub base_instance: u32,
}

/// Batched indexed draws; entry `i` of every array describes draw `i`
#[derive(Debug, Clone, Copy)]
pub struct MultiDrawElements<'a> {
    /// Index counts
    pub counts: &'a [i32],
    /// Index width
    pub format: IndexFormat,
    /// Byte offsets into the bound index buffer
    pub byte_offsets: &'a [i32],
    /// Number of draws to issue
    pub draw_count: usize,
}

/// Batched indexed draws with base vertex / base instance
#[derive(Debug, Clone, Copy)]
pub struct MultiDrawElementsBaseVertex<'a> {
    /// Index counts
    pub counts: &'a [i32],
    /// Index width
    pub format: IndexFormat,
    /// Byte offsets into the bound index buffer
    pub byte_offsets: &'a [i32],
    /// Instance counts
    pub instance_counts: &'a [i32],
    /// Base vertices
    pub base_vertices: &'a [i32],
    /// Base instances
    pub base_instances: &'a [u32],
    /// Number of draws to issue
    pub draw_count: usize,
}

/// Rendering backend driven by the batching core
///
/// Implementations own the device/context exclusively. Every call happens on
/// the frame thread; nothing is expected to be asynchronous from the caller's
/// point of view.
pub trait GraphicsBackend {
    /// Capabilities probed when the context was created
    fn capabilities(&self) -> &BackendCapabilities;

    /// Compile and link the program for a shader variant
    fn create_program(&mut self, variant: ShaderVariant) -> BackendResult<ProgramHandle>;

    /// Make a program current
    fn use_program(&mut self, program: ProgramHandle) -> BackendResult<()>;

    /// Create an empty buffer object
    fn create_buffer(&mut self, target: BufferTarget) -> BackendResult<BufferHandle>;

    /// Release a buffer object; unknown handles are ignored
    fn delete_buffer(&mut self, buffer: BufferHandle);

    /// Replace the whole storage of a buffer
    fn upload_buffer(
        &mut self,
        buffer: BufferHandle,
        data: &[u8],
        usage: BufferUsage,
    ) -> BackendResult<()>;

    /// Overwrite a sub-range of a buffer's existing storage
    fn update_buffer(
        &mut self,
        buffer: BufferHandle,
        byte_offset: usize,
        data: &[u8],
    ) -> BackendResult<()>;

    /// Source a vertex input from a buffer
    fn bind_vertex_buffer(
        &mut self,
        attribute: VertexAttribute,
        buffer: BufferHandle,
    ) -> BackendResult<()>;

    /// Bind the element index buffer
    fn bind_index_buffer(&mut self, buffer: BufferHandle) -> BackendResult<()>;

    /// Bind a uniform buffer to a block binding point
    fn bind_uniform_block(&mut self, binding: u32, buffer: BufferHandle) -> BackendResult<()>;

    /// Set a scalar uniform of the current program
    fn set_uniform(&mut self, name: UniformName, value: f32) -> BackendResult<()>;

    /// Set the color used by [`GraphicsBackend::clear`]
    fn set_clear_color(&mut self, rgba: [f32; 4]);

    /// Clear the color target
    fn clear(&mut self) -> BackendResult<()>;

    /// Issue one indexed draw
    fn draw_elements(&mut self, draw: DrawElements) -> BackendResult<()>;

    /// Issue one indexed draw with base vertex / base instance
    fn draw_elements_base_vertex(&mut self, draw: DrawElementsBaseVertex) -> BackendResult<()>;

    /// Issue a batch of indexed draws in one call
    fn multi_draw_elements(&mut self, draw: MultiDrawElements<'_>) -> BackendResult<()>;

    /// Issue a batch of indexed draws with base vertex / base instance in one call
    fn multi_draw_elements_base_vertex(
        &mut self,
        draw: MultiDrawElementsBaseVertex<'_>,
    ) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_encoding_widths() {
        let indices = [0_u32, 1, 2, 65_535];
        assert_eq!(IndexFormat::Uint16.encode(&indices).len(), 8);
        assert_eq!(IndexFormat::Uint32.encode(&indices).len(), 16);

        let bytes = IndexFormat::Uint16.encode(&[0x0102]);
        assert_eq!(u16::from_ne_bytes([bytes[0], bytes[1]]), 0x0102);
    }
}
