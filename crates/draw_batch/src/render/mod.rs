//! # Rendering Backend Layer
//!
//! The batching core never talks to a device directly. Everything it needs
//! from a rendering API goes through [`GraphicsBackend`]:
//!
//! - **Backend**: buffer, program and draw-call surface
//! - **Capabilities**: API version, optional extensions, uniform block limits
//! - **Recording**: a headless backend that validates and records calls
//!
//! A real device backend lives with the application that owns the window and
//! context.

pub mod backend;
pub mod capabilities;
pub mod recording;

pub use backend::{
    BackendError, BackendResult, BufferHandle, BufferTarget, BufferUsage, DrawElements,
    DrawElementsBaseVertex, GraphicsBackend, IndexFormat, MultiDrawElements,
    MultiDrawElementsBaseVertex, ProgramHandle, ShaderStage, ShaderVariant, UniformName,
    VertexAttribute,
};
pub use capabilities::{ApiVersion, BackendCapabilities, BackendProfile, Extensions};
pub use recording::{BackendCommand, BackendCounters, RecordingBackend};
