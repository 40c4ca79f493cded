//! Object Pool
//!
//! Slot-indexed storage for every drawable triangle. The pool owns all
//! per-object data (jittered geometry, colors, transform parameters, index
//! data and draw metadata) as contiguous arrays and mirrors the static parts
//! into backend buffers.
//!
//! # Growth
//!
//! Capacity starts at [`MIN_CAPACITY`] and grows by [`GROWTH_FACTOR`] until it
//! covers the requested count: 128, 512, 2048, 8192, ... up to [`MAX_CAPACITY`].
//! It never shrinks. A growth step regenerates *every* slot with fresh random
//! values, including slots that existed before, and re-uploads all static
//! buffers. Slot data is immutable between growth steps. A step that fails
//! leaves the previous generation in place.
//!
//! ```text
//! ensure_capacity(n)
//!     │ n ≤ capacity ──→ no-op
//!     ▼
//! grow ×4 → pick index width → regenerate arrays → upload → release old buffers
//! ```

use bytemuck::{Pod, Zeroable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::batch::resolver::{ResolvedConfig, UploadMode};
use crate::render::backend::{
    BackendError, BackendResult, BufferHandle, BufferTarget, BufferUsage, GraphicsBackend, IndexFormat,
    UniformName, VertexAttribute,
};

/// Smallest capacity a pool ever has
pub const MIN_CAPACITY: usize = 128;

/// Capacity multiplier per growth step
pub const GROWTH_FACTOR: usize = 4;

/// Every object is one triangle
pub const VERTICES_PER_OBJECT: usize = 3;

/// Scalars per uniform block record (five used, three padding)
pub const TRANSFORM_RECORD_FLOATS: usize = 8;

/// Bytes per uniform block record
pub const TRANSFORM_RECORD_BYTES: usize = TRANSFORM_RECORD_FLOATS * std::mem::size_of::<f32>();

/// Largest vertex index count addressable with 16-bit indices
const NARROW_INDEX_LIMIT: usize = 65_536;

/// Local triangle shape, `vec4` per vertex
const BASE_POSITIONS: [[f32; 4]; VERTICES_PER_OBJECT] = [
    [0.0, 0.1, 0.0, 1.0],
    [-0.1, -0.1, 0.0, 1.0],
    [0.1, -0.1, 0.0, 1.0],
];

/// Red, green, blue corners
const BASE_COLORS: [[f32; 4]; VERTICES_PER_OBJECT] = [
    [1.0, 0.0, 0.0, 1.0],
    [0.0, 1.0, 0.0, 1.0],
    [0.0, 0.0, 1.0, 1.0],
];

/// Indices of the local triangle
pub const LOCAL_INDICES: [u32; VERTICES_PER_OBJECT] = [0, 1, 2];

/// Largest capacity a pool grows to; byte offsets into a 32-bit index buffer must fit an `i32`
pub const MAX_CAPACITY: usize = MIN_CAPACITY * GROWTH_FACTOR.pow(10);

/// Smallest capacity in the growth sequence that holds `requested` objects
///
/// `None` when that would exceed [`MAX_CAPACITY`].
pub fn capacity_for(requested: usize) -> Option<usize> {
    if requested > MAX_CAPACITY {
        return None;
    }
    let mut capacity = MIN_CAPACITY;
    while capacity < requested {
        capacity = capacity.checked_mul(GROWTH_FACTOR)?;
    }
    Some(capacity)
}

/// Index width needed to address every vertex of a pool of `capacity` slots
pub fn index_format_for(capacity: usize) -> IndexFormat {
    if capacity.saturating_mul(VERTICES_PER_OBJECT) > NARROW_INDEX_LIMIT {
        IndexFormat::Uint32
    } else {
        IndexFormat::Uint16
    }
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors raised while (re)allocating the pool
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// More objects were requested than the largest pool holds
    #[error("Cannot hold {requested} objects, pools stop at {max} slots", max = MAX_CAPACITY)]
    CapacityOverflow {
        /// Requested object count
        requested: usize,
    },

    /// The capacity needs 32-bit indices and the backend has none
    #[error("Capacity {capacity} needs 32-bit indices, which the backend does not support")]
    WideIndicesUnsupported {
        /// Capacity that was about to be allocated
        capacity: usize,
    },

    /// Buffer creation or upload failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Random transform parameters of one slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotTransform {
    /// Uniform scale, 0.2 to 0.4
    pub scale: f32,
    /// Horizontal offset, -0.9 to 0.9
    pub offset_x: f32,
    /// Vertical offset, -0.9 to 0.9
    pub offset_y: f32,
    /// Animation speed, 0.5 to 2.0
    pub scalar: f32,
    /// Animation phase, 0 to 10
    pub scalar_offset: f32,
}

impl SlotTransform {
    fn random(rng: &mut impl Rng) -> Self {
        Self {
            scale: rng.gen_range(0.2..=0.4),
            offset_x: rng.gen_range(-0.9..=0.9),
            offset_y: rng.gen_range(-0.9..=0.9),
            scalar: rng.gen_range(0.5..=2.0),
            scalar_offset: rng.gen_range(0.0..=10.0),
        }
    }

    /// Uniform block layout
    pub fn to_record(self) -> TransformRecord {
        TransformRecord {
            scale: self.scale,
            offset_x: self.offset_x,
            offset_y: self.offset_y,
            scalar: self.scalar,
            scalar_offset: self.scalar_offset,
            padding: [0.0; 3],
        }
    }

    /// Vertex attribute layout
    pub fn to_attribute_record(self) -> AttributeRecord {
        AttributeRecord {
            scale: self.scale,
            offset_x: self.offset_x,
            offset_y: self.offset_y,
            scalar: self.scalar,
            scalar_offset: self.scalar_offset,
        }
    }

    /// Separate-uniform layout with the time slot zeroed
    pub fn to_uniform_record(self) -> UniformRecord {
        UniformRecord {
            scale: self.scale,
            time: 0.0,
            offset_x: self.offset_x,
            offset_y: self.offset_y,
            scalar: self.scalar,
            scalar_offset: self.scalar_offset,
        }
    }
}

/// One entry of the `DrawData` uniform block array
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct TransformRecord {
    /// Uniform scale
    pub scale: f32,
    /// Horizontal offset
    pub offset_x: f32,
    /// Vertical offset
    pub offset_y: f32,
    /// Animation speed
    pub scalar: f32,
    /// Animation phase
    pub scalar_offset: f32,
    /// Pads the record to two `vec4`s
    pub padding: [f32; 3],
}

/// Transform inputs of one vertex in attribute mode
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct AttributeRecord {
    /// Uniform scale
    pub scale: f32,
    /// Horizontal offset
    pub offset_x: f32,
    /// Vertical offset
    pub offset_y: f32,
    /// Animation speed
    pub scalar: f32,
    /// Animation phase
    pub scalar_offset: f32,
}

/// The six scalars pushed before each separate-uniform draw
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct UniformRecord {
    /// Uniform scale
    pub scale: f32,
    /// Elapsed time, written every frame
    pub time: f32,
    /// Horizontal offset
    pub offset_x: f32,
    /// Vertical offset
    pub offset_y: f32,
    /// Animation speed
    pub scalar: f32,
    /// Animation phase
    pub scalar_offset: f32,
}

impl UniformRecord {
    /// Values in upload order
    pub fn values(&self) -> [(UniformName, f32); 6] {
        [
            (UniformName::Scale, self.scale),
            (UniformName::Time, self.time),
            (UniformName::OffsetX, self.offset_x),
            (UniformName::OffsetY, self.offset_y),
            (UniformName::Scalar, self.scalar),
            (UniformName::ScalarOffset, self.scalar_offset),
        ]
    }
}

/// Static per-slot draw parameters, indexed by slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawMetadata {
    /// Index count per draw (always 3)
    pub counts: Vec<i32>,
    /// Byte offset of the slot's triangle in the index buffer
    pub byte_offsets: Vec<i32>,
    /// First vertex of the slot
    pub base_vertices: Vec<i32>,
    /// Instance count per draw (always 1)
    pub instance_counts: Vec<i32>,
    /// Base instance per draw (always 0)
    pub base_instances: Vec<u32>,
}

impl DrawMetadata {
    fn new(capacity: usize, format: IndexFormat) -> Self {
        let stride = (format.byte_width() * VERTICES_PER_OBJECT) as i32;
        Self {
            counts: vec![VERTICES_PER_OBJECT as i32; capacity],
            byte_offsets: (0..capacity as i32).map(|slot| slot * stride).collect(),
            base_vertices: (0..capacity as i32)
                .map(|slot| slot * VERTICES_PER_OBJECT as i32)
                .collect(),
            instance_counts: vec![1; capacity],
            base_instances: vec![0; capacity],
        }
    }
}

/// Backend buffers of one pool generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolBuffers {
    /// Jittered positions
    pub positions: BufferHandle,
    /// Vertex colors
    pub colors: BufferHandle,
    /// Element indices, rewritten by repacking
    pub indices: BufferHandle,
    /// Per-vertex transforms (attribute mode)
    pub transforms: Option<BufferHandle>,
    /// Uniform block chunks of `max_uniform_block_array_size` records (uniform block mode)
    pub uniform_blocks: Vec<BufferHandle>,
}

impl PoolBuffers {
    fn handles(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        [self.positions, self.colors, self.indices]
            .into_iter()
            .chain(self.transforms)
            .chain(self.uniform_blocks.iter().copied())
    }

    fn bind<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) -> BackendResult<()> {
        backend.bind_vertex_buffer(VertexAttribute::Position, self.positions)?;
        backend.bind_vertex_buffer(VertexAttribute::Color, self.colors)?;
        if let Some(transforms) = self.transforms {
            backend.bind_vertex_buffer(VertexAttribute::Transform, transforms)?;
        }
        backend.bind_index_buffer(self.indices)
    }
}

/// Per-slot arrays of one generation
#[derive(Debug, Clone, Default)]
struct SlotArrays {
    positions: Vec<[f32; 4]>,
    colors: Vec<[f32; 4]>,
    transforms: Vec<SlotTransform>,
    transform_records: Vec<TransformRecord>,
    uniform_records: Vec<UniformRecord>,
    static_indices: Vec<u32>,
    metadata: DrawMetadata,
}

impl SlotArrays {
    /// Fill every slot of a `capacity` sized generation with fresh random values
    fn generate(
        capacity: usize,
        index_format: IndexFormat,
        config: &ResolvedConfig,
        rng: &mut StdRng,
    ) -> Self {
        let mut positions = Vec::with_capacity(capacity * VERTICES_PER_OBJECT);
        for _ in 0..capacity {
            // Per-vertex scale gives every triangle its own shape
            for base in BASE_POSITIONS {
                let s: f32 = rng.gen_range(0.1..=2.0);
                positions.push([base[0] * s, base[1] * s, base[2], base[3]]);
            }
        }

        let colors = BASE_COLORS.repeat(capacity);

        let transforms: Vec<SlotTransform> = (0..capacity)
            .map(|_| SlotTransform::random(&mut *rng))
            .collect();

        let mut transform_records = Vec::new();
        let mut uniform_records = Vec::new();
        match config.upload_mode() {
            UploadMode::UniformBlocks => {
                transform_records.extend(transforms.iter().map(|t| t.to_record()));
            }
            UploadMode::SeparateUniforms => {
                uniform_records.extend(transforms.iter().map(|t| t.to_uniform_record()));
            }
            UploadMode::Attributes => {}
        }

        // Base-vertex draws add the slot's first vertex themselves
        let base_vertex = config.base_vertex_base_instance();
        let mut static_indices = Vec::with_capacity(capacity * VERTICES_PER_OBJECT);
        for slot in 0..capacity as u32 {
            let first = if base_vertex {
                0
            } else {
                slot * VERTICES_PER_OBJECT as u32
            };
            static_indices.extend(LOCAL_INDICES.iter().map(|local| local + first));
        }

        Self {
            positions,
            colors,
            transforms,
            transform_records,
            uniform_records,
            static_indices,
            metadata: DrawMetadata::new(capacity, index_format),
        }
    }
}

/// Arena of per-object data, grown in powers of four
pub struct ObjectPool {
    config: ResolvedConfig,
    rng: StdRng,
    capacity: usize,
    generation: u64,
    index_format: IndexFormat,
    slots: SlotArrays,
    buffers: Option<PoolBuffers>,
}

impl ObjectPool {
    /// Create an empty pool; nothing is allocated before [`ObjectPool::ensure_capacity`]
    ///
    /// A seed makes every generation reproducible; without one the generator
    /// is seeded from the OS.
    pub fn new(config: ResolvedConfig, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            config,
            rng,
            capacity: 0,
            generation: 0,
            index_format: IndexFormat::Uint16,
            slots: SlotArrays::default(),
            buffers: None,
        }
    }

    /// Grow to hold at least `requested` objects
    ///
    /// Returns `true` when the pool was (re)generated. The first call always
    /// allocates, at least [`MIN_CAPACITY`] slots. On error the pool keeps its
    /// current generation and buffers.
    pub fn ensure_capacity<B: GraphicsBackend + ?Sized>(
        &mut self,
        requested: usize,
        backend: &mut B,
    ) -> PoolResult<bool> {
        if self.capacity != 0 && requested <= self.capacity {
            return Ok(false);
        }

        let capacity = capacity_for(requested)
            .ok_or(PoolError::CapacityOverflow { requested })?
            .max(self.capacity);
        let index_format = index_format_for(capacity);
        if index_format == IndexFormat::Uint32 && !self.config.wide_indices_supported {
            return Err(PoolError::WideIndicesUnsupported { capacity });
        }

        log::debug!(
            "Growing object pool {} -> {} slots ({:?} indices) for {} objects",
            self.capacity,
            capacity,
            index_format,
            requested
        );

        let slots = SlotArrays::generate(capacity, index_format, &self.config, &mut self.rng);
        let buffers = self.upload(&slots, index_format, backend)?;

        self.capacity = capacity;
        self.index_format = index_format;
        self.slots = slots;
        if let Some(previous) = self.buffers.replace(buffers) {
            for buffer in previous.handles() {
                backend.delete_buffer(buffer);
            }
        }
        self.generation += 1;
        Ok(true)
    }

    /// Create, fill and bind the buffers of a new generation
    ///
    /// Buffers created before a failure are released again.
    fn upload<B: GraphicsBackend + ?Sized>(
        &self,
        slots: &SlotArrays,
        index_format: IndexFormat,
        backend: &mut B,
    ) -> PoolResult<PoolBuffers> {
        let mut created = Vec::new();
        let result = self
            .create_buffers(slots, index_format, backend, &mut created)
            .and_then(|buffers| {
                buffers.bind(backend)?;
                Ok(buffers)
            });

        if result.is_err() {
            log::warn!("Pool upload failed, releasing {} new buffers", created.len());
            for buffer in created {
                backend.delete_buffer(buffer);
            }
        }
        result
    }

    fn create_buffers<B: GraphicsBackend + ?Sized>(
        &self,
        slots: &SlotArrays,
        index_format: IndexFormat,
        backend: &mut B,
        created: &mut Vec<BufferHandle>,
    ) -> PoolResult<PoolBuffers> {
        let mut filled = |target: BufferTarget, data: &[u8], usage: BufferUsage| {
            let buffer = backend.create_buffer(target)?;
            created.push(buffer);
            backend.upload_buffer(buffer, data, usage)?;
            Ok::<_, PoolError>(buffer)
        };

        let positions = filled(
            BufferTarget::Array,
            bytemuck::cast_slice(&slots.positions),
            BufferUsage::Static,
        )?;
        let colors = filled(
            BufferTarget::Array,
            bytemuck::cast_slice(&slots.colors),
            BufferUsage::Static,
        )?;
        let indices = filled(
            BufferTarget::ElementArray,
            &index_format.encode(&slots.static_indices),
            BufferUsage::Dynamic,
        )?;

        let mut transforms = None;
        let mut uniform_blocks = Vec::new();
        match self.config.upload_mode() {
            UploadMode::Attributes => {
                let records: Vec<AttributeRecord> = slots
                    .transforms
                    .iter()
                    .flat_map(|t| [t.to_attribute_record(); VERTICES_PER_OBJECT])
                    .collect();
                transforms = Some(filled(
                    BufferTarget::Array,
                    bytemuck::cast_slice(&records),
                    BufferUsage::Static,
                )?);
            }
            UploadMode::UniformBlocks => {
                let chunk_size = self.config.max_uniform_block_array_size;
                let mut block = vec![TransformRecord::default(); chunk_size];
                for records in slots.transform_records.chunks(chunk_size) {
                    // Every chunk is a full block; the tail of the last one stays zeroed
                    block.fill(TransformRecord::default());
                    block[..records.len()].copy_from_slice(records);
                    uniform_blocks.push(filled(
                        BufferTarget::Uniform,
                        bytemuck::cast_slice(&block),
                        BufferUsage::Dynamic,
                    )?);
                }
            }
            UploadMode::SeparateUniforms => {}
        }

        Ok(PoolBuffers {
            positions,
            colors,
            indices,
            transforms,
            uniform_blocks,
        })
    }

    /// Current capacity, 0 before the first allocation
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of allocations so far; bumps on every regeneration
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Index width of the current generation
    pub fn index_format(&self) -> IndexFormat {
        self.index_format
    }

    /// Configuration the pool lays its data out for
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Jittered vertex positions, three per slot
    pub fn positions(&self) -> &[[f32; 4]] {
        &self.slots.positions
    }

    /// Vertex colors, three per slot
    pub fn colors(&self) -> &[[f32; 4]] {
        &self.slots.colors
    }

    /// Transform parameters per slot
    pub fn transforms(&self) -> &[SlotTransform] {
        &self.slots.transforms
    }

    /// Immutable uniform block records per slot (uniform block mode only)
    pub fn transform_records(&self) -> &[TransformRecord] {
        &self.slots.transform_records
    }

    /// Separate-uniform records per slot (separate-uniform mode only)
    pub fn uniform_records(&self) -> &[UniformRecord] {
        &self.slots.uniform_records
    }

    /// Index buffer contents as uploaded at allocation
    pub fn static_indices(&self) -> &[u32] {
        &self.slots.static_indices
    }

    /// Triangle indices of one slot
    pub fn slot_indices(&self, slot: usize) -> &[u32] {
        let start = slot * VERTICES_PER_OBJECT;
        &self.slots.static_indices[start..start + VERTICES_PER_OBJECT]
    }

    /// Static draw parameters per slot
    pub fn metadata(&self) -> &DrawMetadata {
        &self.slots.metadata
    }

    /// Buffers of the current generation
    pub fn buffers(&self) -> Option<&PoolBuffers> {
        self.buffers.as_ref()
    }

    /// Write the frame time into a slot's uniform record and return the record
    pub fn stamp_time(&mut self, slot: usize, time: f32) -> Option<UniformRecord> {
        let record = self.slots.uniform_records.get_mut(slot)?;
        record.time = time;
        Some(*record)
    }
}
