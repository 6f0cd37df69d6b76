//! The seam between the simulation and whatever actually executes passes.
//!
//! Every object that owns GPU resources receives the backend explicitly; there
//! is no ambient context. Handles are plain integers owned by the backend and
//! stay valid until deleted.

use crate::compile::{LinkedProgram, TextureSlot, UniformBlock};
use crate::error::BackendError;
use crate::types::{BlendMode, FilterMode, TextureFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub(crate) u32);

/// What the device can store and sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub full_float: bool,
    pub half_float: bool,
    /// Whether float render targets can be sampled with hardware bilinear filtering.
    pub linear_filtering: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub filter: FilterMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Target(TargetId),
    Surface,
}

/// One full-screen pass.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub program: ProgramId,
    pub uniforms: &'a UniformBlock,
    pub textures: &'a [(TextureSlot, TargetId)],
    pub output: Output,
    pub blend: BlendMode,
}

/// CPU copy of a target's texels, row 0 first (bottom of the field).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSnapshot {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

impl FieldSnapshot {
    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        self.texels[(y * self.width + x) as usize]
    }

    /// Largest absolute component over the first `channels` channels.
    pub fn max_norm(&self, channels: usize) -> f32 {
        self.texels
            .iter()
            .flat_map(|t| t.iter().take(channels))
            .fold(0.0_f32, |acc, v| acc.max(v.abs()))
    }

    /// Sum of squares over the first `channels` channels.
    pub fn energy(&self, channels: usize) -> f32 {
        self.texels
            .iter()
            .flat_map(|t| t.iter().take(channels))
            .map(|v| v * v)
            .sum()
    }
}

pub trait RenderBackend {
    fn capabilities(&self) -> Capabilities;

    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramId, BackendError>;

    fn delete_program(&mut self, id: ProgramId);

    fn create_target(&mut self, descriptor: &TargetDescriptor) -> Result<TargetId, BackendError>;

    /// Whether `id` can be used as a render output with its format.
    fn target_complete(&self, id: TargetId) -> bool;

    fn delete_target(&mut self, id: TargetId);

    fn clear(&mut self, output: Output, color: [f32; 4]) -> Result<(), BackendError>;

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), BackendError>;

    fn read_target(&self, id: TargetId) -> Result<FieldSnapshot, BackendError>;

    /// Largest width or height accepted by `create_target`.
    fn max_texture_dimension(&self) -> u32;

    /// Current drawable size in physical pixels.
    fn surface_size(&self) -> (u32, u32);

    fn begin_frame(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Submits the frame's passes and presents the surface.
    fn end_frame(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}
