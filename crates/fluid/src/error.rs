use crate::backend::{ProgramId, TargetId};
use crate::types::Channels;

/// Failures reported by a [`RenderBackend`](crate::backend::RenderBackend).
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("render target {0:?} does not exist")]
    UnknownTarget(TargetId),
    #[error("program {0:?} does not exist")]
    UnknownProgram(ProgramId),
    #[error("render target {0:?} is incomplete and cannot be drawn into")]
    IncompleteTarget(TargetId),
    #[error("program '{program}' has no texture bound at binding {binding}")]
    MissingBinding { program: String, binding: u32 },
    #[error("surface lost; frame skipped")]
    SurfaceLost,
    #[error("surface error: {0}")]
    Surface(String),
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
    #[error("{width}x{height} exceeds the largest texture this backend can allocate")]
    TooLarge { width: u32, height: u32 },
    #[error("out of texture memory allocating '{0}'")]
    OutOfMemory(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStageKind {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStageKind::Vertex => f.write_str("vertex"),
            ShaderStageKind::Fragment => f.write_str("fragment"),
        }
    }
}

/// Program build failures. `log` carries the compiler diagnostic verbatim.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("failed to compile {stage} shader of '{program}':\n{log}")]
    Compile {
        program: String,
        stage: ShaderStageKind,
        log: String,
    },
    #[error("failed to link '{program}': {log}")]
    Link { program: String, log: String },
    #[error("program '{program}' has no active uniform '{name}'")]
    MissingUniform { program: String, name: String },
    #[error("program '{program}' has no texture '{name}'")]
    MissingTexture { program: String, name: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Reasons the simulation could not be brought up.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("host does not allow the simulation (touch-only device or reduced motion)")]
    Gated,
    #[error("neither full nor half float render targets are available")]
    NoFloatTargets,
    #[error("no renderable format for {0:?} fields")]
    NoRenderableFormat(Channels),
    #[error("orchestrator was already disposed")]
    Disposed,
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}
