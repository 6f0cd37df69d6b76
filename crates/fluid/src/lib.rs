//! Decorative real-time fluid layer.
//!
//! A stable-fluids solver runs entirely in fragment passes over float render
//! targets and composites its dye onto a transparent surface:
//!
//! ```text
//!   pointer input ──▶ PointerTracker ──▶ Splat
//!                                          │
//!   FluidOrchestrator::tick ──▶ Stepper (curl → vorticity → divergence
//!          │                     → pressure → gradient → advection)
//!          └─────────────▶ Compositor ──▶ surface (window or PNG)
//! ```
//!
//! Every object that owns device resources receives a [`RenderBackend`]
//! explicitly. [`GpuBackend`] renders with wgpu into a window;
//! [`SoftwareBackend`] executes the same programs on the CPU for tests and
//! headless snapshots.

pub mod backend;
pub mod compile;
pub mod compositor;
pub mod error;
pub mod export;
pub mod framebuffer;
pub mod gpu;
pub mod orchestrator;
pub mod palette;
pub mod pointer;
pub mod programs;
pub mod shaders;
pub mod software;
pub mod stepper;
pub mod timeline;
pub mod types;
mod window;

pub use backend::{Capabilities, FieldSnapshot, RenderBackend};
pub use compositor::{Compositor, ThemeStyles};
pub use error::{BackendError, CompileError, InitError};
pub use export::write_png;
pub use gpu::GpuBackend;
pub use orchestrator::{FluidOptions, FluidOrchestrator, FrameOutcome, LifecycleState};
pub use pointer::{PointerTracker, Splat};
pub use software::SoftwareBackend;
pub use types::{
    BlendMode, Channels, CompositorStyle, DeviceClass, HostSignals, Precision,
    SimulationConfig, Theme,
};
pub use window::{run_window, WindowOptions};
