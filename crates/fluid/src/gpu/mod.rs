//! wgpu backend for on-screen rendering.
//!
//! - `context` owns the instance, device and surface wiring and probes which
//!   float formats the adapter can render into and filter.
//! - `pipeline` turns a linked program into shader modules, bind group layouts
//!   and render pipelines keyed by output format and blend mode.
//! - `backend` implements [`RenderBackend`](crate::backend::RenderBackend) on
//!   top of both, recording every pass of a frame into one encoder.

mod backend;
mod context;
mod pipeline;

pub use backend::{texture_format, GpuBackend};
