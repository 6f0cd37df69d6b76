//! Headless rendering: a scripted diagonal drag on the software backend.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use fluid::{write_png, FluidOrchestrator, FrameOutcome, SoftwareBackend};

use crate::bindings::{fluid_options, host_signals};
use crate::cli::SnapshotArgs;
use crate::run::resolve_config;

const DEFAULT_SNAPSHOT_SIZE: (u32, u32) = (256, 256);
const DEFAULT_SEED: u64 = 7;
const FRAME_STEP: Duration = Duration::from_millis(16);

/// Pointer position (window pixels, origin top-left) for `frame` of a drag
/// from the lower-left to the upper-right over `frames` frames.
pub fn drag_position(size: (u32, u32), frame: u32, frames: u32) -> (f32, f32) {
    let t = if frames <= 1 {
        0.0
    } else {
        frame as f32 / (frames - 1) as f32
    };
    let (width, height) = (size.0 as f32, size.1 as f32);
    let x = width * (0.2 + 0.6 * t);
    let y = height * (0.8 - 0.6 * t);
    (x, y)
}

pub fn run(config_file: Option<&Path>, args: SnapshotArgs) -> Result<()> {
    let mut config = resolve_config(config_file, &args.run)?;
    let size = args.run.size.unwrap_or(DEFAULT_SNAPSHOT_SIZE);
    // The CPU backend gains nothing from dye finer than the surface.
    let shorter = size.0.min(size.1).max(8);
    config.simulation.dye_resolution = config.simulation.dye_resolution.min(shorter);
    config.simulation.sim_resolution = config.simulation.sim_resolution.min(shorter);

    let backend = SoftwareBackend::new(size)
        .with_context(|| format!("cannot render a {}x{} snapshot", size.0, size.1))?;
    let signals = host_signals(&config, size);
    let options = fluid_options(&config, Some(args.run.seed.unwrap_or(DEFAULT_SEED)));
    let mut fluid = FluidOrchestrator::new(backend, signals, options);
    fluid.start();

    let frames = args.frames.max(1);
    let drag_frames = (frames / 2).max(1);
    let start = Instant::now();
    let mut presented = 0;
    for frame in 0..frames {
        if frame < drag_frames {
            let (x, y) = drag_position(size, frame, drag_frames);
            if frame == 0 {
                fluid.mouse_down(x, y);
            } else {
                fluid.mouse_move(x, y);
            }
        } else if frame == drag_frames {
            fluid.mouse_up();
        }
        if fluid.tick(start + FRAME_STEP * frame) == FrameOutcome::Presented {
            presented += 1;
        }
    }
    tracing::debug!(frames, presented, "snapshot simulation finished");

    let surface = fluid.backend().surface_snapshot();
    fluid.dispose();
    write_png(&surface, &args.output)
        .with_context(|| format!("failed to save snapshot {}", args.output.display()))?;
    println!("{}", args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_runs_lower_left_to_upper_right() {
        let size = (100, 50);
        assert_eq!(drag_position(size, 0, 5), (20.0, 40.0));
        let (x, y) = drag_position(size, 4, 5);
        assert!((x - 80.0).abs() < 1e-4 && (y - 10.0).abs() < 1e-4);
        assert_eq!(drag_position(size, 0, 1), (20.0, 40.0));
    }
}
