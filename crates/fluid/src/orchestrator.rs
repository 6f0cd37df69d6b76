//! Frame-driven owner of every simulation resource.
//!
//! The host calls [`FluidOrchestrator::tick`] from its repaint callback while
//! [`FluidOrchestrator::frame_requested`] is true. Input handlers only record
//! pointer state; all backend work happens inside `tick`.

use std::time::Instant;

use crate::backend::RenderBackend;
use crate::compositor::{Compositor, ThemeStyles};
use crate::error::{BackendError, InitError};
use crate::framebuffer::{probe_formats, FramebufferPool};
use crate::palette::Palette;
use crate::pointer::{PointerTracker, Splat};
use crate::programs::FluidPrograms;
use crate::stepper::Stepper;
use crate::timeline::FrameClock;
use crate::types::{HostSignals, SimulationConfig, Theme};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Running,
    Disposing,
    Disposed,
}

/// Result of a single [`FluidOrchestrator::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Not running or no frame requested; nothing was drawn.
    Inactive,
    Presented,
    /// The frame was dropped (lost surface or a backend failure).
    Skipped,
}

#[derive(Debug, Clone, Default)]
pub struct FluidOptions {
    pub config: SimulationConfig,
    pub styles: ThemeStyles,
    /// Seed for splat colours and random splats; entropy when unset.
    pub seed: Option<u64>,
}

struct Resources {
    programs: FluidPrograms,
    pool: FramebufferPool,
}

pub struct FluidOrchestrator<B: RenderBackend> {
    backend: B,
    state: LifecycleState,
    signals: HostSignals,
    config: SimulationConfig,
    resources: Option<Resources>,
    pointers: PointerTracker,
    compositor: Compositor,
    palette: Palette,
    clock: FrameClock,
    pending_random: u32,
    frame_requested: bool,
    frames: u64,
}

fn palettes(seed: Option<u64>) -> (Palette, Palette) {
    match seed {
        Some(seed) => (Palette::seeded(seed), Palette::seeded(seed.wrapping_add(1))),
        None => (Palette::from_entropy(), Palette::from_entropy()),
    }
}

/// A bright splat at a random position with a random push.
pub fn random_splat(palette: &mut Palette, theme: Theme) -> Splat {
    let color = palette.next_color(theme).map(|c| c * 10.0);
    let point = [palette.unit(), palette.unit()];
    let force = [palette.centred(1000.0), palette.centred(1000.0)];
    Splat {
        point,
        force,
        color,
    }
}

impl<B: RenderBackend> FluidOrchestrator<B> {
    pub fn new(backend: B, signals: HostSignals, options: FluidOptions) -> Self {
        let (pointer_palette, palette) = palettes(options.seed);
        let viewport = backend.surface_size();
        Self {
            pointers: PointerTracker::new(viewport, signals.theme, pointer_palette),
            compositor: Compositor::new(signals.theme, options.styles),
            clock: FrameClock::new(options.config.max_dt),
            backend,
            state: LifecycleState::Uninitialized,
            signals: HostSignals {
                viewport,
                ..signals
            },
            config: options.config,
            resources: None,
            palette,
            pending_random: 0,
            frame_requested: false,
            frames: 0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    /// Whether the host should schedule another [`tick`](Self::tick).
    pub fn frame_requested(&self) -> bool {
        self.frame_requested
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn signals(&self) -> HostSignals {
        self.signals
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn fields(&self) -> Option<&FramebufferPool> {
        self.resources.as_ref().map(|resources| &resources.pool)
    }

    pub fn pointers(&self) -> &PointerTracker {
        &self.pointers
    }

    /// Brings the simulation up, or explains why it stays inert.
    pub fn try_start(&mut self) -> Result<(), InitError> {
        match self.state {
            LifecycleState::Running => return Ok(()),
            LifecycleState::Disposing | LifecycleState::Disposed => {
                return Err(InitError::Disposed)
            }
            LifecycleState::Uninitialized => {}
        }
        if !self.signals.simulation_allowed() {
            return Err(InitError::Gated);
        }

        let formats = probe_formats(&mut self.backend)?;
        let programs = FluidPrograms::compile(&mut self.backend)?;
        let surface = self.backend.surface_size();
        let pool = match FramebufferPool::create(&mut self.backend, formats, surface, &self.config)
        {
            Ok(pool) => pool,
            Err(err) => {
                programs.release(&mut self.backend);
                return Err(err.into());
            }
        };

        self.resources = Some(Resources { programs, pool });
        self.state = LifecycleState::Running;
        self.frame_requested = true;
        self.clock.reset();
        self.pending_random += self.config.initial_splats;
        tracing::info!(
            surface = ?surface,
            sim_resolution = self.config.sim_resolution,
            dye_resolution = self.config.dye_resolution,
            theme = %self.signals.theme,
            "fluid layer running"
        );
        Ok(())
    }

    /// Like [`try_start`](Self::try_start) but logs failures and leaves the layer blank.
    pub fn start(&mut self) -> bool {
        match self.try_start() {
            Ok(()) => true,
            Err(InitError::Gated) => {
                tracing::info!(
                    device = ?self.signals.device,
                    reduced_motion = self.signals.reduced_motion,
                    "fluid layer disabled for this host"
                );
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "fluid layer failed to initialise; rendering nothing");
                false
            }
        }
    }

    /// Runs one frame at wall-clock time `now`.
    pub fn tick(&mut self, now: Instant) -> FrameOutcome {
        if self.state != LifecycleState::Running || !self.frame_requested {
            return FrameOutcome::Inactive;
        }
        let dt = self.clock.advance(now);
        match self.render_frame(dt) {
            Ok(()) => {
                self.frames += 1;
                FrameOutcome::Presented
            }
            Err(BackendError::SurfaceLost) => {
                tracing::debug!("surface lost; skipping frame");
                FrameOutcome::Skipped
            }
            Err(err) => {
                tracing::warn!(error = %err, "frame failed");
                FrameOutcome::Skipped
            }
        }
    }

    fn render_frame(&mut self, dt: f32) -> Result<(), BackendError> {
        let Some(resources) = self.resources.as_mut() else {
            return Ok(());
        };
        self.backend.begin_frame()?;

        let surface = self.backend.surface_size();
        if surface != self.signals.viewport {
            self.signals.viewport = surface;
            self.pointers.set_viewport(surface);
        }
        resources.pool.resize_all(
            &mut self.backend,
            &resources.programs.copy,
            surface,
            &self.config,
        )?;

        let theme = self.signals.theme;
        let mut splats: Vec<Splat> = (0..std::mem::take(&mut self.pending_random))
            .map(|_| random_splat(&mut self.palette, theme))
            .collect();
        splats.extend(self.pointers.take_splats(self.config.splat_force));

        let mut stepper = Stepper::new(
            &mut self.backend,
            &resources.programs,
            &mut resources.pool,
            &self.config,
        );
        for splat in &splats {
            stepper.splat(splat.point, splat.force, splat.color)?;
        }
        if !self.config.paused {
            stepper.step(dt)?;
        }

        self.compositor.composite(
            &mut self.backend,
            &resources.programs.display,
            resources.pool.dye.read(),
        )?;
        self.backend.end_frame()
    }

    /// Cancels the frame request, then releases every program and target.
    pub fn dispose(&mut self) {
        if matches!(
            self.state,
            LifecycleState::Disposing | LifecycleState::Disposed
        ) {
            return;
        }
        self.state = LifecycleState::Disposing;
        self.frame_requested = false;
        if let Some(resources) = self.resources.take() {
            resources.pool.release(&mut self.backend);
            resources.programs.release(&mut self.backend);
        }
        self.state = LifecycleState::Disposed;
        tracing::debug!(frames = self.frames, "fluid layer disposed");
    }

    pub fn queue_random_splats(&mut self, count: u32) {
        self.pending_random = self.pending_random.saturating_add(count);
    }

    /// Queues between 5 and 24 random splats.
    pub fn queue_random_burst(&mut self) {
        let count = 5 + (self.palette.unit() * 20.0) as u32;
        self.queue_random_splats(count.min(24));
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.config.paused = paused;
    }

    pub fn toggle_paused(&mut self) -> bool {
        self.config.paused = !self.config.paused;
        self.config.paused
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.signals.theme = theme;
        self.pointers.set_theme(theme);
        self.compositor.set_theme(theme);
    }

    pub fn mouse_down(&mut self, x: f32, y: f32) {
        self.pointers.mouse_down(x, y);
    }

    pub fn mouse_move(&mut self, x: f32, y: f32) {
        self.pointers.mouse_move(x, y);
    }

    pub fn mouse_up(&mut self) {
        self.pointers.mouse_up();
    }

    pub fn touch_start(&mut self, id: u64, x: f32, y: f32) {
        self.pointers.touch_start(id, x, y);
    }

    pub fn touch_move(&mut self, id: u64, x: f32, y: f32) {
        self.pointers.touch_move(id, x, y);
    }

    pub fn touch_end(&mut self, id: u64) {
        self.pointers.touch_end(id);
    }
}

impl<B: RenderBackend> Drop for FluidOrchestrator<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}
