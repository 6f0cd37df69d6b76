use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, MouseButton, TouchPhase, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::backend::RenderBackend;
use crate::gpu::GpuBackend;
use crate::orchestrator::{FluidOptions, FluidOrchestrator};
use crate::types::{HostSignals, Theme};

/// Everything the preview window needs to start.
#[derive(Debug, Clone)]
pub struct WindowOptions {
    pub title: String,
    pub size: (u32, u32),
    pub signals: HostSignals,
    pub fluid: FluidOptions,
}

/// Window-side state; `fluid` is declared first so the surface is released
/// before the window it was created from. `None` keeps the window blank.
struct PreviewState {
    fluid: Option<FluidOrchestrator<GpuBackend>>,
    cursor: PhysicalPosition<f64>,
    window: Arc<Window>,
}

impl PreviewState {
    fn handle_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        let Some(fluid) = self.fluid.as_mut() else {
            return;
        };
        match &event.logical_key {
            Key::Named(NamedKey::Space) => fluid.queue_random_burst(),
            Key::Character(value) if value.eq_ignore_ascii_case("p") => {
                let paused = fluid.toggle_paused();
                tracing::info!(paused, "toggled simulation");
            }
            Key::Character(value) if value.eq_ignore_ascii_case("t") => {
                let theme = match fluid.signals().theme {
                    Theme::Dark => Theme::Light,
                    Theme::Light => Theme::Dark,
                };
                fluid.set_theme(theme);
                tracing::info!(%theme, "switched theme");
            }
            _ => {}
        }
    }

    fn handle_mouse_button(&mut self, state: ElementState) {
        let (x, y) = (self.cursor.x as f32, self.cursor.y as f32);
        let Some(fluid) = self.fluid.as_mut() else {
            return;
        };
        match state {
            ElementState::Pressed => fluid.mouse_down(x, y),
            ElementState::Released => fluid.mouse_up(),
        }
    }

    fn handle_cursor_moved(&mut self, position: PhysicalPosition<f64>) {
        self.cursor = position;
        if let Some(fluid) = self.fluid.as_mut() {
            fluid.mouse_move(position.x as f32, position.y as f32);
        }
    }

    fn handle_touch(&mut self, id: u64, phase: TouchPhase, x: f32, y: f32) {
        let Some(fluid) = self.fluid.as_mut() else {
            return;
        };
        match phase {
            TouchPhase::Started => fluid.touch_start(id, x, y),
            TouchPhase::Moved => fluid.touch_move(id, x, y),
            TouchPhase::Ended | TouchPhase::Cancelled => fluid.touch_end(id),
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if let Some(fluid) = self.fluid.as_mut() {
            fluid.backend_mut().resize(size);
            self.window.request_redraw();
        }
    }

    fn redraw(&mut self) {
        if let Some(fluid) = self.fluid.as_mut() {
            fluid.tick(Instant::now());
        }
    }

    fn frame_requested(&self) -> bool {
        self.fluid.as_ref().is_some_and(|fluid| fluid.frame_requested())
    }

    fn close(&mut self) {
        if let Some(fluid) = self.fluid.as_mut() {
            fluid.dispose();
        }
    }
}

/// Brings the layer up for `signals`, or returns `None` and leaves the window
/// blank. Gated hosts never create a backend; a backend that cannot be
/// created is logged and otherwise ignored.
fn bring_up<B, F>(
    signals: HostSignals,
    options: FluidOptions,
    create_backend: F,
) -> Option<FluidOrchestrator<B>>
where
    B: RenderBackend,
    F: FnOnce() -> Result<B>,
{
    if !signals.simulation_allowed() {
        tracing::info!(
            device = ?signals.device,
            reduced_motion = signals.reduced_motion,
            "fluid layer disabled for this host"
        );
        return None;
    }
    let backend = match create_backend() {
        Ok(backend) => backend,
        Err(err) => {
            tracing::warn!("graphics context unavailable; nothing will be drawn: {err:#}");
            return None;
        }
    };
    let mut fluid = FluidOrchestrator::new(backend, signals, options);
    fluid.start().then_some(fluid)
}

/// Opens a transparent window and runs the fluid layer until it is closed.
///
/// Space adds a burst of random splats, `P` pauses and `T` flips the theme.
pub fn run_window(options: WindowOptions) -> Result<()> {
    let event_loop =
        EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let window = WindowBuilder::new()
        .with_title(options.title.as_str())
        .with_inner_size(PhysicalSize::new(options.size.0, options.size.1))
        .with_transparent(true)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let size = window.inner_size();
    let signals = HostSignals {
        viewport: (size.width, size.height),
        ..options.signals
    };
    let fluid = bring_up(signals, options.fluid, || {
        GpuBackend::new(window.as_ref(), size)
    });
    if fluid.is_none() {
        tracing::info!("window stays blank; close it to exit");
    }

    let mut state = PreviewState {
        fluid,
        cursor: PhysicalPosition::new(0.0, 0.0),
        window,
    };
    state.window.request_redraw();

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == state.window.id() => {
                match event {
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                        state.close();
                        elwt.exit();
                    }
                    WindowEvent::KeyboardInput { event, .. } => state.handle_key(&event),
                    WindowEvent::CursorMoved { position, .. } => {
                        state.handle_cursor_moved(position);
                    }
                    WindowEvent::MouseInput {
                        state: button_state,
                        button: MouseButton::Left,
                        ..
                    } => state.handle_mouse_button(button_state),
                    WindowEvent::Touch(touch) => state.handle_touch(
                        touch.id,
                        touch.phase,
                        touch.location.x as f32,
                        touch.location.y as f32,
                    ),
                    WindowEvent::Resized(size) => state.resize(size),
                    WindowEvent::RedrawRequested => state.redraw(),
                    _ => {}
                }
            }
            Event::AboutToWait => {
                if state.frame_requested() {
                    state.window.request_redraw();
                }
                elwt.set_control_flow(ControlFlow::Wait);
            }
            _ => {}
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use anyhow::anyhow;

    use super::*;
    use crate::software::SoftwareBackend;
    use crate::types::DeviceClass;

    #[test]
    fn gated_hosts_never_create_a_backend() {
        let created = Cell::new(false);
        let mut signals = HostSignals::new(Theme::Dark, (32, 32));
        signals.device = DeviceClass::TouchOnly;
        let fluid = bring_up(signals, FluidOptions::default(), || {
            created.set(true);
            Ok(SoftwareBackend::new((32, 32))?)
        });
        assert!(fluid.is_none());
        assert!(!created.get());

        let signals = HostSignals {
            reduced_motion: true,
            ..HostSignals::new(Theme::Light, (32, 32))
        };
        let fluid = bring_up(signals, FluidOptions::default(), || {
            created.set(true);
            Ok(SoftwareBackend::new((32, 32))?)
        });
        assert!(fluid.is_none());
        assert!(!created.get());
    }

    #[test]
    fn missing_graphics_context_leaves_the_window_blank() {
        let signals = HostSignals::new(Theme::Dark, (32, 32));
        let fluid = bring_up::<SoftwareBackend, _>(signals, FluidOptions::default(), || {
            Err(anyhow!("no suitable GPU adapter"))
        });
        assert!(fluid.is_none());
    }

    #[test]
    fn desktop_hosts_start_the_layer() {
        let signals = HostSignals::new(Theme::Dark, (32, 32));
        let fluid = bring_up(signals, FluidOptions::default(), || {
            Ok(SoftwareBackend::new((32, 32))?)
        })
        .expect("layer starts");
        assert!(fluid.is_running());
        assert!(fluid.frame_requested());
    }
}
