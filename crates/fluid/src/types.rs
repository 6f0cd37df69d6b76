use std::fmt;

/// Page colour scheme reported by the host.
///
/// The theme never touches the physics; it only selects the compositor style
/// and the palette used for new pointer splats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Dark => f.write_str("dark"),
            Theme::Light => f.write_str("light"),
        }
    }
}

/// Coarse input capability of the host display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceClass {
    /// Mouse or trackpad driven desktop display.
    #[default]
    DesktopPointer,
    /// Touch-only device (phones, tablets, kiosks).
    TouchOnly,
}

/// Read-only inputs supplied by the surrounding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSignals {
    pub theme: Theme,
    pub device: DeviceClass,
    pub reduced_motion: bool,
    /// Viewport size in physical pixels.
    pub viewport: (u32, u32),
}

impl HostSignals {
    pub fn new(theme: Theme, viewport: (u32, u32)) -> Self {
        Self {
            theme,
            device: DeviceClass::DesktopPointer,
            reduced_motion: false,
            viewport,
        }
    }

    /// The layer only runs on pointer-capable desktops without a reduced-motion request.
    pub fn simulation_allowed(&self) -> bool {
        matches!(self.device, DeviceClass::DesktopPointer) && !self.reduced_motion
    }
}

/// Channel layout of a field texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channels {
    R,
    Rg,
    Rgba,
}

impl Channels {
    pub fn count(self) -> usize {
        match self {
            Channels::R => 1,
            Channels::Rg => 2,
            Channels::Rgba => 4,
        }
    }

    /// Next wider layout used when this one cannot be rendered into.
    pub fn widen(self) -> Option<Channels> {
        match self {
            Channels::R => Some(Channels::Rg),
            Channels::Rg => Some(Channels::Rgba),
            Channels::Rgba => None,
        }
    }
}

/// Component type of a field texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// 32-bit float components.
    Full,
    /// 16-bit float components.
    Half,
}

/// Storage format of a render target: channel layout plus component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureFormat {
    pub channels: Channels,
    pub precision: Precision,
}

impl TextureFormat {
    pub const fn new(channels: Channels, precision: Precision) -> Self {
        Self {
            channels,
            precision,
        }
    }

    pub fn with_channels(self, channels: Channels) -> Self {
        Self { channels, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

/// Blend equation applied when a pass writes to its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Overwrite the destination.
    #[default]
    Replace,
    /// `ONE, ONE_MINUS_SRC_ALPHA`.
    Premultiplied,
    /// `SRC_ALPHA, ONE_MINUS_SRC_ALPHA` for colour, `ONE, ONE_MINUS_SRC_ALPHA` for alpha.
    Alpha,
}

impl BlendMode {
    /// Blends `src` over `dst` on the CPU with the same factors the GPU uses.
    pub fn apply(self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        match self {
            BlendMode::Replace => src,
            BlendMode::Premultiplied => {
                let inv = 1.0 - src[3];
                std::array::from_fn(|i| src[i] + dst[i] * inv)
            }
            BlendMode::Alpha => {
                let a = src[3];
                let inv = 1.0 - a;
                let mut out: [f32; 4] = std::array::from_fn(|i| src[i] * a + dst[i] * inv);
                out[3] = a + dst[3] * inv;
                out
            }
        }
    }
}

/// Tunables of the solver.
///
/// The defaults were picked by eye for a background layer; none of them carry
/// physical units.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Short-edge cell count of the velocity/pressure grid.
    pub sim_resolution: u32,
    /// Short-edge cell count of the dye grid.
    pub dye_resolution: u32,
    pub velocity_dissipation: f32,
    pub dye_dissipation: f32,
    /// Fraction of the previous pressure kept before each solve.
    pub pressure: f32,
    pub pressure_iterations: u32,
    /// Vorticity confinement strength.
    pub curl: f32,
    /// Splat radius in percent of the short edge.
    pub splat_radius: f32,
    pub splat_force: f32,
    /// Largest timestep a single frame may advance, in seconds.
    pub max_dt: f32,
    /// Random splats queued when the simulation starts.
    pub initial_splats: u32,
    pub paused: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sim_resolution: 128,
            dye_resolution: 1024,
            velocity_dissipation: 0.9,
            dye_dissipation: 0.6,
            pressure: 0.8,
            pressure_iterations: 20,
            curl: 30.0,
            splat_radius: 0.25,
            splat_force: 6000.0,
            max_dt: 1.0 / 60.0,
            initial_splats: 0,
            paused: false,
        }
    }
}

impl SimulationConfig {
    pub fn clamp_dt(&self, dt: f32) -> f32 {
        crate::timeline::clamp_dt(dt, self.max_dt)
    }
}

/// Parameters of the final dye-to-surface pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositorStyle {
    pub blend: BlendMode,
    pub tint: [f32; 3],
    /// Blend between dye luminance (0) and dye colour (1) before tinting.
    pub saturation: f32,
    pub gain: f32,
    /// Scale applied to the brightest channel to derive alpha.
    pub alpha: f32,
    /// Upper bound on per-pixel alpha.
    pub clamp: f32,
}

impl CompositorStyle {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                blend: BlendMode::Premultiplied,
                tint: [1.0, 1.0, 1.0],
                saturation: 1.0,
                gain: 1.6,
                alpha: 1.0,
                clamp: 0.85,
            },
            Theme::Light => Self {
                blend: BlendMode::Alpha,
                tint: [0.22, 0.23, 0.26],
                saturation: 0.15,
                gain: 0.7,
                alpha: 1.4,
                clamp: 0.55,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gating_requires_desktop_without_reduced_motion() {
        let mut signals = HostSignals::new(Theme::Dark, (800, 600));
        assert!(signals.simulation_allowed());
        signals.reduced_motion = true;
        assert!(!signals.simulation_allowed());
        signals.reduced_motion = false;
        signals.device = DeviceClass::TouchOnly;
        assert!(!signals.simulation_allowed());
    }

    #[test]
    fn channels_widen_to_rgba() {
        assert_eq!(Channels::R.widen(), Some(Channels::Rg));
        assert_eq!(Channels::Rg.widen(), Some(Channels::Rgba));
        assert_eq!(Channels::Rgba.widen(), None);
    }

    #[test]
    fn premultiplied_blend_keeps_destination_under_transparent_source() {
        let dst = [0.2, 0.4, 0.6, 1.0];
        let out = BlendMode::Premultiplied.apply([0.0; 4], dst);
        assert_eq!(out, dst);
    }

    #[test]
    fn light_theme_clamps_tighter_than_dark() {
        let dark = CompositorStyle::for_theme(Theme::Dark);
        let light = CompositorStyle::for_theme(Theme::Light);
        assert!(light.clamp < dark.clamp);
        assert!(light.gain < dark.gain);
        assert!(light.alpha > dark.alpha);
    }
}
