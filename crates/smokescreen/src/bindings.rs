//! Maps the configuration file and CLI overrides onto `fluid` types.

use fluid::{
    BlendMode, CompositorStyle, DeviceClass, FluidOptions, HostSignals, SimulationConfig, Theme,
    ThemeStyles,
};
use fluidconfig::{
    BlendSetting, DeviceSetting, FluidConfig, SimulationSection, StyleOverride, ThemeSetting,
};

use crate::cli::RunArgs;

pub fn map_theme(setting: ThemeSetting) -> Theme {
    match setting {
        ThemeSetting::Dark => Theme::Dark,
        ThemeSetting::Light => Theme::Light,
    }
}

fn theme_setting(theme: Theme) -> ThemeSetting {
    match theme {
        Theme::Dark => ThemeSetting::Dark,
        Theme::Light => ThemeSetting::Light,
    }
}

fn map_blend(setting: BlendSetting) -> BlendMode {
    match setting {
        BlendSetting::Premultiplied => BlendMode::Premultiplied,
        BlendSetting::Alpha => BlendMode::Alpha,
    }
}

/// Folds command-line flags into the loaded file; flags win.
pub fn apply_overrides(config: &mut FluidConfig, args: &RunArgs) {
    if let Some(theme) = args.theme {
        config.theme = theme_setting(theme);
    }
    if args.reduced_motion {
        config.host.reduced_motion = true;
    }
    if args.touch_only {
        config.host.device = DeviceSetting::Touch;
    }
    if args.paused {
        config.simulation.paused = true;
    }
    if let Some(resolution) = args.sim_resolution {
        config.simulation.sim_resolution = resolution;
    }
    if let Some(resolution) = args.dye_resolution {
        config.simulation.dye_resolution = resolution;
    }
}

pub fn simulation_config(section: &SimulationSection) -> SimulationConfig {
    SimulationConfig {
        sim_resolution: section.sim_resolution,
        dye_resolution: section.dye_resolution,
        velocity_dissipation: section.velocity_dissipation,
        dye_dissipation: section.dye_dissipation,
        pressure: section.pressure,
        pressure_iterations: section.pressure_iterations,
        curl: section.curl,
        splat_radius: section.splat_radius,
        splat_force: section.splat_force,
        max_dt: section.max_frame_time.as_secs_f32(),
        initial_splats: section.initial_splats,
        paused: section.paused,
    }
}

fn apply_style(base: CompositorStyle, style: Option<&StyleOverride>) -> CompositorStyle {
    let Some(style) = style else {
        return base;
    };
    CompositorStyle {
        blend: style.blend.map(map_blend).unwrap_or(base.blend),
        tint: style.tint.unwrap_or(base.tint),
        saturation: style.saturation.unwrap_or(base.saturation),
        gain: style.gain.unwrap_or(base.gain),
        alpha: style.alpha.unwrap_or(base.alpha),
        clamp: style.clamp.unwrap_or(base.clamp),
    }
}

pub fn theme_styles(config: &FluidConfig) -> ThemeStyles {
    let defaults = ThemeStyles::default();
    ThemeStyles {
        dark: apply_style(defaults.dark, config.style_override(ThemeSetting::Dark)),
        light: apply_style(defaults.light, config.style_override(ThemeSetting::Light)),
    }
}

pub fn host_signals(config: &FluidConfig, viewport: (u32, u32)) -> HostSignals {
    HostSignals {
        theme: map_theme(config.theme),
        device: match config.host.device {
            DeviceSetting::Desktop => DeviceClass::DesktopPointer,
            DeviceSetting::Touch => DeviceClass::TouchOnly,
        },
        reduced_motion: config.host.reduced_motion,
        viewport,
    }
}

pub fn fluid_options(config: &FluidConfig, seed: Option<u64>) -> FluidOptions {
    FluidOptions {
        config: simulation_config(&config.simulation),
        styles: theme_styles(config),
        seed,
    }
}
