use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fluid::{run_window, WindowOptions};
use fluidconfig::FluidConfig;
use tracing_subscriber::EnvFilter;

use crate::bindings::{apply_overrides, fluid_options, host_signals};
use crate::cli::RunArgs;
use crate::paths::AppPaths;

const DEFAULT_WINDOW_SIZE: (u32, u32) = (1280, 720);

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// The file that would be read: the explicit `--config` or the default location.
pub fn config_path(explicit: Option<&Path>, paths: &AppPaths) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| paths.config_file())
}

/// Loads the configuration. An explicit path must exist; a missing default
/// file yields the built-in defaults.
pub fn load_config(explicit: Option<&Path>, paths: &AppPaths) -> Result<FluidConfig> {
    let path = config_path(explicit, paths);
    if explicit.is_none() && !path.exists() {
        tracing::debug!(path = %path.display(), "no configuration file; using defaults");
        return Ok(FluidConfig::default());
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration at {}", path.display()))?;
    let config = FluidConfig::from_toml_str(&raw)
        .with_context(|| format!("failed to load configuration at {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// Loads the file, applies flags and re-validates the result.
pub fn resolve_config(explicit: Option<&Path>, args: &RunArgs) -> Result<FluidConfig> {
    let paths = AppPaths::discover()?;
    let mut config = load_config(explicit, &paths)?;
    apply_overrides(&mut config, args);
    config
        .validate()
        .context("command-line overrides produced an invalid configuration")?;
    Ok(config)
}

pub fn run(config_file: Option<&Path>, args: RunArgs) -> Result<()> {
    let config = resolve_config(config_file, &args)?;
    let size = args.size.unwrap_or(DEFAULT_WINDOW_SIZE);
    tracing::info!(
        width = size.0,
        height = size.1,
        theme = ?config.theme,
        "opening smokescreen preview"
    );
    run_window(WindowOptions {
        title: "smokescreen".to_string(),
        size,
        signals: host_signals(&config, size),
        fluid: fluid_options(&config, args.seed),
    })
}
