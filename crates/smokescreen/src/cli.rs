use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fluid::software::MAX_TEXTURE_DIMENSION;
use fluid::Theme;

#[derive(Parser, Debug)]
#[command(
    name = "smokescreen",
    author,
    version,
    about = "Decorative real-time fluid layer",
    arg_required_else_help = false
)]
pub struct Cli {
    /// Configuration file; defaults to `config.toml` in the config directory.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Overrides shared by the preview window and headless snapshots.
#[derive(Parser, Debug, Default, Clone)]
pub struct RunArgs {
    /// Page theme: `dark` or `light`.
    #[arg(long, value_name = "THEME", value_parser = parse_theme)]
    pub theme: Option<Theme>,

    /// Window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Behave as if the user asked for reduced motion (nothing is drawn).
    #[arg(long)]
    pub reduced_motion: bool,

    /// Behave as a touch-only device (nothing is drawn).
    #[arg(long)]
    pub touch_only: bool,

    /// Start with the simulation paused; splats still land.
    #[arg(long)]
    pub paused: bool,

    /// Velocity grid resolution along the shorter side.
    #[arg(long, value_name = "TEXELS")]
    pub sim_resolution: Option<u32>,

    /// Dye grid resolution along the shorter side.
    #[arg(long, value_name = "TEXELS")]
    pub dye_resolution: Option<u32>,

    /// Seed for splat colours and random splats.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a scripted drag headlessly and write the final frame as PNG.
    Snapshot(SnapshotArgs),
    /// Inspect the configuration file.
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
pub struct SnapshotArgs {
    /// Destination PNG.
    #[arg(long, short, value_name = "FILE.png", value_parser = parse_png_path)]
    pub output: PathBuf,

    /// Frames to simulate before capturing.
    #[arg(long, value_name = "N", default_value_t = 30)]
    pub frames: u32,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the configuration file path that would be loaded.
    Where,
    /// Print the effective configuration as TOML.
    Dump,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_theme(value: &str) -> Result<Theme, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("theme must not be empty".to_string());
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "dark" => Ok(Theme::Dark),
        "light" => Ok(Theme::Light),
        other => Err(format!("unknown theme '{other}'; expected dark or light")),
    }
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT, e.g. 1280x720".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid width in size".to_string())?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid height in size".to_string())?;
    if width == 0 || height == 0 {
        return Err("size must be greater than zero".into());
    }
    if width > MAX_TEXTURE_DIMENSION || height > MAX_TEXTURE_DIMENSION {
        return Err(format!(
            "size must be at most {MAX_TEXTURE_DIMENSION} on each side"
        ));
    }
    Ok((width, height))
}

pub fn parse_png_path(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => Ok(path),
        None => Err("output path has no extension; expected .png".to_string()),
        Some(other) => Err(format!("unsupported output format '.{other}'; expected .png")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_size(" 64X32 "), Ok((64, 32)));
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("wide").is_err());
    }

    #[test]
    fn oversized_sizes_are_rejected() {
        assert_eq!(parse_size("16384x16384"), Ok((16_384, 16_384)));
        let err = parse_size("65536x65537").expect_err("too large");
        assert!(err.contains("at most 16384"));
        assert!(Cli::try_parse_from(["smokescreen", "--size", "20000x10"]).is_err());
    }

    #[test]
    fn parses_themes_case_insensitively() {
        assert_eq!(parse_theme("Light"), Ok(Theme::Light));
        assert_eq!(parse_theme("dark"), Ok(Theme::Dark));
        assert!(parse_theme("sepia").is_err());
    }

    #[test]
    fn snapshot_requires_png() {
        assert!(parse_png_path("frame.png").is_ok());
        assert!(parse_png_path("frame.PNG").is_ok());
        assert!(parse_png_path("frame.jpg").is_err());
        assert!(parse_png_path("frame").is_err());
    }

    #[test]
    fn subcommands_accept_global_config() {
        let cli = Cli::try_parse_from([
            "smokescreen",
            "snapshot",
            "--output",
            "out.png",
            "--frames",
            "4",
            "--config",
            "alt.toml",
        ])
        .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        match cli.command {
            Some(Command::Snapshot(args)) => assert_eq!(args.frames, 4),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
