mod bindings;
mod cli;
mod paths;
mod run;
mod snapshot;

use std::path::Path;

use anyhow::{Context, Result};
use cli::{Command, ConfigAction, RunArgs};
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    let config_file = cli.config.as_deref();
    match cli.command {
        Some(Command::Snapshot(args)) => snapshot::run(config_file, args),
        Some(Command::Config(config_cmd)) => {
            handle_config_command(config_file, &cli.run, config_cmd.action)
        }
        None => run::run(config_file, cli.run),
    }
}

fn handle_config_command(
    config_file: Option<&Path>,
    args: &RunArgs,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Where => {
            let paths = AppPaths::discover()?;
            let path = run::config_path(config_file, &paths);
            println!("Config directory: {}", paths.config_dir().display());
            let status = if path.exists() { "" } else { " (not present)" };
            println!("Config file: {}{status}", path.display());
            Ok(())
        }
        ConfigAction::Dump => {
            let config = run::resolve_config(config_file, args)?;
            let rendered = config
                .to_toml_string()
                .context("failed to render configuration")?;
            print!("{rendered}");
            Ok(())
        }
    }
}
