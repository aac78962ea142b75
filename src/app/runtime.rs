use anyhow::Result;
use clap::Parser;
use tracing::debug;

use crate::ProcessExit;
use crate::app::{command_dispatcher, config_runtime, terminal};
use crate::app_config::load_default_file_config;
use crate::cli::Cli;

pub(crate) async fn run_setup_downloader() -> Result<ProcessExit> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();
    let loaded_config = load_default_file_config()?;

    let default_level = config_runtime::resolve_default_log_level(&cli, loaded_config.config.as_ref());
    let force_cli_log_level = config_runtime::should_force_cli_log_level(&cli);
    let caps = terminal::TerminalCaps::detect(cli.no_color);
    terminal::init_tracing(caps, default_level, force_cli_log_level);

    debug!(?cli, "CLI arguments parsed");
    if let Some(path) = &loaded_config.path {
        debug!(path = %path.display(), loaded = loaded_config.loaded_from_file, "config file");
    }

    let env = config_runtime::EnvOverrides::from_env();
    let settings = config_runtime::resolve_settings(loaded_config.config.as_ref(), &env)?;

    command_dispatcher::dispatch(cli, &loaded_config, settings, caps).await
}
