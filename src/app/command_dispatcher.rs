//! CLI command routing: runs the handler for the selected subcommand.

use anyhow::Result;

use crate::app::config_runtime::Settings;
use crate::app::context::RunContext;
use crate::app::terminal::TerminalCaps;
use crate::app_config::LoadedConfig;
use crate::cli::{Cli, Command, ConfigCommand};
use crate::{ProcessExit, commands};

/// Runs `cli.command` and returns the exit outcome.
pub(crate) async fn dispatch(
    cli: Cli,
    loaded_config: &LoadedConfig,
    settings: Settings,
    caps: TerminalCaps,
) -> Result<ProcessExit> {
    if let Command::Config {
        command: ConfigCommand::Show,
    } = &cli.command
    {
        commands::run_config_show_command(loaded_config, &settings);
        return Ok(ProcessExit::Success);
    }

    let ctx = RunContext::build(settings, cli.quiet, caps.interactive && !cli.quiet)?;
    match cli.command {
        Command::Download(args) => commands::run_download_command(&ctx, &args).await,
        Command::List(args) => commands::run_list_command(&ctx, &args).await,
        Command::Organize(args) => commands::run_organize_command(&ctx, &args).await,
        Command::Resolve(args) => Ok(commands::run_resolve_command(&ctx, &args)),
        Command::Config { .. } => Ok(ProcessExit::Success),
    }
}
