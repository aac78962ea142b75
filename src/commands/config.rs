//! Config command handlers: show effective configuration.

use crate::app::config_runtime::Settings;
use crate::app_config::LoadedConfig;

pub fn run_config_show_command(loaded_config: &LoadedConfig, settings: &Settings) {
    let resolved_path = loaded_config.path.as_ref().map_or_else(
        || "<unresolved>".to_string(),
        |path| path.display().to_string(),
    );
    println!("config_path = {resolved_path}");
    println!(
        "config_file = {}",
        if loaded_config.loaded_from_file {
            "loaded"
        } else {
            "not found (using defaults)"
        }
    );
    println!("output_dir = {}", settings.output_dir.display());
    println!("state_file = {}", settings.state_file.display());
    println!("hash_cache_file = {}", settings.hash_cache_file.display());
    println!(
        "catalog = {}",
        settings
            .catalog_path
            .as_ref()
            .map_or_else(|| "<bundled>".to_string(), |path| path.display().to_string())
    );
    println!("concurrency = {}", settings.concurrency);
    println!("min_delay_ms = {}", settings.min_delay.as_millis());
    println!("max_delay_ms = {}", settings.max_delay.as_millis());
    println!("max_retries = {}", settings.max_retries);
    println!("timeout_secs = {}", settings.timeout.as_secs());
    for (key, value) in [
        ("gofast_token", &settings.gofast_token),
        ("cda_session_id", &settings.cda_session_id),
        ("cda_csrf_token", &settings.cda_csrf_token),
        ("tt_access_token", &settings.tt_access_token),
        ("tt_user_id", &settings.tt_user_id),
    ] {
        println!("{key} = {}", if value.is_some() { "<set>" } else { "<not set>" });
    }
    println!("verbosity = {}", settings.verbosity);
}
