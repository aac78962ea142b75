//! Effective settings: CLI flag > environment > config file > built-in default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use setup_downloader_core::download::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, DEFAULT_MIN_DELAY,
};

use crate::app_config::{FileConfig, VerbositySetting};
use crate::cli::{Cli, DownloadArgs, ProviderName};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const STATE_DIR_NAME: &str = ".setup-downloader";
const STATE_FILE_NAME: &str = "state.json";
const HASH_CACHE_FILE_NAME: &str = "hash_cache.json";

/// Environment variables that override the config file.
#[derive(Debug, Clone, Default)]
pub(crate) struct EnvOverrides {
    pub(crate) home: Option<PathBuf>,
    pub(crate) gofast_token: Option<String>,
    pub(crate) gofast_endpoint: Option<String>,
    pub(crate) cda_session_id: Option<String>,
    pub(crate) cda_csrf_token: Option<String>,
    pub(crate) cda_endpoint: Option<String>,
    pub(crate) tt_access_token: Option<String>,
    pub(crate) tt_user_id: Option<String>,
    pub(crate) tt_endpoint: Option<String>,
    pub(crate) catalog_path: Option<PathBuf>,
}

impl EnvOverrides {
    pub(crate) fn from_env() -> Self {
        Self {
            home: non_empty_env("HOME").map(PathBuf::from),
            gofast_token: non_empty_env("GOFAST_TOKEN"),
            gofast_endpoint: non_empty_env("GOFAST_ENDPOINT"),
            cda_session_id: non_empty_env("CDA_SESSION_ID"),
            cda_csrf_token: non_empty_env("CDA_CSRF_TOKEN"),
            cda_endpoint: non_empty_env("CDA_ENDPOINT"),
            tt_access_token: non_empty_env("TT_ACCESS_TOKEN"),
            tt_user_id: non_empty_env("TT_USER_ID"),
            tt_endpoint: non_empty_env("TT_ENDPOINT"),
            catalog_path: non_empty_env("SETUP_DOWNLOADER_CATALOG").map(PathBuf::from),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) output_dir: PathBuf,
    pub(crate) state_file: PathBuf,
    pub(crate) hash_cache_file: PathBuf,
    pub(crate) catalog_path: Option<PathBuf>,
    pub(crate) concurrency: usize,
    pub(crate) min_delay: Duration,
    pub(crate) max_delay: Duration,
    pub(crate) max_retries: u32,
    pub(crate) timeout: Duration,
    pub(crate) gofast_token: Option<String>,
    pub(crate) gofast_endpoint: Option<String>,
    pub(crate) cda_session_id: Option<String>,
    pub(crate) cda_csrf_token: Option<String>,
    pub(crate) cda_endpoint: Option<String>,
    pub(crate) tt_access_token: Option<String>,
    pub(crate) tt_user_id: Option<String>,
    pub(crate) tt_endpoint: Option<String>,
    pub(crate) verbosity: &'static str,
}

impl Settings {
    /// Applies download flags on top of the file/env settings.
    pub(crate) fn with_download_args(mut self, args: &DownloadArgs) -> Result<Self> {
        if let Some(output) = &args.output {
            self.output_dir.clone_from(output);
        }
        if let Some(token) = &args.token {
            self.set_credential(args.provider, token);
        }
        if let Some(concurrency) = args.concurrency {
            self.concurrency = usize::from(concurrency);
        }
        if let Some(ms) = args.min_delay {
            self.min_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = args.max_delay {
            self.max_delay = Duration::from_millis(ms);
        }
        if let Some(retries) = args.max_retries {
            self.max_retries = u32::from(retries);
        }
        self.validate()?;
        Ok(self)
    }

    /// Stores a `--token` value as the provider's primary credential.
    pub(crate) fn set_credential(&mut self, provider: ProviderName, token: &str) {
        let slot = match provider {
            ProviderName::Gofast => &mut self.gofast_token,
            ProviderName::Cda => &mut self.cda_session_id,
            ProviderName::Tracktitan => &mut self.tt_access_token,
        };
        *slot = Some(token.to_string());
    }

    fn validate(&self) -> Result<()> {
        if self.min_delay > self.max_delay {
            bail!(
                "Invalid effective delay range: min {}ms exceeds max {}ms",
                self.min_delay.as_millis(),
                self.max_delay.as_millis()
            );
        }
        Ok(())
    }
}

/// Resolves settings from the file config and environment.
pub(crate) fn resolve_settings(file: Option<&FileConfig>, env: &EnvOverrides) -> Result<Settings> {
    let home = env.home.clone().unwrap_or_else(|| PathBuf::from("."));
    let state_dir = home.join(STATE_DIR_NAME);
    let file = file.cloned().unwrap_or_default();

    let settings = Settings {
        output_dir: file
            .output_dir
            .map_or_else(|| default_output_dir(&home), |dir| expand_home(&dir, &home)),
        state_file: file
            .state_file
            .map_or_else(|| state_dir.join(STATE_FILE_NAME), |path| expand_home(&path, &home)),
        hash_cache_file: file.hash_cache_file.map_or_else(
            || state_dir.join(HASH_CACHE_FILE_NAME),
            |path| expand_home(&path, &home),
        ),
        catalog_path: env
            .catalog_path
            .clone()
            .or(file.catalog_path.map(|path| expand_home(&path, &home))),
        concurrency: file.concurrency.map_or(DEFAULT_CONCURRENCY, usize::from),
        min_delay: file
            .min_delay_ms
            .map_or(DEFAULT_MIN_DELAY, Duration::from_millis),
        max_delay: file
            .max_delay_ms
            .map_or(DEFAULT_MAX_DELAY, Duration::from_millis),
        max_retries: file.max_retries.map_or(DEFAULT_MAX_RETRIES, u32::from),
        timeout: Duration::from_secs(file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        gofast_token: env.gofast_token.clone().or(file.gofast_token),
        gofast_endpoint: env.gofast_endpoint.clone(),
        cda_session_id: env.cda_session_id.clone().or(file.cda_session_id),
        cda_csrf_token: env.cda_csrf_token.clone().or(file.cda_csrf_token),
        cda_endpoint: env.cda_endpoint.clone(),
        tt_access_token: env.tt_access_token.clone().or(file.tt_access_token),
        tt_user_id: env.tt_user_id.clone().or(file.tt_user_id),
        tt_endpoint: env.tt_endpoint.clone(),
        verbosity: file.verbosity.unwrap_or(VerbositySetting::Default).as_str(),
    };
    settings.validate()?;
    Ok(settings)
}

fn default_output_dir(home: &Path) -> PathBuf {
    home.join("Documents").join("iRacing").join("setups")
}

fn expand_home(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Log level from flags, falling back to the config file's verbosity.
pub(crate) fn resolve_default_log_level(cli: &Cli, file: Option<&FileConfig>) -> &'static str {
    if cli.quiet {
        return "error";
    }
    match cli.verbose {
        0 => {}
        1 => return "debug",
        _ => return "trace",
    }
    match file.and_then(|f| f.verbosity) {
        Some(VerbositySetting::Quiet) => "error",
        Some(VerbositySetting::Verbose) => "debug",
        Some(VerbositySetting::Debug) => "trace",
        Some(VerbositySetting::Default) | None => "info",
    }
}

/// An explicit verbosity flag beats `RUST_LOG`.
pub(crate) fn should_force_cli_log_level(cli: &Cli) -> bool {
    cli.verbose > 0 || cli.quiet
}
