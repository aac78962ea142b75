//! File configuration for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Flat `key = value` file configuration.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    /// Default destination root for downloads.
    pub output_dir: Option<PathBuf>,
    /// Ledger file.
    pub state_file: Option<PathBuf>,
    /// Hash cache file.
    pub hash_cache_file: Option<PathBuf>,
    /// Catalog document replacing the bundled one.
    pub catalog_path: Option<PathBuf>,
    /// Default concurrency (same range as CLI).
    pub concurrency: Option<u8>,
    /// Default minimum pacing delay in milliseconds.
    pub min_delay_ms: Option<u64>,
    /// Default maximum pacing delay in milliseconds.
    pub max_delay_ms: Option<u64>,
    /// Default total attempts per setup.
    pub max_retries: Option<u8>,
    /// HTTP request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// GoFast API token.
    pub gofast_token: Option<String>,
    /// CDA `PHPSESSID` cookie value.
    pub cda_session_id: Option<String>,
    /// CDA CSRF token.
    pub cda_csrf_token: Option<String>,
    /// Track Titan access token.
    pub tt_access_token: Option<String>,
    /// Track Titan user id.
    pub tt_user_id: Option<String>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=20).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=20");
        }
        validate_delay_ms("min_delay_ms", self.min_delay_ms)?;
        validate_delay_ms("max_delay_ms", self.max_delay_ms)?;
        if let (Some(min), Some(max)) = (self.min_delay_ms, self.max_delay_ms)
            && min > max
        {
            bail!("Invalid config: `min_delay_ms` ({min}) exceeds `max_delay_ms` ({max})");
        }
        if let Some(retries) = self.max_retries
            && !(1..=10).contains(&retries)
        {
            bail!("Invalid config value for `max_retries`: {retries}. Expected range: 1..=10");
        }
        if let Some(timeout) = self.timeout_secs
            && !(1..=3600).contains(&timeout)
        {
            bail!("Invalid config value for `timeout_secs`: {timeout}. Expected range: 1..=3600");
        }
        Ok(())
    }
}

fn validate_delay_ms(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if value > 60_000 {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 0..=60000");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Verbose => "verbose",
            Self::Quiet => "quiet",
            Self::Debug => "debug",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/setup-downloader/config.toml`
/// 2. `$HOME/.config/setup-downloader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("setup-downloader")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("setup-downloader")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref() else {
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    };

    if !path_ref.exists() {
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    }

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        config: Some(config),
        loaded_from_file: true,
    })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(parse_string_literal(value).with_context(context)?));
            }
            "state_file" => {
                cfg.state_file = Some(PathBuf::from(parse_string_literal(value).with_context(context)?));
            }
            "hash_cache_file" => {
                cfg.hash_cache_file =
                    Some(PathBuf::from(parse_string_literal(value).with_context(context)?));
            }
            "catalog_path" => {
                cfg.catalog_path = Some(PathBuf::from(parse_string_literal(value).with_context(context)?));
            }
            "concurrency" => {
                cfg.concurrency = Some(parse_integer_u8(value).with_context(context)?);
            }
            "min_delay_ms" => {
                cfg.min_delay_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "max_delay_ms" => {
                cfg.max_delay_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "max_retries" => {
                cfg.max_retries = Some(parse_integer_u8(value).with_context(context)?);
            }
            "timeout_secs" => {
                cfg.timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "gofast_token" => {
                cfg.gofast_token = Some(parse_string_literal(value).with_context(context)?);
            }
            "cda_session_id" => {
                cfg.cda_session_id = Some(parse_string_literal(value).with_context(context)?);
            }
            "cda_csrf_token" => {
                cfg.cda_csrf_token = Some(parse_string_literal(value).with_context(context)?);
            }
            "tt_access_token" => {
                cfg.tt_access_token = Some(parse_string_literal(value).with_context(context)?);
            }
            "tt_user_id" => {
                cfg.tt_user_id = Some(parse_string_literal(value).with_context(context)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}
