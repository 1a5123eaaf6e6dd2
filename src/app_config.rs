//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use flashfetch_core::download::{
    DownloadConfig, MAX_BUFFER_CAPACITY, MIN_BUFFER_CAPACITY, SpaceCheck,
};

/// Upper bound for millisecond timeouts and backoff (10 minutes).
const MAX_MILLIS: u64 = 600_000;

/// File configuration for download defaults. Unset keys keep built-in values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Maximum attempts, including the first.
    pub max_retries: Option<u32>,
    /// Slow-download warning threshold in bytes per second.
    pub min_speed_bps: Option<u64>,
    /// Read timeout in milliseconds.
    pub read_timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Backoff before the first retry in milliseconds.
    pub backoff_base_ms: Option<u64>,
    /// RAM staging buffer size in bytes.
    pub buffer_capacity: Option<usize>,
    /// Redirect hops to follow.
    pub max_redirects: Option<usize>,
    /// Free-space refresh cadence.
    pub space_check: Option<SpaceCheck>,
    /// Emulated partition size in bytes.
    pub partition_size: Option<u64>,
    /// Extra PEM trust anchors for TLS.
    pub ca_bundle: Option<PathBuf>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(max_retries) = self.max_retries
            && !(1..=100).contains(&max_retries)
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 1..=100");
        }

        if let Some(buffer_capacity) = self.buffer_capacity
            && !(MIN_BUFFER_CAPACITY..=MAX_BUFFER_CAPACITY).contains(&buffer_capacity)
        {
            bail!(
                "Invalid config value for `buffer_capacity`: {buffer_capacity}. Expected range: {MIN_BUFFER_CAPACITY}..={MAX_BUFFER_CAPACITY}"
            );
        }

        if let Some(max_redirects) = self.max_redirects
            && max_redirects > 50
        {
            bail!("Invalid config value for `max_redirects`: {max_redirects}. Expected range: 0..=50");
        }

        if self.partition_size == Some(0) {
            bail!("Invalid config value for `partition_size`: 0. Expected a positive size");
        }

        validate_millis("read_timeout_ms", self.read_timeout_ms, 1)?;
        validate_millis("connect_timeout_ms", self.connect_timeout_ms, 1)?;
        validate_millis("backoff_base_ms", self.backoff_base_ms, 0)?;

        Ok(())
    }

    /// Overlays the values set in this file onto `config`.
    #[must_use]
    pub fn apply(&self, mut config: DownloadConfig) -> DownloadConfig {
        if let Some(value) = self.max_retries {
            config.max_retries = value;
        }
        if let Some(value) = self.min_speed_bps {
            config.min_speed_bps = value;
        }
        if let Some(value) = self.read_timeout_ms {
            config.read_timeout = Duration::from_millis(value);
        }
        if let Some(value) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(value);
        }
        if let Some(value) = self.backoff_base_ms {
            config.backoff_base = Duration::from_millis(value);
        }
        if let Some(value) = self.buffer_capacity {
            config.buffer_capacity = value;
        }
        if let Some(value) = self.max_redirects {
            config.max_redirects = value;
        }
        if let Some(value) = self.space_check {
            config.space_check = value;
        }
        if let Some(path) = &self.ca_bundle {
            config.ca_bundle = Some(path.clone());
        }
        config
    }
}

fn validate_millis(field: &str, value: Option<u64>, min: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=MAX_MILLIS).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={MAX_MILLIS}");
    }
    Ok(())
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
/// 1. `$XDG_CONFIG_HOME/flashfetch/config.toml`
/// 2. `$HOME/.config/flashfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("flashfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("flashfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit` if given, otherwise from the default path if
/// a file exists there.
///
/// An explicit path that does not exist is an error; a missing default file
/// is not.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
            loaded_from_file: true,
        });
    }

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
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "max_retries" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("max_retries out of range for u32"))?;
                cfg.max_retries = Some(n);
            }
            "min_speed_bps" => {
                cfg.min_speed_bps = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "read_timeout_ms" => {
                cfg.read_timeout_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "connect_timeout_ms" => {
                cfg.connect_timeout_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "backoff_base_ms" => {
                cfg.backoff_base_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "buffer_capacity" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = usize::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("buffer_capacity out of range for usize"))?;
                cfg.buffer_capacity = Some(n);
            }
            "max_redirects" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = usize::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("max_redirects out of range for usize"))?;
                cfg.max_redirects = Some(n);
            }
            "space_check" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.space_check = Some(parse_space_check(&parsed).with_context(|| {
                    format!("Invalid `space_check` value '{parsed}' on line {line_no}")
                })?);
            }
            "partition_size" => {
                cfg.partition_size = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "ca_bundle" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.ca_bundle = Some(PathBuf::from(parsed));
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

fn parse_space_check(value: &str) -> Result<SpaceCheck> {
    match value {
        "per_chunk" => Ok(SpaceCheck::PerChunk),
        "per_flush" => Ok(SpaceCheck::PerFlush),
        _ => bail!("Expected one of: per_chunk, per_flush"),
    }
}
