//! Config file loading for CLI defaults.
//!
//! The file is a flat `key = value` list (strings in double quotes,
//! integers, `true`/`false`, `#` comments). Command-line flags win over
//! file values.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// File-backed defaults. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub database: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
    pub library_dir: Option<PathBuf>,
    pub bypass_url: Option<String>,
    pub mirror_base_url: Option<String>,
    pub mirror_count: Option<u32>,
    pub max_retries: Option<u32>,
    pub quota_max_retries: Option<u32>,
    pub attempt_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub move_to_final: Option<bool>,
    pub move_to_indexer: Option<bool>,
    pub indexer_dir: Option<PathBuf>,
    pub indexer_use_category_subdir: Option<bool>,
    pub delete_temp: Option<bool>,
}

impl FileConfig {
    /// Range-checks numeric values.
    pub fn validate(&self) -> Result<()> {
        validate_range("mirror_count", self.mirror_count.map(u64::from), 1, 10)?;
        validate_range("max_retries", self.max_retries.map(u64::from), 0, 10)?;
        validate_range(
            "quota_max_retries",
            self.quota_max_retries.map(u64::from),
            1,
            168,
        )?;
        validate_range("attempt_timeout_secs", self.attempt_timeout_secs, 1, 3600)?;
        validate_range("connect_timeout_secs", self.connect_timeout_secs, 1, 3600)?;
        validate_range("read_timeout_secs", self.read_timeout_secs, 1, 3600)?;
        Ok(())
    }
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Loaded config and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub path: Option<PathBuf>,
    pub config: Option<FileConfig>,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bookfetch/config.toml`
/// 2. `$HOME/.config/bookfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("bookfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("bookfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads `explicit` if given (it must exist), else the default path if present.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(default_path) if default_path.exists() => {
            let config = load_file_config(default_path)?;
            Ok(LoadedConfig {
                path,
                config: Some(config),
            })
        }
        _ => Ok(LoadedConfig { path, config: None }),
    }
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
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "database" => cfg.database = Some(parse_path(value).with_context(context)?),
            "download_dir" => cfg.download_dir = Some(parse_path(value).with_context(context)?),
            "library_dir" => cfg.library_dir = Some(parse_path(value).with_context(context)?),
            "indexer_dir" => cfg.indexer_dir = Some(parse_path(value).with_context(context)?),
            "bypass_url" => {
                cfg.bypass_url = Some(parse_string_literal(value).with_context(context)?);
            }
            "mirror_base_url" => {
                cfg.mirror_base_url = Some(parse_string_literal(value).with_context(context)?);
            }
            "mirror_count" => cfg.mirror_count = Some(parse_integer_u32(value).with_context(context)?),
            "max_retries" => cfg.max_retries = Some(parse_integer_u32(value).with_context(context)?),
            "quota_max_retries" => {
                cfg.quota_max_retries = Some(parse_integer_u32(value).with_context(context)?);
            }
            "attempt_timeout_secs" => {
                cfg.attempt_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "move_to_final" => cfg.move_to_final = Some(parse_boolean(value).with_context(context)?),
            "move_to_indexer" => {
                cfg.move_to_indexer = Some(parse_boolean(value).with_context(context)?);
            }
            "indexer_use_category_subdir" => {
                cfg.indexer_use_category_subdir =
                    Some(parse_boolean(value).with_context(context)?);
            }
            "delete_temp" => cfg.delete_temp = Some(parse_boolean(value).with_context(context)?),
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

fn parse_path(raw_value: &str) -> Result<PathBuf> {
    let value = parse_string_literal(raw_value)?;
    if value.is_empty() {
        bail!("Expected non-empty path");
    }
    Ok(PathBuf::from(value))
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

fn parse_integer_u32(raw_value: &str) -> Result<u32> {
    let value = parse_integer_u64(raw_value)?;
    u32::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u32"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
