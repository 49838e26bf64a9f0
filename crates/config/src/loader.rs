use std::path::{Path, PathBuf};

use {
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::BatchcastConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "batchcast.toml",
    "batchcast.yaml",
    "batchcast.yml",
    "batchcast.json",
];

/// Environment variable that supplies the bot token when the file leaves it empty.
pub const TOKEN_ENV_VAR: &str = "BOT_TOKEN";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<BatchcastConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./batchcast.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/batchcast/batchcast.{toml,yaml,yml,json}` (user-global)
///
/// Returns `BatchcastConfig::default()` if no config file is found.
pub fn discover_and_load() -> BatchcastConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    BatchcastConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/batchcast/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "batchcast").map(|d| d.config_dir().to_path_buf())
}

/// Fill gaps in the loaded config from the process environment.
pub fn apply_env_overrides(config: &mut BatchcastConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(
    config: &mut BatchcastConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if config.telegram.token.expose_secret().is_empty()
        && let Some(token) = lookup(TOKEN_ENV_VAR).filter(|t| !t.trim().is_empty())
    {
        debug!("using bot token from {TOKEN_ENV_VAR}");
        config.telegram.token = Secret::new(token.trim().to_string());
    }
}

fn parse_config(raw: &str, path: &Path) -> Result<BatchcastConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).context("invalid TOML config"),
        "yaml" | "yml" => serde_yaml::from_str(raw).context("invalid YAML config"),
        "json" => serde_json::from_str(raw).context("invalid JSON config"),
        _ => Err(Error::message(format!("unsupported config format: .{ext}"))),
    }
}
