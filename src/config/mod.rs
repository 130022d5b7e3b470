use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub sources: Vec<String>,
    pub exclude: Vec<String>,
    pub budget_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    sources: Option<Vec<String>>,
    #[serde(default)]
    exclude: Option<Vec<String>>,
    #[serde(default)]
    budget_ms: Option<u64>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Yaml(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

#[derive(Debug)]
struct ConfigLayer {
    sources: Vec<String>,
    exclude: Option<Vec<String>>,
    budget_ms: Option<u64>,
}

/// Layers user, nearest-ancestor project, and repo configs, in that order.
/// Later layers override `exclude` and `budget_ms` wholesale; sources merge
/// with later layers replacing earlier entries for the same pattern.
pub fn load_effective_config(
    cwd: &Path,
    repo_config: Option<&Path>,
    user_config: Option<&Path>,
) -> Result<EffectiveConfig, ConfigError> {
    let mut merged = EffectiveConfig {
        sources: Vec::new(),
        exclude: Vec::new(),
        budget_ms: None,
    };

    if let Some(path) = user_config.filter(|path| path.exists()) {
        let cfg = load_config_layer(path)?;
        merge_layer(&mut merged, cfg);
    }

    if let Some(path) = find_nearest_project_config(cwd) {
        let cfg = load_config_layer(&path)?;
        merge_layer(&mut merged, cfg);
    }

    if let Some(path) = repo_config.filter(|path| path.exists()) {
        let cfg = load_config_layer(path)?;
        merge_layer(&mut merged, cfg);
    }

    Ok(merged)
}

pub fn find_nearest_project_config(start: &Path) -> Option<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(".weft.project.yml");
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn merge_layer(merged: &mut EffectiveConfig, layer: ConfigLayer) {
    merge_sources_dedup(&mut merged.sources, layer.sources);
    if let Some(exclude) = layer.exclude {
        merged.exclude = exclude;
    }
    if layer.budget_ms.is_some() {
        merged.budget_ms = layer.budget_ms;
    }
}

fn merge_sources_dedup(existing: &mut Vec<String>, incoming: Vec<String>) {
    let mut indices = HashMap::new();
    for (idx, source) in existing.iter().enumerate() {
        indices.insert(source.clone(), idx);
    }

    for source in incoming {
        if let Some(idx) = indices.get(&source).copied() {
            existing[idx] = source;
        } else {
            let idx = existing.len();
            indices.insert(source.clone(), idx);
            existing.push(source);
        }
    }
}

fn load_config_layer(path: &Path) -> Result<ConfigLayer, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_layer(&content)
}

fn parse_config_layer(content: &str) -> Result<ConfigLayer, ConfigError> {
    let raw: RawConfig = serde_yaml::from_str(content)?;
    Ok(ConfigLayer {
        sources: raw.sources.unwrap_or_default(),
        exclude: raw.exclude,
        budget_ms: raw.budget_ms,
    })
}

pub fn load_config_file(path: &Path) -> Result<EffectiveConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let layer = parse_config_layer(&content)?;
    Ok(EffectiveConfig {
        sources: layer.sources,
        exclude: layer.exclude.unwrap_or_default(),
        budget_ms: layer.budget_ms,
    })
}

pub fn default_repo_config_yaml() -> String {
    r#"sources:
  - extract/**/*.jsonl
exclude: []
"#
    .to_string()
}

pub fn expand_tilde(path: &str, home: &Path) -> PathBuf {
    if path == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(path)
}
