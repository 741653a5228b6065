use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::broker::DEFAULT_BROKER_BINARY;

const MIN_PAGE_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub source: Option<String>,
    pub shell: String,
    pub broker_binary: String,
    pub region: Option<String>,
    pub page_size: usize,
    pub log_filter: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            source: None,
            shell: default_shell(),
            broker_binary: DEFAULT_BROKER_BINARY.to_string(),
            region: None,
            page_size: default_page_size(),
            log_filter: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default, alias = "command")]
    shell: Option<String>,
    #[serde(default, alias = "broker", alias = "plugin")]
    broker_binary: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    page_size: Option<usize>,
    #[serde(default)]
    log_filter: Option<String>,
}

impl RuntimeConfig {
    pub fn discover() -> Result<Self> {
        match discover_config_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::parse(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.source = Some(path.display().to_string());
        Ok(config)
    }

    fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let parsed: ConfigFile = serde_yaml::from_str(raw)?;
        let defaults = Self::default();

        Ok(Self {
            source: None,
            shell: non_empty(parsed.shell).unwrap_or(defaults.shell),
            broker_binary: non_empty(parsed.broker_binary).unwrap_or(defaults.broker_binary),
            region: non_empty(parsed.region),
            page_size: parsed
                .page_size
                .unwrap_or(defaults.page_size)
                .max(MIN_PAGE_SIZE),
            log_filter: non_empty(parsed.log_filter),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_page_size() -> usize {
    10
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("ECS_SHELL_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("ecs-shell.yaml"),
        PathBuf::from("ecs-shell.yml"),
        PathBuf::from(".ecs-shell.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/ecs-shell/config.yaml"),
            PathBuf::from(&home).join(".config/ecs-shell/config.yml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}
