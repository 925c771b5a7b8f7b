//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/archives.sqlite"
//!
//! [import]
//! workers = 4
//! reimport = false
//! force_delete = false
//! artifacts_dir = "./data/appfiles"
//! exclude_globs = ["**/drafts/**"]
//!
//! [search]
//! provider = "elasticsearch"
//! url = "http://localhost:9200"
//! index_name = "archives"
//!
//! [services.FRAD054]
//! name = "AD 54"
//! title = "Archives départementales de Meurthe-et-Moselle"
//!
//! [[digitized.provider_rules]]
//! provider_prefix = "FRAD054"
//! pattern = '/series/(?P<series>[^/]+)/'
//! template = "https://viewer.example/?cote={series}"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde::Deserialize;

use crate::dao::ProviderRule;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,
    #[serde(default)]
    pub digitized: DigitizedConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    /// Worker count; defaults to available parallelism minus one.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub reimport: bool,
    #[serde(default)]
    pub force_delete: bool,
    /// Run every file on the calling task instead of a worker pool.
    #[serde(default)]
    pub synchronous: bool,
    /// Where cleaned XML is republished. Unset means no artifacts.
    #[serde(default)]
    pub artifacts_dir: Option<PathBuf>,
    #[serde(default = "default_authority_grouping")]
    pub authority_grouping: String,
    /// Globs, relative to a directory argument, skipped while expanding it.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            workers: None,
            reimport: false,
            force_delete: false,
            synchronous: false,
            artifacts_dir: None,
            authority_grouping: default_authority_grouping(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_authority_grouping() -> String {
    "service/normalize".to_string()
}

impl ImportConfig {
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(default_workers).max(1)
    }

    /// Directory-expansion excludes: VCS folders plus `exclude_globs`.
    pub fn exclude_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        builder.add(Glob::new("**/.git/**")?);
        for pattern in &self.exclude_globs {
            builder.add(
                Glob::new(pattern)
                    .with_context(|| format!("invalid import.exclude_globs entry '{}'", pattern))?,
            );
        }
        Ok(builder.build()?)
    }
}

/// Available parallelism minus one, never below one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default = "default_search_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            url: None,
            index_name: default_index_name(),
            batch_size: default_search_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SearchConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_search_provider() -> String {
    "disabled".to_string()
}
fn default_index_name() -> String {
    "archives".to_string()
}
fn default_search_batch_size() -> usize {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DigitizedConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
    #[serde(default = "default_illustration_roles")]
    pub illustration_roles: Vec<String>,
    #[serde(default)]
    pub group_roles: GroupRoles,
    #[serde(default)]
    pub provider_rules: Vec<ProviderRuleConfig>,
}

impl Default for DigitizedConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
            illustration_roles: default_illustration_roles(),
            group_roles: GroupRoles::default(),
            provider_rules: Vec::new(),
        }
    }
}

fn default_image_extensions() -> Vec<String> {
    [".jpg", ".jpeg", ".png", ".jp2"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_illustration_roles() -> Vec<String> {
    vec!["image".to_string(), "thumbnail".to_string()]
}

/// Role names of the parts of a legacy `daogrp` image sequence.
#[derive(Debug, Deserialize, Clone)]
pub struct GroupRoles {
    pub folder: String,
    pub prefix: String,
    pub extension: String,
    pub first: String,
    pub last: String,
}

impl Default for GroupRoles {
    fn default() -> Self {
        Self {
            folder: "dossier".to_string(),
            prefix: "prefixe".to_string(),
            extension: "extension".to_string(),
            first: "premier".to_string(),
            last: "dernier".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderRuleConfig {
    pub provider_prefix: String,
    pub pattern: String,
    pub template: String,
}

impl DigitizedConfig {
    /// Compile the provider rules.
    pub fn compile_rules(&self) -> Result<Vec<ProviderRule>> {
        self.provider_rules
            .iter()
            .map(|rule| {
                let pattern = Regex::new(&rule.pattern).with_context(|| {
                    format!(
                        "invalid pattern for provider rule '{}'",
                        rule.provider_prefix
                    )
                })?;
                Ok(ProviderRule {
                    provider_prefix: rule.provider_prefix.clone(),
                    pattern,
                    template: rule.template.clone(),
                })
            })
            .collect()
    }
}

impl Config {
    /// Configuration with defaults everywhere except the database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Config {
            db: DbConfig { path: path.into() },
            import: ImportConfig::default(),
            search: SearchConfig::default(),
            services: HashMap::new(),
            digitized: DigitizedConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.import.workers == Some(0) {
        bail!("import.workers must be >= 1");
    }

    match config.import.authority_grouping.as_str() {
        "service/normalize" | "global/normalize" | "service/strict" => {}
        other => bail!(
            "Unknown import.authority_grouping: '{}'. Must be service/normalize, global/normalize, or service/strict.",
            other
        ),
    }

    match config.search.provider.as_str() {
        "disabled" => {}
        "elasticsearch" => {
            if config.search.url.is_none() {
                bail!("search.url must be set when provider is 'elasticsearch'");
            }
        }
        other => bail!(
            "Unknown search provider: '{}'. Must be disabled or elasticsearch.",
            other
        ),
    }

    if config.search.batch_size == 0 {
        bail!("search.batch_size must be > 0");
    }

    for code in config.services.keys() {
        if code.trim().is_empty() || code.contains('_') {
            bail!("service code '{}' must be non-empty and contain no underscore", code);
        }
    }

    // compile once to surface bad patterns at load time
    config.import.exclude_set()?;
    config.digitized.compile_rules()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse_config("[db]\npath = \"/tmp/a.sqlite\"\n").unwrap();
        assert!(!cfg.search.is_enabled());
        assert_eq!(cfg.search.batch_size, 30);
        assert_eq!(cfg.search.max_retries, 3);
        assert_eq!(cfg.import.authority_grouping, "service/normalize");
        assert!(cfg.import.effective_workers() >= 1);
        assert_eq!(cfg.digitized.group_roles.first, "premier");
        assert!(cfg.digitized.image_extensions.contains(&".jp2".to_string()));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_config("[db]\npath = \"a\"\n[import]\nworkers = 0\n").is_err());
        assert!(parse_config("[db]\npath = \"a\"\n[search]\nprovider = \"solr\"\n").is_err());
        assert!(parse_config("[db]\npath = \"a\"\n[search]\nprovider = \"elasticsearch\"\n").is_err());
        assert!(parse_config("[db]\npath = \"a\"\n[services.FR_AD]\nname = \"x\"\n").is_err());
        assert!(parse_config("[db]\npath = \"a\"\n[import]\nexclude_globs = [\"a[\"]\n").is_err());
        let bad_rule = r#"
[db]
path = "a"
[[digitized.provider_rules]]
provider_prefix = "FRAD054"
pattern = "(unclosed"
template = "x"
"#;
        assert!(parse_config(bad_rule).is_err());
    }

    #[test]
    fn services_and_rules_parse() {
        let cfg = parse_config(
            r#"
[db]
path = "a.sqlite"

[services.FRAD054]
name = "AD 54"
level = "level-D"

[[digitized.provider_rules]]
provider_prefix = "FRAD054"
pattern = '/series/(?P<series>[^/]+)/'
template = "https://viewer.example/?cote={series}"
"#,
        )
        .unwrap();
        assert_eq!(cfg.services["FRAD054"].name.as_deref(), Some("AD 54"));
        let rules = cfg.digitized.compile_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].provider_prefix, "FRAD054");
    }
}
