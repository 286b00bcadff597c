use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::markers::DEFAULT_BANNER_TEMPLATE;

pub const DEFAULT_USER_AGENT: &str = "wikiflow/0.1";
pub const DEFAULT_ARTICLE_PATH: &str = "/wiki/$1";
pub const DEFAULT_MIN_SUMMARY_LENGTH: usize = 10;
pub const DEFAULT_SEARCH_LIMIT: usize = 500;
pub const DEFAULT_MAX_PARALLEL: usize = 8;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiflowConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub workflow: WorkflowSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub url: Option<String>,
    pub api_url: Option<String>,
    pub article_path: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WorkflowSection {
    pub issue_banner_template: Option<String>,
    pub min_summary_length: Option<usize>,
    pub search_limit: Option<usize>,
    pub max_parallel: Option<usize>,
}

impl WikiflowConfig {
    /// Resolve the wiki API URL: env WIKI_API_URL > config > derived from the wiki URL.
    pub fn api_url(&self) -> Option<String> {
        if let Some(value) = env_override("WIKI_API_URL") {
            return Some(value);
        }
        if let Some(api_url) = &self.wiki.api_url {
            return Some(api_url.clone());
        }
        env_override("WIKI_URL")
            .or_else(|| self.wiki.url.clone())
            .map(|url| format!("{}/api.php", url.trim_end_matches('/')))
    }

    /// Resolve the wiki base URL: env WIKI_URL > config > derived from api_url.
    pub fn wiki_url(&self) -> Option<String> {
        if let Some(value) = env_override("WIKI_URL") {
            return Some(value);
        }
        if let Some(url) = &self.wiki.url {
            return Some(url.clone());
        }
        self.api_url().and_then(|api| derive_wiki_url(&api))
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("WIKI_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn article_path(&self) -> String {
        env_override("WIKI_ARTICLE_PATH")
            .or_else(|| self.wiki.article_path.clone())
            .unwrap_or_else(|| DEFAULT_ARTICLE_PATH.to_string())
    }

    /// Full URL of a page rendered through the article path, e.g. a special page.
    pub fn page_url(&self, title: &str) -> Option<String> {
        let base = self.wiki_url()?;
        let origin = site_origin(&base).unwrap_or(base);
        Some(format!(
            "{}{}",
            origin.trim_end_matches('/'),
            self.article_path().replace("$1", title)
        ))
    }

    pub fn issue_banner_template(&self) -> String {
        self.workflow
            .issue_banner_template
            .clone()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BANNER_TEMPLATE.to_string())
    }

    pub fn min_summary_length(&self) -> usize {
        self.workflow
            .min_summary_length
            .unwrap_or(DEFAULT_MIN_SUMMARY_LENGTH)
    }

    pub fn search_limit(&self) -> usize {
        self.workflow
            .search_limit
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
    }

    pub fn max_parallel(&self) -> usize {
        self.workflow
            .max_parallel
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MAX_PARALLEL)
    }
}

/// Load and parse a WikiflowConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<WikiflowConfig> {
    if !config_path.exists() {
        return Ok(WikiflowConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: WikiflowConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Derive wiki base URL from an API URL by stripping `/api.php` or `/w/api.php`.
pub fn derive_wiki_url(api_url: &str) -> Option<String> {
    let trimmed = api_url.trim();
    let stripped = trimmed
        .strip_suffix("/w/api.php")
        .or_else(|| trimmed.strip_suffix("/api.php"))
        .unwrap_or(trimmed);
    let result = stripped.trim_end_matches('/').to_string();
    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

fn site_origin(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    })
}

fn env_override(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
