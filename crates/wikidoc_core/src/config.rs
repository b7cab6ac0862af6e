use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SITE_TITLE: &str = "Documentation";
pub const DEFAULT_SINGLE_PAGE_FILE: &str = "docs.html";
pub const DEFAULT_DOCSET_NAME: &str = "Docs";
pub const DEFAULT_RENDERER_COMMAND: &str = "apex";
pub const DEFAULT_RENDER_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DocsConfig {
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub docset: DocsetSection,
    #[serde(default)]
    pub renderer: RendererSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteSection {
    pub title: Option<String>,
    pub single_page_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DocsetSection {
    pub name: Option<String>,
    pub bundle_id: Option<String>,
    pub platform_family: Option<String>,
    pub keyword: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RendererSection {
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout_ms: Option<u64>,
}

/// Docset identity written into `Info.plist`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocsetIdentity {
    pub name: String,
    pub bundle_id: String,
    pub platform_family: String,
    pub keyword: String,
}

impl DocsConfig {
    pub fn site_title(&self) -> &str {
        self.site.title.as_deref().unwrap_or(DEFAULT_SITE_TITLE)
    }

    pub fn single_page_file(&self) -> &str {
        self.site
            .single_page_file
            .as_deref()
            .unwrap_or(DEFAULT_SINGLE_PAGE_FILE)
    }

    /// Resolve the docset identity; missing keys derive from the name.
    pub fn docset_identity(&self) -> DocsetIdentity {
        let name = self
            .docset
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_DOCSET_NAME.to_string());
        let derived = name.to_ascii_lowercase().replace(char::is_whitespace, "-");
        DocsetIdentity {
            bundle_id: self.docset.bundle_id.clone().unwrap_or_else(|| derived.clone()),
            platform_family: self
                .docset
                .platform_family
                .clone()
                .unwrap_or_else(|| derived.clone()),
            keyword: self.docset.keyword.clone().unwrap_or(derived),
            name,
        }
    }

    /// Resolve the renderer command: env WIKIDOC_RENDERER > config > DEFAULT_RENDERER_COMMAND.
    pub fn renderer_command(&self) -> String {
        if let Some(value) = env_override("WIKIDOC_RENDERER") {
            return value;
        }
        self.renderer
            .command
            .clone()
            .unwrap_or_else(|| DEFAULT_RENDERER_COMMAND.to_string())
    }

    /// Resolve the per-page render timeout: env WIKIDOC_RENDER_TIMEOUT_MS > config > default.
    pub fn render_timeout(&self) -> Duration {
        let from_env = env_override("WIKIDOC_RENDER_TIMEOUT_MS").and_then(|value| value.parse().ok());
        Duration::from_millis(
            from_env
                .or(self.renderer.timeout_ms)
                .unwrap_or(DEFAULT_RENDER_TIMEOUT_MS),
        )
    }
}

/// Load and parse a DocsConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<DocsConfig> {
    if !config_path.exists() {
        return Ok(DocsConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: DocsConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

pub fn render_default_config() -> String {
    format!(
        "# wikidoc configuration (materialized by `wikidoc init`)\n\n[site]\ntitle = \"{DEFAULT_SITE_TITLE}\"\nsingle_page_file = \"{DEFAULT_SINGLE_PAGE_FILE}\"\n\n[docset]\nname = \"{DEFAULT_DOCSET_NAME}\"\n# bundle_id = \"docs\"\n# platform_family = \"docs\"\n# keyword = \"docs\"\n\n[renderer]\n# Resolved from WIKIDOC_RENDERER, this value, <root>/tools, <root>/build*, then PATH.\ncommand = \"{DEFAULT_RENDERER_COMMAND}\"\nargs = []\ntimeout_ms = {DEFAULT_RENDER_TIMEOUT_MS}\n"
    )
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
