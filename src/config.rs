use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::models::CredentialType;

const DEFAULT_MAX_RENDER: usize = 10;

/// Values given on the command line or through the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub admin_secret: Option<String>,
    pub verify_tls: Option<bool>,
    pub config_path: Option<PathBuf>,
}

/// `config.json` layout. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub admin_secret: Option<String>,
    pub verify_tls: Option<bool>,
    pub max_render_antigravity: Option<usize>,
    pub max_render_gemini_cli: Option<usize>,
}

/// Per-type cap on credentials shown in the quota report, 0 = unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxRender {
    pub antigravity: usize,
    pub gemini_cli: usize,
}

impl MaxRender {
    pub fn for_type(&self, kind: CredentialType) -> usize {
        match kind {
            CredentialType::Antigravity => self.antigravity,
            CredentialType::GeminiCli => self.gemini_cli,
        }
    }
}

impl Default for MaxRender {
    fn default() -> Self {
        Self {
            antigravity: DEFAULT_MAX_RENDER,
            gemini_cli: DEFAULT_MAX_RENDER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub admin_secret: String,
    pub verify_tls: bool,
    pub max_render: MaxRender,
}

impl Config {
    pub fn load(overrides: Overrides) -> Result<Self> {
        let path = overrides.config_path.clone().or_else(Self::default_path);
        let file = match path {
            Some(path) if path.exists() => Self::read_file(&path)?,
            Some(path) => {
                debug!("No config file at {:?}", path);
                FileConfig::default()
            }
            None => FileConfig::default(),
        };

        Self::resolve(overrides, file)
    }

    fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("cpa-monitor").join("config.json"))
    }

    fn read_file(path: &Path) -> Result<FileConfig> {
        debug!("Loading config file: {:?}", path);
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Flags and environment win over the config file.
    pub fn resolve(overrides: Overrides, file: FileConfig) -> Result<Self> {
        let base_url = overrides
            .base_url
            .or(file.base_url)
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        let admin_secret = overrides
            .admin_secret
            .or(file.admin_secret)
            .filter(|s| !s.is_empty());

        let (Some(base_url), Some(admin_secret)) = (base_url, admin_secret) else {
            anyhow::bail!("CLIProxyAPI URL or admin secret not configured");
        };

        let parsed = Url::parse(&base_url)
            .with_context(|| format!("Invalid CLIProxyAPI URL: {}", base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("CLIProxyAPI URL must use http or https: {}", base_url);
        }

        let defaults = MaxRender::default();
        Ok(Self {
            base_url,
            admin_secret,
            verify_tls: overrides.verify_tls.or(file.verify_tls).unwrap_or(false),
            max_render: MaxRender {
                antigravity: file.max_render_antigravity.unwrap_or(defaults.antigravity),
                gemini_cli: file.max_render_gemini_cli.unwrap_or(defaults.gemini_cli),
            },
        })
    }
}
