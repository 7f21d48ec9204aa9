//! Configuration system (layered: defaults < settings file < env < code).

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::types::PermissionMode;

/// File name of the optional settings file.
pub const SETTINGS_FILE_NAME: &str = "turngate.toml";

/// Context window assumed when a result carries no per-model metadata.
pub const DEFAULT_CONTEXT_WINDOW: u64 = 200_000;

/// Fraction of the budget at which a warning is raised.
pub const DEFAULT_BUDGET_WARNING_RATIO: f64 = 0.8;

/// Tool-name prefix of externally-integrated (MCP) servers.
pub const DEFAULT_MCP_TOOL_PREFIX: &str = "mcp__";

fn default_read_only_tools() -> Vec<String> {
    [
        "Read",
        "Glob",
        "Grep",
        "LS",
        "WebFetch",
        "WebSearch",
        "LSP",
        "NotebookRead",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Settings shared by the turn engine and the tool gate.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Spend limit for one query, in USD.
    pub budget_limit_usd: Option<f64>,
    #[builder(default = DEFAULT_BUDGET_WARNING_RATIO)]
    pub budget_warning_ratio: f64,
    #[builder(default = DEFAULT_CONTEXT_WINDOW)]
    pub default_context_window: u64,
    /// Tools that never need approval.
    #[builder(default = default_read_only_tools())]
    pub read_only_tools: Vec<String>,
    #[builder(default = DEFAULT_MCP_TOOL_PREFIX.to_string(), into)]
    pub mcp_tool_prefix: String,
    #[builder(default)]
    pub skip_permissions: bool,
    #[builder(default)]
    pub permission_mode: PermissionMode,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            budget_limit_usd: None,
            budget_warning_ratio: DEFAULT_BUDGET_WARNING_RATIO,
            default_context_window: DEFAULT_CONTEXT_WINDOW,
            read_only_tools: default_read_only_tools(),
            mcp_tool_prefix: DEFAULT_MCP_TOOL_PREFIX.to_string(),
            skip_permissions: false,
            permission_mode: PermissionMode::default(),
        }
    }
}

impl BridgeConfig {
    /// Load every layer: settings file (explicit path, else the platform
    /// config dir), then the process environment including `.env`.
    pub fn load(settings_path: Option<&Path>) -> Result<Self> {
        let path = settings_path
            .map(Path::to_path_buf)
            .or_else(Self::default_settings_path);
        let mut config = match path {
            Some(path) if path.is_file() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML settings file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "turngate settings loaded");
        Ok(config)
    }

    /// Platform-specific location of the settings file.
    pub fn default_settings_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "turngate", "turngate")
            .map(|dirs| dirs.config_dir().join(SETTINGS_FILE_NAME))
    }

    /// Overlay environment variables resolved through `lookup`.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup("TURNGATE_BUDGET_LIMIT_USD") {
            let limit = parse_env::<f64>("TURNGATE_BUDGET_LIMIT_USD", &raw)?;
            self.budget_limit_usd = (limit > 0.0).then_some(limit);
        }
        if let Some(raw) = lookup("TURNGATE_SKIP_PERMISSIONS") {
            self.skip_permissions = parse_bool_flag(&raw).ok_or_else(|| {
                BridgeError::Configuration(format!(
                    "TURNGATE_SKIP_PERMISSIONS must be a boolean, got {raw:?}"
                ))
            })?;
        }
        if let Some(raw) = lookup("TURNGATE_PERMISSION_MODE") {
            self.permission_mode = parse_env::<PermissionMode>("TURNGATE_PERMISSION_MODE", &raw)?;
        }
        if let Some(raw) = lookup("TURNGATE_CONTEXT_WINDOW") {
            self.default_context_window = parse_env::<u64>("TURNGATE_CONTEXT_WINDOW", &raw)?;
        }
        Ok(())
    }

    pub fn is_read_only_tool(&self, tool_name: &str) -> bool {
        self.read_only_tools.iter().any(|name| name == tool_name)
    }

    pub fn is_mcp_tool(&self, tool_name: &str) -> bool {
        !self.mcp_tool_prefix.is_empty() && tool_name.starts_with(&self.mcp_tool_prefix)
    }
}

fn parse_env<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| BridgeError::Configuration(format!("invalid value for {key}: {raw:?}")))
}

fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
