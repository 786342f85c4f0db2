//! Service configuration
//!
//! Loaded from YAML; every field has a default so an empty file is valid.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::access::RoleActionTable;

pub const NOTES_CONFIG_ENV: &str = "NOTES_CONFIG";

/// Field limits shared by validation and the summary deriver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteLimits {
    pub max_title_chars: usize,
    pub max_summary_chars: usize,
    pub id_length: usize,
}

impl NoteLimits {
    /// Title, one hyphen, then the lowercased id.
    pub fn max_url_fragment_chars(&self) -> usize {
        self.max_title_chars + 1 + self.id_length
    }
}

impl Default for NoteLimits {
    fn default() -> Self {
        Self {
            max_title_chars: 65,
            max_summary_chars: 300,
            id_length: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesConfig {
    pub limits: NoteLimits,
    /// Attempts before id generation gives up with `TooManyCollisions`.
    pub max_id_attempts: usize,
    /// Index re-queries allowed when backfilling stale search hits.
    pub search_max_iterations: usize,
    pub homepage_page_size: usize,
    pub author_page_size: usize,
    /// Result count at which search logs that it may be hitting query limits.
    pub default_query_limit: usize,
    pub roles: RoleActionTable,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            limits: NoteLimits::default(),
            max_id_attempts: 10,
            search_max_iterations: 10,
            homepage_page_size: 10,
            author_page_size: 12,
            default_query_limit: 1000,
            roles: RoleActionTable::default(),
        }
    }
}

impl NotesConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading notes configuration from {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: NotesConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Path from `NOTES_CONFIG`, defaults otherwise.
    pub fn from_env() -> Result<Self> {
        match std::env::var(NOTES_CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.limits.max_title_chars == 0 {
            bail!("limits.max_title_chars must be positive");
        }
        // Room for at least one character plus the ellipsis.
        if self.limits.max_summary_chars <= 3 {
            bail!("limits.max_summary_chars must be greater than 3");
        }
        if self.limits.id_length == 0 {
            bail!("limits.id_length must be positive");
        }
        if self.max_id_attempts == 0 {
            bail!("max_id_attempts must be positive");
        }
        if self.search_max_iterations == 0 {
            bail!("search_max_iterations must be positive");
        }
        if self.homepage_page_size == 0 || self.author_page_size == 0 {
            bail!("page sizes must be positive");
        }
        if self.roles.is_empty() {
            bail!("roles table must not be empty");
        }
        Ok(())
    }
}
