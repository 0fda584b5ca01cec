use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::model::tenant::TenantConfig;

/// Where tenant configurations live.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn list_active(&self) -> Result<Vec<TenantConfig>>;
}

/// Tenants kept in one file: TOML with `[[tenants]]` tables, or a JSON array
/// when the extension is `.json`.
pub struct FileTenantStore {
    path: PathBuf,
}

#[derive(Deserialize, Default)]
struct TenantFile {
    #[serde(default)]
    tenants: Vec<TenantConfig>,
}

impl FileTenantStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parse(path: &Path, contents: &str) -> Result<Vec<TenantConfig>> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(contents)
                .with_context(|| format!("Failed to parse tenants from {}", path.display()))
        } else {
            let file: TenantFile = toml::from_str(contents)
                .with_context(|| format!("Failed to parse tenants from {}", path.display()))?;
            Ok(file.tenants)
        }
    }
}

#[async_trait]
impl TenantStore for FileTenantStore {
    async fn list_active(&self) -> Result<Vec<TenantConfig>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read tenants from {}", self.path.display()))?;
        let tenants = Self::parse(&self.path, &contents)?;
        Ok(tenants.into_iter().filter(|t| t.is_active).collect())
    }
}
