//! Persisted backend configuration.
//!
//! Backend configs are the only state that survives a restart. They live
//! in one JSON file under the platform config directory, overridable via
//! `TOOLMESH_CONFIG`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use toolmesh_core_types::BackendName;
use toolmesh_registry::BackendConfig;

pub const CONFIG_ENV: &str = "TOOLMESH_CONFIG";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MeshConfig {
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

impl MeshConfig {
    pub fn enabled_backends(&self) -> impl Iterator<Item = &BackendConfig> {
        self.backends.iter().filter(|backend| backend.enabled)
    }

    /// Add or replace a backend entry by name.
    pub fn upsert_backend(&mut self, config: BackendConfig) {
        if let Some(existing) = self
            .backends
            .iter_mut()
            .find(|backend| backend.name == config.name)
        {
            *existing = config;
        } else {
            self.backends.push(config);
        }
    }

    pub fn remove_backend(&mut self, name: &BackendName) -> bool {
        let before = self.backends.len();
        self.backends.retain(|backend| &backend.name != name);
        self.backends.len() != before
    }
}

/// Resolve the config file path: env override first, then the platform
/// config directory.
pub fn default_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    let base = dirs::config_dir().context("no config directory on this platform")?;
    Ok(base.join("toolmesh").join("backends.json"))
}

/// Missing file means an empty config, not an error.
pub fn load_from(path: &Path) -> Result<MeshConfig> {
    if !path.exists() {
        debug!(target: "config", path = %path.display(), "no config file, starting empty");
        return Ok(MeshConfig::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: MeshConfig =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

pub fn save_to(path: &Path, config: &MeshConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }
    let raw = serde_json::to_string_pretty(config).context("serializing config")?;
    fs::write(path, raw).with_context(|| format!("writing config file {}", path.display()))?;
    debug!(target: "config", path = %path.display(), backends = config.backends.len(), "config saved");
    Ok(())
}

pub fn load() -> Result<MeshConfig> {
    load_from(&default_path()?)
}

pub fn save(config: &MeshConfig) -> Result<()> {
    save_to(&default_path()?, config)
}
