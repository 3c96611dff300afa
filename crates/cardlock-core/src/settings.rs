use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSettings {
    pub lock_timeout_secs: u64,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            lock_timeout_secs: 30,
        }
    }
}

impl VaultSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

pub fn load_settings(path: &Path) -> anyhow::Result<VaultSettings> {
    if path.exists() {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    } else {
        Ok(VaultSettings::default())
    }
}

pub fn save_settings(path: &Path, settings: &VaultSettings) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)?;
    Ok(())
}
