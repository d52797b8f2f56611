use crate::script::ReloadPolicy;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub script: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarantine: Option<PathBuf>,
    #[serde(default)]
    pub reload: ReloadPolicy,
}

fn default_name() -> String {
    "DicomFilter".to_string()
}

impl Default for StageConfig {
    fn default() -> Self {
        StageConfig {
            name: default_name(),
            script: PathBuf::from("/etc/dicom-filter/filter.script"),
            quarantine: Some(PathBuf::from("/var/lib/dicom-filter/quarantine")),
            reload: ReloadPolicy::OnChange,
        }
    }
}

impl StageConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: StageConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        // Relative paths are taken relative to the config file
        if let Some(base) = path.parent() {
            config.script = resolve(base, &config.script);
            config.quarantine = config.quarantine.map(|q| resolve(base, &q));
        }
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;
        Ok(())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
