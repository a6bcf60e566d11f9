use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub extension: ManifestInfo,
    pub background: BackgroundConfig,
    pub locale: LocaleConfig,
    pub icons: IconsConfig,
}

/// Identity of the hosted extension, as declared by its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestInfo {
    pub name: String,
    pub version: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Script resources evaluated, in order, when the bridge is set up.
    pub scripts: Vec<String>,
    /// Global function in the background context that receives every payload.
    pub entry_point: String,
    /// Seconds to wait for `ready` before warning.
    pub ready_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocaleConfig {
    /// Language code of the catalog injected at setup (e.g. "en").
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IconsConfig {
    /// Platform-specific size→resource table, consulted in declaration order.
    pub overrides: Vec<IconOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconOverride {
    pub size: String,
    pub resource: String,
}

#[allow(clippy::derivable_impls)]
impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            extension: ManifestInfo::default(),
            background: BackgroundConfig::default(),
            locale: LocaleConfig::default(),
            icons: IconsConfig::default(),
        }
    }
}

impl Default for ManifestInfo {
    fn default() -> Self {
        Self {
            name: "extension".to_string(),
            version: "0.0.0".to_string(),
            id: "extension".to_string(),
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            scripts: Vec::new(),
            entry_point: "__tabrelayDispatch".to_string(),
            ready_timeout_secs: 10,
        }
    }
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            default: Some("en".to_string()),
        }
    }
}

impl BackgroundConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

impl BridgeConfig {
    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
            })
            .join("tabrelay")
            .join("config.toml")
    }

    /// Load config from the default location, or return defaults if the
    /// file is missing or unreadable.
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load and validate config from an explicit path.
    pub fn load_from(path: &Path) -> BridgeResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the bridge cannot work with.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.extension.name.is_empty() {
            return Err(BridgeError::Config("extension.name is required".to_string()));
        }

        if self.extension.id.is_empty() {
            return Err(BridgeError::Config("extension.id is required".to_string()));
        }

        let entry = &self.background.entry_point;
        let valid_ident = !entry.is_empty()
            && !entry.starts_with(|c: char| c.is_ascii_digit())
            && entry
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.');
        if !valid_ident {
            return Err(BridgeError::Config(format!(
                "background.entry_point '{}' is not a valid function name",
                entry
            )));
        }

        for icon in &self.icons.overrides {
            if icon.size.is_empty() || icon.resource.is_empty() {
                return Err(BridgeError::Config(
                    "icons.overrides entries need both size and resource".to_string(),
                ));
            }
        }

        Ok(())
    }
}
