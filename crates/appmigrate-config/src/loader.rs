use std::path::{Path, PathBuf};

use appmigrate_common::{Error, Result};
use tracing::debug;

use crate::model::MigrateConfig;

const CONFIG_DIR_NAME: &str = "appmigrate";
const CONFIG_FILE_NAME: &str = "config.yml";

/// Reads `MigrateConfig` from YAML or TOML files.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Default location: `<config dir>/appmigrate/config.yml`.
    pub fn default_path() -> Option<PathBuf> {
        let dir = dirs::config_dir()?;
        Some(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// The default path, if a file is actually there.
    pub fn existing_default_path() -> Option<PathBuf> {
        Self::default_path().filter(|path| path.exists())
    }

    pub fn load_from(path: &Path) -> Result<MigrateConfig> {
        let contents = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config: MigrateConfig = match ext {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("YAML parse error: {e}")))?,
            "toml" => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("TOML parse error: {e}")))?,
            other => {
                return Err(Error::Config(format!(
                    "unsupported config extension: {other}"
                )));
            }
        };

        config.validate()?;
        debug!("parsed config file {}", path.display());
        Ok(config)
    }
}
