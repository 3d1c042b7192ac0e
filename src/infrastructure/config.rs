use crate::domain::{
    config::LiveConfig,
    error::{LiveError, LiveResult},
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_DIR: &str = "tarot-live";
const PROJECT_DIR: &str = ".tarot-live";
const CONFIG_FILE: &str = "config.toml";

/// Configuration manager
pub struct ConfigManager {
    global_config_path: PathBuf,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Resolve the global path and search for a project config from the cwd up
    pub fn new() -> LiveResult<Self> {
        let global_config_path = Self::default_global_config_path()?;
        let project_config_path = Self::find_project_config_path();

        Ok(Self {
            global_config_path,
            project_config_path,
        })
    }

    /// Use explicit locations instead of the discovered ones
    pub fn with_paths(global_config_path: PathBuf, project_config_path: Option<PathBuf>) -> Self {
        Self {
            global_config_path,
            project_config_path,
        }
    }

    /// Effective configuration: defaults, then the global file, then the
    /// project file key by key, then the environment
    pub fn load_config(&self) -> LiveResult<LiveConfig> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        if self.global_config_path.exists() {
            debug!("Loading global config {}", self.global_config_path.display());
            merge_toml(&mut merged, read_toml(&self.global_config_path)?);
        }

        if let Some(project_path) = &self.project_config_path {
            if project_path.exists() {
                debug!("Loading project config {}", project_path.display());
                merge_toml(&mut merged, read_toml(project_path)?);
            }
        }

        let mut config: LiveConfig = merged.try_into().map_err(|e| {
            LiveError::config(format!("Invalid configuration: {}", e))
        })?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load one file, ignoring the global/project layering
    pub fn load_config_from_path(&self, path: &Path) -> LiveResult<LiveConfig> {
        let content = fs::read_to_string(path).map_err(|e| {
            LiveError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let mut config: LiveConfig = toml::from_str(&content).map_err(|e| {
            LiveError::config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save_config_to_path(&self, path: &Path, config: &LiveConfig) -> LiveResult<()> {
        let content = toml::to_string_pretty(config)
            .map_err(|e| LiveError::config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                LiveError::config(format!("Failed to create config directory: {}", e))
            })?;
        }

        fs::write(path, content).map_err(|e| {
            LiveError::config(format!("Failed to write config file {}: {}", path.display(), e))
        })
    }

    /// Write a default project configuration under `dir/.tarot-live`
    pub fn init_project_config(&self, dir: &Path) -> LiveResult<PathBuf> {
        let config_file = dir.join(PROJECT_DIR).join(CONFIG_FILE);

        if config_file.exists() {
            return Err(LiveError::config(format!(
                "Project configuration already exists at {}",
                config_file.display()
            )));
        }

        self.save_config_to_path(&config_file, &LiveConfig::default())?;
        Ok(config_file)
    }

    pub fn project_config_path(&self) -> Option<&Path> {
        self.project_config_path.as_deref()
    }

    pub fn global_config_path(&self) -> &Path {
        &self.global_config_path
    }

    fn default_global_config_path() -> LiveResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| LiveError::config("Could not determine home directory"))?;

        Ok(home.join(".config").join(APP_DIR).join(CONFIG_FILE))
    }

    /// Find project configuration path by walking up directory tree
    fn find_project_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut path = current_dir.as_path();

        loop {
            let config_path = path.join(PROJECT_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            path = path.parent()?;
        }
    }
}

fn read_toml(path: &Path) -> LiveResult<toml::Value> {
    let content = fs::read_to_string(path).map_err(|e| {
        LiveError::config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    toml::from_str(&content).map_err(|e| {
        LiveError::config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Tables merge recursively; any other value in `overlay` replaces the base
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
