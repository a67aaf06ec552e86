use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub sound_enabled: bool,
    pub speed: f64,
    /// Directory the cartridge library serves images from.
    pub library_root: Option<PathBuf>,
    /// Directory the file-backed save store writes domains under.
    pub save_root: Option<PathBuf>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            speed: 1.0,
            library_root: None,
            save_root: None,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("vibeemu").join("shell.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("vibeemu").join("shell.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("vibeemu")
            .join("shell.toml");
    }

    PathBuf::from("shell.toml")
}

pub fn load_from_file(path: &Path) -> ShellConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => return ShellConfig::default(),
    };

    match toml::from_str::<ShellConfig>(&text) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Failed to parse shell config {}: {err}; using defaults",
                path.display()
            );
            ShellConfig::default()
        }
    }
}

pub fn save_to_file(path: &Path, config: &ShellConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(config).unwrap_or_else(|_| String::new());
    std::fs::write(path, text)
}
