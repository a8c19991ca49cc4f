//! Path utilities and XDG directory discovery.

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// XDG-compliant paths for the Stream Coordinator.
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    /// Creates a new `Paths` instance with XDG discovery.
    pub fn new() -> Self {
        Self { project_dirs: ProjectDirs::from("com", "StreamCoordinator", "streamcoord") }
    }

    /// User config directory (`~/.config/streamcoord/`).
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::XdgError("failed to determine user config directory".to_string()))
    }

    /// User config file path (`~/.config/streamcoord/config.toml`).
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join("config.toml"))
    }

    /// Project config file path (`streamcoord.toml`).
    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("streamcoord.toml")
    }

    /// Local config file path (`streamcoord.local.toml`, gitignored).
    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("streamcoord.local.toml")
    }

    /// Whether a project is initialized (has `streamcoord.toml`).
    pub fn is_initialized(project_dir: impl AsRef<Path>) -> bool {
        Self::project_config_file(project_dir).exists()
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
