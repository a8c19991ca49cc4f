//! Configuration loader with multi-source merging.

use crate::{CoordinatorConfig, Paths};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with a builder pattern, mirroring the precedence
/// order documented on [`crate::CoordinatorConfig`].
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current directory.
    pub fn new() -> Self {
        Self { project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")), env_prefix: "STREAMCOORD".to_string() }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Loads configuration from all sources with proper precedence.
    pub fn load(self) -> Result<CoordinatorConfig> {
        let mut builder = config::Config::builder();

        let defaults = CoordinatorConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        let paths = Paths::new();
        if let Ok(user_config_file) = paths.user_config_file() {
            if user_config_file.exists() {
                builder = builder
                    .add_source(config::File::from(user_config_file).required(false).format(config::FileFormat::Toml));
            }
        }

        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder
                .add_source(config::File::from(project_config_file).required(false).format(config::FileFormat::Toml));
        }

        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder
                .add_source(config::File::from(local_config_file).required(false).format(config::FileFormat::Toml));
        }

        builder = builder.add_source(config::Environment::with_prefix(&self.env_prefix).separator("_").try_parsing(true));

        let config = builder.build().context("failed to build configuration")?;
        let coordinator_config: CoordinatorConfig =
            config.try_deserialize().context("failed to deserialize configuration")?;

        Ok(coordinator_config)
    }

    pub fn load_or_default(self) -> CoordinatorConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_defaults() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config = ConfigLoader::new().with_project_dir(temp_dir.path()).load().expect("failed to load config");

        assert_eq!(config.coordinator.release_cursor_interval, 4096);
        assert_eq!(config.cluster.tick_interval_ms, 5_000);
    }

    #[test]
    fn load_project_config() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("streamcoord.toml"),
            r#"
[coordinator]
release_cursor_interval = 1024

[replica]
max_freshness_skew_secs = 30
"#,
        )
        .expect("failed to write config");

        let config = ConfigLoader::new().with_project_dir(project_dir).load().expect("failed to load config");

        assert_eq!(config.coordinator.release_cursor_interval, 1024);
        assert_eq!(config.replica.max_freshness_skew_secs, 30);
    }

    #[test]
    fn local_overrides_project() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(project_dir.join("streamcoord.toml"), "[coordinator]\nrelease_cursor_interval = 1024\n")
            .expect("failed to write project config");
        fs::write(project_dir.join("streamcoord.local.toml"), "[coordinator]\nrelease_cursor_interval = 8\n")
            .expect("failed to write local config");

        let config = ConfigLoader::new().with_project_dir(project_dir).load().expect("failed to load config");

        assert_eq!(config.coordinator.release_cursor_interval, 8);
    }

    // Environment-variable precedence (STREAMCOORD_COORDINATOR_RELEASE_CURSOR_INTERVAL=...)
    // is exercised by integration tests rather than here, for the same reason
    // the teacher's loader tests document: the `config` crate's process-wide
    // env cache makes in-process env mutation unreliable across parallel tests.
}
