//! Configuration management for the Stream Coordinator.
//!
//! Provides hierarchical configuration loading from multiple sources, highest
//! precedence first:
//!
//! 1. Environment variables (`STREAMCOORD_*` prefix)
//! 2. `streamcoord.local.toml` (gitignored, local overrides)
//! 3. `streamcoord.toml` (git-tracked, project config)
//! 4. `~/.config/streamcoord/config.toml` (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! None of spec.md's tunables are read by the pure kernel crate directly —
//! `streamcoord-kernel` takes its release-cursor interval as a plain `u64`
//! constant and its quorum rule as a pure function of `nodes.len()`. This
//! crate is where an embedder turns a loaded [`CoordinatorConfig`] into the
//! arguments the kernel's entry points expect.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Root configuration for a Stream Coordinator deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub coordinator: CoordinatorSection,
    pub replica: ReplicaConfig,
    pub cluster: ClusterConfig,
    pub aux: AuxConfig,
}

/// Parameters spec.md names but leaves as constants or open tunables
/// (§4.1 release-cursor policy, §Glossary quorum rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSection {
    /// Commands between `release_cursor` effects (spec §4.1: `index mod
    /// 4096 == 0`).
    pub release_cursor_interval: u64,
    /// How a stream's quorum size is derived from `nodes.len()` (spec
    /// GLOSSARY: "strictly more than half... for n=1 defined as 1").
    pub quorum_rule: QuorumRule,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self { release_cursor_interval: 4096, quorum_rule: QuorumRule::StrictMajority }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum QuorumRule {
    StrictMajority,
}

/// The (non-replicated, caller-side) `add_replica` freshness gate (spec §7:
/// "refuses if the existing replicas' write-offsets span more than 10
/// seconds of wall-clock skew").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    pub max_freshness_skew_secs: u64,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self { max_freshness_skew_secs: 10 }
    }
}

/// Tunables for the `tick`-driven cluster-resize task (spec §6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub tick_interval_ms: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { tick_interval_ms: 5_000 }
    }
}

/// Tunables for the reference `Aux` worker (spec §4.6 "graceful throttling
/// on transient errors... via a sleep").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuxConfig {
    pub retry_backoff_ms: u64,
}

impl Default for AuxConfig {
    fn default() -> Self {
        Self { retry_backoff_ms: 200 }
    }
}

impl CoordinatorConfig {
    /// Loads configuration from default locations relative to the current
    /// directory.
    pub fn load() -> anyhow::Result<Self> {
        ConfigLoader::new().load()
    }

    /// Loads configuration from a specific project directory.
    pub fn load_from_dir(project_dir: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// A configuration tuned for single-process development/testing: a
    /// short release-cursor interval so the compaction path is exercised
    /// quickly, and no freshness gate.
    pub fn development() -> Self {
        Self {
            coordinator: CoordinatorSection { release_cursor_interval: 16, ..CoordinatorSection::default() },
            replica: ReplicaConfig { max_freshness_skew_secs: u64::MAX },
            ..Self::default()
        }
    }

    pub fn data_dir(&self, base_dir: impl Into<PathBuf>) -> PathBuf {
        base_dir.into().join(".streamcoord")
    }
}
