use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::subsystem::{Subsystem, SUBSYSTEMS};

pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup/";
/// Environment variable overriding the cgroup mount prefix.
pub const CGROUP_ROOT_ENV: &str = "CGCTL_ROOT";

/// How the subsystems are mounted below the cgroup root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemLayout {
    /// Every subsystem has its own hierarchy, e.g. `/sys/fs/cgroup/cpuset`.
    PerSubsystem(Vec<Subsystem>),
    /// All subsystems share a single hierarchy mounted at the root.
    Comounted,
}

impl Default for SubsystemLayout {
    fn default() -> Self {
        SubsystemLayout::PerSubsystem(SUBSYSTEMS.to_vec())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollOptions {
    /// Delay after the first unsuccessful check.
    pub initial_interval: Duration,
    /// Upper bound for the delay, which doubles after every unsuccessful check.
    pub max_interval: Duration,
    /// Give up after this long. `None` waits until the condition is observed.
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(100),
            timeout: None,
        }
    }
}

impl PollOptions {
    pub fn with_timeout<T: Into<Option<Duration>>>(mut self, timeout: T) -> Self {
        self.timeout = timeout.into();
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KillOptions {
    /// Time the tasks get to exit after SIGTERM before they are sent SIGKILL.
    /// `None` never escalates.
    pub grace_period: Option<Duration>,
    /// Overall time to wait for the group to become empty.
    pub timeout: Option<Duration>,
}

impl Default for KillOptions {
    fn default() -> Self {
        Self {
            grace_period: Some(Duration::from_secs(10)),
            timeout: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CgroupConfig {
    pub root: PathBuf,
    pub layout: SubsystemLayout,
    pub poll: PollOptions,
    pub kill: KillOptions,
}

impl Default for CgroupConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_CGROUP_ROOT),
            layout: SubsystemLayout::default(),
            poll: PollOptions::default(),
            kill: KillOptions::default(),
        }
    }
}

impl CgroupConfig {
    /// Default configuration with the root taken from `CGCTL_ROOT` if it is set.
    pub fn from_env() -> Self {
        let config = Self::default();
        match std::env::var_os(CGROUP_ROOT_ENV) {
            Some(root) if !root.is_empty() => {
                tracing::debug!(?root, "cgroup root overridden from environment");
                config.with_root(root)
            }
            _ => config,
        }
    }

    pub fn with_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_layout(mut self, layout: SubsystemLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_poll(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_kill(mut self, kill: KillOptions) -> Self {
        self.kill = kill;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial(env)]
    fn test_from_env_override() {
        std::env::set_var(CGROUP_ROOT_ENV, "/tmp/cgroups");
        let config = CgroupConfig::from_env();
        std::env::remove_var(CGROUP_ROOT_ENV);

        assert_eq!(config.root(), Path::new("/tmp/cgroups"));
        assert_eq!(config.layout, SubsystemLayout::default());
    }

    #[test]
    #[serial(env)]
    fn test_from_env_default() {
        std::env::remove_var(CGROUP_ROOT_ENV);
        assert_eq!(CgroupConfig::from_env(), CgroupConfig::default());

        std::env::set_var(CGROUP_ROOT_ENV, "");
        let config = CgroupConfig::from_env();
        std::env::remove_var(CGROUP_ROOT_ENV);
        assert_eq!(config.root(), Path::new(DEFAULT_CGROUP_ROOT));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let json = r#"{
            "root": "/mnt/cgroup",
            "layout": "comounted",
            "kill": { "grace_period": null }
        }"#;

        let config: CgroupConfig = serde_json::from_str(json).expect("deserialize config");
        assert_eq!(config.root(), Path::new("/mnt/cgroup"));
        assert_eq!(config.layout, SubsystemLayout::Comounted);
        assert_eq!(config.kill.grace_period, None);
        assert_eq!(config.kill.timeout, None);
        assert_eq!(config.poll, PollOptions::default());
    }

    #[test]
    fn test_deserialize_subsystem_list() {
        let json = r#"{ "layout": { "per_subsystem": ["freezer"] } }"#;

        let config: CgroupConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.layout,
            SubsystemLayout::PerSubsystem(vec![Subsystem::Freezer])
        );
        assert_eq!(config.root(), Path::new(DEFAULT_CGROUP_ROOT));
    }
}
