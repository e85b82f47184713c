//! Resolution of group names to cgroup directories.
//!
//! Resolution happens in two steps. A [`GroupPath`] binds a validated group
//! name to the configured cgroup root without choosing a subsystem. Each
//! operation then asks it for the directory in the subsystem(s) it needs:
//! create, delete and add-task visit every hierarchy, cpuset knobs only the
//! cpuset one.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::{CgroupConfig, SubsystemLayout};
use crate::subsystem::Subsystem;

#[derive(thiserror::Error, Debug)]
pub enum GroupPathError {
    #[error("invalid group name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("subsystem {0} is not part of the configured layout")]
    UnsupportedSubsystem(Subsystem),
    #[error("the configured layout has no subsystems")]
    EmptyLayout,
}

/// Name of a group. The empty name is the root group of a hierarchy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GroupName(String);

impl GroupName {
    pub fn new<S: Into<String>>(name: S) -> Result<Self, GroupPathError> {
        let name = name.into();
        let reason = if name.contains('/') {
            Some("must not contain '/'")
        } else if name.contains('\0') {
            Some("must not contain NUL")
        } else if name == "." || name == ".." {
            Some("must not be a relative directory reference")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(GroupPathError::InvalidName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for GroupName {
    type Err = GroupPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Display for GroupName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// A group bound to a cgroup root, not yet resolved to a subsystem.
#[derive(Debug, Clone)]
pub struct GroupPath<'a> {
    root: &'a Path,
    layout: &'a SubsystemLayout,
    name: GroupName,
}

impl<'a> GroupPath<'a> {
    pub fn new(config: &'a CgroupConfig, name: GroupName) -> Self {
        Self {
            root: config.root(),
            layout: &config.layout,
            name,
        }
    }

    pub fn name(&self) -> &GroupName {
        &self.name
    }

    /// Directory of the group in the hierarchy of `subsystem`.
    pub fn subsystem_dir(&self, subsystem: Subsystem) -> Result<PathBuf, GroupPathError> {
        match self.layout {
            SubsystemLayout::PerSubsystem(subsystems) => {
                if !subsystems.contains(&subsystem) {
                    return Err(GroupPathError::UnsupportedSubsystem(subsystem));
                }
                Ok(self.in_hierarchy(&self.root.join(subsystem.as_ref())))
            }
            SubsystemLayout::Comounted => Ok(self.in_hierarchy(self.root)),
        }
    }

    /// Directories of the group in every configured hierarchy. Never empty.
    pub fn dirs(&self) -> Result<Vec<PathBuf>, GroupPathError> {
        match self.layout {
            SubsystemLayout::PerSubsystem(subsystems) if subsystems.is_empty() => {
                Err(GroupPathError::EmptyLayout)
            }
            SubsystemLayout::PerSubsystem(subsystems) => Ok(subsystems
                .iter()
                .map(|s| self.in_hierarchy(&self.root.join(s.as_ref())))
                .collect()),
            SubsystemLayout::Comounted => Ok(vec![self.in_hierarchy(self.root)]),
        }
    }

    fn in_hierarchy(&self, hierarchy: &Path) -> PathBuf {
        if self.name.is_root() {
            hierarchy.to_path_buf()
        } else {
            hierarchy.join(self.name.as_str())
        }
    }
}
