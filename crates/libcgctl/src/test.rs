#![cfg(test)]

use anyhow::{Context, Result};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

use crate::config::{CgroupConfig, PollOptions, SubsystemLayout};

pub fn setup(cgroup_file: &str) -> (TempDir, PathBuf) {
    let tmp = tempfile::tempdir().expect("create temp directory for test");
    let cgroup_file = set_fixture(tmp.path(), cgroup_file, "")
        .unwrap_or_else(|_| panic!("set test fixture for {cgroup_file}"));

    (tmp, cgroup_file)
}

pub fn set_fixture(temp_dir: &Path, filename: &str, val: &str) -> Result<PathBuf> {
    let full_path = temp_dir.join(filename);

    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&full_path)
        .with_context(|| format!("failed to open {full_path:?}"))?
        .write_all(val.as_bytes())
        .with_context(|| format!("failed to write to {full_path:?}"))?;

    Ok(full_path)
}

/// A fake cgroup mount with the hierarchy roots of `layout` created.
pub fn cgroup_root(layout: SubsystemLayout) -> (TempDir, CgroupConfig) {
    let tmp = tempfile::tempdir().expect("create temp cgroup root");
    if let SubsystemLayout::PerSubsystem(subsystems) = &layout {
        for subsystem in subsystems {
            fs::create_dir(tmp.path().join(subsystem.as_ref())).expect("create hierarchy root");
        }
    }

    let config = CgroupConfig::default()
        .with_root(tmp.path())
        .with_layout(layout)
        .with_poll(PollOptions {
            timeout: Some(std::time::Duration::from_secs(5)),
            ..PollOptions::default()
        });
    (tmp, config)
}
