use std::fs::{self, DirBuilder};
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::sys::signal::Signal;
use nix::unistd::Pid;

use crate::codec::{self, AttributeValue, FreezerState};
use crate::common::{self, WrapIoResult, WrappedIoError, TASKS};
use crate::config::{CgroupConfig, SubsystemLayout};
use crate::cpuset::{CpuSet, CpuSetError, CpuSetFlag};
use crate::freezer::{Freezer, FreezerError};
use crate::path::{GroupName, GroupPath, GroupPathError};
use crate::poll::Poller;
use crate::signal::{KillSignaller, Signaller};
use crate::subsystem::Subsystem;
use crate::threads::{self, ThreadsError};

const GROUP_DIR_MODE: u32 = 0o770;

#[derive(thiserror::Error, Debug)]
pub enum GroupError {
    #[error("path error: {0}")]
    Path(#[from] GroupPathError),
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("cpuset error: {0}")]
    CpuSet(#[from] CpuSetError),
    #[error("freezer error: {0}")]
    Freezer(#[from] FreezerError),
    #[error(transparent)]
    Threads(#[from] ThreadsError),
    #[error("failed to send {signal} to {tid}: {err}")]
    Signal {
        tid: Pid,
        signal: Signal,
        #[source]
        err: nix::Error,
    },
    #[error("the operation is not permitted on the root group")]
    RootGroup,
    #[error("{path} still lists tasks after {waited:?}")]
    Timeout { path: PathBuf, waited: Duration },
}

impl GroupError {
    /// Whether the call was rejected before touching the filesystem because
    /// of invalid arguments. Retrying such a call can not succeed.
    pub fn is_precondition(&self) -> bool {
        match self {
            GroupError::Path(_) | GroupError::RootGroup => true,
            GroupError::CpuSet(err) => err.is_precondition(),
            _ => false,
        }
    }
}

/// Manages named groups below the configured cgroup root.
pub struct GroupManager<S: Signaller = KillSignaller> {
    config: CgroupConfig,
    signaller: S,
}

impl GroupManager {
    pub fn new(config: CgroupConfig) -> Self {
        Self::with_signaller(config, KillSignaller)
    }

    /// Manager for the configuration described by the environment.
    pub fn from_env() -> Self {
        Self::new(CgroupConfig::from_env())
    }
}

impl<S: Signaller> GroupManager<S> {
    pub fn with_signaller(config: CgroupConfig, signaller: S) -> Self {
        Self { config, signaller }
    }

    pub fn config(&self) -> &CgroupConfig {
        &self.config
    }

    pub fn signaller(&self) -> &S {
        &self.signaller
    }

    pub fn group(&self, name: &str) -> Result<GroupPath<'_>, GroupError> {
        Ok(GroupPath::new(&self.config, GroupName::new(name)?))
    }

    /// Creates the group in every hierarchy. Existing directories are kept.
    pub fn create(&self, name: &str) -> Result<(), GroupError> {
        let group = self.group(name)?;
        for dir in group.dirs()? {
            tracing::debug!(?dir, "create cgroup");
            match DirBuilder::new().mode(GROUP_DIR_MODE).create(&dir) {
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                res => res.wrap_create_dir(&dir)?,
            }
        }

        Ok(())
    }

    /// Removes the group from every hierarchy. The group has to be empty.
    pub fn delete(&self, name: &str) -> Result<(), GroupError> {
        let group = self.group(name)?;
        for dir in group.dirs()? {
            tracing::debug!(?dir, "remove cgroup");
            fs::remove_dir(&dir).wrap_remove_dir(&dir)?;
        }

        Ok(())
    }

    pub fn exists(&self, name: &str) -> Result<bool, GroupError> {
        Ok(self.group(name)?.dirs()?.iter().all(|dir| dir.is_dir()))
    }

    /// Moves the thread `tid` into the group in every hierarchy.
    pub fn add_task(&self, name: &str, tid: Pid) -> Result<(), GroupError> {
        let group = self.group(name)?;
        for dir in group.dirs()? {
            tracing::debug!(%tid, ?dir, "add task");
            common::append_cgroup_file(dir.join(TASKS), AttributeValue::from(tid))?;
        }

        Ok(())
    }

    /// Moves the calling thread into the group.
    pub fn add_current_thread(&self, name: &str) -> Result<(), GroupError> {
        self.add_task(name, threads::current_thread())
    }

    /// Threads listed in the group.
    pub fn tasks(&self, name: &str) -> Result<Vec<Pid>, GroupError> {
        let path = self.tasks_path(&self.group(name)?)?;
        Self::read_tasks(&path)
    }

    pub fn set_cpus(&self, name: &str, cpus: &[usize]) -> Result<(), GroupError> {
        let dir = self.cpuset_dir(name)?;
        tracing::debug!(?dir, ?cpus, "set cpus");
        Ok(CpuSet::set_cpus(&dir, cpus)?)
    }

    pub fn set_mems(&self, name: &str, mems: &[usize]) -> Result<(), GroupError> {
        let dir = self.cpuset_dir(name)?;
        tracing::debug!(?dir, ?mems, "set memory nodes");
        Ok(CpuSet::set_mems(&dir, mems)?)
    }

    pub fn cpus(&self, name: &str) -> Result<Vec<usize>, GroupError> {
        Ok(CpuSet::cpus(&self.cpuset_dir(name)?)?)
    }

    pub fn mems(&self, name: &str) -> Result<Vec<usize>, GroupError> {
        Ok(CpuSet::mems(&self.cpuset_dir(name)?)?)
    }

    pub fn cpuset_flag(&self, name: &str, flag: CpuSetFlag) -> Result<bool, GroupError> {
        Ok(CpuSet::flag(&self.cpuset_dir(name)?, flag)?)
    }

    pub fn set_memory_migrate(&self, name: &str, enabled: bool) -> Result<(), GroupError> {
        self.set_cpuset_flag(name, CpuSetFlag::MemoryMigrate, enabled)
    }

    pub fn set_cpu_exclusive(&self, name: &str, enabled: bool) -> Result<(), GroupError> {
        self.set_cpuset_flag(name, CpuSetFlag::CpuExclusive, enabled)
    }

    pub fn set_mem_hardwall(&self, name: &str, enabled: bool) -> Result<(), GroupError> {
        self.set_cpuset_flag(name, CpuSetFlag::MemHardwall, enabled)
    }

    pub fn set_sched_relax_domain_level(&self, name: &str, level: i32) -> Result<(), GroupError> {
        let dir = self.cpuset_dir(name)?;
        tracing::debug!(?dir, level, "set scheduling domain level");
        Ok(CpuSet::set_sched_relax_domain_level(&dir, level)?)
    }

    fn set_cpuset_flag(
        &self,
        name: &str,
        flag: CpuSetFlag,
        enabled: bool,
    ) -> Result<(), GroupError> {
        let dir = self.cpuset_dir(name)?;
        tracing::debug!(?dir, ?flag, enabled, "set cpuset flag");
        Ok(CpuSet::set_flag(&dir, flag, enabled)?)
    }

    pub fn freeze(&self, name: &str) -> Result<(), GroupError> {
        let dir = self.freezer_dir(name, true)?;
        Ok(Freezer::freeze(&dir)?)
    }

    pub fn thaw(&self, name: &str) -> Result<(), GroupError> {
        let dir = self.freezer_dir(name, false)?;
        Ok(Freezer::thaw(&dir)?)
    }

    pub fn freezer_state(&self, name: &str) -> Result<FreezerState, GroupError> {
        let dir = self.freezer_dir(name, false)?;
        Ok(Freezer::state(&dir)?)
    }

    /// Blocks until the kernel reports the group as frozen.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn wait_frozen(&self, name: &str) -> Result<(), GroupError> {
        let dir = self.freezer_dir(name, true)?;
        Ok(Freezer::wait_for(&dir, FreezerState::Frozen, self.config.poll)?)
    }

    /// Blocks until the kernel reports the group as thawed.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn wait_thawed(&self, name: &str) -> Result<(), GroupError> {
        let dir = self.freezer_dir(name, false)?;
        Ok(Freezer::wait_for(&dir, FreezerState::Thawed, self.config.poll)?)
    }

    /// Terminates every thread of the group which does not belong to the
    /// calling process, waits until the group is empty and removes it.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn kill(&self, name: &str) -> Result<(), GroupError> {
        self.kill_tasks(name)?;
        self.delete(name)
    }

    /// Sends SIGTERM to every thread of the group which does not belong to
    /// the calling process and waits until the group is empty. Threads still
    /// listed after the grace period are sent SIGKILL.
    pub fn kill_tasks(&self, name: &str) -> Result<(), GroupError> {
        let group = self.group(name)?;
        if group.name().is_root() {
            return Err(GroupError::RootGroup);
        }

        let path = self.tasks_path(&group)?;
        let own = threads::own_threads()?;

        let foreign = Self::foreign_tasks(&path, &own)?;
        tracing::info!(?path, count = foreign.len(), "terminating tasks");
        self.signal_all(&foreign, Signal::SIGTERM)?;

        let options = self.config.poll.with_timeout(self.config.kill.timeout);
        let mut poller = Poller::new(options);
        let mut escalated = false;
        loop {
            let remaining = Self::read_tasks(&path)?;
            if remaining.is_empty() {
                return Ok(());
            }

            let grace_expired = self
                .config
                .kill
                .grace_period
                .map_or(false, |grace| poller.elapsed() >= grace);
            if grace_expired && !escalated {
                let stubborn: Vec<Pid> = remaining
                    .into_iter()
                    .filter(|tid| !own.contains(tid))
                    .collect();
                tracing::warn!(?path, ?stubborn, "tasks survived SIGTERM, sending SIGKILL");
                self.signal_all(&stubborn, Signal::SIGKILL)?;
                escalated = true;
            }

            poller.backoff().map_err(|deadline| GroupError::Timeout {
                path: path.clone(),
                waited: deadline.waited,
            })?;
        }
    }

    fn signal_all(&self, tids: &[Pid], signal: Signal) -> Result<(), GroupError> {
        for &tid in tids {
            match self.signaller.signal(tid, signal) {
                // already exited
                Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
                Err(err) => return Err(GroupError::Signal { tid, signal, err }),
            }
        }

        Ok(())
    }

    fn foreign_tasks(path: &Path, own: &[Pid]) -> Result<Vec<Pid>, GroupError> {
        Ok(Self::read_tasks(path)?
            .into_iter()
            .filter(|tid| !own.contains(tid))
            .collect())
    }

    fn read_tasks(path: &Path) -> Result<Vec<Pid>, GroupError> {
        Ok(common::read_cgroup_values(path, codec::parse_int)?
            .into_iter()
            .filter_map(|tid| match i32::try_from(tid) {
                Ok(tid) => Some(Pid::from_raw(tid)),
                Err(_) => {
                    tracing::trace!(?path, tid, "skipping out of range thread id");
                    None
                }
            })
            .collect())
    }

    fn cpuset_dir(&self, name: &str) -> Result<PathBuf, GroupError> {
        Ok(self.group(name)?.subsystem_dir(Subsystem::CpuSet)?)
    }

    fn freezer_dir(&self, name: &str, reject_root: bool) -> Result<PathBuf, GroupError> {
        let group = self.group(name)?;
        if reject_root && group.name().is_root() {
            return Err(GroupError::RootGroup);
        }

        Ok(group.subsystem_dir(Subsystem::Freezer)?)
    }

    /// Membership is read from the cpuset hierarchy, or from the first one
    /// when cpuset is not configured.
    fn tasks_path(&self, group: &GroupPath) -> Result<PathBuf, GroupError> {
        let dir = match &self.config.layout {
            SubsystemLayout::PerSubsystem(subsystems)
                if !subsystems.contains(&Subsystem::CpuSet) =>
            {
                group
                    .dirs()?
                    .into_iter()
                    .next()
                    .ok_or(GroupPathError::UnsupportedSubsystem(Subsystem::CpuSet))?
            }
            _ => group.subsystem_dir(Subsystem::CpuSet)?,
        };

        Ok(dir.join(TASKS))
    }
}
