use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use crate::codec::{self, AttributeValue};
use crate::common::{self, WrappedIoError};

const CGROUP_CPUSET_CPUS: &str = "cpuset.cpus";
const CGROUP_CPUSET_MEMS: &str = "cpuset.mems";
const CGROUP_CPUSET_MEMORY_MIGRATE: &str = "cpuset.memory_migrate";
const CGROUP_CPUSET_CPU_EXCLUSIVE: &str = "cpuset.cpu_exclusive";
const CGROUP_CPUSET_MEM_HARDWALL: &str = "cpuset.mem_hardwall";
const CGROUP_CPUSET_SCHED_RELAX_DOMAIN_LEVEL: &str = "cpuset.sched_relax_domain_level";

/// Levels accepted by `cpuset.sched_relax_domain_level`. -1 selects the
/// system default, 0 disables searching for idle cpus on wakeup.
pub const SCHED_RELAX_DOMAIN_LEVELS: RangeInclusive<i32> = -1..=5;

#[derive(thiserror::Error, Debug)]
pub enum CpuSetError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("{file} requires at least one entry")]
    EmptyList { file: &'static str },
    #[error("scheduling domain level {0} is outside of -1..=5")]
    SchedDomainLevel(i32),
    #[error("unexpected content of {path}: {content:?}")]
    UnexpectedContent { path: PathBuf, content: String },
}

impl CpuSetError {
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            CpuSetError::EmptyList { .. } | CpuSetError::SchedDomainLevel(_)
        )
    }
}

/// Boolean knobs of the cpuset controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuSetFlag {
    /// Move pages of member tasks when `cpuset.mems` changes.
    MemoryMigrate,
    /// Do not share cpus with sibling groups.
    CpuExclusive,
    /// Restrict kernel allocations of member tasks to the group's nodes.
    MemHardwall,
}

impl CpuSetFlag {
    pub fn file_name(&self) -> &'static str {
        match self {
            CpuSetFlag::MemoryMigrate => CGROUP_CPUSET_MEMORY_MIGRATE,
            CpuSetFlag::CpuExclusive => CGROUP_CPUSET_CPU_EXCLUSIVE,
            CpuSetFlag::MemHardwall => CGROUP_CPUSET_MEM_HARDWALL,
        }
    }
}

pub struct CpuSet {}

impl CpuSet {
    pub fn set_cpus(cgroup_path: &Path, cpus: &[usize]) -> Result<(), CpuSetError> {
        Self::write_list(cgroup_path, CGROUP_CPUSET_CPUS, cpus)
    }

    pub fn set_mems(cgroup_path: &Path, mems: &[usize]) -> Result<(), CpuSetError> {
        Self::write_list(cgroup_path, CGROUP_CPUSET_MEMS, mems)
    }

    pub fn set_flag(
        cgroup_path: &Path,
        flag: CpuSetFlag,
        enabled: bool,
    ) -> Result<(), CpuSetError> {
        common::write_cgroup_file(
            cgroup_path.join(flag.file_name()),
            AttributeValue::from(enabled),
        )?;
        Ok(())
    }

    pub fn flag(cgroup_path: &Path, flag: CpuSetFlag) -> Result<bool, CpuSetError> {
        Self::read_parsed(&cgroup_path.join(flag.file_name()), codec::parse_flag)
    }

    pub fn set_sched_relax_domain_level(cgroup_path: &Path, level: i32) -> Result<(), CpuSetError> {
        if !SCHED_RELAX_DOMAIN_LEVELS.contains(&level) {
            return Err(CpuSetError::SchedDomainLevel(level));
        }

        common::write_cgroup_file(
            cgroup_path.join(CGROUP_CPUSET_SCHED_RELAX_DOMAIN_LEVEL),
            AttributeValue::from(i64::from(level)),
        )?;
        Ok(())
    }

    /// Cpus the group may run on, with kernel ranges expanded.
    pub fn cpus(cgroup_path: &Path) -> Result<Vec<usize>, CpuSetError> {
        Self::read_parsed(&cgroup_path.join(CGROUP_CPUSET_CPUS), codec::parse_int_list)
    }

    pub fn mems(cgroup_path: &Path) -> Result<Vec<usize>, CpuSetError> {
        Self::read_parsed(&cgroup_path.join(CGROUP_CPUSET_MEMS), codec::parse_int_list)
    }

    fn read_parsed<T>(path: &Path, parse: fn(&str) -> Option<T>) -> Result<T, CpuSetError> {
        let content = common::read_cgroup_file(path)?;
        parse(&content).ok_or_else(|| CpuSetError::UnexpectedContent {
            path: path.to_path_buf(),
            content,
        })
    }

    fn write_list(
        cgroup_path: &Path,
        file: &'static str,
        values: &[usize],
    ) -> Result<(), CpuSetError> {
        if values.is_empty() {
            return Err(CpuSetError::EmptyList { file });
        }

        common::write_cgroup_file(cgroup_path.join(file), AttributeValue::from(values))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test::setup;

    #[test]
    fn test_set_cpus() {
        // arrange
        let (tmp, cpus) = setup(CGROUP_CPUSET_CPUS);

        // act
        CpuSet::set_cpus(tmp.path(), &[0, 2, 4]).expect("set cpus");

        // assert
        let content = fs::read_to_string(cpus)
            .unwrap_or_else(|_| panic!("read {CGROUP_CPUSET_CPUS} file content"));
        assert!(content.starts_with("0,2,4,"));
    }

    #[test]
    fn test_set_mems() {
        let (tmp, mems) = setup(CGROUP_CPUSET_MEMS);

        CpuSet::set_mems(tmp.path(), &[1]).expect("set mems");

        let content = fs::read_to_string(mems).unwrap();
        assert_eq!(content, "1,");
    }

    #[test]
    fn test_empty_list_is_rejected() {
        let (tmp, cpus) = setup(CGROUP_CPUSET_CPUS);
        fs::write(&cpus, "0-3").unwrap();

        let err = CpuSet::set_cpus(tmp.path(), &[]).unwrap_err();

        assert!(err.is_precondition());
        assert_eq!(fs::read_to_string(cpus).unwrap(), "0-3");
    }

    #[test]
    fn test_set_flags() {
        for flag in [
            CpuSetFlag::MemoryMigrate,
            CpuSetFlag::CpuExclusive,
            CpuSetFlag::MemHardwall,
        ] {
            let (tmp, file) = setup(flag.file_name());

            CpuSet::set_flag(tmp.path(), flag, true).expect("enable flag");
            assert_eq!(fs::read_to_string(&file).unwrap(), "1");
            assert!(CpuSet::flag(tmp.path(), flag).unwrap());

            CpuSet::set_flag(tmp.path(), flag, false).expect("disable flag");
            assert_eq!(fs::read_to_string(&file).unwrap(), "0");
        }
    }

    #[test]
    fn test_sched_relax_domain_level() {
        let (tmp, file) = setup(CGROUP_CPUSET_SCHED_RELAX_DOMAIN_LEVEL);

        CpuSet::set_sched_relax_domain_level(tmp.path(), -1).expect("set level");
        assert_eq!(fs::read_to_string(&file).unwrap(), "-1");

        for level in [-2, 6] {
            let err = CpuSet::set_sched_relax_domain_level(tmp.path(), level).unwrap_err();
            assert!(matches!(err, CpuSetError::SchedDomainLevel(l) if l == level));
        }
        assert_eq!(fs::read_to_string(&file).unwrap(), "-1");
    }

    #[test]
    fn test_read_back() {
        let (tmp, cpus) = setup(CGROUP_CPUSET_CPUS);
        fs::write(cpus, "0-3,8\n").unwrap();
        fs::write(tmp.path().join(CGROUP_CPUSET_MEMS), "0\n").unwrap();
        fs::write(tmp.path().join(CGROUP_CPUSET_MEM_HARDWALL), "1\n").unwrap();

        assert_eq!(CpuSet::cpus(tmp.path()).unwrap(), vec![0, 1, 2, 3, 8]);
        assert_eq!(CpuSet::mems(tmp.path()).unwrap(), vec![0]);
        assert!(CpuSet::flag(tmp.path(), CpuSetFlag::MemHardwall).unwrap());
    }

    #[test]
    fn test_read_unexpected_content() {
        let (tmp, cpus) = setup(CGROUP_CPUSET_CPUS);
        fs::write(cpus, "3-1\n").unwrap();
        fs::write(tmp.path().join(CGROUP_CPUSET_CPU_EXCLUSIVE), "yes\n").unwrap();

        let err = CpuSet::cpus(tmp.path()).unwrap_err();
        assert!(matches!(
            err,
            CpuSetError::UnexpectedContent { ref content, .. } if content == "3-1\n"
        ));
        assert!(!err.is_precondition());
        assert!(matches!(
            CpuSet::flag(tmp.path(), CpuSetFlag::CpuExclusive),
            Err(CpuSetError::UnexpectedContent { .. })
        ));
    }

    #[test]
    fn test_missing_group() {
        let tmp = tempfile::tempdir().unwrap();

        let err = CpuSet::set_cpus(&tmp.path().join("gone"), &[0]).unwrap_err();
        assert!(!err.is_precondition());
    }
}
