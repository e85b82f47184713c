//! Control groups provide a way of controlling groups of threads.
//! This crate manages named groups in cgroup v1 style `cpuset` and `freezer`
//! hierarchies: creating and removing them, moving threads into them, pinning
//! them to cpus and memory nodes, freezing them and tearing them down.
#[cfg(test)]
#[macro_use]
extern crate quickcheck;

#[cfg(test)]
#[macro_use]
extern crate mockall;

mod test;

pub mod codec;
pub mod common;
pub mod config;
pub mod cpuset;
pub mod freezer;
pub mod manager;
pub mod path;
pub mod poll;
pub mod signal;
pub mod subsystem;
pub mod threads;

pub use codec::{AttributeValue, FreezerState};
pub use config::{CgroupConfig, KillOptions, PollOptions, SubsystemLayout};
pub use manager::{GroupError, GroupManager};
pub use path::{GroupName, GroupPath};
pub use subsystem::Subsystem;
