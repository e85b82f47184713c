use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Hash, PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    CpuSet,
    Freezer,
}

impl Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl AsRef<str> for Subsystem {
    fn as_ref(&self) -> &str {
        match *self {
            Self::CpuSet => "cpuset",
            Self::Freezer => "freezer",
        }
    }
}

pub const SUBSYSTEMS: &[Subsystem] = &[Subsystem::CpuSet, Subsystem::Freezer];
