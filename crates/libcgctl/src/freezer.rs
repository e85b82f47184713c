use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::codec::{AttributeValue, FreezerState, UnknownFreezerState};
use crate::common::{self, WrappedIoError};
use crate::config::PollOptions;
use crate::poll::{self, PollError};

const CGROUP_FREEZER_STATE: &str = "freezer.state";

#[derive(thiserror::Error, Debug)]
pub enum FreezerError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("unexpected content of {path}: {err}")]
    UnexpectedState {
        path: PathBuf,
        #[source]
        err: UnknownFreezerState,
    },
    #[error("{path} did not reach {state} within {waited:?}")]
    Timeout {
        path: PathBuf,
        state: FreezerState,
        waited: Duration,
    },
}

pub struct Freezer {}

impl Freezer {
    pub fn freeze(cgroup_path: &Path) -> Result<(), FreezerError> {
        Self::apply(cgroup_path, FreezerState::Frozen)
    }

    pub fn thaw(cgroup_path: &Path) -> Result<(), FreezerError> {
        Self::apply(cgroup_path, FreezerState::Thawed)
    }

    fn apply(cgroup_path: &Path, state: FreezerState) -> Result<(), FreezerError> {
        let path = cgroup_path.join(CGROUP_FREEZER_STATE);
        tracing::debug!(?path, %state, "set freezer state");
        common::write_cgroup_file(path, AttributeValue::from(state))?;
        Ok(())
    }

    pub fn state(cgroup_path: &Path) -> Result<FreezerState, FreezerError> {
        let path = cgroup_path.join(CGROUP_FREEZER_STATE);
        let line = common::read_cgroup_line(&path)?;
        line.parse()
            .map_err(|err| FreezerError::UnexpectedState { path, err })
    }

    /// Blocks until the freezer reports `state`. The kernel terminates the
    /// token with a newline; a single trailing newline is optional here, any
    /// other difference keeps waiting.
    pub fn wait_for(
        cgroup_path: &Path,
        state: FreezerState,
        options: PollOptions,
    ) -> Result<(), FreezerError> {
        let path = cgroup_path.join(CGROUP_FREEZER_STATE);
        poll::poll_until(options, || {
            let line = common::read_cgroup_line(&path)?;
            let reported = line.strip_suffix('\n').unwrap_or(&line);
            Ok::<_, FreezerError>((reported == state.as_str()).then_some(()))
        })
        .map_err(|err| match err {
            PollError::Check(err) => err,
            PollError::Deadline(deadline) => FreezerError::Timeout {
                path,
                state,
                waited: deadline.waited,
            },
        })
    }
}
