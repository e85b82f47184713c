//! Delivery of signals to the threads of a group

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

#[cfg_attr(test, automock)]
pub trait Signaller {
    fn signal(&self, tid: Pid, signal: Signal) -> nix::Result<()>;
}

/// Sends signals with kill(2).
#[derive(Debug, Default, Clone, Copy)]
pub struct KillSignaller;

impl Signaller for KillSignaller {
    fn signal(&self, tid: Pid, sig: Signal) -> nix::Result<()> {
        signal::kill(tid, sig)
    }
}
