use nix::unistd::{self, Pid};
use procfs::process::Process;
use procfs::ProcError;

#[derive(thiserror::Error, Debug)]
#[error("failed to list threads of process {pid}: {err}")]
pub struct ThreadsError {
    pub pid: Pid,
    #[source]
    pub err: ProcError,
}

/// Lists the ids of all threads of `pid` as found in `/proc/<pid>/task`.
/// Threads exiting during the scan are skipped.
pub fn list_threads(pid: Pid) -> Result<Vec<Pid>, ThreadsError> {
    let process = Process::new(pid.as_raw()).map_err(|err| ThreadsError { pid, err })?;
    let tasks = process.tasks().map_err(|err| ThreadsError { pid, err })?;

    Ok(tasks
        .filter_map(|task| match task {
            Ok(task) => Some(Pid::from_raw(task.tid)),
            Err(err) => {
                tracing::trace!(%pid, ?err, "skipping thread");
                None
            }
        })
        .collect())
}

/// Threads of the calling process.
pub fn own_threads() -> Result<Vec<Pid>, ThreadsError> {
    list_threads(unistd::getpid())
}

pub fn current_thread() -> Pid {
    unistd::gettid()
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;

    use super::*;

    #[test]
    fn test_lists_current_thread() {
        let threads = own_threads().expect("list own threads");

        assert!(threads.contains(&current_thread()));
        assert!(threads.contains(&unistd::getpid()));
    }

    #[test]
    fn test_lists_spawned_thread() {
        let (tid_tx, tid_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            tid_tx.send(current_thread()).unwrap();
            let _ = done_rx.recv();
        });

        let tid = tid_rx.recv().unwrap();
        let threads = own_threads().unwrap();
        done_tx.send(()).unwrap();
        handle.join().unwrap();

        assert!(threads.contains(&tid));
        assert_ne!(tid, current_thread());
    }

    #[test]
    fn test_missing_process() {
        // pid_max is at most 2^22
        let pid = Pid::from_raw(i32::MAX);

        let err = list_threads(pid).unwrap_err();
        assert_eq!(err.pid, pid);
    }
}
