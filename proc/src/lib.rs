// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod stat;

use std::{
    env, fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::{Child, Command},
};

pub use civet_err::{Error, Result};
use log::{debug, warn};

use crate::stat::ProcessStat;

/// One background job started by the manager.
struct Job {
    pid: i32,
    path: PathBuf,
    child: Child,
}

/// What a reap sweep observed about a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    pub pid: i32,
    /// Terminated by a signal rather than exiting on its own.
    pub signaled: bool,
}

/// Owned list of background jobs.
///
/// Jobs spawned here are children of this process; the list is the only
/// bookkeeping, there is no process-wide state.
#[derive(Default)]
pub struct JobList {
    jobs: Vec<Job>,
}

impl JobList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `command` (absolute, `./relative` or bare) to an executable
    /// file and spawns it in the background with `args`.
    pub fn spawn(&mut self, command: &str, args: &[String]) -> Result<i32> {
        let path = resolve_executable(command)?;
        let child = Command::new(&path).args(args).spawn()?;
        let pid = child.id() as i32;
        debug!("spawned {} as pid {pid}", path.display());
        self.jobs.push(Job { pid, path, child });

        Ok(pid)
    }

    /// Pid and executable path of every live job, in spawn order.
    pub fn jobs(&self) -> impl Iterator<Item = (i32, &Path)> {
        self.jobs.iter().map(|job| (job.pid, job.path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn contains(&self, pid: i32) -> bool {
        self.jobs.iter().any(|job| job.pid == pid)
    }

    /// Non-blocking sweep over every job, pruning those that exited or were
    /// killed outside the manager and reporting each removal.
    pub fn reap(&mut self) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();
        self.jobs.retain_mut(|job| match job.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                outcomes.push(JobOutcome {
                    pid: job.pid,
                    signaled: status.code().is_none(),
                });
                false
            }
            Err(error) => {
                warn!("waiting on pid {}: {error}", job.pid);
                true
            }
        });

        outcomes
    }

    /// Sends SIGKILL, waits for termination and removes the job.
    pub fn kill(&mut self, pid: i32) -> Result<()> {
        let index = self
            .jobs
            .iter()
            .position(|job| job.pid == pid)
            .ok_or(Error::NotFound)?;
        signal(pid, libc::SIGKILL)?;
        let mut job = self.jobs.remove(index);
        job.child.wait()?;

        Ok(())
    }

    /// Sends SIGSTOP to a running job. A job already in the stopped state is
    /// reported instead of re-signaled.
    pub fn stop(&self, pid: i32) -> Result<()> {
        if !self.contains(pid) {
            return Err(Error::NotFound);
        }
        if ProcessStat::read(pid)?.state == 'T' {
            return Err(Error::InvalidInput(format!(
                "PID {pid} is already in stopped state"
            )));
        }

        signal(pid, libc::SIGSTOP)
    }

    /// Sends SIGCONT to a stopped job.
    pub fn resume(&self, pid: i32) -> Result<()> {
        if !self.contains(pid) {
            return Err(Error::NotFound);
        }
        if ProcessStat::read(pid)?.state != 'T' {
            return Err(Error::InvalidInput(format!(
                "PID {pid} was not in stopped state"
            )));
        }

        signal(pid, libc::SIGCONT)
    }
}

fn signal(pid: i32, signal: libc::c_int) -> Result<()> {
    // SAFETY: kill(2) takes the pid and signal number and touches no memory.
    if unsafe { libc::kill(pid, signal) } != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }

    Ok(())
}

/// Turns a command into an absolute path to an existing executable file.
fn resolve_executable(command: &str) -> Result<PathBuf> {
    let path = if command.starts_with('/') {
        PathBuf::from(command)
    } else {
        env::current_dir()?.join(command.trim_start_matches("./"))
    };

    let metadata = fs::metadata(&path).map_err(|_| Error::NotFound)?;
    if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
        return Err(Error::InvalidInput(format!(
            "{} is not executable",
            path.display()
        )));
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    #[test]
    fn spawn_kill_and_prune() {
        let mut jobs = JobList::new();
        let pid = jobs.spawn("/bin/sleep", &["30".to_string()]).unwrap();
        assert!(jobs.contains(pid));
        assert_eq!(jobs.len(), 1);

        jobs.kill(pid).unwrap();
        assert!(!jobs.contains(pid));
        assert!(jobs.is_empty());
    }

    #[test]
    fn reap_reports_exited_jobs() {
        let mut jobs = JobList::new();
        let pid = jobs.spawn("/bin/true", &[]).unwrap();

        let mut outcomes = Vec::new();
        for _ in 0..500 {
            outcomes = jobs.reap();
            if !outcomes.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(outcomes, vec![JobOutcome {
            pid,
            signaled: false
        }]);
        assert!(jobs.is_empty());
    }

    #[test]
    fn stop_and_resume_toggle_the_stopped_state() {
        let mut jobs = JobList::new();
        let pid = jobs.spawn("/bin/sleep", &["30".to_string()]).unwrap();

        jobs.stop(pid).unwrap();
        // SIGSTOP delivery is asynchronous; poll for the state change.
        let mut stopped = false;
        for _ in 0..500 {
            if ProcessStat::read(pid).unwrap().state == 'T' {
                stopped = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(stopped);
        // A second stop is reported, not re-signaled.
        assert!(jobs.stop(pid).is_err());

        jobs.resume(pid).unwrap();
        let mut resumed = false;
        for _ in 0..500 {
            if ProcessStat::read(pid).unwrap().state != 'T' {
                resumed = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(resumed);

        jobs.kill(pid).unwrap();
    }

    #[test]
    fn unknown_pids_are_rejected() {
        let mut jobs = JobList::new();
        assert!(matches!(jobs.kill(1), Err(Error::NotFound)));
        assert!(matches!(jobs.stop(1), Err(Error::NotFound)));
        assert!(matches!(jobs.resume(1), Err(Error::NotFound)));
    }

    #[test]
    fn missing_executables_are_not_spawned() {
        let mut jobs = JobList::new();
        assert!(matches!(
            jobs.spawn("/nonexistent/program", &[]),
            Err(Error::NotFound)
        ));
        assert!(jobs.is_empty());
    }
}
