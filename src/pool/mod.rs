//! Process-level parallelism across functions (§5 "Across functions"): one
//! forked child per function, so a crash or hang analyzing one function
//! cannot take the rest of the run down with it. Separate from the
//! monitor's thread-per-client model in `crate::monitor`.

use crate::error::Result;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::collections::VecDeque;

/// Supervises up to `max_parallel` forked children at once, each running
/// `analyze` on one item from `work`. `analyze` must not return to the
/// parent - the child calls it and then exits the process directly.
pub struct Pool {
    max_parallel: usize,
}

impl Pool {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Runs `analyze(item)` once per `work` item, each in its own child
    /// process, keeping at most `max_parallel` children alive at a time.
    pub fn run<T, F>(&self, work: Vec<T>, analyze: F) -> Result<()>
    where
        F: Fn(&T),
    {
        let mut pending: VecDeque<T> = work.into_iter().collect();
        let mut running: usize = 0;

        while !pending.is_empty() || running > 0 {
            while running < self.max_parallel && !pending.is_empty() {
                let item = pending.pop_front().expect("queue just checked non-empty");
                match unsafe { fork() }? {
                    ForkResult::Child => {
                        analyze(&item);
                        std::process::exit(0);
                    }
                    ForkResult::Parent { .. } => {
                        running += 1;
                    }
                }
            }

            if running == 0 {
                break;
            }

            match waitpid(None::<Pid>, None) {
                Ok(WaitStatus::StillAlive) | Ok(WaitStatus::Continued(_)) | Ok(WaitStatus::Stopped(..)) => {}
                Ok(_) => running = running.saturating_sub(1),
                Err(nix::Error::Sys(nix::errno::Errno::ECHILD)) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_requested_parallelism_still_runs_at_least_one_at_a_time() {
        assert_eq!(Pool::new(0).max_parallel(), 1);
    }

    #[test]
    fn empty_work_list_returns_immediately() {
        let pool = Pool::new(4);
        pool.run(Vec::<u32>::new(), |_: &u32| {}).unwrap();
    }
}
