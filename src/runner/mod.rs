//! C3 — Instance Runner. See `runner::process` for the typestate runner,
//! `runner::shutdown` for graceful/escalated termination,
//! `runner::env` for `PM_*` variable injection, and `runner::logring` for
//! the bounded per-instance log buffer.

pub mod env;
pub mod logring;
pub mod process;
pub mod shutdown;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub use env::InstanceIdentity;
pub use process::{ExitRecord, ProcessRunner, SpawnError, Started, Unstarted};

/// Registry of PIDs an Instance Runner currently owns. The PID-1 reaper's
/// wait-any loop (`crate::signal`) consults this so it never double-waits a
/// PID a runner already claimed (spec §4.6, §9 "PID-1 reaper vs runner
/// wait"). Lives here rather than in `signal` because the runner is the side
/// that claims/releases; the reaper only reads it.
#[derive(Clone, Default)]
pub struct OwnedPids(Arc<Mutex<HashSet<i32>>>);

impl OwnedPids {
    pub fn new() -> Self {
        OwnedPids::default()
    }

    pub fn claim(&self, pid: i32) {
        self.0.lock().expect("owned pids mutex poisoned").insert(pid);
    }

    pub fn release(&self, pid: i32) {
        self.0.lock().expect("owned pids mutex poisoned").remove(&pid);
    }

    pub fn is_owned(&self, pid: i32) -> bool {
        self.0.lock().expect("owned pids mutex poisoned").contains(&pid)
    }
}
